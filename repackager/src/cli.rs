//! CLI argument definitions for the Perseus repackager.
//!
//! The surface is two reuse switches, each with a negated form. Both default
//! to on and the last occurrence wins.

use crate::config::PipelinePolicy;
use clap::Parser;

/// Patch and repackage the game client with the Perseus native library.
#[derive(Parser, Debug, Default)]
#[command(name = "perseus-repackager")]
#[command(version, about)]
#[command(long_about = concat!(
    "Patch and repackage the game client with the Perseus native library.\n\n",
    "Builds the native library, extracts the client from packages/, decompiles ",
    "it, injects the library, runs the patch script, rebuilds, aligns and signs. ",
    "All work happens in apk_build/ under the current directory.\n\n",
    "Running with no arguments reuses earlier extraction and decompilation and ",
    "takes the quick rebuild path when a previous build exists.",
))]
pub struct Cli {
    /// Reuse the extracted archive and decompiled tree when present [default].
    #[arg(long, overrides_with = "no_skip")]
    pub skip: bool,

    /// Always extract and decompile from scratch.
    #[arg(long, overrides_with = "skip")]
    pub no_skip: bool,

    /// Swap libraries into the previous build instead of running apktool
    /// [default].
    #[arg(long, overrides_with = "no_quick_rebuild")]
    pub quick_rebuild: bool,

    /// Always rebuild with apktool.
    #[arg(long, overrides_with = "quick_rebuild")]
    pub no_quick_rebuild: bool,
}

impl Cli {
    /// The reuse policy selected on the command line.
    #[must_use]
    pub fn policy(&self) -> PipelinePolicy {
        PipelinePolicy {
            skip_if_present: !self.no_skip,
            quick_rebuild: !self.no_quick_rebuild,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
