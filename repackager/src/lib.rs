//! Perseus repackager library.
//!
//! Builds the Perseus native library, injects it into the game client's
//! package and produces an aligned, test-signed archive. The
//! `perseus-repackager` binary is a thin wrapper over [`pipeline::Pipeline`].
//!
//! # Modules
//!
//! - [`apktool`] - Decompile and rebuild through apktool
//! - [`artifact`] - Package identity and per-stage artifacts
//! - [`bundle`] - Sidecar zip of the built libraries
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Reuse policy and `repackager.toml` settings
//! - [`error`] - Semantic error types with captured tool output
//! - [`exec`] - Structured invocation of external tools
//! - [`extract`] - Package archive discovery and extraction
//! - [`inject`] - Copying native libraries into the decompiled tree
//! - [`layout`] - Fixed filesystem layout of a root directory
//! - [`native`] - `ndk-build` adapter
//! - [`patch`] - Patch script runner
//! - [`pipeline`] - Stage sequencing
//! - [`repack`] - Differential repackaging of a previous build
//! - [`sign`] - Alignment and signing
//! - [`version`] - Version resolution fallback chain

pub mod apktool;
pub mod artifact;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod extract;
pub mod inject;
pub mod layout;
pub mod native;
pub mod patch;
pub mod pipeline;
pub mod repack;
pub mod sign;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
