//! Runs the patch script against the decompiled tree.
//!
//! The script runs under the bundled busybox shell when one is shipped in
//! `bin/`, and under the system `sh` otherwise. Its working directory is the
//! shared working directory, so it sees the tree under the package name.

use crate::error::{PipelineError, Result};
use crate::exec::{CommandExecutor, Invocation, run_checked};
use crate::layout::{Layout, list_dir};
use camino::Utf8Path;
use log::info;

/// Bundled shell utility, run as `busybox sh <script>`.
pub const BUSYBOX: &str = "busybox";

/// Shell used when busybox is not bundled.
pub const SYSTEM_SHELL: &str = "sh";

/// Applies the patch script.
pub struct Patcher<'a> {
    executor: &'a dyn CommandExecutor,
    layout: &'a Layout,
}

impl<'a> Patcher<'a> {
    /// Create a patcher for the script in `layout`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, layout: &'a Layout) -> Self {
        Self { executor, layout }
    }

    /// Run the patch script.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ArtifactNotFound`] when the script is missing
    /// and [`PipelineError::ToolFailure`] when it exits non-zero.
    pub fn patch(&self) -> Result<()> {
        info!("patching decompiled sources");
        let script = self.layout.patch_script();
        if !script.is_file() {
            let parent = script.parent().unwrap_or(script);
            return Err(PipelineError::ArtifactNotFound {
                path: script.to_owned(),
                listing: list_dir(parent),
            });
        }

        let invocation = self.shell(script).current_dir(&self.layout.work_dir());
        run_checked(self.executor, &invocation).map(drop)
    }

    fn shell(&self, script: &Utf8Path) -> Invocation {
        let busybox = self.layout.bundled_tool(BUSYBOX);
        if busybox.is_file() {
            Invocation::new(busybox.as_str()).args([SYSTEM_SHELL, script.as_str()])
        } else {
            Invocation::new(SYSTEM_SHELL).arg(script.as_str())
        }
    }
}
