//! Native library build through `ndk-build`.
//!
//! The build runs before anything else touches the working directory. A
//! failure halts the pipeline and both captured streams are reported
//! verbatim.

use crate::error::{PipelineError, Result};
use crate::exec::{CommandExecutor, Invocation, tool_file_name};
use crate::layout::Layout;
use log::{error, info};
use std::num::NonZeroUsize;
use std::thread;

/// The NDK build driver, without its Windows suffix.
pub const NDK_BUILD: &str = "ndk-build";

/// Builds the native library project for every configured ABI.
pub struct NativeBuild<'a> {
    executor: &'a dyn CommandExecutor,
    layout: &'a Layout,
    android_platform: &'a str,
}

impl<'a> NativeBuild<'a> {
    /// Create a build of the project in `layout` targeting `android_platform`.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        layout: &'a Layout,
        android_platform: &'a str,
    ) -> Self {
        Self {
            executor,
            layout,
            android_platform,
        }
    }

    /// Build (or with `clean`, clean) the native libraries.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NativeBuildFailed`] with both streams when
    /// `ndk-build` exits non-zero, and [`PipelineError::ToolUnavailable`]
    /// when it is not installed.
    pub fn build(&self, clean: bool) -> Result<()> {
        info!("{} perseus libs", if clean { "cleaning" } else { "building" });

        let invocation = self.invocation(clean);
        let output = self.executor.run(&invocation)?;
        if output.status.success() {
            return Ok(());
        }

        error!("{NDK_BUILD} failed with {}", output.status);
        Err(PipelineError::NativeBuildFailed {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// The `ndk-build` invocation, run from the native project directory.
    #[must_use]
    pub fn invocation(&self, clean: bool) -> Invocation {
        let invocation = Invocation::new(tool_file_name(NDK_BUILD, ".cmd"))
            .args([
                "NDK_PROJECT_PATH=./src",
                "NDK_APPLICATION_MK=./src/Application.mk",
                "APP_BUILD_SCRIPT=./src/Android.mk",
            ])
            .arg(format!("APP_PLATFORM={}", self.android_platform))
            .arg(format!("-j{}", parallel_jobs()))
            .current_dir(self.layout.native_project());

        if clean {
            invocation.arg("clean")
        } else {
            invocation
        }
    }
}

/// Number of parallel jobs handed to the build, at least one.
#[must_use]
pub fn parallel_jobs() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}
