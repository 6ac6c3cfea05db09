//! Decompile and rebuild through the bundled apktool jar.

use crate::artifact::{ArtifactStage, BuildArtifact};
use crate::config::PipelinePolicy;
use crate::error::{PipelineError, Result};
use crate::exec::{CommandExecutor, Invocation, run_checked};
use crate::layout::{Layout, list_dir};
use camino::Utf8Path;
use log::info;
use std::fs;

/// Java launcher used to run the jar.
pub const JAVA: &str = "java";

/// Converts between a package archive and its editable tree.
pub struct Apktool<'a> {
    executor: &'a dyn CommandExecutor,
    layout: &'a Layout,
}

impl<'a> Apktool<'a> {
    /// Create an adapter for the jar in `layout`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, layout: &'a Layout) -> Self {
        Self { executor, layout }
    }

    /// Decompile `raw` into `tree_dir`.
    ///
    /// With `skip_if_present` set an existing tree is reused untouched;
    /// otherwise any existing tree is removed first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ToolFailure`] when apktool exits non-zero and
    /// [`PipelineError::ArtifactNotFound`] when it leaves no tree behind.
    pub fn decompile(
        &self,
        raw: &BuildArtifact,
        tree_dir: &Utf8Path,
        policy: PipelinePolicy,
    ) -> Result<BuildArtifact> {
        let tree = BuildArtifact::new(ArtifactStage::DecompiledTree, tree_dir);
        if policy.skip_if_present && tree_dir.is_dir() {
            info!("{} is already decompiled, skipping", raw.path);
            return Ok(tree);
        }

        info!("decompiling {}", raw.path);
        if tree_dir.exists() {
            fs::remove_dir_all(tree_dir)?;
        }

        let invocation = self
            .jar()
            .args(["-q", "d", "-f", raw.path.as_str(), "-o", tree_dir.as_str()])
            .current_dir(&self.layout.work_dir());
        run_checked(self.executor, &invocation)?;

        if !tree_dir.is_dir() {
            let parent = tree_dir.parent().unwrap_or(tree_dir);
            return Err(PipelineError::ArtifactNotFound {
                path: tree_dir.to_owned(),
                listing: list_dir(parent),
            });
        }
        Ok(tree)
    }

    /// Rebuild `tree` into `output`.
    ///
    /// The output is not checked here; signing verifies it exists.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ToolFailure`] when apktool exits non-zero.
    pub fn rebuild(&self, tree: &BuildArtifact, output: &Utf8Path) -> Result<BuildArtifact> {
        info!("rebuilding {} with apktool", tree.path);
        let invocation = self
            .jar()
            .args(["-q", "b", "-f", tree.path.as_str(), "-o", output.as_str()])
            .current_dir(&self.layout.work_dir());
        run_checked(self.executor, &invocation)?;
        Ok(BuildArtifact::new(ArtifactStage::Rebuilt, output))
    }

    fn jar(&self) -> Invocation {
        Invocation::new(JAVA).args(["-jar", self.layout.apktool_jar().as_str()])
    }
}
