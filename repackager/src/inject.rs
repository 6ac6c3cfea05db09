//! Copies freshly built native libraries into the decompiled tree.

use crate::artifact::{ArtifactStage, BuildArtifact};
use crate::error::{PipelineError, Result};
use crate::layout::{list_dir, walk_files};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::fs;

/// Places the per-ABI library output into `<tree>/lib`.
pub struct LibraryInjector {
    source_dir: Utf8PathBuf,
}

impl LibraryInjector {
    /// Inject from `source_dir`, the native build's `libs/` directory.
    #[must_use]
    pub fn new(source_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }

    /// The directory libraries are copied from.
    #[must_use]
    pub fn source_dir(&self) -> &Utf8Path {
        &self.source_dir
    }

    /// Copy every file under the source directory into `tree`'s `lib/`,
    /// keeping the ABI subdirectories and overwriting existing files.
    ///
    /// Returns the copied destinations.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ArtifactNotFound`] if the source directory is
    /// missing, or an I/O error if a copy fails.
    pub fn inject(&self, tree: &BuildArtifact) -> Result<Vec<Utf8PathBuf>> {
        info!("copying Perseus libs");
        if !self.source_dir.is_dir() {
            let parent = self.source_dir.parent().unwrap_or(&self.source_dir);
            return Err(PipelineError::ArtifactNotFound {
                path: self.source_dir.clone(),
                listing: list_dir(parent),
            });
        }

        let lib_dir = tree.path.join("lib");
        let mut copied = Vec::new();
        for relative in walk_files(&self.source_dir)? {
            let dest = lib_dir.join(&relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(self.source_dir.join(&relative), &dest)?;
            debug!("copied {relative} to {dest}");
            copied.push(dest);
        }
        Ok(copied)
    }
}

/// The tree once libraries are in place and the patch has run.
#[must_use]
pub fn patched(tree: BuildArtifact) -> BuildArtifact {
    BuildArtifact::new(ArtifactStage::PatchedTree, tree.path)
}
