//! Stage sequencing for a complete patch-and-repackage run.
//!
//! Stages run strictly in order and each hands the next an artifact on disk:
//!
//! 1. Build the native libraries.
//! 2. Extract the raw archive from `packages/`.
//! 3. Resolve the version.
//! 4. Decompile.
//! 5. Inject the libraries and run the patch script.
//! 6. Rebuild, fully or differentially.
//! 7. Align and sign.
//! 8. Bundle the libraries.
//!
//! Any error ends the run. Nothing is rolled back; leftover artifacts are
//! reused by the next run when the policy allows.

use crate::apktool::Apktool;
use crate::artifact::{BuildArtifact, LibraryEntry, PackageIdentity, PackageName};
use crate::bundle::bundle_libraries;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::exec::CommandExecutor;
use crate::extract::ArchiveExtractor;
use crate::inject::{LibraryInjector, patched};
use crate::layout::Layout;
use crate::native::NativeBuild;
use crate::patch::Patcher;
use crate::repack::{DifferentialRepackager, EntryEditor, RebuildMode, editor_for};
use crate::sign::Signer;
use crate::version::VersionResolver;
use camino::Utf8PathBuf;
use log::info;
use std::fs;
use std::time::{Duration, Instant};

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Package and resolved version.
    pub identity: PackageIdentity,
    /// The signed archive.
    pub artifact: BuildArtifact,
    /// The library bundle, when one was written.
    pub bundle: Option<Utf8PathBuf>,
    /// How the archive was rebuilt.
    pub rebuild_mode: RebuildMode,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

/// One configured run over a root directory.
pub struct Pipeline<'a> {
    executor: &'a dyn CommandExecutor,
    layout: &'a Layout,
    config: &'a PipelineConfig,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline that runs tools through `executor`.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        layout: &'a Layout,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            executor,
            layout,
            config,
        }
    }

    /// Run every stage.
    ///
    /// # Errors
    ///
    /// Returns the first stage error.
    pub fn run(&self) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let policy = self.config.policy;
        let settings = &self.config.settings;

        NativeBuild::new(self.executor, self.layout, &settings.android_platform).build(false)?;

        let work_dir = self.layout.work_dir();
        fs::create_dir_all(&work_dir)?;

        let package = PackageName::new(settings.package_name.as_str());
        let raw = ArchiveExtractor::new(self.executor, self.layout).extract(
            &package,
            &work_dir,
            policy,
        )?;

        let version = VersionResolver::new(self.executor).resolve(&work_dir, package.as_str());
        let identity = PackageIdentity::new(package, version);

        let tree_dir = work_dir.join(identity.name().tree_dir());
        let tree = Apktool::new(self.executor, self.layout).decompile(&raw, &tree_dir, policy)?;

        LibraryInjector::new(self.layout.native_libs_dir()).inject(&tree)?;
        Patcher::new(self.executor, self.layout).patch()?;
        let tree = patched(tree);

        let editor = editor_for(self.executor, self.layout);
        let (rebuild_mode, rebuilt) = self.rebuild(&identity, &tree, editor.as_ref())?;

        let artifact = Signer::new(self.executor, self.layout)
            .verify(settings.verify_signature)
            .sign(&rebuilt)?;

        let bundle = if settings.bundle_libraries {
            bundle_libraries(&self.layout.native_libs_dir(), &work_dir)?
        } else {
            None
        };

        Ok(PipelineOutcome {
            identity,
            artifact,
            bundle,
            rebuild_mode,
            elapsed: start.elapsed(),
        })
    }

    /// Produce the unsigned archive from the patched tree.
    ///
    /// Takes the differential path through `editor` when quick rebuild is on
    /// and the previous archive for this version exists, and otherwise
    /// recompiles with apktool.
    ///
    /// # Errors
    ///
    /// Returns errors from whichever rebuild ran.
    pub fn rebuild(
        &self,
        identity: &PackageIdentity,
        tree: &BuildArtifact,
        editor: &dyn EntryEditor,
    ) -> Result<(RebuildMode, BuildArtifact)> {
        let settings = &self.config.settings;
        let work_dir = self.layout.work_dir();
        let previous = work_dir.join(identity.patched_archive());

        let mode = RebuildMode::select(self.config.policy.quick_rebuild, previous.is_file());
        info!("rebuild mode: {mode}");

        let rebuilt = match mode {
            RebuildMode::Differential => {
                let entries =
                    LibraryEntry::for_abis(identity.name(), &settings.library_name, &settings.abis);
                DifferentialRepackager::new(editor)
                    .strict(settings.strict_archive_edits)
                    .repackage(identity, &work_dir, &entries)?
            }
            RebuildMode::Full => {
                Apktool::new(self.executor, self.layout).rebuild(tree, &previous)?
            }
        };
        Ok((mode, rebuilt))
    }
}
