//! Differential repackaging: swap native libraries into a previous build.
//!
//! A full apktool rebuild spends most of its time repackaging resources that
//! have not changed. When only the native libraries differ, the previous
//! signed archive is edited in place instead:
//!
//! 1. Rename the archive to a scratch container.
//! 2. Delete the library entries.
//! 3. Add the freshly built libraries.
//! 4. Move the added entries to their final paths.
//! 5. Rename the container back.
//!
//! Steps 2 to 4 are performed by an [`EntryEditor`]. Each reports its own
//! outcome in an [`EditReport`]; whether a failed step aborts the run is the
//! caller's choice (see [`DifferentialRepackager::strict`]).
//!
//! Only valid when nothing but the native libraries changed since the
//! previous archive was produced.

use crate::artifact::{
    ArtifactStage, BuildArtifact, LibraryEntry, PackageIdentity, normalize_entry_path,
};
use crate::error::{PipelineError, Result};
use crate::exec::{CommandExecutor, Invocation};
use crate::extract::BUNDLED_ARCHIVER;
use crate::layout::Layout;
use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// How the unsigned archive was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildMode {
    /// Recompiled from the patched tree.
    Full,
    /// Library entries swapped into the previous archive.
    Differential,
}

impl RebuildMode {
    /// Pick the rebuild mode for this run.
    ///
    /// The differential path needs both the policy and a previous archive.
    #[must_use]
    pub fn select(quick_rebuild: bool, previous_exists: bool) -> Self {
        if quick_rebuild && previous_exists {
            Self::Differential
        } else {
            Self::Full
        }
    }
}

impl fmt::Display for RebuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Differential => "differential",
        })
    }
}

/// An entry-level operation on a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOperation {
    /// Remove entries.
    Delete,
    /// Add entries from disk.
    Add,
    /// Move entries to new paths.
    Rename,
}

impl EditOperation {
    /// Lower-case label used in logs and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Add => "add",
            Self::Rename => "rename",
        }
    }

    fn progress(self) -> &'static str {
        match self {
            Self::Delete => "deleting",
            Self::Add => "adding",
            Self::Rename => "renaming",
        }
    }
}

/// Outcome of one edit operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditStep {
    /// The operation performed.
    pub operation: EditOperation,
    /// Whether it succeeded.
    pub succeeded: bool,
    /// Exit status or failure description.
    pub detail: String,
}

/// Outcomes of every operation an editor performed, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditReport {
    steps: Vec<EditStep>,
}

impl EditReport {
    /// Append the outcome of one operation.
    pub fn record(&mut self, operation: EditOperation, succeeded: bool, detail: impl Into<String>) {
        self.steps.push(EditStep {
            operation,
            succeeded,
            detail: detail.into(),
        });
    }

    /// All recorded steps.
    #[must_use]
    pub fn steps(&self) -> &[EditStep] {
        &self.steps
    }

    /// The first failed step, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&EditStep> {
        self.steps.iter().find(|step| !step.succeeded)
    }
}

/// Replaces library entries inside a zip container.
#[cfg_attr(test, mockall::automock)]
pub trait EntryEditor {
    /// Replace each entry's `entry_path` with the file at
    /// `work_dir/<tree_path>`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the edit could not be attempted at all;
    /// individual operation failures are reported in the [`EditReport`].
    fn replace_entries(
        &self,
        container: &Utf8Path,
        work_dir: &Utf8Path,
        entries: &[LibraryEntry],
    ) -> Result<EditReport>;
}

/// Edits the container with the bundled archive tool's `d`, `a` and `rn`.
///
/// Adding stages each library under its path relative to the working
/// directory (`<package>/lib/<abi>/...`), so a rename pass moves it to the
/// final entry path.
pub struct SevenZipEditor<'a> {
    executor: &'a dyn CommandExecutor,
    archiver: Utf8PathBuf,
}

impl<'a> SevenZipEditor<'a> {
    /// Create an editor that runs `archiver`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, archiver: impl Into<Utf8PathBuf>) -> Self {
        Self {
            executor,
            archiver: archiver.into(),
        }
    }

    fn step(
        &self,
        report: &mut EditReport,
        operation: EditOperation,
        container: &Utf8Path,
        work_dir: &Utf8Path,
        operands: Vec<String>,
    ) -> Result<()> {
        let command = match operation {
            EditOperation::Delete => "d",
            EditOperation::Add => "a",
            EditOperation::Rename => "rn",
        };
        let invocation = Invocation::new(self.archiver.as_str())
            .args(["-y", command, container.as_str()])
            .args(operands)
            .current_dir(work_dir);

        let output = self.executor.run(&invocation)?;
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_owned(), |code| code.to_string());
        info!("{} libs in archive, ret={code}", operation.progress());

        let detail = if output.status.success() {
            format!("ret={code}")
        } else {
            format!(
                "ret={code}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )
        };
        report.record(operation, output.status.success(), detail);
        Ok(())
    }
}

impl EntryEditor for SevenZipEditor<'_> {
    fn replace_entries(
        &self,
        container: &Utf8Path,
        work_dir: &Utf8Path,
        entries: &[LibraryEntry],
    ) -> Result<EditReport> {
        let mut report = EditReport::default();

        let targets = entries.iter().map(|entry| entry.entry_path.clone()).collect();
        self.step(&mut report, EditOperation::Delete, container, work_dir, targets)?;

        let staged = entries.iter().map(LibraryEntry::staged_entry_path).collect();
        self.step(&mut report, EditOperation::Add, container, work_dir, staged)?;

        let pairs = entries
            .iter()
            .flat_map(|entry| [entry.staged_entry_path(), entry.entry_path.clone()])
            .collect();
        self.step(&mut report, EditOperation::Rename, container, work_dir, pairs)?;

        Ok(report)
    }
}

/// Rewrites the container with the `zip` crate.
///
/// Unchanged entries are copied without recompression. Libraries are written
/// straight to their final paths, stored uncompressed so the aligner can
/// page-align them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipRewriter;

impl EntryEditor for ZipRewriter {
    fn replace_entries(
        &self,
        container: &Utf8Path,
        work_dir: &Utf8Path,
        entries: &[LibraryEntry],
    ) -> Result<EditReport> {
        let mut report = EditReport::default();
        let targets: HashSet<&str> = entries.iter().map(|e| e.entry_path.as_str()).collect();

        let mut archive = ZipArchive::new(fs::File::open(container)?)?;
        let scratch_dir = container.parent().unwrap_or(work_dir);
        let mut writer = ZipWriter::new(tempfile::NamedTempFile::new_in(scratch_dir)?);

        let mut removed = 0_usize;
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if targets.contains(normalize_entry_path(entry.name()).as_str()) {
                removed += 1;
                continue;
            }
            writer.raw_copy_file(entry)?;
        }
        info!("deleting libs in archive, removed {removed} entries");
        report.record(
            EditOperation::Delete,
            true,
            format!("removed {removed} entries"),
        );

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut missing = Vec::new();
        for entry in entries {
            let source = work_dir.join(&entry.tree_path);
            let mut file = match fs::File::open(&source) {
                Ok(file) => file,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    missing.push(source.into_string());
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            writer.start_file(entry.entry_path.as_str(), options)?;
            io::copy(&mut file, &mut writer)?;
        }
        info!(
            "adding libs to archive, {} of {} written",
            entries.len() - missing.len(),
            entries.len()
        );
        if missing.is_empty() {
            report.record(EditOperation::Add, true, format!("added {} entries", entries.len()));
        } else {
            report.record(
                EditOperation::Add,
                false,
                format!("missing {}", missing.join(", ")),
            );
        }

        let rewritten = writer.finish()?;
        drop(archive);
        rewritten
            .persist(container)
            .map_err(|err| PipelineError::from(err.error))?;
        Ok(report)
    }
}

/// Choose the editor for `layout`: the bundled archive tool when shipped,
/// the in-process rewriter otherwise.
#[must_use]
pub fn editor_for<'a>(
    executor: &'a dyn CommandExecutor,
    layout: &Layout,
) -> Box<dyn EntryEditor + 'a> {
    let archiver = layout.bundled_tool(BUNDLED_ARCHIVER);
    if archiver.is_file() {
        Box::new(SevenZipEditor::new(executor, archiver))
    } else {
        info!("{BUNDLED_ARCHIVER} not found in bin/, editing archive in-process");
        Box::new(ZipRewriter)
    }
}

/// Drives the rename, edit, rename-back cycle around an [`EntryEditor`].
pub struct DifferentialRepackager<'a> {
    editor: &'a dyn EntryEditor,
    strict: bool,
}

impl<'a> DifferentialRepackager<'a> {
    /// Create a lenient repackager: failed edit steps are only logged.
    #[must_use]
    pub fn new(editor: &'a dyn EntryEditor) -> Self {
        Self {
            editor,
            strict: false,
        }
    }

    /// Make a failed edit step fatal.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Replace `entries` inside the previous archive for `identity`.
    ///
    /// The archive keeps its name; it is returned tagged as rebuilt and
    /// unsigned.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from the renames, errors from the editor, and in
    /// strict mode [`PipelineError::ArchiveEdit`] for the first failed step.
    /// The container is renamed back before any editor error is returned.
    pub fn repackage(
        &self,
        identity: &PackageIdentity,
        work_dir: &Utf8Path,
        entries: &[LibraryEntry],
    ) -> Result<BuildArtifact> {
        let archive = work_dir.join(identity.patched_archive());
        let scratch = work_dir.join(identity.scratch_container());
        info!("rebuilding {} quickly", identity.name().raw_archive());

        fs::rename(&archive, &scratch)?;
        let edited = self.editor.replace_entries(&scratch, work_dir, entries);
        fs::rename(&scratch, &archive)?;
        let report = edited?;

        if let Some(failed) = report.first_failure() {
            if self.strict {
                return Err(PipelineError::ArchiveEdit {
                    container: archive,
                    operation: failed.operation.as_str(),
                    reason: failed.detail.clone(),
                });
            }
            for step in report.steps().iter().filter(|step| !step.succeeded) {
                warn!(
                    "{} step failed ({}); the archive may hold stale libraries",
                    step.operation.as_str(),
                    step.detail
                );
            }
        }

        Ok(BuildArtifact::new(ArtifactStage::Rebuilt, archive))
    }
}

#[cfg(test)]
#[path = "repack_tests.rs"]
mod tests;
