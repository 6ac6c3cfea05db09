//! Discovery and extraction of the distributed package archive.
//!
//! Distributions arrive as a single (possibly renamed) archive or as split
//! volumes in `packages/`. Discovery prefers an archive named after the
//! package and otherwise takes the first `*.zip`, `*.7z` or `*part*` file.
//!
//! Extraction tries each [`ExtractionStrategy`] in turn: the bundled `7zz`,
//! the system `unzip`, then an in-process zip reader. Only a missing tool
//! moves on to the next strategy. The first tool that runs decides the
//! outcome, and its failure ends the run with its captured output.

use crate::artifact::{ArtifactStage, BuildArtifact, PackageName};
use crate::config::PipelinePolicy;
use crate::error::{PipelineError, Result};
use crate::exec::{CommandExecutor, Invocation, run_checked};
use crate::layout::{Layout, list_dir};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use glob::Pattern;
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::time::SystemTime;

/// Archive tool shipped in `bin/`.
pub const BUNDLED_ARCHIVER: &str = "7zz";

/// Fallback extractor expected on `PATH`.
pub const SYSTEM_UNZIP: &str = "unzip";

/// One way of unpacking an archive into a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// `bin/7zz x -y <archive>`, run from the target directory.
    BundledSevenZip,
    /// `unzip -o <archive> -d <target>`.
    SystemUnzip,
    /// Read the archive with the `zip` crate.
    InProcessZip,
}

/// Strategies in the order they are attempted.
pub const EXTRACTION_CHAIN: [ExtractionStrategy; 3] = [
    ExtractionStrategy::BundledSevenZip,
    ExtractionStrategy::SystemUnzip,
    ExtractionStrategy::InProcessZip,
];

/// Locates and unpacks the package archive into the working directory.
pub struct ArchiveExtractor<'a> {
    executor: &'a dyn CommandExecutor,
    layout: &'a Layout,
}

impl<'a> ArchiveExtractor<'a> {
    /// Create an extractor for `layout`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, layout: &'a Layout) -> Self {
        Self { executor, layout }
    }

    /// Extract the package archive into `target_dir` and return the raw APK.
    ///
    /// With `skip_if_present` set and the APK already in place, nothing is
    /// searched or run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoPackageArchive`] when discovery finds
    /// nothing, [`PipelineError::ToolFailure`] when an extractor runs and
    /// exits non-zero, [`PipelineError::ExtractionFailed`] when no tool is
    /// available and the in-process reader fails, and [`PipelineError::ArtifactNotFound`] when extraction
    /// succeeds without producing `<package>.apk`.
    pub fn extract(
        &self,
        package: &PackageName,
        target_dir: &Utf8Path,
        policy: PipelinePolicy,
    ) -> Result<BuildArtifact> {
        let raw = BuildArtifact::new(ArtifactStage::Raw, target_dir.join(package.raw_archive()));
        if policy.skip_if_present && raw.exists() {
            info!("{} already exists, skipping", package.raw_archive());
            return Ok(raw);
        }

        info!("searching for package archives in {}", self.layout.packages_dir());
        let archive = find_package_archive(&self.layout.packages_dir(), package)?;
        info!("using archive: {archive}");

        fs::create_dir_all(target_dir)?;
        self.unpack(&archive, target_dir)?;

        if !raw.exists() {
            return Err(PipelineError::ArtifactNotFound {
                path: raw.path,
                listing: list_dir(target_dir),
            });
        }
        Ok(raw)
    }

    fn unpack(&self, archive: &Utf8Path, target_dir: &Utf8Path) -> Result<()> {
        let mut attempts = Vec::new();

        for strategy in EXTRACTION_CHAIN {
            match self.attempt(strategy, archive, target_dir) {
                Ok(()) => return Ok(()),
                Err(PipelineError::ToolUnavailable { tool }) => {
                    info!("{tool} not found, trying next extractor");
                    attempts.push(format!("{tool} is not available"));
                }
                Err(err @ PipelineError::ToolFailure { .. }) => {
                    error!("{strategy:?} extraction failed: {err}");
                    return Err(err);
                }
                Err(err) => {
                    warn!("{strategy:?} extraction failed: {err}");
                    attempts.push(err.to_string());
                    break;
                }
            }
        }

        Err(PipelineError::ExtractionFailed {
            archive: archive.to_owned(),
            attempts,
        })
    }

    fn attempt(
        &self,
        strategy: ExtractionStrategy,
        archive: &Utf8Path,
        target_dir: &Utf8Path,
    ) -> Result<()> {
        match strategy {
            ExtractionStrategy::BundledSevenZip => {
                let sevenz = self.layout.bundled_tool(BUNDLED_ARCHIVER);
                if !sevenz.is_file() {
                    return Err(PipelineError::ToolUnavailable {
                        tool: sevenz.into_string(),
                    });
                }
                info!("extracting with {sevenz}");
                let invocation = Invocation::new(sevenz.as_str())
                    .args(["x", "-y", archive.as_str()])
                    .current_dir(target_dir);
                run_checked(self.executor, &invocation).map(drop)
            }
            ExtractionStrategy::SystemUnzip => {
                info!("falling back to system {SYSTEM_UNZIP}");
                let invocation = Invocation::new(SYSTEM_UNZIP).args([
                    "-o",
                    archive.as_str(),
                    "-d",
                    target_dir.as_str(),
                ]);
                run_checked(self.executor, &invocation).map(drop)
            }
            ExtractionStrategy::InProcessZip => {
                info!("extracting {archive} in-process");
                extract_zip(archive, target_dir).map(drop)
            }
        }
    }
}

/// Find the archive to extract in `packages_dir`.
///
/// # Errors
///
/// Returns [`PipelineError::NoPackageArchive`] when no candidate exists.
pub fn find_package_archive(packages_dir: &Utf8Path, package: &PackageName) -> Result<Utf8PathBuf> {
    let no_archive = || PipelineError::NoPackageArchive {
        dir: packages_dir.to_owned(),
        expected: format!("{package}.zip"),
    };

    let Ok(entries) = packages_dir.read_dir_utf8() else {
        return Err(no_archive());
    };
    let names: BTreeSet<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_owned())
        .collect();

    let exact = Pattern::new(&format!("{}*", Pattern::escape(package.as_str())));
    let fallbacks = ["*.zip", "*.7z", "*part*"].map(Pattern::new);

    let exact_match = exact
        .ok()
        .and_then(|pattern| names.iter().find(|name| pattern.matches(name)));
    let chosen = exact_match.or_else(|| {
        names.iter().find(|name| {
            fallbacks
                .iter()
                .flatten()
                .any(|pattern| pattern.matches(name))
        })
    });

    chosen
        .map(|name| packages_dir.join(name))
        .ok_or_else(no_archive)
}

/// Extract a zip archive into `dest_dir` and return the extracted file names.
///
/// Entries that would land outside `dest_dir` are rejected. Files keep the
/// modification time stored in the archive, read as UTC.
///
/// # Errors
///
/// Returns [`PipelineError::Zip`] if the file is not a readable zip,
/// [`PipelineError::UnsafeArchiveEntry`] for escaping entries, and
/// [`PipelineError::Io`] on write failures.
pub fn extract_zip(archive_path: &Utf8Path, dest_dir: &Utf8Path) -> Result<Vec<String>> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(PipelineError::UnsafeArchiveEntry {
                entry: entry.name().to_owned(),
            });
        };
        let dest_path = dest_dir.as_std_path().join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = fs::File::create(&dest_path)?;
        io::copy(&mut entry, &mut out)?;
        if let Some(modified) = entry.last_modified().and_then(stored_time) {
            out.set_modified(modified)?;
        }
        extracted.push(entry.name().to_owned());
    }

    Ok(extracted)
}

fn stored_time(stamp: zip::DateTime) -> Option<SystemTime> {
    let date = NaiveDate::from_ymd_opt(
        i32::from(stamp.year()),
        u32::from(stamp.month()),
        u32::from(stamp.day()),
    )?;
    let time = date.and_hms_opt(
        u32::from(stamp.hour()),
        u32::from(stamp.minute()),
        u32::from(stamp.second()),
    )?;
    Some(SystemTime::from(time.and_utc()))
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
