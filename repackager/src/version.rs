//! Version resolution for the patched package.
//!
//! The version only decorates artifact file names, so resolution never
//! fails. Sources are tried in order and the first to produce a value wins:
//!
//! 1. `versionName` from `aapt dump badging` of the candidate archive.
//! 2. The candidate archive's modification time (UTC).
//! 3. The current time (UTC).
//!
//! Timestamps use the `YYYYMMDDHHMMSS` form.

use crate::error::PipelineError;
use crate::exec::{CommandExecutor, Invocation};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use glob::Pattern;
use log::{debug, info, warn};
use regex::Regex;
use std::sync::LazyLock;

/// `strftime` format of timestamp versions.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Program used to read the manifest badging.
pub const BADGING_TOOL: &str = "aapt";

static VERSION_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"versionName='([^']+)'").ok());

/// One link of the version fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    /// `versionName` reported by the badging dump.
    Badging,
    /// Modification time of the candidate archive.
    ModificationTime,
    /// Time of the run.
    CurrentTime,
}

/// Sources in priority order.
pub const VERSION_CHAIN: [VersionSource; 3] = [
    VersionSource::Badging,
    VersionSource::ModificationTime,
    VersionSource::CurrentTime,
];

/// Resolves a version string for the package in a working directory.
pub struct VersionResolver<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> VersionResolver<'a> {
    /// Create a resolver that runs the badging tool through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    /// Resolve the version for `package` from the archives in `working_dir`.
    ///
    /// Always returns a value.
    #[must_use]
    pub fn resolve(&self, working_dir: &Utf8Path, package: &str) -> String {
        info!("getting version from apk file in {working_dir}");

        let candidate = find_version_candidate(working_dir, package);
        match &candidate {
            Some(apk) => info!("found apk for version extraction: {apk}"),
            None => warn!("no apk found to extract version; falling back to timestamp"),
        }

        VERSION_CHAIN
            .iter()
            .find_map(|source| {
                let version = self.attempt(*source, candidate.as_deref())?;
                info!("resolved version {version} from {source:?}");
                Some(version)
            })
            .unwrap_or_else(current_timestamp)
    }

    fn attempt(&self, source: VersionSource, candidate: Option<&Utf8Path>) -> Option<String> {
        match source {
            VersionSource::Badging => self.badging_version(candidate?),
            VersionSource::ModificationTime => modification_timestamp(candidate?),
            VersionSource::CurrentTime => Some(current_timestamp()),
        }
    }

    fn badging_version(&self, apk: &Utf8Path) -> Option<String> {
        let invocation = Invocation::new(BADGING_TOOL).args(["dump", "badging", apk.as_str()]);
        match self.executor.run(&invocation) {
            Ok(output) if output.status.success() => {
                parse_version_name(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                debug!("{BADGING_TOOL} exited with {}", output.status);
                None
            }
            Err(PipelineError::ToolUnavailable { .. }) => {
                debug!("{BADGING_TOOL} not found");
                None
            }
            Err(err) => {
                debug!("{BADGING_TOOL} could not run: {err}");
                None
            }
        }
    }
}

/// Pick the archive to read the version from.
///
/// Archives whose name starts with the package name are preferred over any
/// other `*.apk`; within each group the lexicographically first wins.
/// Previously produced `*.patched.apk` files are ignored so a leftover output
/// never stands in for the input.
#[must_use]
pub fn find_version_candidate(working_dir: &Utf8Path, package: &str) -> Option<Utf8PathBuf> {
    let preferred = Pattern::new(&format!("{}*.apk", Pattern::escape(package))).ok()?;
    let any_apk = Pattern::new("*.apk").ok()?;

    let mut names: Vec<String> = working_dir
        .read_dir_utf8()
        .ok()?
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_owned())
        .filter(|name| !name.ends_with(".patched.apk"))
        .collect();
    names.sort();

    names
        .iter()
        .find(|name| preferred.matches(name))
        .or_else(|| names.iter().find(|name| any_apk.matches(name)))
        .map(|name| working_dir.join(name))
}

/// Extract the `versionName` value from badging output.
///
/// # Examples
///
/// ```
/// use perseus_repackager::version::parse_version_name;
///
/// let badging = "package: name='com.bilibili.AzurLane' versionCode='90' versionName='9.1.2'";
/// assert_eq!(parse_version_name(badging).as_deref(), Some("9.1.2"));
/// assert_eq!(parse_version_name("sdkVersion:'21'"), None);
/// ```
#[must_use]
pub fn parse_version_name(output: &str) -> Option<String> {
    VERSION_NAME
        .as_ref()?
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().to_owned())
}

/// Format a point in time as a version timestamp.
#[must_use]
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

fn modification_timestamp(path: &Utf8Path) -> Option<String> {
    let modified = std::fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
    let version = format_timestamp(DateTime::<Utc>::from(modified));
    warn!("using timestamp fallback version: {version}");
    Some(version)
}

fn current_timestamp() -> String {
    let version = format_timestamp(Utc::now());
    warn!("using UTC-now fallback version: {version}");
    version
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;
