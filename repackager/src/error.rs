//! Error types for the repackaging pipeline.
//!
//! The variants follow the failure taxonomy of the pipeline: a tool that is
//! not installed, a tool that ran and failed, and an artifact that a stage
//! should have produced but did not. Fatal variants carry enough captured
//! output for `main` to echo a diagnosis before exiting.

use camino::Utf8PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors that can occur while patching and repackaging.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An external program could not be spawned because it is not installed.
    #[error("{tool} is not available")]
    ToolUnavailable {
        /// Program name or path that could not be found.
        tool: String,
    },

    /// An external program ran and exited unsuccessfully.
    #[error("{tool} failed with {status}")]
    ToolFailure {
        /// Program that failed.
        tool: String,
        /// Exit status reported by the program.
        status: ExitStatus,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The native library build failed. Both streams are dumped verbatim.
    #[error("ndk-build failed")]
    NativeBuildFailed {
        /// Captured standard output of the build.
        stdout: String,
        /// Captured standard error of the build.
        stderr: String,
    },

    /// No candidate package archive exists in the packages directory.
    #[error(
        "no package archives found in {dir}; expected something like {expected} or split archives"
    )]
    NoPackageArchive {
        /// Directory that was searched.
        dir: Utf8PathBuf,
        /// Example of the archive name that was expected.
        expected: String,
    },

    /// Every extraction strategy failed for the chosen archive.
    #[error("could not extract {archive}: {}", attempts.join("; "))]
    ExtractionFailed {
        /// Archive that could not be extracted.
        archive: Utf8PathBuf,
        /// One line per failed attempt, in the order they were tried.
        attempts: Vec<String>,
    },

    /// An entry inside an archive would be written outside the destination.
    #[error("archive entry escapes the destination directory: {entry}")]
    UnsafeArchiveEntry {
        /// Entry name as stored in the archive.
        entry: String,
    },

    /// A stage finished without producing the artifact the next stage needs.
    #[error("expected {path} to exist (directory contains: {})", listing.join(", "))]
    ArtifactNotFound {
        /// Artifact that is missing.
        path: Utf8PathBuf,
        /// Entries of the directory the artifact should have been written to.
        listing: Vec<String>,
    },

    /// An entry-level edit of an existing archive reported a failure.
    #[error("{operation} failed on {container}: {reason}")]
    ArchiveEdit {
        /// Container being edited.
        container: Utf8PathBuf,
        /// The edit operation that failed.
        operation: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration in {path}: {reason}")]
    InvalidConfig {
        /// Path to the configuration file.
        path: Utf8PathBuf,
        /// Description of the parse error.
        reason: String,
    },

    /// A filesystem path is not valid UTF-8.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading or writing a zip container failed.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Test stub received an unexpected or mismatched invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl PipelineError {
    /// Returns the captured tool output to echo after the error message.
    ///
    /// Only failures that carry tool output produce diagnostics; the native
    /// build always dumps both streams, other tools dump whichever stream is
    /// non-empty.
    #[must_use]
    pub fn diagnostics(&self) -> Option<String> {
        match self {
            Self::NativeBuildFailed { stdout, stderr } => Some(format!(
                concat!(
                    "======== ndk-build stdout ========\n",
                    "{}\n",
                    "======== ndk-build stderr ========\n",
                    "{}"
                ),
                stdout, stderr
            )),
            Self::ToolFailure {
                tool,
                stdout,
                stderr,
                ..
            } => {
                let mut sections = Vec::new();
                if !stdout.trim().is_empty() {
                    sections.push(format!("======== {tool} stdout ========\n{stdout}"));
                }
                if !stderr.trim().is_empty() {
                    sections.push(format!("======== {tool} stderr ========\n{stderr}"));
                }
                (!sections.is_empty()).then(|| sections.join("\n"))
            }
            _ => None,
        }
    }
}

/// Result type alias using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;
