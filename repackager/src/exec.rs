//! Structured invocation of external tools.
//!
//! Every tool the pipeline depends on (the NDK build, the badging dump, the
//! archive tool, apktool, the aligner and the signer) is launched through a
//! [`CommandExecutor`] with an explicit argument vector. Nothing is composed
//! into a shell string.

use crate::error::{PipelineError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fmt;
use std::io::ErrorKind;
use std::process::{Command, Output};

/// A single external program invocation.
///
/// # Examples
///
/// ```
/// use perseus_repackager::exec::Invocation;
///
/// let invocation = Invocation::new("aapt")
///     .args(["dump", "badging"])
///     .arg("base.apk");
/// assert_eq!(invocation.to_string(), "aapt dump badging base.apk");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    current_dir: Option<Utf8PathBuf>,
}

impl Invocation {
    /// Create an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the program from `dir` instead of the process working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: &Utf8Path) -> Self {
        self.current_dir = Some(dir.to_owned());
        self
    }

    /// The program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument vector, excluding the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The working directory, if one was set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.current_dir.as_deref()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs the invocation to completion and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ToolUnavailable`] when the program does not
    /// exist, or any other I/O error encountered while spawning it. A
    /// non-zero exit is *not* an error at this level; callers inspect
    /// `Output::status` and decide.
    fn run(&self, invocation: &Invocation) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, invocation: &Invocation) -> Result<Output> {
        debug!("running {invocation}");

        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.arguments());
        if let Some(dir) = invocation.working_dir() {
            cmd.current_dir(dir);
        }

        cmd.output().map_err(|err| match err.kind() {
            ErrorKind::NotFound => PipelineError::ToolUnavailable {
                tool: invocation.program().to_owned(),
            },
            _ => PipelineError::from(err),
        })
    }
}

/// Run an invocation and turn a non-zero exit into [`PipelineError::ToolFailure`].
///
/// # Errors
///
/// Propagates spawn errors from the executor and reports unsuccessful exits
/// with both captured streams.
pub fn run_checked(executor: &dyn CommandExecutor, invocation: &Invocation) -> Result<Output> {
    let output = executor.run(invocation)?;
    if output.status.success() {
        return Ok(output);
    }

    Err(PipelineError::ToolFailure {
        tool: invocation.program().to_owned(),
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Return the platform-specific file name for a bundled or SDK tool.
///
/// `windows_suffix` is the extension the tool carries on Windows
/// (`.exe`, `.cmd` or `.bat`); it is ignored elsewhere.
#[must_use]
pub fn tool_file_name(name: &str, windows_suffix: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}{windows_suffix}")
    } else {
        name.to_owned()
    }
}
