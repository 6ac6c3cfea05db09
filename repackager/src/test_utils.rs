//! Shared test utilities for the repackager crate.
//!
//! [`StubExecutor`] stands in for the external Android tooling. Each
//! [`ExpectedCall`] names the program and arguments it expects, the output to
//! return, and optionally a side effect that creates the files the real tool
//! would have produced.

use crate::error::{PipelineError, Result};
use crate::exec::{CommandExecutor, Invocation};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
pub fn success_output() -> Output {
    stdout_output("")
}

/// Creates a successful command `Output` with the given stdout.
pub fn stdout_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

type SideEffect = Box<dyn Fn(&Invocation)>;

/// Represents an expected command invocation for testing.
pub struct ExpectedCall {
    /// The program to execute (e.g., "7zz").
    pub program: String,
    /// The arguments to pass to the program.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
    effect: Option<SideEffect>,
}

impl ExpectedCall {
    /// Expect `program` with `args`; succeeds with empty output by default.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            result: Ok(success_output()),
            effect: None,
        }
    }

    /// Return `output` when invoked.
    #[must_use]
    pub fn returning(mut self, output: Output) -> Self {
        self.result = Ok(output);
        self
    }

    /// Fail to spawn, as if the program were not installed.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.result = Err(PipelineError::ToolUnavailable {
            tool: self.program.clone(),
        });
        self
    }

    /// Apply `effect` before returning, e.g. to write the tool's output file.
    #[must_use]
    pub fn with_effect(mut self, effect: impl Fn(&Invocation) + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }
}

impl fmt::Debug for ExpectedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectedCall")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("result", &self.result)
            .field("effect", &self.effect.is_some())
            .finish()
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects beyond
/// the ones each call opts into.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    invoked: RefCell<Vec<Invocation>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            invoked: RefCell::new(Vec::new()),
        }
    }

    /// Returns every invocation received so far.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invoked.borrow().clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.borrow();
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} left: {:?}",
            remaining.len(),
            remaining.front().map(|call| &call.program)
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, invocation: &Invocation) -> Result<Output> {
        self.invoked.borrow_mut().push(invocation.clone());

        let Some(call) = self.expected.borrow_mut().pop_front() else {
            return Err(PipelineError::StubMismatch {
                message: format!("unexpected invocation: {invocation}"),
            });
        };

        if call.program != invocation.program() || call.args != invocation.arguments() {
            return Err(PipelineError::StubMismatch {
                message: format!(
                    "expected `{} {}`, got `{invocation}`",
                    call.program,
                    call.args.join(" ")
                ),
            });
        }

        if let Some(effect) = &call.effect {
            effect(invocation);
        }

        call.result
    }
}
