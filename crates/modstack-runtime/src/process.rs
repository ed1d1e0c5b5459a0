//! External process execution.
//!
//! Every program modstack runs (hooks, the container runtime) goes through a
//! [`ProcessRunner`], so tests can substitute a recording fake.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use modstack_common::error::{ModstackError, Result};
use nix::sys::signal::Signal;

/// A program invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Bytes fed to standard input; stdin is closed when absent.
    pub stdin: Option<Vec<u8>>,
}

impl ProcessSpec {
    /// Creates a spec for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds environment variables.
    #[must_use]
    pub fn envs(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Feeds `input` on standard input.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Program and arguments joined for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with a code.
    Exited(i32),
    /// Terminated by a signal.
    Signaled(i32),
}

impl ExitStatus {
    /// Returns whether the process exited with code 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Exited(-1),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit code {code}"),
            Self::Signaled(signal) => match Signal::try_from(*signal) {
                Ok(name) => write!(f, "killed by {name}"),
                Err(_) => write!(f, "killed by signal {signal}"),
            },
        }
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Exit status.
    pub status: ExitStatus,
}

impl ProcessOutput {
    /// A successful run printing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: ExitStatus::Exited(0),
        }
    }

    /// Standard error, or standard output when stderr is empty.
    #[must_use]
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs processes to completion.
pub trait ProcessRunner: Send + Sync {
    /// Runs `spec` and captures its output.
    ///
    /// A non-zero exit is not an error; inspect [`ProcessOutput::status`].
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::Process`] if the program cannot be started.
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput>;
}

/// Runs processes on the host with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput> {
        tracing::debug!(command = %spec.command_line(), "running process");
        let spawn_error = |source| ModstackError::Process {
            program: spec.program.clone(),
            source,
        };

        let mut command = Command::new(&spec.program);
        let _ = command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            let _ = command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(spawn_error)?;
        let writer = match (child.stdin.take(), spec.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(std::thread::spawn(move || {
                // The child may exit without reading everything.
                let _ = pipe.write_all(&input);
            })),
            _ => None,
        };
        let output = child.wait_with_output().map_err(spawn_error)?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let spec = ProcessSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = SystemRunner.run(&spec).expect("run");
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.status, ExitStatus::Exited(3));
        assert_eq!(output.diagnostic(), "err");
    }

    #[test]
    fn feeds_stdin_and_environment() {
        let spec = ProcessSpec::new("sh")
            .args(["-s", "--", "arg1"])
            .envs([("GREETING".to_string(), "hello".to_string())])
            .stdin("echo \"$GREETING $1\"\n");
        let output = SystemRunner.run(&spec).expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "hello arg1");
    }

    #[test]
    fn reports_signals() {
        let spec = ProcessSpec::new("sh").args(["-c", "kill -9 $$"]);
        let output = SystemRunner.run(&spec).expect("run");
        assert_eq!(output.status, ExitStatus::Signaled(9));
        assert_eq!(output.status.to_string(), "killed by SIGKILL");
    }

    #[test]
    fn missing_program_is_a_process_error() {
        let err = SystemRunner
            .run(&ProcessSpec::new("/nonexistent/modstack-test-binary"))
            .unwrap_err();
        assert!(matches!(err, ModstackError::Process { .. }));
    }

    #[test]
    fn command_line_joins_arguments() {
        let spec = ProcessSpec::new("docker").args(["compose", "up"]);
        assert_eq!(spec.command_line(), "docker compose up");
    }
}
