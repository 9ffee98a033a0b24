use crate::RuntimeError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// A fully described external command: program, arguments, working
/// directory and the variables added on top of the inherited environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[inline]
    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into an `ExternalProcess` error.
    pub fn check(self, command: &ExternalCommand) -> Result<Self, RuntimeError> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(RuntimeError::ExternalProcess {
                command: command.to_string(),
                code: self.code,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Seam between backends and the host's process table.
pub trait ProcessRunner {
    /// Run to completion with stdout/stderr captured. A non-zero exit is not
    /// an error at this level.
    fn capture(&self, command: &ExternalCommand) -> Result<CapturedOutput, RuntimeError>;

    /// Run attached to the caller's terminal. Returns the exit code.
    fn stream(&self, command: &ExternalCommand) -> Result<Option<i32>, RuntimeError>;
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn capture(&self, command: &ExternalCommand) -> Result<CapturedOutput, RuntimeError> {
        debug!("running (captured): {command}");
        let output = command
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(command, &e))?;
        Ok(CapturedOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn stream(&self, command: &ExternalCommand) -> Result<Option<i32>, RuntimeError> {
        debug!("running (attached): {command}");
        let status = command
            .to_command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_error(command, &e))?;
        Ok(status.code())
    }
}

fn spawn_error(command: &ExternalCommand, e: &std::io::Error) -> RuntimeError {
    RuntimeError::ExternalProcess {
        command: command.to_string(),
        code: None,
        stdout: String::new(),
        stderr: format!("failed to start {}: {e}", command.program),
    }
}

/// Capture and fail on a non-zero exit.
pub fn run_checked(
    runner: &dyn ProcessRunner,
    command: &ExternalCommand,
) -> Result<CapturedOutput, RuntimeError> {
    runner.capture(command)?.check(command)
}

/// Stream and fail on a non-zero exit.
pub fn stream_checked(
    runner: &dyn ProcessRunner,
    command: &ExternalCommand,
) -> Result<(), RuntimeError> {
    match runner.stream(command)? {
        Some(0) => Ok(()),
        code => Err(RuntimeError::ExternalProcess {
            command: command.to_string(),
            code,
            stdout: String::new(),
            stderr: String::new(),
        }),
    }
}

/// Stream an interactive session. The shell's exit code is whatever the
/// user's last command returned, so only a failure to spawn is an error.
pub fn stream_interactive(
    runner: &dyn ProcessRunner,
    command: &ExternalCommand,
) -> Result<(), RuntimeError> {
    match runner.stream(command)? {
        Some(0) => {}
        code => debug!("interactive session {} exited with {code:?}", command.program),
    }
    Ok(())
}

/// Resolve a user-supplied path against `base` when relative.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
