//! External command execution
//!
//! Every native tool (make, cmake, objdump, strip, patchelf, tar, ...) runs
//! through a [`CommandRunner`]. The runner receives the immutable session
//! environment and the command's own overrides, blocks until the child
//! exits and turns a non-zero exit into [`CommandError::Failed`].

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::build_env::EnvMap;
use crate::error::CommandError;

/// Where a command's standard input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Where a command's standard output goes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdoutSink {
    #[default]
    Capture,
    File(PathBuf),
}

/// One command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<StdinSource>,
    pub stdout: StdoutSink,
    pub allow_failure: bool,
}

impl CommandSpec {
    /// Command running `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            env: Vec::new(),
            cwd: None,
            stdin: None,
            stdout: StdoutSink::Capture,
            allow_failure: false,
        }
    }

    /// Add a single argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Add multiple arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path argument
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Override an environment variable for this command only
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Feed bytes on standard input
    #[must_use]
    pub fn stdin_bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(StdinSource::Bytes(data.into()));
        self
    }

    /// Feed a file on standard input
    #[must_use]
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(StdinSource::File(path.into()));
        self
    }

    /// Redirect standard output into a file
    #[must_use]
    pub fn stdout_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = StdoutSink::File(path.into());
        self
    }

    /// Do not treat a non-zero exit as an error
    #[must_use]
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))?;
        if let Some(StdinSource::File(path)) = &self.stdin {
            write!(f, " < {}", path.display())?;
        }
        if let StdoutSink::File(path) = &self.stdout {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub success: bool,
    /// Captured standard output (empty when redirected to a file)
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output carrying `stdout`
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Captured streams, stdout first
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Executes commands with a composed environment
pub trait CommandRunner {
    /// Run `cmd` with `env` as the complete base environment
    fn run(&self, env: &EnvMap, cmd: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runner spawning real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

fn io_error(path: &Path, e: &std::io::Error) -> CommandError {
    CommandError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, env: &EnvMap, cmd: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let (program, args) = cmd.argv.split_first().ok_or(CommandError::EmptyCommand)?;
        let shown = cmd.to_string();
        tracing::debug!("Running: {shown}");

        let mut command = Command::new(program);
        command.args(args).env_clear();
        for (key, value) in env.merged(&cmd.env).iter() {
            command.env(key, value);
        }
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }

        let mut pending_stdin = None;
        match &cmd.stdin {
            Some(StdinSource::File(path)) => {
                let file = File::open(path).map_err(|e| io_error(path, &e))?;
                command.stdin(Stdio::from(file));
            }
            Some(StdinSource::Bytes(data)) => {
                command.stdin(Stdio::piped());
                pending_stdin = Some(data.as_slice());
            }
            None => {
                command.stdin(Stdio::null());
            }
        }

        match &cmd.stdout {
            StdoutSink::Capture => {
                command.stdout(Stdio::piped());
            }
            StdoutSink::File(path) => {
                let file = File::create(path).map_err(|e| io_error(path, &e))?;
                command.stdout(Stdio::from(file));
            }
        }
        command.stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| CommandError::Spawn {
            command: shown.clone(),
            error: e.to_string(),
        })?;

        let output = std::thread::scope(|scope| {
            if let (Some(data), Some(mut stdin)) = (pending_stdin, child.stdin.take()) {
                scope.spawn(move || {
                    // A child that exits early closes the pipe; that is not our error.
                    let _ = stdin.write_all(data);
                });
            }
            child.wait_with_output()
        })
        .map_err(|e| CommandError::Spawn {
            command: shown.clone(),
            error: e.to_string(),
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success && !cmd.allow_failure {
            return Err(CommandError::Failed {
                command: shown,
                status: output.status.to_string(),
                output: result.combined(),
            });
        }

        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base_env() -> EnvMap {
        EnvMap::new().with_var("PATH", "/usr/bin:/bin")
    }

    #[test]
    fn test_captures_stdout() {
        let out = ProcessRunner
            .run(&base_env(), &CommandSpec::new("echo").arg("hello"))
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_override_wins_over_base_env() {
        let env = base_env().with_var("GREETING", "base");
        let cmd = CommandSpec::new("sh")
            .args(["-c", "echo $GREETING"])
            .env("GREETING", "override");

        let out = ProcessRunner.run(&env, &cmd).unwrap();
        assert_eq!(out.stdout.trim(), "override");
    }

    #[test]
    fn test_environment_is_exactly_the_merged_map() {
        let cmd = CommandSpec::new("sh").args(["-c", "echo ${HOME:-unset}"]);
        let out = ProcessRunner.run(&base_env(), &cmd).unwrap();
        assert_eq!(out.stdout.trim(), "unset");
    }

    #[test]
    fn test_non_zero_exit_is_an_error_with_output() {
        let cmd = CommandSpec::new("sh").args(["-c", "echo broken >&2; exit 3"]);
        let err = ProcessRunner.run(&base_env(), &cmd).unwrap_err();

        match err {
            CommandError::Failed { output, status, .. } => {
                assert!(output.contains("broken"));
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_tolerated_failure_returns_output() {
        let cmd = CommandSpec::new("sh")
            .args(["-c", "echo missing >&2; exit 1"])
            .allow_failure();
        let out = ProcessRunner.run(&base_env(), &cmd).unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(1));
        assert_eq!(out.stderr.trim(), "missing");
    }

    #[test]
    fn test_stdin_bytes_and_stdout_file() {
        let temp = TempDir::new().unwrap();
        let sink = temp.path().join("out.txt");
        let cmd = CommandSpec::new("cat")
            .stdin_bytes("piped through\n")
            .stdout_file(&sink);

        let out = ProcessRunner.run(&base_env(), &cmd).unwrap();
        assert!(out.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(&sink).unwrap(), "piped through\n");
    }

    #[test]
    fn test_stdin_file_and_cwd() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("input"), "from file").unwrap();
        let cmd = CommandSpec::new("cat")
            .stdin_file(temp.path().join("input"))
            .cwd(temp.path());

        let out = ProcessRunner.run(&base_env(), &cmd).unwrap();
        assert_eq!(out.stdout, "from file");
    }

    #[test]
    fn test_empty_and_missing_programs() {
        let empty = CommandSpec {
            argv: Vec::new(),
            ..CommandSpec::new("x")
        };
        assert!(matches!(
            ProcessRunner.run(&base_env(), &empty),
            Err(CommandError::EmptyCommand)
        ));

        let missing = CommandSpec::new("definitely-not-a-real-tool-4242");
        assert!(matches!(
            ProcessRunner.run(&base_env(), &missing),
            Err(CommandError::Spawn { .. })
        ));
    }

    #[test]
    fn test_display_shows_redirections() {
        let cmd = CommandSpec::new("rpm2cpio")
            .arg("sdk.rpm")
            .stdout_file("/tmp/sdk.rpm.cpio");
        assert_eq!(cmd.to_string(), "rpm2cpio sdk.rpm > /tmp/sdk.rpm.cpio");
    }
}
