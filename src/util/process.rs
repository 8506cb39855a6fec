//! Subprocess execution utilities.
//!
//! Every external tool the orchestrator drives (cmake, vcpkg, makensis, npm,
//! the freshly built binaries) goes through [`ProcessBuilder`]. Callers that
//! need to be testable without spawning real processes take a
//! [`CommandRunner`] instead of calling the builder directly.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    env_remove: Vec<String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            env_remove: Vec::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set several environment variables at once.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            self.env
                .insert(key.as_ref().to_string(), value.as_ref().to_string());
        }
        self
    }

    /// Remove an environment variable.
    pub fn env_remove(mut self, key: impl AsRef<str>) -> Self {
        self.env_remove.push(key.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the working directory, if one was set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Get an explicitly set environment variable.
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        for key in &self.env_remove {
            cmd.env_remove(key);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute with inherited stdio and return status only.
    pub fn status(&self) -> Result<ExitStatus> {
        let mut cmd = self.build_command();
        let status = cmd
            .status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))?;
        Ok(status)
    }

    /// Execute under a wall-clock limit, capturing output.
    ///
    /// stdout and stderr are read on background threads from the moment the
    /// child starts. The child is killed once `timeout` elapses, and output
    /// is collected only until the same deadline: a background process that
    /// inherited the pipes cannot extend the wait.
    pub fn exec_with_timeout(&self, timeout: Duration) -> Result<CapturedOutput> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        let deadline = Instant::now() + timeout;
        let (tx, rx) = mpsc::channel();
        if let Some(out) = child.stdout.take() {
            forward_output(out, Stream::Stdout, tx.clone());
        }
        if let Some(err) = child.stderr.take() {
            forward_output(err, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break CommandStatus::exited(status.code()),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break CommandStatus::timed_out();
                }
                Ok(None) => thread::sleep(Duration::from_millis(50)),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e).with_context(|| {
                        format!("failed to wait for `{}`", self.program.display())
                    });
                }
            }
        };

        let (stdout, stderr) = collect_output(&rx, deadline);
        Ok(CapturedOutput {
            status,
            stdout,
            stderr,
        })
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Copy a pipe into `tx` chunk by chunk until EOF. The thread is detached;
/// it ends when every writer of the pipe has closed it.
fn forward_output(
    mut pipe: impl Read + Send + 'static,
    stream: Stream,
    tx: Sender<(Stream, Vec<u8>)>,
) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send((stream, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

/// Gather forwarded output until both pipes close or `deadline` passes.
fn collect_output(rx: &Receiver<(Stream, Vec<u8>)>, deadline: Instant) -> (String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let received = if remaining.is_zero() {
            rx.try_recv().map_err(|e| matches!(e, TryRecvError::Disconnected))
        } else {
            rx.recv_timeout(remaining)
                .map_err(|e| matches!(e, RecvTimeoutError::Disconnected))
        };
        match received {
            Ok((Stream::Stdout, chunk)) => stdout.extend_from_slice(&chunk),
            Ok((Stream::Stderr, chunk)) => stderr.extend_from_slice(&chunk),
            Err(true) => break,
            Err(false) => {
                tracing::debug!("output still open at the deadline; returning what arrived");
                break;
            }
        }
    }
    (
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

/// How a subprocess finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandStatus {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Whether the process was killed for exceeding its time limit.
    pub timed_out: bool,
}

impl CommandStatus {
    pub fn exited(code: Option<i32>) -> Self {
        CommandStatus {
            code,
            timed_out: false,
        }
    }

    pub fn timed_out() -> Self {
        CommandStatus {
            code: None,
            timed_out: true,
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.timed_out {
            write!(f, "timed out")
        } else {
            match self.code {
                Some(code) => write!(f, "exit code {}", code),
                None => write!(f, "terminated by signal"),
            }
        }
    }
}

/// Captured result of a time-limited run.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Seam between orchestration logic and real process execution.
pub trait CommandRunner {
    /// Run a command to completion with inherited stdio.
    fn run(&self, cmd: &ProcessBuilder) -> Result<CommandStatus>;

    /// Run a short command under a time limit, capturing its output.
    fn run_timed(&self, cmd: &ProcessBuilder, timeout: Duration) -> Result<CapturedOutput>;
}

/// Runner that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ProcessBuilder) -> Result<CommandStatus> {
        tracing::info!("Running: {}", cmd.display_command());
        let status = cmd.status()?;
        Ok(CommandStatus::exited(status.code()))
    }

    fn run_timed(&self, cmd: &ProcessBuilder, timeout: Duration) -> Result<CapturedOutput> {
        tracing::debug!("Running with timeout: {}", cmd.display_command());
        cmd.exec_with_timeout(timeout)
    }
}

/// Number of CPUs to hand to the native build tool as a parallelism hint.
pub fn cpu_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
