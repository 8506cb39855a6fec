//! Test utilities and mocks for neutron-pack unit tests.
//!
//! This module provides a scripted [`FakeRunner`] standing in for real
//! subprocess execution, plus fixture builders for project trees and
//! archives in the dependency cache.
//!
//! # Example
//!
//! ```rust,ignore
//! use neutron_pack::test_support::{CommandPattern, FakeRunner, MockProcessOutput};
//!
//! #[test]
//! fn test_example() {
//!     let runner = FakeRunner::new();
//!     runner.expect(CommandPattern::Contains("--build".into()), MockProcessOutput::failure(2, ""));
//!
//!     // Hand `&runner` to the code under test...
//!     assert_eq!(runner.count_matching("--build"), 1);
//! }
//! ```

pub mod fixtures;

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::util::process::{CapturedOutput, CommandRunner, CommandStatus, ProcessBuilder};

// Re-export fixtures for convenience
pub use fixtures::*;

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Report the command as killed by its timeout.
    pub timed_out: bool,
    /// Fail to spawn instead of running.
    pub spawn_error: bool,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
            spawn_error: false,
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
            timed_out: false,
            spawn_error: false,
        }
    }

    /// A process that hangs until killed.
    pub fn timeout() -> Self {
        MockProcessOutput {
            timed_out: true,
            ..MockProcessOutput::failure(-1, "")
        }
    }

    /// A program that cannot be started.
    pub fn not_found() -> Self {
        MockProcessOutput {
            spawn_error: true,
            ..MockProcessOutput::failure(-1, "")
        }
    }

    fn command_status(&self) -> CommandStatus {
        if self.timed_out {
            CommandStatus::timed_out()
        } else {
            CommandStatus::exited(Some(self.status))
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

/// Pattern for matching commands in FakeRunner.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
    /// Match using a regex pattern.
    Regex(String),
    /// Match any command.
    Any,
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
            CommandPattern::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(cmd))
                .unwrap_or(false),
            CommandPattern::Any => true,
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    /// Pattern to match against commands.
    pub pattern: CommandPattern,
    /// Output to return when matched.
    pub output: MockProcessOutput,
    /// Files written (with their contents) when the command runs.
    pub creates: Vec<(PathBuf, String)>,
    /// Number of times this expectation can be used (None = unlimited).
    pub times: Option<usize>,
    /// Number of times this expectation has been used.
    pub used: usize,
}

impl CommandExpectation {
    /// Create a new expectation.
    pub fn new(pattern: CommandPattern, output: MockProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            creates: Vec::new(),
            times: None,
            used: 0,
        }
    }

    /// Set the number of times this expectation can be used.
    pub fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }

    /// Simulate the command producing a file.
    pub fn creating(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.creates.push((path.into(), contents.into()));
        self
    }

    /// Check if this expectation can still be used.
    pub fn available(&self) -> bool {
        match self.times {
            Some(n) => self.used < n,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct RunnerState {
    expectations: Vec<CommandExpectation>,
    calls: Vec<String>,
}

/// Scripted [`CommandRunner`] that never spawns processes.
///
/// Expectations are matched in registration order; the first available one
/// wins. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct FakeRunner {
    state: Mutex<RunnerState>,
}

impl FakeRunner {
    /// Create a new fake runner.
    pub fn new() -> Self {
        FakeRunner::default()
    }

    /// Add an expectation for a command.
    pub fn expect(&self, pattern: CommandPattern, output: MockProcessOutput) {
        self.push(CommandExpectation::new(pattern, output));
    }

    /// Add a fully built expectation.
    pub fn push(&self, expectation: CommandExpectation) {
        if let Ok(mut state) = self.state.lock() {
            state.expectations.push(expectation);
        }
    }

    /// All commands run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    /// Number of recorded commands containing `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    fn respond(&self, cmd: &ProcessBuilder) -> Result<MockProcessOutput> {
        let line = cmd.display_command();
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => bail!("fake runner state poisoned"),
        };
        state.calls.push(line.clone());

        let matched = state
            .expectations
            .iter_mut()
            .find(|e| e.available() && e.pattern.matches(&line));

        let output = match matched {
            Some(expectation) => {
                expectation.used += 1;
                for (path, contents) in &expectation.creates {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, contents)?;
                }
                expectation.output.clone()
            }
            None => MockProcessOutput::default(),
        };

        if output.spawn_error {
            bail!("failed to spawn `{}`", cmd.get_program().display());
        }
        Ok(output)
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, cmd: &ProcessBuilder) -> Result<CommandStatus> {
        Ok(self.respond(cmd)?.command_status())
    }

    fn run_timed(&self, cmd: &ProcessBuilder, _timeout: Duration) -> Result<CapturedOutput> {
        let output = self.respond(cmd)?;
        Ok(CapturedOutput {
            status: output.command_status(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pattern_matching() {
        assert!(CommandPattern::Exact("cmake --version".into()).matches("cmake --version"));
        assert!(CommandPattern::StartsWith("cmake".into()).matches("cmake --build ."));
        assert!(CommandPattern::Contains("--build".into()).matches("cmake --build ."));
        assert!(CommandPattern::Regex(r"-j\d+".into()).matches("cmake --build . -j8"));
        assert!(CommandPattern::Any.matches("anything"));
        assert!(!CommandPattern::Contains("--preset".into()).matches("cmake .."));
    }

    #[test]
    fn test_fake_runner_scripted_responses() {
        let runner = FakeRunner::new();
        runner.push(
            CommandExpectation::new(
                CommandPattern::Contains("configure".into()),
                MockProcessOutput::failure(1, ""),
            )
            .times(1),
        );

        let cmd = ProcessBuilder::new("cmake").arg("configure");
        assert!(!runner.run(&cmd).unwrap().success());
        // Expectation exhausted; falls through to default success.
        assert!(runner.run(&cmd).unwrap().success());
        assert_eq!(runner.count_matching("configure"), 2);
    }

    #[test]
    fn test_fake_runner_creates_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = tmp.path().join("build").join("CMakeCache.txt");

        let runner = FakeRunner::new();
        runner.push(
            CommandExpectation::new(CommandPattern::Any, MockProcessOutput::success(""))
                .creating(&cache, "CMAKE_BUILD_TYPE:STRING=Release\n"),
        );

        runner.run(&ProcessBuilder::new("cmake")).unwrap();
        assert!(cache.exists());
    }

    #[test]
    fn test_fake_runner_timed_states() {
        let runner = FakeRunner::new();
        runner.expect(
            CommandPattern::Contains("slow".into()),
            MockProcessOutput::timeout(),
        );
        runner.expect(
            CommandPattern::Contains("missing".into()),
            MockProcessOutput::not_found(),
        );

        let out = runner
            .run_timed(&ProcessBuilder::new("slow"), Duration::from_secs(1))
            .unwrap();
        assert!(out.status.timed_out);
        assert!(runner
            .run_timed(&ProcessBuilder::new("missing"), Duration::from_secs(1))
            .is_err());
    }
}
