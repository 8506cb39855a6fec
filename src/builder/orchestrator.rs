//! Effect runner for the build state machine.
//!
//! [`Orchestrator::run_target`] drives one [`BuildTarget`] from `Init` to a
//! terminal state, executing the effects [`transition`] requests and
//! feeding the results back as events.

use std::path::PathBuf;
use std::thread;

use serde::Serialize;

use crate::builder::cmake::CMake;
use crate::builder::machine::{
    transition, BuildEvent, BuildOutcome, BuildState, Effect, RetryPolicy,
};
use crate::core::target::BuildTarget;
use crate::recovery::{Diagnosis, RecoveryAction, RecoveryEngine};
use crate::util::fs::ensure_dir;
use crate::util::process::{CommandRunner, CommandStatus};
use crate::util::shell::{Shell, Status};
use crate::util::vcpkg::{manifest_install_log, retire_manifest_install_log};

/// One configure invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub command: String,
    /// `None` when the command could not be spawned.
    pub status: Option<CommandStatus>,
    /// Manifest-install log written by this attempt, if any.
    pub log_path: Option<PathBuf>,
}

/// Everything that happened while building one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub name: String,
    pub outcome: BuildOutcome,
    pub attempts: Vec<AttemptRecord>,
    pub recovery_actions: Vec<RecoveryAction>,
}

/// Runs targets through the configure/recover/build loop.
pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    shell: &'a Shell,
    cmake: CMake,
    engine: RecoveryEngine,
    policy: RetryPolicy,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        shell: &'a Shell,
        cmake: CMake,
        engine: RecoveryEngine,
        policy: RetryPolicy,
    ) -> Self {
        Orchestrator {
            runner,
            shell,
            cmake,
            engine,
            policy,
        }
    }

    pub fn cmake(&self) -> &CMake {
        &self.cmake
    }

    /// Build one target to a terminal outcome.
    ///
    /// `prior_artifact` says whether a binary from an earlier run already
    /// exists; it decides between degraded and fatal when configure never
    /// succeeds.
    pub fn run_target(&self, target: &BuildTarget, prior_artifact: bool) -> TargetReport {
        let mut report = TargetReport {
            name: target.name.clone(),
            outcome: BuildOutcome::Success,
            attempts: Vec::new(),
            recovery_actions: Vec::new(),
        };

        if !target.source_dir.is_dir() {
            let reason = format!("source directory {} not found", target.source_dir.display());
            self.shell
                .warn(format!("{}: {}; skipping build", target.name, reason));
            report.outcome = BuildOutcome::Degraded(reason);
            return report;
        }

        let (mut state, mut effects) = transition(&BuildState::Init, &BuildEvent::Start, &self.policy);

        loop {
            if let Some(outcome) = state.outcome() {
                report.outcome = outcome;
                break;
            }

            let mut next = None;
            for effect in effects {
                if let Some(event) = self.perform(target, &effect, prior_artifact, &mut report) {
                    next = Some(event);
                }
            }

            let Some(event) = next else {
                // Every non-terminal state requests an effect that yields an event.
                report.outcome = BuildOutcome::Degraded("build loop stalled".to_string());
                break;
            };
            (state, effects) = transition(&state, &event, &self.policy);
        }

        match &report.outcome {
            BuildOutcome::Success => tracing::info!("{} built successfully", target.name),
            BuildOutcome::Degraded(reason) => {
                self.shell
                    .warn(format!("{} is degraded: {}", target.name, reason))
            }
            BuildOutcome::Fatal(reason) => {
                self.shell.error(format!("{} failed: {}", target.name, reason))
            }
        }
        report
    }

    fn perform(
        &self,
        target: &BuildTarget,
        effect: &Effect,
        prior_artifact: bool,
        report: &mut TargetReport,
    ) -> Option<BuildEvent> {
        match effect {
            Effect::ScanCache => {
                let actions = self.engine.scan_cache();
                for action in &actions {
                    self.shell.status(Status::Recovering, action);
                }
                report.recovery_actions.extend(actions);
                None
            }
            Effect::RunConfigure { attempt } => {
                self.shell.status(
                    Status::Configuring,
                    format!(
                        "{} (attempt {}/{})",
                        target.name, attempt, self.policy.max_attempts
                    ),
                );
                if let Err(e) = ensure_dir(&target.build_dir) {
                    tracing::warn!("{:#}", e);
                }
                let fresh_log = retire_manifest_install_log(&target.build_dir);
                if !fresh_log {
                    tracing::warn!(
                        "could not clear the previous manifest-install log of {}; it will not be diagnosed",
                        target.name
                    );
                }

                let cmd = self.cmake.configure(target);
                let status = match self.runner.run(&cmd) {
                    Ok(status) => Some(status),
                    Err(e) => {
                        tracing::warn!("{:#}", e);
                        None
                    }
                };
                let ok = status.is_some_and(|s| s.success());
                if !ok {
                    self.shell.warn(format!(
                        "configure of {} failed ({})",
                        target.name,
                        status.map_or_else(|| "could not start".to_string(), |s| s.to_string())
                    ));
                }

                report.attempts.push(AttemptRecord {
                    attempt: *attempt,
                    command: cmd.display_command(),
                    status,
                    log_path: Some(manifest_install_log(&target.build_dir))
                        .filter(|log| fresh_log && log.is_file()),
                });
                Some(BuildEvent::ConfigureFinished { ok })
            }
            Effect::DiagnoseLog => {
                self.shell.status(
                    Status::Recovering,
                    "checking vcpkg logs for corrupt downloads",
                );
                let (actions, diagnosis) =
                    match report.attempts.last().and_then(|a| a.log_path.as_deref()) {
                        Some(log) => self.engine.diagnose_log(log),
                        None => {
                            tracing::debug!("no manifest-install log from this attempt");
                            (Vec::new(), Diagnosis::None)
                        }
                    };
                for action in &actions {
                    self.shell.status(Status::Recovering, action);
                }
                report.recovery_actions.extend(actions);
                tracing::debug!("diagnosis for {}: {:?}", target.name, diagnosis);

                Some(BuildEvent::Diagnosed {
                    diagnosis,
                    state_files: target.has_configure_state(),
                    prior_artifact,
                })
            }
            Effect::Sleep(delay) => {
                if !delay.is_zero() {
                    thread::sleep(*delay);
                }
                None
            }
            Effect::Remediate(cause) => {
                let mut diagnostic = cause.remediation();
                if let Some(log) = report.attempts.last().and_then(|a| a.log_path.clone()) {
                    diagnostic = diagnostic.with_location(log);
                }
                self.shell.block(&diagnostic.format(self.shell.use_color()));
                self.shell.json_event(&serde_json::json!({
                    "reason": "remediation",
                    "target": target.name,
                    "message": diagnostic.message,
                    "log": diagnostic.location,
                    "suggestions": diagnostic.suggestions,
                }));
                None
            }
            Effect::RunBuild => {
                self.shell.status(Status::Building, &target.name);
                let ok = match self.runner.run(&self.cmake.build(target)) {
                    Ok(status) => status.success(),
                    Err(e) => {
                        tracing::warn!("{:#}", e);
                        false
                    }
                };
                if !ok {
                    self.shell.warn(format!(
                        "build failed for {}; packaging continues but its binaries may be missing",
                        target.name
                    ));
                }
                Some(BuildEvent::BuildFinished { ok })
            }
        }
    }
}
