//! Retry/recovery state machine for one build target.
//!
//! [`transition`] is pure: it maps a state and an observed event to the
//! next state plus the effects the runner must perform. All process
//! execution and filesystem access happens in the
//! [`orchestrator`](super::orchestrator), which feeds the results back in
//! as events.

use std::time::Duration;

use serde::Serialize;

use crate::recovery::{Diagnosis, UnrecoverableCause};

/// Final result of a target's build loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum BuildOutcome {
    Success,
    /// Packaging continues; some artifacts may be missing or stale.
    Degraded(String),
    /// The target produced nothing usable.
    Fatal(String),
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BuildOutcome::Fatal(_))
    }
}

/// Retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of configure invocations.
    pub max_attempts: u32,
    /// Fixed pause before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Build loop state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    Init,
    Configuring { attempt: u32 },
    Recovering { attempt: u32 },
    /// Building; `degraded` carries the reason when the build is only
    /// best-effort after a failed configure.
    Building { degraded: Option<String> },
    Done,
    Degraded(String),
    Fatal(String),
}

impl BuildState {
    /// The outcome, once the machine has reached a terminal state.
    pub fn outcome(&self) -> Option<BuildOutcome> {
        match self {
            BuildState::Done => Some(BuildOutcome::Success),
            BuildState::Degraded(reason) => Some(BuildOutcome::Degraded(reason.clone())),
            BuildState::Fatal(reason) => Some(BuildOutcome::Fatal(reason.clone())),
            _ => None,
        }
    }
}

/// Observation fed back into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Start,
    ConfigureFinished {
        ok: bool,
    },
    /// Result of diagnosing a failed configure, together with the facts
    /// needed to pick between a best-effort build, degraded and fatal.
    Diagnosed {
        diagnosis: Diagnosis,
        /// Build-system state files exist in the build directory.
        state_files: bool,
        /// A binary from an earlier run is already present.
        prior_artifact: bool,
    },
    BuildFinished {
        ok: bool,
    },
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ScanCache,
    RunConfigure { attempt: u32 },
    DiagnoseLog,
    Sleep(Duration),
    Remediate(UnrecoverableCause),
    RunBuild,
}

/// Compute the next state and the effects to perform.
///
/// Events that make no sense in the current state leave it unchanged and
/// request nothing.
pub fn transition(
    state: &BuildState,
    event: &BuildEvent,
    policy: &RetryPolicy,
) -> (BuildState, Vec<Effect>) {
    use BuildEvent as E;
    use BuildState as S;

    match (state, event) {
        (S::Init, E::Start) => (
            S::Configuring { attempt: 1 },
            vec![Effect::ScanCache, Effect::RunConfigure { attempt: 1 }],
        ),

        (S::Configuring { .. }, E::ConfigureFinished { ok: true }) => {
            (S::Building { degraded: None }, vec![Effect::RunBuild])
        }

        (S::Configuring { attempt }, E::ConfigureFinished { ok: false }) => (
            S::Recovering { attempt: *attempt },
            vec![Effect::DiagnoseLog],
        ),

        (
            S::Recovering { attempt },
            E::Diagnosed {
                diagnosis,
                state_files,
                prior_artifact,
            },
        ) => match diagnosis {
            Diagnosis::Unrecoverable(cause) => {
                let reason = format!("configure failed: {}", cause);
                if *state_files {
                    (
                        S::Building {
                            degraded: Some(reason),
                        },
                        vec![Effect::Remediate(*cause), Effect::RunBuild],
                    )
                } else {
                    (S::Degraded(reason), vec![Effect::Remediate(*cause)])
                }
            }
            Diagnosis::Retry | Diagnosis::None if *attempt < policy.max_attempts => {
                let next = attempt + 1;
                (
                    S::Configuring { attempt: next },
                    vec![
                        Effect::Sleep(policy.delay),
                        Effect::ScanCache,
                        Effect::RunConfigure { attempt: next },
                    ],
                )
            }
            Diagnosis::Retry | Diagnosis::None => {
                let reason = format!("configure failed after {} attempt(s)", attempt);
                if *state_files {
                    (
                        S::Building {
                            degraded: Some(reason),
                        },
                        vec![Effect::RunBuild],
                    )
                } else if *prior_artifact {
                    (
                        S::Degraded(format!("{}; using binary from a previous build", reason)),
                        Vec::new(),
                    )
                } else {
                    (S::Fatal(reason), Vec::new())
                }
            }
        },

        (S::Building { degraded }, E::BuildFinished { ok }) => match (degraded, ok) {
            (None, true) => (S::Done, Vec::new()),
            (Some(reason), true) => (S::Degraded(reason.clone()), Vec::new()),
            (None, false) => (S::Degraded("build failed".to_string()), Vec::new()),
            (Some(reason), false) => (
                S::Degraded(format!("{}; best-effort build failed", reason)),
                Vec::new(),
            ),
        },

        (state, _) => (state.clone(), Vec::new()),
    }
}
