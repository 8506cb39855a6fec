//! Native build driving.
//!
//! This module locates the build tools, renders CMake invocations, and runs
//! each build target through the configure/recover/build state machine.

pub mod cmake;
pub mod machine;
pub mod orchestrator;
pub mod toolchain;

pub use cmake::CMake;
pub use machine::{transition, BuildEvent, BuildOutcome, BuildState, Effect, RetryPolicy};
pub use orchestrator::{AttemptRecord, Orchestrator, TargetReport};
pub use toolchain::{SearchStrategy, Tool, ToolLocator, ToolchainLocation};
