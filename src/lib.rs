//! neutron-pack - build and packaging orchestrator for the Neutron toolchain
//!
//! This crate provides the library behind the `neutron-pack` binary:
//! host classification, dependency recovery, the build state machine,
//! artifact verification and package assembly.

pub mod builder;
pub mod core;
pub mod ops;
pub mod recovery;
pub mod util;

/// Test utilities and mocks for neutron-pack unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted command runner and project
/// fixtures.
#[cfg(test)]
pub mod test_support;

pub use self::core::platform::HostPlatform;
pub use util::context::GlobalContext;
