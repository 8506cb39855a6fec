//! High-level operations.
//!
//! This module contains the implementation of neutron-pack commands.

pub mod assemble;
pub mod clean;
pub mod doctor;
pub mod extension;
pub mod installer;
pub mod locate;
pub mod neutron_package;

pub use assemble::{assemble, build_manifest, AssemblyReport};
pub use clean::{clean, CleanOptions, CleanReport};
pub use doctor::{check_dependencies, format_report, preflight, DoctorReport, HostFacts};
pub use locate::{Artifact, ArtifactLocator, ResolvedBinary};
pub use neutron_package::{package, package_for_host, PackageOptions, PackageReport};
