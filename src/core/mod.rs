//! Core data structures for neutron-pack.
//!
//! This module contains the foundational types used throughout the crate:
//! - Host platform classification
//! - Build targets and their command templates
//! - The package manifest

pub mod manifest;
pub mod platform;
pub mod target;

pub use manifest::{Condition, ItemKind, ManifestItem, PackageManifest};
pub use platform::{ArchKind, HostPlatform, OsKind, PlatformError};
pub use target::{BuildTarget, CommandTemplate, Profile, TargetOptions};
