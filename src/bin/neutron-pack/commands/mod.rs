//! Command implementations

pub mod check_deps;
pub mod clean;
pub mod package;
