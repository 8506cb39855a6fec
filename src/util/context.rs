//! Global context for neutron-pack operations.
//!
//! Provides centralized access to the project root, well-known build paths
//! and the configuration file locations.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::BaseDirs;

use crate::util::config::{load_config, Config};

/// Per-user data directory (`~/.neutron-pack`).
static HOME_DIR: LazyLock<Option<PathBuf>> =
    LazyLock::new(|| BaseDirs::new().map(|b| b.home_dir().join(".neutron-pack")));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Project root (the directory neutron-pack was launched from)
    root: PathBuf,

    /// Home directory for global neutron-pack data (~/.neutron-pack/)
    home: PathBuf,
}

impl GlobalContext {
    /// Create a context rooted at the current working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_root(cwd))
    }

    /// Create a context rooted at a specific project directory.
    pub fn with_root(root: PathBuf) -> Self {
        let home = HOME_DIR
            .clone()
            .unwrap_or_else(|| PathBuf::from(".neutron-pack"));

        GlobalContext { root, home }
    }

    /// Project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Global neutron-pack directory (~/.neutron-pack/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Project-local neutron-pack directory.
    pub fn project_dir(&self) -> PathBuf {
        self.root.join(".neutron-pack")
    }

    /// Project configuration file path.
    pub fn project_config_path(&self) -> PathBuf {
        self.project_dir().join("config.toml")
    }

    /// Load merged global + project configuration.
    pub fn load_config(&self) -> Config {
        load_config(&self.config_path(), &self.project_config_path())
    }

    /// Build directory of the interpreter (and language server).
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Source directory of the box package manager.
    pub fn box_source_dir(&self) -> PathBuf {
        self.root.join("nt-box")
    }

    /// Build directory of the box package manager.
    pub fn box_build_dir(&self) -> PathBuf {
        self.box_source_dir().join("build")
    }

    /// Project-local vcpkg checkout.
    pub fn vcpkg_dir(&self) -> PathBuf {
        self.root.join("vcpkg")
    }

    /// Dependency manifest whose presence gates acquisition.
    pub fn dependency_manifest(&self) -> PathBuf {
        self.root.join("vcpkg.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_paths() {
        let ctx = GlobalContext::with_root(PathBuf::from("/work/neutron"));

        assert_eq!(ctx.build_dir(), PathBuf::from("/work/neutron/build"));
        assert_eq!(
            ctx.box_build_dir(),
            PathBuf::from("/work/neutron/nt-box/build")
        );
        assert_eq!(
            ctx.project_config_path(),
            PathBuf::from("/work/neutron/.neutron-pack/config.toml")
        );
        assert_eq!(
            ctx.dependency_manifest(),
            PathBuf::from("/work/neutron/vcpkg.json")
        );
    }

    #[test]
    fn test_global_config_path_under_home() {
        let ctx = GlobalContext::with_root(PathBuf::from("/tmp/p"));
        assert!(ctx.config_path().ends_with("config.toml"));
        assert!(ctx.config_path().starts_with(ctx.home()));
    }
}
