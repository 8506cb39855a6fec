//! Configuration file support for neutron-pack.
//!
//! Two configuration file locations are consulted:
//! - Global: `~/.neutron-pack/config.toml` - User-wide defaults
//! - Project: `.neutron-pack/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default number of configure attempts per build target.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between configure attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default pause after the build phase before looking for artifacts.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

/// Default smoke-test timeout, in seconds.
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;

/// neutron-pack configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Smoke-test settings
    pub verify: VerifyConfig,

    /// Package layout settings
    pub package: PackageConfig,

    /// Dependency acquisition settings
    pub vcpkg: VcpkgConfig,

    /// Explicit tool locations
    pub tools: ToolsConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Configure attempts per target (None = 3)
    pub max_attempts: Option<u32>,

    /// Delay between configure attempts in milliseconds
    pub retry_delay_ms: Option<u64>,

    /// Pause after building before artifacts are located
    pub settle_delay_ms: Option<u64>,

    /// Default number of parallel jobs (None = CPU count)
    pub jobs: Option<usize>,

    /// Link the language server statically against libgcc/libstdc++ on Linux
    #[serde(default)]
    pub static_lsp: bool,
}

/// Smoke-test configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Timeout for `--version`/`--help` smoke tests in seconds
    pub timeout_secs: Option<u64>,
}

/// Package layout configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// Product name used for the output directory (None = "neutron")
    pub product: Option<String>,

    /// Project-relative files and directories copied into the package
    pub assets: Option<Vec<String>>,
}

/// Dependency acquisition configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VcpkgConfig {
    /// Skip vcpkg bootstrap and preflight checks
    #[serde(default)]
    pub skip: bool,

    /// Target triplet override (e.g., x64-windows-static)
    pub triplet: Option<String>,
}

/// Explicit tool paths that bypass PATH lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub cmake: Option<PathBuf>,
    pub makensis: Option<PathBuf>,
    pub vcpkg: Option<PathBuf>,
    pub npm: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Build settings
        if other.build.max_attempts.is_some() {
            self.build.max_attempts = other.build.max_attempts;
        }
        if other.build.retry_delay_ms.is_some() {
            self.build.retry_delay_ms = other.build.retry_delay_ms;
        }
        if other.build.settle_delay_ms.is_some() {
            self.build.settle_delay_ms = other.build.settle_delay_ms;
        }
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.static_lsp {
            self.build.static_lsp = true;
        }

        if other.verify.timeout_secs.is_some() {
            self.verify.timeout_secs = other.verify.timeout_secs;
        }

        if other.package.product.is_some() {
            self.package.product = other.package.product;
        }
        if other.package.assets.is_some() {
            self.package.assets = other.package.assets;
        }

        if other.vcpkg.skip {
            self.vcpkg.skip = true;
        }
        if other.vcpkg.triplet.is_some() {
            self.vcpkg.triplet = other.vcpkg.triplet;
        }

        // Tool overrides
        if other.tools.cmake.is_some() {
            self.tools.cmake = other.tools.cmake;
        }
        if other.tools.makensis.is_some() {
            self.tools.makensis = other.tools.makensis;
        }
        if other.tools.vcpkg.is_some() {
            self.tools.vcpkg = other.tools.vcpkg;
        }
        if other.tools.npm.is_some() {
            self.tools.npm = other.tools.npm;
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.build
            .max_attempts
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
            .max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.build.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(
            self.build
                .settle_delay_ms
                .unwrap_or(DEFAULT_SETTLE_DELAY_MS),
        )
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(
            self.verify
                .timeout_secs
                .unwrap_or(DEFAULT_VERIFY_TIMEOUT_SECS),
        )
    }

    pub fn product(&self) -> &str {
        self.package.product.as_deref().unwrap_or("neutron")
    }

    /// Assets copied into the package when present in the project root.
    pub fn assets(&self) -> Vec<String> {
        self.package.assets.clone().unwrap_or_else(|| {
            ["README.md", "LICENSE", "docs", "include", "src", "libs", "nt-box"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        })
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.neutron-pack/config.toml)
/// 2. Global config (~/.neutron-pack/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}
