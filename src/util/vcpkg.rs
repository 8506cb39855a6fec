//! Vcpkg integration helpers.
//!
//! This module provides utilities for driving the project-local vcpkg
//! checkout, including:
//! - Resolving the target triplet from configuration and environment
//! - Path helpers for the vcpkg directory structure (download cache, tool
//!   folders, installed binaries, toolchain file)
//! - Bootstrapping the checkout and installing the manifest dependencies

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::platform::HostPlatform;
use crate::util::config::VcpkgConfig;
use crate::util::process::{CommandRunner, ProcessBuilder};

/// File name of the manifest-install log written next to the build tree.
pub const MANIFEST_INSTALL_LOG: &str = "vcpkg-manifest-install.log";

/// Where the log of an earlier configure is moved before the next one runs.
pub const PREVIOUS_MANIFEST_INSTALL_LOG: &str = "vcpkg-manifest-install.previous.log";

/// Resolved layout of a vcpkg checkout.
#[derive(Debug, Clone)]
pub struct VcpkgLayout {
    /// Path to the vcpkg root directory
    pub root: PathBuf,
    /// Target triplet (e.g., x64-windows, arm64-osx)
    pub triplet: String,
}

impl VcpkgLayout {
    /// Resolve the layout of the checkout at `root`.
    pub fn new(root: PathBuf, config: &VcpkgConfig, host: &HostPlatform) -> Self {
        let triplet = resolve_triplet(config, host);
        VcpkgLayout { root, triplet }
    }

    /// Get the path to the vcpkg binary.
    pub fn vcpkg_binary(&self) -> PathBuf {
        let exe = if cfg!(windows) { "vcpkg.exe" } else { "vcpkg" };
        self.root.join(exe)
    }

    /// Bootstrap script shipped with the checkout.
    pub fn bootstrap_script(&self) -> PathBuf {
        let script = if cfg!(windows) {
            "bootstrap-vcpkg.bat"
        } else {
            "bootstrap-vcpkg.sh"
        };
        self.root.join(script)
    }

    /// Download cache holding fetched source archives.
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    /// Tool folders vcpkg unpacks its helper tools into.
    pub fn tools_dir(&self) -> PathBuf {
        self.downloads_dir().join("tools")
    }

    /// Get the installed directory for the current triplet.
    pub fn installed_dir(&self) -> PathBuf {
        self.root.join("installed").join(&self.triplet)
    }

    /// Runtime DLLs of the installed ports.
    pub fn installed_bin_dir(&self) -> PathBuf {
        self.installed_dir().join("bin")
    }

    /// CMake toolchain file for vcpkg-aware configures.
    pub fn toolchain_file(&self) -> PathBuf {
        self.root
            .join("scripts")
            .join("buildsystems")
            .join("vcpkg.cmake")
    }

    /// Whether the checkout looks usable.
    pub fn is_valid(&self) -> bool {
        is_valid_vcpkg_root(&self.root)
    }
}

/// Manifest-install log location for a build directory.
pub fn manifest_install_log(build_dir: &Path) -> PathBuf {
    build_dir.join(MANIFEST_INSTALL_LOG)
}

/// Move an existing manifest-install log out of the way so that only a log
/// written by the upcoming configure is diagnosed.
///
/// Best-effort: if the log can be neither renamed nor removed, returns
/// `false` and the caller should not trust the log afterwards.
pub fn retire_manifest_install_log(build_dir: &Path) -> bool {
    let log = manifest_install_log(build_dir);
    if !log.exists() {
        return true;
    }

    let previous = build_dir.join(PREVIOUS_MANIFEST_INSTALL_LOG);
    // rename does not replace an existing file on Windows
    let _ = std::fs::remove_file(&previous);
    match std::fs::rename(&log, &previous) {
        Ok(()) => {
            tracing::debug!("moved stale {} aside", log.display());
            true
        }
        Err(e) => {
            tracing::debug!("failed to move {} aside: {}", log.display(), e);
            std::fs::remove_file(&log).is_ok()
        }
    }
}

/// Validate that a directory is a valid vcpkg root.
fn is_valid_vcpkg_root(path: &Path) -> bool {
    // Check for .vcpkg-root marker file (created by vcpkg bootstrap)
    if path.join(".vcpkg-root").exists() {
        return true;
    }

    // Fallback: check for vcpkg binary and scripts directory
    let vcpkg_exe = if cfg!(windows) { "vcpkg.exe" } else { "vcpkg" };
    path.join(vcpkg_exe).exists() && path.join("scripts").is_dir()
}

fn resolve_triplet(config: &VcpkgConfig, host: &HostPlatform) -> String {
    config
        .triplet
        .clone()
        .or_else(|| std::env::var("VCPKG_TARGET_TRIPLET").ok())
        .or_else(|| std::env::var("VCPKG_DEFAULT_TRIPLET").ok())
        .unwrap_or_else(|| host.vcpkg_triplet())
}

/// Make sure a vcpkg checkout exists at `layout.root` and is bootstrapped.
///
/// Tries `git submodule update` first (the checkout is normally a
/// submodule) and falls back to a fresh clone. Every step is best-effort:
/// failures are logged and reported through the returned flag.
pub fn ensure_checkout(
    runner: &dyn CommandRunner,
    project_root: &Path,
    layout: &VcpkgLayout,
) -> bool {
    if !layout.root.exists() {
        tracing::info!("vcpkg checkout missing; initializing submodules");
        let submodule = ProcessBuilder::new("git")
            .args(["submodule", "update", "--init", "--recursive"])
            .cwd(project_root);
        let ok = matches!(runner.run(&submodule), Ok(status) if status.success());

        if !ok || !layout.root.exists() {
            tracing::info!("cloning vcpkg into {}", layout.root.display());
            let clone = ProcessBuilder::new("git")
                .args(["clone", "https://github.com/microsoft/vcpkg.git"])
                .arg(&layout.root)
                .cwd(project_root);
            if let Err(e) = runner.run(&clone) {
                tracing::warn!("failed to clone vcpkg: {:#}", e);
            }
        }
    }

    if !layout.root.exists() {
        tracing::warn!("vcpkg checkout unavailable at {}", layout.root.display());
        return false;
    }

    if !layout.vcpkg_binary().exists() {
        tracing::info!("bootstrapping vcpkg");
        let bootstrap = ProcessBuilder::new(layout.bootstrap_script()).cwd(&layout.root);
        match runner.run(&bootstrap) {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!("vcpkg bootstrap failed ({})", status),
            Err(e) => tracing::warn!("vcpkg bootstrap failed: {:#}", e),
        }
    }

    layout.vcpkg_binary().exists()
}

/// Install the manifest dependencies for the layout's triplet.
pub fn install_manifest(
    runner: &dyn CommandRunner,
    project_root: &Path,
    vcpkg: &Path,
    layout: &VcpkgLayout,
) -> Result<bool> {
    let cmd = ProcessBuilder::new(vcpkg)
        .args(["install", "--triplet", layout.triplet.as_str()])
        .cwd(project_root);
    let status = runner.run(&cmd)?;
    if !status.success() {
        tracing::warn!("vcpkg install failed ({})", status);
    }
    Ok(status.success())
}
