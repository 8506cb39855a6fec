//! Build-output cleanup.
//!
//! Removes both build trees, packaging leftovers at the project root and
//! native build artifacts anywhere in the tree, skipping third-party and
//! output directories.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use walkdir::WalkDir;

use crate::core::platform::OsKind;
use crate::util::fs::{compile_patterns, glob_files, remove_dir_all_if_exists, remove_file_with_retries};
use crate::util::shell::{Shell, Status};
use crate::util::GlobalContext;

/// Attempts per locked file.
pub const REMOVE_RETRIES: u32 = 10;

/// Pause between attempts on a locked file.
pub const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Directory names the recursive sweep never descends into.
pub const SWEEP_EXCLUDED_DIRS: [&str; 8] = [
    ".git",
    "vcpkg",
    "neutron-linux-x64",
    "neutron-windows-x64",
    "build_test",
    "node_modules",
    ".box",
    "vscode-extension",
];

/// File patterns removed by the recursive sweep.
pub const SWEEP_PATTERNS: [&str; 10] = [
    "*.dll", "*.lib", "*.a", "*.so", "*.dylib", "*.obj", "*.exe", "*.pdb", "*.ilk", "*.exp",
];

/// Options for the clean command.
#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub os: OsKind,
    pub retry_delay: Duration,
}

impl CleanOptions {
    pub fn for_host(os: OsKind) -> Self {
        CleanOptions {
            os,
            retry_delay: REMOVE_RETRY_DELAY,
        }
    }
}

/// What the clean removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub removed_dirs: Vec<PathBuf>,
    pub removed_files: Vec<PathBuf>,
    /// Paths that could not be removed.
    pub failed: Vec<PathBuf>,
}

/// Top-level leftovers of earlier builds and packaging runs.
fn root_patterns(os: OsKind) -> Vec<String> {
    let specific: &[&str] = if os.is_windows() {
        &["neutron.exe", "box.exe", "neutron-*-installer.exe"]
    } else {
        &["neutron", "box", "neutron-lsp", "libneutron_runtime.*"]
    };
    specific
        .iter()
        .chain(["*.lib", "*.dll", "*.a", "*.so", "*.dylib", "*.exe"].iter())
        .map(|p| p.to_string())
        .collect()
}

/// Clean the project at `ctx.root()`.
pub fn clean(ctx: &GlobalContext, shell: &Shell, opts: &CleanOptions) -> Result<CleanReport> {
    let mut report = CleanReport::default();

    for dir in [ctx.build_dir(), ctx.box_build_dir()] {
        if !dir.exists() {
            continue;
        }
        match remove_dir_all_if_exists(&dir) {
            Ok(()) => {
                shell.status(Status::Removed, dir.display());
                report.removed_dirs.push(dir);
            }
            Err(e) => {
                shell.warn(format!("{:#}", e));
                report.failed.push(dir);
            }
        }
    }

    for file in glob_files(ctx.root(), &root_patterns(opts.os))? {
        remove(shell, &file, opts, &mut report);
    }

    for file in sweep(ctx.root()) {
        remove(shell, &file, opts, &mut report);
    }

    tracing::info!(
        "removed {} director(ies) and {} file(s)",
        report.removed_dirs.len(),
        report.removed_files.len()
    );
    Ok(report)
}

/// Build artifacts anywhere under `root`, outside the excluded directories.
pub fn sweep(root: &Path) -> Vec<PathBuf> {
    let patterns = compile_patterns(&SWEEP_PATTERNS);

    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && SWEEP_EXCLUDED_DIRS.iter().any(|d| *d == name))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            patterns.iter().any(|p| p.matches(&name))
        })
        .map(|e| e.into_path())
        .collect()
}

fn remove(shell: &Shell, path: &Path, opts: &CleanOptions, report: &mut CleanReport) {
    if !path.exists() || report.removed_files.iter().any(|p| p == path) {
        return;
    }
    match remove_file_with_retries(path, REMOVE_RETRIES, opts.retry_delay) {
        Ok(()) => {
            tracing::debug!("removed {}", path.display());
            report.removed_files.push(path.to_path_buf());
        }
        Err(e) => {
            shell.warn(format!("{:#}", e));
            report.failed.push(path.to_path_buf());
        }
    }
}
