//! In-process extraction fallback.
//!
//! When the acquisition tool's own extractor is broken, the runtime archive
//! it downloaded can still be unpacked in-process into the tool folder it
//! expects, letting the next configure attempt find it.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use regex::Regex;

use crate::recovery::cache::ArchiveFormat;
use crate::util::fs::{copy_dir_all, remove_dir_all_if_exists};

/// Executables whose presence indicates the runtime was unpacked correctly.
const MARKERS: &[&str] = &["pwsh.exe", "bin/pwsh.exe", "pwsh"];

static POWERSHELL_FOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)powershell[-_].*?\d[\d.\-]*[-_]?win").ok());

/// Extract `archive` into `target_dir`, replacing any previous contents.
///
/// Extraction happens in a `<archive>.tmp` staging directory first, so a
/// failed extraction never destroys an existing target. Returns `false`
/// only when extraction or the final move failed; a missing marker
/// executable is logged but still counts as success.
pub fn manual_extract_fallback(archive: &Path, target_dir: &Path) -> bool {
    match try_extract(archive, target_dir) {
        Ok(()) => {
            match find_marker(target_dir) {
                Some(marker) => tracing::info!(
                    "Manual extraction of {} succeeded ({} present)",
                    archive.display(),
                    marker.display()
                ),
                None => tracing::info!(
                    "Manual extraction of {} finished; no runtime executable found in {}",
                    archive.display(),
                    target_dir.display()
                ),
            }
            true
        }
        Err(e) => {
            tracing::warn!("Manual extraction of {} failed: {:#}", archive.display(), e);
            let _ = remove_dir_all_if_exists(&staging_dir(archive));
            false
        }
    }
}

fn staging_dir(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn try_extract(archive: &Path, target_dir: &Path) -> Result<()> {
    if !archive.is_file() {
        anyhow::bail!("{} does not exist", archive.display());
    }
    let format = ArchiveFormat::from_path(archive)
        .with_context(|| format!("unsupported archive format: {}", archive.display()))?;

    let staging = staging_dir(archive);
    remove_dir_all_if_exists(&staging)?;
    fs::create_dir_all(&staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;

    let file = File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    match format {
        ArchiveFormat::Zip => {
            let mut zip = zip::ZipArchive::new(file)
                .with_context(|| format!("{} is not a readable zip archive", archive.display()))?;
            zip.extract(&staging)
                .with_context(|| format!("failed to extract {}", archive.display()))?;
        }
        ArchiveFormat::TarGz => {
            let mut tar = tar::Archive::new(GzDecoder::new(file));
            tar.unpack(&staging)
                .with_context(|| format!("failed to extract {}", archive.display()))?;
        }
    }

    if let Err(e) = remove_dir_all_if_exists(target_dir) {
        tracing::warn!("could not clear {}: {:#}", target_dir.display(), e);
    }
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    // Rename fails across filesystems; fall back to a copy.
    if fs::rename(&staging, target_dir).is_err() {
        copy_dir_all(&staging, target_dir, &[])?;
        remove_dir_all_if_exists(&staging)?;
    }
    Ok(())
}

fn find_marker(target_dir: &Path) -> Option<PathBuf> {
    MARKERS
        .iter()
        .map(|m| target_dir.join(m))
        .find(|p| p.is_file())
}

/// Tool folder name vcpkg uses for an extracted PowerShell archive.
///
/// `PowerShell-7.5.4-win-x64.zip` maps to `PowerShell-7.5.4-win`; names
/// that do not follow the release naming fall back to the folder vcpkg
/// uses for the pinned runtime.
pub fn powershell_tool_folder(archive_name: &str) -> String {
    POWERSHELL_FOLDER
        .as_ref()
        .and_then(|re| re.find(archive_name))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "powershell-core-7.5.4-windows".to_string())
}
