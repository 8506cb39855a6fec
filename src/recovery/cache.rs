//! Download cache integrity scanning.
//!
//! A partially written or truncated archive in the vcpkg download cache
//! poisons every later configure. The scan removes anything that is
//! obviously broken so the next attempt downloads it again.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

/// Archive formats the scanner can verify in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Classify a path by its extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }
}

/// Remove zero-length files and archives that fail an integrity check.
///
/// Only regular files directly inside `cache_dir` are inspected; tool
/// folders below it are left alone. Returns the removed paths. A missing
/// cache directory yields an empty list. Running the scan twice in a row
/// removes nothing the second time.
pub fn scan_cache_for_corruption(cache_dir: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    let entries = match fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(_) => return removed,
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    files.sort();

    for path in files {
        let reason = match fs::metadata(&path) {
            Ok(meta) if meta.len() == 0 => Some("zero-length download".to_string()),
            Ok(_) => match ArchiveFormat::from_path(&path) {
                Some(format) => verify_archive(&path, format)
                    .err()
                    .map(|e| format!("{:#}", e)),
                None => None,
            },
            Err(e) => {
                tracing::debug!("cannot stat {}: {}", path.display(), e);
                None
            }
        };

        let Some(reason) = reason else {
            continue;
        };

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::warn!("Removed corrupt download {} ({})", path.display(), reason);
                removed.push(path);
            }
            Err(e) => {
                tracing::warn!("failed to remove {}: {}", path.display(), e);
            }
        }
    }

    removed
}

/// Read every entry of an archive to the end, surfacing CRC and framing
/// errors.
pub fn verify_archive(path: &Path, format: ArchiveFormat) -> Result<()> {
    match format {
        ArchiveFormat::Zip => verify_zip(path),
        ArchiveFormat::TarGz => verify_tar_gz(path),
    }
}

fn verify_zip(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a readable zip archive", path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("entry {} of {} is unreadable", i, path.display()))?;
        let name = entry.name().to_string();
        io::copy(&mut entry, &mut io::sink())
            .with_context(|| format!("entry `{}` of {} is damaged", name, path.display()))?;
    }
    Ok(())
}

fn verify_tar_gz(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let entries = archive
        .entries()
        .with_context(|| format!("{} is not a readable tarball", path.display()))?;
    for entry in entries {
        let mut entry = entry.with_context(|| format!("{} has a damaged header", path.display()))?;
        io::copy(&mut entry, &mut io::sink())
            .with_context(|| format!("{} has a truncated entry", path.display()))?;
    }
    Ok(())
}
