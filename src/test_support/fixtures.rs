//! Test fixtures for common test scenarios.
//!
//! This module provides fixture generators for the on-disk shapes the
//! orchestrator works with: a Neutron source checkout, build trees with
//! produced binaries, and archives in the vcpkg download cache.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use zip::write::FileOptions;

/// Fixture for a Neutron source checkout.
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    /// Files (path relative to project root -> content).
    pub files: Vec<(PathBuf, String)>,
}

impl ProjectFixture {
    /// Create a new empty project fixture.
    pub fn new() -> Self {
        ProjectFixture { files: Vec::new() }
    }

    /// A checkout with the usual top-level assets and a box source tree.
    pub fn neutron() -> Self {
        ProjectFixture::new()
            .file("CMakeLists.txt", "project(neutron)\n")
            .file("README.md", "# Neutron\n")
            .file("LICENSE", "MIT\n")
            .file("docs/guide.md", "guide\n")
            .file("include/neutron.h", "#pragma once\n")
            .file("src/main.cpp", "int main() { return 0; }\n")
            .file("nt-box/CMakeLists.txt", "project(box)\n")
            .file("nt-box/src/main.cpp", "int main() { return 0; }\n")
    }

    /// Add a file.
    pub fn file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    /// Write the fixture to disk.
    pub fn write_to(&self, root: &Path) -> std::io::Result<()> {
        for (rel, content) in &self.files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)?;
        }
        Ok(())
    }
}

impl Default for ProjectFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a file, creating parent directories.
pub fn write_file(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    path.to_path_buf()
}

/// Write a valid zip archive containing `entries` (name -> content).
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path.to_path_buf()
}

/// Write a valid gzip-compressed tarball containing `entries`.
pub fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = fs::File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    path.to_path_buf()
}

/// Write a file that claims to be an archive but is not.
pub fn write_corrupt_archive(path: &Path) -> PathBuf {
    write_file(path, "this is not an archive")
}

/// Write a zip whose first entry's payload is damaged after creation.
///
/// The central directory stays intact, so the archive opens but reading the
/// entry fails its CRC check.
pub fn write_zip_with_bad_crc(path: &Path) -> PathBuf {
    let content = "A".repeat(256);
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file("payload.txt", options).unwrap();
    zip.write_all(content.as_bytes()).unwrap();
    zip.finish().unwrap();

    let mut bytes = fs::read(path).unwrap();
    let needle = content.as_bytes();
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap();
    bytes[pos] = b'B';
    fs::write(path, bytes).unwrap();
    path.to_path_buf()
}

/// Place a fake executable at `path` (a shell script on Unix).
pub fn write_fake_binary(path: &Path) -> PathBuf {
    write_file(path, "#!/bin/sh\necho 0.1.0\n");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    path.to_path_buf()
}
