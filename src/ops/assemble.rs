//! Package assembly.
//!
//! [`build_manifest`] describes the package declaratively; [`assemble`]
//! materializes it into the output directory. Only required items can fail
//! assembly. Everything else that is missing is reported and skipped.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::core::manifest::{Condition, ItemKind, ManifestItem, PackageManifest};
use crate::core::platform::{HostPlatform, OsKind};
use crate::ops::locate::ResolvedBinary;
use crate::util::fs::{
    compile_patterns, copy_dir_all, copy_file, ensure_dir, glob_files, remove_dir_all_if_exists,
};
use crate::util::shell::{Shell, Status};

/// Entries left out of the bundled box sources.
pub const BOX_SOURCE_EXCLUDES: [&str; 6] = ["build", ".git", "*.o", "*.obj", "*.exe", "*.dll"];

const WINDOWS_ROOT_LIBS: [&str; 3] = ["*.lib", "*.a", "*.dll"];
const WINDOWS_RELEASE_LIBS: [&str; 2] = ["*.lib", "*.dll"];
const WINDOWS_CONFIG_LIBS: [&str; 1] = ["*.lib"];
const UNIX_LIBS: [&str; 3] = ["*.a*", "*.so*", "*.dylib*"];

/// Describe everything that goes into the package.
///
/// Binaries land at the package root under their platform executable
/// names. Libraries land next to them.
pub fn build_manifest(
    host: &HostPlatform,
    root: &Path,
    build_dir: &Path,
    binaries: &[&ResolvedBinary],
    assets: &[String],
) -> PackageManifest {
    let mut manifest = PackageManifest::new();

    for binary in binaries {
        manifest.push(ManifestItem::binary(
            &binary.path,
            host.exe_name(binary.artifact.name()),
        ));
    }

    let windows = Condition::OnlyOn(OsKind::Windows);
    manifest.push(ManifestItem::libraries(build_dir, &WINDOWS_ROOT_LIBS).when(windows));
    manifest.push(
        ManifestItem::libraries(build_dir.join("Release"), &WINDOWS_RELEASE_LIBS).when(windows),
    );
    for config in ["MinSizeRel", "RelWithDebInfo"] {
        manifest.push(
            ManifestItem::libraries(build_dir.join(config), &WINDOWS_CONFIG_LIBS).when(windows),
        );
    }
    manifest.push(
        ManifestItem::libraries(build_dir, &UNIX_LIBS).when(Condition::NotOn(OsKind::Windows)),
    );

    for asset in assets {
        let source = root.join(asset);
        let item = if asset == "nt-box" {
            ManifestItem::directory(&source, asset, &BOX_SOURCE_EXCLUDES)
        } else if source.is_dir() {
            ManifestItem::directory(&source, asset, &[])
        } else {
            let name = Path::new(asset)
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(asset));
            ManifestItem::file(&source, name)
        };
        manifest.push(item);
    }

    manifest.push(
        ManifestItem::file(root.join("scripts").join("install.sh"), "install.sh")
            .executable()
            .when(Condition::NotOn(OsKind::Windows)),
    );
    manifest.push(ManifestItem::empty_dir("lib"));

    manifest
}

/// What ended up in the package.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssemblyReport {
    pub output: PathBuf,
    /// Files and directories copied, relative to the package root.
    pub copied: Vec<PathBuf>,
    /// Optional sources that did not exist.
    pub skipped: Vec<PathBuf>,
    pub libraries: usize,
}

/// Materialize `manifest` into `output`, replacing any previous contents.
pub fn assemble(
    shell: &Shell,
    host: &HostPlatform,
    manifest: &PackageManifest,
    output: &Path,
) -> Result<AssemblyReport> {
    shell.status(Status::Packaging, output.display());
    remove_dir_all_if_exists(output)
        .with_context(|| format!("failed to clear package directory {}", output.display()))?;
    ensure_dir(output)?;

    let mut report = AssemblyReport {
        output: output.to_path_buf(),
        ..Default::default()
    };
    let items: Vec<&ManifestItem> = manifest.applicable(host.os).collect();
    let progress = shell.progress(items.len() as u64, "Copying");
    let unix = !host.os.is_windows();

    for item in items {
        let result = copy_item(item, output, unix, &mut report);
        progress.inc(1);
        result?;
    }
    progress.finish();

    let has_library_items = manifest
        .applicable(host.os)
        .any(|i| matches!(i.kind, ItemKind::LibraryGlob { .. }));
    if has_library_items && report.libraries == 0 {
        shell.warn("no runtime libraries found to copy");
    }
    for skipped in &report.skipped {
        shell.warn(format!("{} not found; skipped", skipped.display()));
    }

    tracing::info!(
        "assembled {} item(s) into {}",
        report.copied.len(),
        output.display()
    );
    Ok(report)
}

fn copy_item(
    item: &ManifestItem,
    output: &Path,
    unix: bool,
    report: &mut AssemblyReport,
) -> Result<()> {
    let dst = output.join(&item.destination);

    if let ItemKind::EmptyDir = item.kind {
        ensure_dir(&dst)?;
        report.copied.push(item.destination.clone());
        return Ok(());
    }

    if let ItemKind::LibraryGlob { patterns } = &item.kind {
        for lib in glob_files(&item.source, patterns)? {
            let Some(name) = lib.file_name() else {
                continue;
            };
            copy_file(&lib, &dst.join(name), false)?;
            tracing::debug!("copied library {}", lib.display());
            report.libraries += 1;
            report.copied.push(item.destination.join(name));
        }
        return Ok(());
    }

    if !item.source.exists() {
        if item.optional {
            report.skipped.push(item.source.clone());
            return Ok(());
        }
        bail!("required package input missing: {}", item.source.display());
    }

    match &item.kind {
        ItemKind::Binary => copy_file(&item.source, &dst, unix)?,
        ItemKind::File { executable } => copy_file(&item.source, &dst, *executable && unix)?,
        ItemKind::Directory { exclude } => {
            let patterns: Vec<&str> = exclude.iter().map(String::as_str).collect();
            copy_dir_all(&item.source, &dst, &compile_patterns(&patterns))?
        }
        ItemKind::LibraryGlob { .. } | ItemKind::EmptyDir => {}
    }
    report.copied.push(item.destination.clone());
    Ok(())
}
