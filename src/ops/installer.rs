//! Windows installer generation with NSIS.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::util::fs::{copy_file, glob_files, read_to_string, write_string};
use crate::util::process::{CommandRunner, ProcessBuilder};
use crate::util::shell::{Shell, Status};

/// Installer script at the project root.
pub const INSTALLER_SCRIPT: &str = "installer.nsi";

/// Sanitized copy handed to makensis when some `File` globs match nothing.
pub const TEMP_INSTALLER_SCRIPT: &str = "installer.temp.nsi";

/// Installer produced by the script.
pub const INSTALLER_OUTPUT: &str = "NeutronInstaller.exe";

/// Runtime DLLs pulled in by vcpkg dependencies of the language server.
pub const VCPKG_RUNTIME_DLLS: [&str; 3] = ["jsoncpp.dll", "libcurl.dll", "zlib1.dll"];

/// A `File` instruction whose quoted argument contains a wildcard.
static FILE_GLOB: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)^(\s*File\b[^"]*"([^"]*\*[^"]*)".*)$"#).ok());

/// Copy `src` to `dst`, commenting out `File "...*..."` lines whose glob
/// matches nothing under `root`.
///
/// Returns whether any line was changed.
pub fn sanitize_nsi(src: &Path, dst: &Path, root: &Path) -> Result<bool> {
    let contents = read_to_string(src)?;
    let mut out = String::with_capacity(contents.len());
    let mut changed = false;

    for line in contents.split_inclusive('\n') {
        if let Some(glob) = file_glob(line.trim_end_matches(['\r', '\n'])) {
            if !glob_matches(root, &glob) {
                tracing::debug!("commenting out `File \"{}\"`: no matches", glob);
                out.push_str("; ");
                changed = true;
            }
        }
        out.push_str(line);
    }

    write_string(dst, &out)?;
    Ok(changed)
}

fn file_glob(line: &str) -> Option<String> {
    let re = FILE_GLOB.as_ref()?;
    let caps = re.captures(line)?;
    caps.get(2).map(|m| m.as_str().to_string())
}

fn glob_matches(root: &Path, pattern: &str) -> bool {
    let normalized = pattern.replace('\\', "/");
    let full = if Path::new(&normalized).is_absolute() {
        PathBuf::from(&normalized)
    } else {
        root.join(&normalized)
    };

    match glob::glob(&full.to_string_lossy()) {
        Ok(mut paths) => paths.any(|p| p.is_ok()),
        Err(e) => {
            tracing::debug!("invalid installer glob `{}`: {}", pattern, e);
            false
        }
    }
}

/// Inputs copied to the project root for the installer script to find.
#[derive(Debug, Clone, Default)]
pub struct InstallerInputs {
    pub binaries: Vec<PathBuf>,
    /// Interpreter build directory (DLLs and import libraries).
    pub build_dir: PathBuf,
    /// vcpkg `installed/<triplet>/bin` directories, in lookup order.
    pub vcpkg_bin_dirs: Vec<PathBuf>,
}

/// Stage binaries, DLLs and import libraries next to the installer script.
///
/// Returns the number of files copied.
pub fn stage_inputs(shell: &Shell, root: &Path, inputs: &InstallerInputs) -> Result<usize> {
    let mut staged = 0;
    let mut stage = |src: &Path| -> Result<()> {
        if let Some(name) = src.file_name() {
            let dst = root.join(name);
            if dst != src {
                copy_file(src, &dst, false)?;
            }
            staged += 1;
        }
        Ok(())
    };

    for binary in &inputs.binaries {
        stage(binary)?;
    }

    let dll_patterns = ["Release/*.dll".to_string(), "*.dll".to_string()];
    for dll in glob_files(&inputs.build_dir, &dll_patterns)? {
        stage(&dll)?;
    }

    for dir in &inputs.vcpkg_bin_dirs {
        for name in VCPKG_RUNTIME_DLLS {
            let dll = dir.join(name);
            if dll.is_file() {
                tracing::debug!("staging vcpkg runtime {}", dll.display());
                stage(&dll)?;
            }
        }
    }

    let lib_patterns = ["*.lib".to_string(), "Release/*.lib".to_string()];
    for lib in glob_files(&inputs.build_dir, &lib_patterns)? {
        stage(&lib)?;
    }

    shell.note(format!("staged {} installer input(s)", staged));
    Ok(staged)
}

/// Run makensis over the (sanitized) installer script.
///
/// The temporary script is always removed, whether or not makensis
/// succeeds.
pub fn build_installer(
    runner: &dyn CommandRunner,
    shell: &Shell,
    makensis: &Path,
    root: &Path,
    version: &str,
) -> Result<PathBuf> {
    let script = root.join(INSTALLER_SCRIPT);
    if !script.is_file() {
        bail!("{} not found in {}", INSTALLER_SCRIPT, root.display());
    }

    let temp = root.join(TEMP_INSTALLER_SCRIPT);
    let result = run_makensis(runner, shell, makensis, root, &script, &temp, version);

    if temp.exists() {
        if let Err(e) = std::fs::remove_file(&temp) {
            tracing::warn!("failed to remove {}: {}", temp.display(), e);
        }
    }
    result
}

fn run_makensis(
    runner: &dyn CommandRunner,
    shell: &Shell,
    makensis: &Path,
    root: &Path,
    script: &Path,
    temp: &Path,
    version: &str,
) -> Result<PathBuf> {
    let changed = sanitize_nsi(script, temp, root)?;
    let chosen = if changed {
        TEMP_INSTALLER_SCRIPT
    } else {
        INSTALLER_SCRIPT
    };

    let cmd = ProcessBuilder::new(makensis)
        .arg(format!("/DVERSION={}", version))
        .arg(chosen)
        .cwd(root);
    shell.status(Status::Running, cmd.display_command());

    let status = runner
        .run(&cmd)
        .with_context(|| format!("failed to run {}", makensis.display()))?;
    if !status.success() {
        bail!("makensis failed ({})", status);
    }

    let installer = root.join(INSTALLER_OUTPUT);
    if !installer.is_file() {
        bail!("makensis succeeded but {} was not produced", INSTALLER_OUTPUT);
    }
    shell.status(Status::Created, installer.display());
    Ok(installer)
}
