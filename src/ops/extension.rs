//! Editor extension packaging.
//!
//! The VS Code extension lives in `vscode-extension/` and is built with
//! npm. Every step is best-effort; a broken extension build never fails
//! packaging.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::util::fs::{copy_file, glob_files};
use crate::util::process::{CommandRunner, ProcessBuilder};
use crate::util::shell::{Shell, Status};

pub const EXTENSION_DIR: &str = "vscode-extension";

const NPM_STEPS: [&[&str]; 3] = [&["install"], &["run", "compile"], &["run", "package"]];

/// Build the extension and copy the produced `.vsix` files into `package_dir`.
///
/// `npm` is `None` when no npm executable could be located. Returns the
/// copied files.
pub fn build_extension(
    runner: &dyn CommandRunner,
    shell: &Shell,
    npm: Option<&Path>,
    root: &Path,
    package_dir: &Path,
) -> Vec<PathBuf> {
    let dir = root.join(EXTENSION_DIR);
    if !dir.join("package.json").is_file() {
        tracing::debug!("no editor extension at {}", dir.display());
        return Vec::new();
    }

    let Some(npm) = npm else {
        shell.warn("npm not found; skipping VS Code extension build");
        return Vec::new();
    };

    shell.status(Status::Building, "VS Code extension");
    for step in NPM_STEPS {
        let cmd = ProcessBuilder::new(npm).args(step).cwd(&dir);
        match runner.run(&cmd) {
            Ok(status) if status.success() => {}
            Ok(status) => shell.warn(format!("`npm {}` failed ({})", step.join(" "), status)),
            Err(e) => shell.warn(format!("`npm {}` failed: {:#}", step.join(" "), e)),
        }
    }

    match copy_vsix(&dir, package_dir) {
        Ok(copied) => {
            for vsix in &copied {
                shell.status(Status::Created, vsix.display());
            }
            copied
        }
        Err(e) => {
            shell.warn(format!("failed to copy extension package: {:#}", e));
            Vec::new()
        }
    }
}

fn copy_vsix(dir: &Path, package_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for vsix in glob_files(dir, &["*.vsix".to_string()])? {
        let Some(name) = vsix.file_name() else {
            continue;
        };
        let dst = package_dir.join(name);
        copy_file(&vsix, &dst, false)?;
        copied.push(dst);
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        write_file, CommandExpectation, CommandPattern, FakeRunner, MockProcessOutput,
    };
    use tempfile::TempDir;

    #[test]
    fn test_builds_and_copies_vsix() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let ext = root.join(EXTENSION_DIR);
        write_file(&ext.join("package.json"), "{}");
        let pkg = root.join("pkg");
        std::fs::create_dir_all(&pkg).unwrap();

        let runner = FakeRunner::new();
        runner.push(
            CommandExpectation::new(
                CommandPattern::Contains("run package".into()),
                MockProcessOutput::success(""),
            )
            .creating(ext.join("neutron-0.1.0.vsix"), "vsix"),
        );

        let copied = build_extension(&runner, &Shell::silent(), Some(Path::new("npm")), root, &pkg);

        assert_eq!(
            runner.calls(),
            vec!["npm install", "npm run compile", "npm run package"]
        );
        assert_eq!(copied, vec![pkg.join("neutron-0.1.0.vsix")]);
        assert!(pkg.join("neutron-0.1.0.vsix").is_file());
    }

    #[test]
    fn test_failed_step_does_not_stop_later_steps() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_file(&root.join(EXTENSION_DIR).join("package.json"), "{}");

        let runner = FakeRunner::new();
        runner.expect(
            CommandPattern::Contains("compile".into()),
            MockProcessOutput::failure(1, "tsc error"),
        );

        let copied = build_extension(&runner, &Shell::silent(), Some(Path::new("npm")), root, root);
        assert_eq!(runner.count_matching("npm"), 3);
        assert!(copied.is_empty());
    }

    #[test]
    fn test_skipped_without_npm_or_manifest() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();

        assert!(build_extension(&runner, &Shell::silent(), Some(Path::new("npm")), tmp.path(), tmp.path())
            .is_empty());

        write_file(&tmp.path().join(EXTENSION_DIR).join("package.json"), "{}");
        assert!(build_extension(&runner, &Shell::silent(), None, tmp.path(), tmp.path()).is_empty());
        assert!(runner.calls().is_empty());
    }
}
