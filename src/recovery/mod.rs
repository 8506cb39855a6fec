//! Dependency recovery engine.
//!
//! Repairs the vcpkg download cache between configure attempts:
//! - [`cache`]: integrity scan of downloaded archives
//! - [`diagnose`]: classification of the manifest-install log
//! - [`extract`]: in-process extraction when vcpkg's extractor is broken
//!
//! Every filesystem operation here is best-effort. Failures are logged and
//! recorded as a failed [`RecoveryAction`]; they never abort the build.

pub mod cache;
pub mod diagnose;
pub mod extract;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub use cache::scan_cache_for_corruption;
pub use diagnose::{
    Classification, Diagnosis, FailureKind, LogClassifier, PatternClassifier, UnrecoverableCause,
};
pub use extract::manual_extract_fallback;

use crate::util::fs::remove_dir_all_if_exists;

/// What a recovery step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A download named in the log was deleted.
    DeletedArchive,
    /// A download failed the cache integrity scan and was deleted.
    DeletedCorruptDownload,
    /// A tool folder under `downloads/tools` was removed.
    RemovedToolFolder,
    /// An archive was extracted in-process into its tool folder.
    ReExtracted,
}

/// Whether a recovery step took effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Done,
    Failed(String),
}

/// A remediation step and its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryAction {
    pub kind: ActionKind,
    pub target: PathBuf,
    pub outcome: ActionOutcome,
}

impl RecoveryAction {
    pub fn succeeded(&self) -> bool {
        self.outcome == ActionOutcome::Done
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            ActionKind::DeletedArchive => "deleted archive",
            ActionKind::DeletedCorruptDownload => "deleted corrupt download",
            ActionKind::RemovedToolFolder => "removed tool folder",
            ActionKind::ReExtracted => "re-extracted",
        };
        write!(f, "{} {}", verb, self.target.display())?;
        if let ActionOutcome::Failed(ref reason) = self.outcome {
            write!(f, " (failed: {})", reason)?;
        }
        Ok(())
    }
}

/// Cache-repair logic bound to one project and one download cache.
pub struct RecoveryEngine {
    project_root: PathBuf,
    downloads_dir: PathBuf,
    tools_dir: PathBuf,
    classifier: Box<dyn LogClassifier>,
}

impl RecoveryEngine {
    /// Engine using the built-in [`PatternClassifier`].
    pub fn new(project_root: impl Into<PathBuf>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self::with_classifier(project_root, downloads_dir, Box::new(PatternClassifier))
    }

    pub fn with_classifier(
        project_root: impl Into<PathBuf>,
        downloads_dir: impl Into<PathBuf>,
        classifier: Box<dyn LogClassifier>,
    ) -> Self {
        let downloads_dir = downloads_dir.into();
        RecoveryEngine {
            project_root: project_root.into(),
            tools_dir: downloads_dir.join("tools"),
            downloads_dir,
            classifier,
        }
    }

    /// Scan the download cache, reporting each removal as an action.
    pub fn scan_cache(&self) -> Vec<RecoveryAction> {
        scan_cache_for_corruption(&self.downloads_dir)
            .into_iter()
            .map(|target| RecoveryAction {
                kind: ActionKind::DeletedCorruptDownload,
                target,
                outcome: ActionOutcome::Done,
            })
            .collect()
    }

    /// Diagnose a failed configure from its manifest-install log and apply
    /// the matching remediation.
    ///
    /// A missing or unreadable log yields no actions and [`Diagnosis::None`].
    pub fn diagnose_log(&self, log_path: &Path) -> (Vec<RecoveryAction>, Diagnosis) {
        let text = match fs::read(log_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!("no manifest-install log at {}: {}", log_path.display(), e);
                return (Vec::new(), Diagnosis::None);
            }
        };

        let classification = self.classifier.classify(&text);
        let mut actions = Vec::new();

        for archive in &classification.archives {
            let target = self.resolve(archive);
            if !target.exists() {
                tracing::debug!("reported archive {} already gone", target.display());
                continue;
            }
            tracing::warn!("Removing corrupt vcpkg download: {}", target.display());
            actions.push(remove_file_action(ActionKind::DeletedArchive, target));
        }

        if classification.has(&FailureKind::ExtractionTool) {
            actions.extend(self.remove_extractor_tool_folders());
            actions.extend(self.re_extract_runtime_archives());
        }

        for name in classification.corrupt_tool_folders() {
            let target = self.tools_dir.join(name);
            if target.exists() && !actions.iter().any(|a| a.target == target) {
                actions.push(remove_dir_action(target));
            }
        }

        actions.extend(self.scan_cache());

        let diagnosis = if classification.has(&FailureKind::RuntimeMissing) {
            Diagnosis::Unrecoverable(UnrecoverableCause::RuntimeMissing)
        } else if actions.iter().any(RecoveryAction::succeeded) {
            Diagnosis::Retry
        } else {
            Diagnosis::None
        };

        (actions, diagnosis)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    fn remove_extractor_tool_folders(&self) -> Vec<RecoveryAction> {
        let Ok(entries) = fs::read_dir(&self.tools_dir) else {
            return Vec::new();
        };

        let mut folders: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_lowercase();
                name.contains("7zip") || name.contains("7-zip")
            })
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        folders.sort();

        folders
            .into_iter()
            .map(|target| {
                tracing::warn!(
                    "Removing vcpkg tool folder after extraction error: {}",
                    target.display()
                );
                remove_dir_action(target)
            })
            .collect()
    }

    fn re_extract_runtime_archives(&self) -> Vec<RecoveryAction> {
        let Ok(entries) = fs::read_dir(&self.downloads_dir) else {
            return Vec::new();
        };

        let mut archives: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                let name = p
                    .file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                name.contains("powershell") && name.ends_with(".zip") && p.is_file()
            })
            .collect();
        archives.sort();

        archives
            .into_iter()
            .map(|archive| {
                let name = archive
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let target = self.tools_dir.join(extract::powershell_tool_folder(&name));
                let outcome = if manual_extract_fallback(&archive, &target) {
                    ActionOutcome::Done
                } else {
                    ActionOutcome::Failed(format!("could not extract {}", archive.display()))
                };
                RecoveryAction {
                    kind: ActionKind::ReExtracted,
                    target,
                    outcome,
                }
            })
            .collect()
    }
}

impl fmt::Debug for RecoveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryEngine")
            .field("project_root", &self.project_root)
            .field("downloads_dir", &self.downloads_dir)
            .finish_non_exhaustive()
    }
}

fn remove_file_action(kind: ActionKind, target: PathBuf) -> RecoveryAction {
    let outcome = match fs::remove_file(&target) {
        Ok(()) => ActionOutcome::Done,
        Err(e) => {
            tracing::warn!("failed to remove {}: {}", target.display(), e);
            ActionOutcome::Failed(e.to_string())
        }
    };
    RecoveryAction {
        kind,
        target,
        outcome,
    }
}

fn remove_dir_action(target: PathBuf) -> RecoveryAction {
    let outcome = match remove_dir_all_if_exists(&target) {
        Ok(()) => ActionOutcome::Done,
        Err(e) => {
            tracing::warn!("{:#}", e);
            ActionOutcome::Failed(format!("{:#}", e))
        }
    };
    RecoveryAction {
        kind: ActionKind::RemovedToolFolder,
        target,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_corrupt_archive, write_file, write_zip};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        downloads: PathBuf,
        log: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let downloads = root.join("vcpkg").join("downloads");
        std::fs::create_dir_all(&downloads).unwrap();
        let log = root.join("build").join("vcpkg-manifest-install.log");
        Fixture {
            _tmp: tmp,
            root,
            downloads,
            log,
        }
    }

    #[test]
    fn test_missing_log_is_none() {
        let f = fixture();
        let engine = RecoveryEngine::new(&f.root, &f.downloads);
        let (actions, diagnosis) = engine.diagnose_log(&f.log);
        assert!(actions.is_empty());
        assert_eq!(diagnosis, Diagnosis::None);
    }

    #[test]
    fn test_deletes_reported_archive_relative_to_root() {
        let f = fixture();
        let archive = write_zip(&f.downloads.join("zlib-1.3.zip"), &[("a", "b")]);
        write_file(&f.log, "ERROR: vcpkg/downloads/zlib-1.3.zip\n");

        let engine = RecoveryEngine::new(&f.root, &f.downloads);
        let (actions, diagnosis) = engine.diagnose_log(&f.log);

        assert!(!archive.exists());
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::DeletedArchive);
        assert_eq!(actions[0].target, archive);
        assert_eq!(diagnosis, Diagnosis::Retry);
    }

    #[test]
    fn test_absolute_archive_path() {
        let f = fixture();
        let archive = write_file(&f.root.join("cache").join("foo.zip"), "partial");
        write_file(&f.log, &format!("ERROR: {}\n", archive.display()));

        let engine = RecoveryEngine::new(&f.root, &f.downloads);
        let (actions, _) = engine.diagnose_log(&f.log);

        assert!(!archive.exists());
        assert_eq!(actions[0].target, archive);
    }

    #[test]
    fn test_runtime_missing_is_unrecoverable() {
        let f = fixture();
        write_file(&f.log, "error: pwsh.exe failed with exit code -1073741515\n");

        let engine = RecoveryEngine::new(&f.root, &f.downloads);
        let (_, diagnosis) = engine.diagnose_log(&f.log);
        assert_eq!(
            diagnosis,
            Diagnosis::Unrecoverable(UnrecoverableCause::RuntimeMissing)
        );
    }

    #[test]
    fn test_extraction_failure_removes_7zip_and_re_extracts() {
        let f = fixture();
        let tools = f.downloads.join("tools");
        write_file(&tools.join("7zip-24.08-windows").join("7z.dll"), "dll");
        write_file(&tools.join("ninja-1.12").join("ninja.exe"), "exe");
        write_zip(
            &f.downloads.join("PowerShell-7.5.4-win-x64.zip"),
            &[("pwsh.exe", "MZ")],
        );
        write_file(&f.log, "error: 7zip failed: Codec Load Error\n");

        let engine = RecoveryEngine::new(&f.root, &f.downloads);
        let (actions, diagnosis) = engine.diagnose_log(&f.log);

        assert!(!tools.join("7zip-24.08-windows").exists());
        assert!(tools.join("ninja-1.12").exists());
        assert!(tools.join("PowerShell-7.5.4-win").join("pwsh.exe").exists());
        assert!(actions
            .iter()
            .any(|a| a.kind == ActionKind::ReExtracted && a.succeeded()));
        assert_eq!(diagnosis, Diagnosis::Retry);
    }

    #[test]
    fn test_generic_tool_folder_corruption() {
        let f = fixture();
        let tools = f.downloads.join("tools");
        write_file(&tools.join("cmake-3.30.1-windows").join("bin/cmake.exe"), "x");
        write_file(
            &f.log,
            "error: downloads/tools/cmake-3.30.1-windows/bin/cmake.exe failed to run\n",
        );

        let engine = RecoveryEngine::new(&f.root, &f.downloads);
        let (actions, diagnosis) = engine.diagnose_log(&f.log);

        assert!(!tools.join("cmake-3.30.1-windows").exists());
        assert_eq!(actions[0].kind, ActionKind::RemovedToolFolder);
        assert_eq!(diagnosis, Diagnosis::Retry);
    }

    #[test]
    fn test_general_scan_runs_after_categories() {
        let f = fixture();
        let broken = write_corrupt_archive(&f.downloads.join("boost.zip"));
        write_file(&f.log, "-- configure failed for an unknown reason\n");

        let engine = RecoveryEngine::new(&f.root, &f.downloads);
        let (actions, diagnosis) = engine.diagnose_log(&f.log);

        assert!(!broken.exists());
        assert_eq!(actions[0].kind, ActionKind::DeletedCorruptDownload);
        assert_eq!(diagnosis, Diagnosis::Retry);
    }

    #[test]
    fn test_unrecognized_log_is_none() {
        let f = fixture();
        write_file(&f.log, "CMake Error: could not find compiler\n");

        let engine = RecoveryEngine::new(&f.root, &f.downloads);
        let (actions, diagnosis) = engine.diagnose_log(&f.log);
        assert!(actions.is_empty());
        assert_eq!(diagnosis, Diagnosis::None);
    }

    #[test]
    fn test_custom_classifier() {
        struct Always;
        impl LogClassifier for Always {
            fn classify(&self, _: &str) -> Classification {
                Classification {
                    archives: Vec::new(),
                    failures: vec![FailureKind::RuntimeMissing],
                }
            }
        }

        let f = fixture();
        write_file(&f.log, "anything");
        let engine = RecoveryEngine::with_classifier(&f.root, &f.downloads, Box::new(Always));
        let (_, diagnosis) = engine.diagnose_log(&f.log);
        assert!(matches!(diagnosis, Diagnosis::Unrecoverable(_)));
    }
}
