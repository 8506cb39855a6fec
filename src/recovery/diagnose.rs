//! Manifest-install log classification.
//!
//! The acquisition tool reports failures as free-form text. A
//! [`LogClassifier`] turns that text into evidence: which archives it named
//! as broken and which failure categories are present. Deciding what to do
//! with the evidence is left to the [`RecoveryEngine`](super::RecoveryEngine).

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Failure category recognized in a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The downloaded shell runtime is missing or will not start.
    RuntimeMissing,
    /// The archive extraction tool or one of its codecs failed.
    ExtractionTool,
    /// A named tool folder under `downloads/tools` is damaged.
    ToolFolderCorrupt(String),
}

/// Evidence extracted from a log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Archive paths reported as broken, exactly as written in the log.
    pub archives: Vec<PathBuf>,
    pub failures: Vec<FailureKind>,
}

impl Classification {
    pub fn has(&self, kind: &FailureKind) -> bool {
        self.failures.contains(kind)
    }

    /// Names of tool folders reported as damaged.
    pub fn corrupt_tool_folders(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().filter_map(|f| match f {
            FailureKind::ToolFolderCorrupt(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Turns manifest-install log text into a [`Classification`].
pub trait LogClassifier {
    fn classify(&self, log_text: &str) -> Classification;
}

/// Classifier keyed on the messages vcpkg prints on Windows hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

static ARCHIVE_ERROR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)ERROR:\s*(.+\.(zip|tar|tgz|gz|xz|7z))").ok());

static TOOL_FOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)downloads[\\/]tools[\\/]([^\\/\s"':]+)"#).ok());

impl LogClassifier for PatternClassifier {
    fn classify(&self, log_text: &str) -> Classification {
        let mut classification = Classification::default();

        if let Some(re) = ARCHIVE_ERROR.as_ref() {
            for cap in re.captures_iter(log_text) {
                let path = PathBuf::from(cap[1].trim());
                if !classification.archives.contains(&path) {
                    classification.archives.push(path);
                }
            }
        }

        let lower = log_text.to_lowercase();

        if lower.contains("pwsh.exe failed")
            || lower.contains("pwsh.dll")
            || (lower.contains("powershell-core") && lower.contains("failed"))
        {
            classification.failures.push(FailureKind::RuntimeMissing);
        }

        if lower.contains("7zip") || lower.contains("codec load error") || lower.contains("7z.dll")
        {
            classification.failures.push(FailureKind::ExtractionTool);
        }

        let Some(tool_folder) = TOOL_FOLDER.as_ref() else {
            return classification;
        };
        for line in log_text.lines() {
            let line_lower = line.to_lowercase();
            if !["failed", "error", "corrupt"]
                .iter()
                .any(|w| line_lower.contains(w))
            {
                continue;
            }
            for cap in tool_folder.captures_iter(line) {
                let kind = FailureKind::ToolFolderCorrupt(cap[1].to_string());
                if !classification.failures.contains(&kind) {
                    classification.failures.push(kind);
                }
            }
        }

        classification
    }
}

/// Why automatic recovery cannot help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnrecoverableCause {
    /// The acquisition tool's shell runtime cannot run on this host.
    RuntimeMissing,
}

impl UnrecoverableCause {
    /// Actionable remediation for the user.
    pub fn remediation(&self) -> Diagnostic {
        match self {
            UnrecoverableCause::RuntimeMissing => Diagnostic::error(
                "vcpkg failed to install the PowerShell runtime",
            )
            .with_context(
                "the extracted PowerShell lacks required runtime files or system dependencies",
            )
            .with_suggestion(suggestions::INSTALL_PWSH)
            .with_suggestion(suggestions::INSTALL_VC_REDIST)
            .with_suggestion(suggestions::INSTALL_7ZIP)
            .with_suggestion(suggestions::RERUN_PACKAGE),
        }
    }
}

impl fmt::Display for UnrecoverableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnrecoverableCause::RuntimeMissing => {
                write!(f, "PowerShell runtime required by vcpkg is missing or failing")
            }
        }
    }
}

/// Verdict after a failed configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    /// Something was repaired; another attempt may succeed.
    Retry,
    /// A host prerequisite is missing; retrying is pointless.
    Unrecoverable(UnrecoverableCause),
    /// Nothing recognizable was found.
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_error_targets_exact_path() {
        let log = "Downloading PowerShell...\nERROR: C:\\cache\\foo.zip\nother line\n";
        let c = PatternClassifier.classify(log);

        assert_eq!(c.archives, vec![PathBuf::from("C:\\cache\\foo.zip")]);
        assert!(c.failures.is_empty());
    }

    #[test]
    fn test_archive_extensions_and_case() {
        let log = "error: downloads/zlib-1.3.TAR.GZ\nERROR:   tools/cmake.tgz  \nERROR: x.7z\nERROR: not-an-archive.txt\n";
        let c = PatternClassifier.classify(log);
        assert_eq!(
            c.archives,
            vec![
                PathBuf::from("downloads/zlib-1.3.TAR.GZ"),
                PathBuf::from("tools/cmake.tgz"),
                PathBuf::from("x.7z"),
            ]
        );
    }

    #[test]
    fn test_runtime_missing_patterns() {
        for log in [
            "error: pwsh.exe failed with exit code -1073741515",
            "could not load pwsh.dll",
            "Installing powershell-core... FAILED",
        ] {
            let c = PatternClassifier.classify(log);
            assert!(c.has(&FailureKind::RuntimeMissing), "{}", log);
        }

        let c = PatternClassifier.classify("Installing powershell-core... done");
        assert!(!c.has(&FailureKind::RuntimeMissing));
    }

    #[test]
    fn test_extraction_tool_patterns() {
        for log in ["7zip failed", "Codec Load Error", "cannot open 7z.dll"] {
            assert!(PatternClassifier
                .classify(log)
                .has(&FailureKind::ExtractionTool));
        }
    }

    #[test]
    fn test_tool_folder_corruption() {
        let log = "\
note: using C:\\vcpkg\\downloads\\tools\\ninja-1.12.1-windows
error: C:\\vcpkg\\downloads\\tools\\cmake-3.30.1-windows\\bin\\cmake.exe failed
corrupt file in downloads/tools/perl-5.38/bin
";
        let c = PatternClassifier.classify(log);
        let folders: Vec<_> = c.corrupt_tool_folders().collect();
        assert_eq!(folders, vec!["cmake-3.30.1-windows", "perl-5.38"]);
    }

    #[test]
    fn test_clean_log_yields_nothing() {
        let c = PatternClassifier.classify("-- Running vcpkg install\n-- Done\n");
        assert_eq!(c, Classification::default());
    }

    #[test]
    fn test_remediation_lists_actions() {
        let text = UnrecoverableCause::RuntimeMissing.remediation().format(false);
        assert!(text.contains("1. Install PowerShell 7.5.4"));
        assert!(text.contains("2. Ensure the Visual C++ Redistributable"));
        assert!(text.contains("3. Install 7-Zip"));
    }

    #[test]
    fn test_log_patterns_compile() {
        assert!(ARCHIVE_ERROR.is_some());
        assert!(TOOL_FOLDER.is_some());
    }
}
