//! User-friendly diagnostic messages.
//!
//! Every failure the orchestrator cannot fix on its own is reported with a
//! root cause and a numbered list of things the user can do about it.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Re-run hint after host prerequisites are fixed.
    pub const RERUN_PACKAGE: &str = "After taking these steps, re-run: neutron-pack package --installer";

    /// Preflight failure escape hatch.
    pub const SKIP_VCPKG: &str =
        "Install the listed prerequisites, or re-run with --skip-vcpkg to proceed (may still fail)";

    /// Installing the PowerShell runtime vcpkg downloads and executes.
    pub const INSTALL_PWSH: &str = "Install PowerShell 7.5.4 for Windows from https://github.com/PowerShell/PowerShell/releases and ensure 'pwsh.exe' runs on your system";

    /// Installing the MSVC runtime that pwsh links against.
    pub const INSTALL_VC_REDIST: &str = "Ensure the Visual C++ Redistributable is installed (Microsoft Visual C++ 2015-2022 Redistributable x64); missing runtimes can prevent pwsh.exe from running";

    /// Installing a host archive extractor.
    pub const INSTALL_7ZIP: &str = "Install 7-Zip on the host so vcpkg can extract archives reliably, or verify your antivirus isn't blocking extraction";

    /// Installing NSIS.
    pub const INSTALL_NSIS: &str = "Install NSIS from https://nsis.sourceforge.io and ensure makensis is in PATH";

    /// Verbose build output.
    pub const BUILD_FAILED: &str = "Run `neutron-pack package --verbose` for more details";
}

/// An error diagnostic with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let label = if color {
            "\x1b[1;31merror\x1b[0m"
        } else {
            "error"
        };

        output.push_str(&format!("{}: {}\n", label, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: actions you can take:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}
