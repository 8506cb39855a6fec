//! Host platform detection.
//!
//! The orchestrator only supports a closed set of operating systems and
//! CPU architectures. Anything outside that set is rejected up front with
//! a [`PlatformError`], which is never retried.

use std::fmt;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Operating system classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsKind {
    MacOs,
    Linux,
    Windows,
}

impl OsKind {
    /// Short name used in package directory names (`macos`, `linux`, `windows`).
    pub fn as_str(&self) -> &'static str {
        match self {
            OsKind::MacOs => "macos",
            OsKind::Linux => "linux",
            OsKind::Windows => "windows",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, OsKind::Windows)
    }

    /// Suffix appended to executable names on this OS.
    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() {
            ".exe"
        } else {
            ""
        }
    }
}

impl fmt::Display for OsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture classifier.
///
/// `Intel` is only produced on macOS, where it names x86_64 hosts to keep
/// package names distinct from Apple Silicon builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchKind {
    X64,
    Arm64,
    Intel,
}

impl ArchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchKind::X64 => "x64",
            ArchKind::Arm64 => "arm64",
            ArchKind::Intel => "intel",
        }
    }
}

impl fmt::Display for ArchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when the host is outside the supported set.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum PlatformError {
    #[error("unsupported operating system: {os}")]
    #[diagnostic(
        code(neutron_pack::platform::unsupported_os),
        help("Neutron packages are produced for macOS, Linux and Windows only")
    )]
    UnsupportedOs { os: String },

    #[error("unsupported {os} architecture: {arch}")]
    #[diagnostic(
        code(neutron_pack::platform::unsupported_arch),
        help("Supported architectures are x86_64 and aarch64")
    )]
    UnsupportedArch { os: String, arch: String },
}

/// A classified host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostPlatform {
    pub os: OsKind,
    pub arch: ArchKind,
}

impl HostPlatform {
    /// Classify the running host.
    pub fn detect() -> Result<Self, PlatformError> {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Classify an OS/architecture pair as reported by the host.
    ///
    /// Accepts both Rust-style (`macos`, `aarch64`) and uname-style
    /// (`darwin`, `arm64`, `amd64`) spellings, case-insensitively.
    pub fn from_parts(os: &str, arch: &str) -> Result<Self, PlatformError> {
        let os_lower = os.to_ascii_lowercase();
        let arch_lower = arch.to_ascii_lowercase();

        let unsupported_arch = || PlatformError::UnsupportedArch {
            os: os_lower.clone(),
            arch: arch_lower.clone(),
        };

        let (os_kind, arch_kind) = match os_lower.as_str() {
            "macos" | "darwin" => {
                let arch = match arch_lower.as_str() {
                    "arm64" | "aarch64" => ArchKind::Arm64,
                    "x86_64" | "amd64" => ArchKind::Intel,
                    _ => return Err(unsupported_arch()),
                };
                (OsKind::MacOs, arch)
            }
            "linux" => {
                let arch = match arch_lower.as_str() {
                    "x86_64" | "amd64" => ArchKind::X64,
                    "aarch64" | "arm64" => ArchKind::Arm64,
                    _ => return Err(unsupported_arch()),
                };
                (OsKind::Linux, arch)
            }
            "windows" => {
                let arch = match arch_lower.as_str() {
                    "x86_64" | "amd64" => ArchKind::X64,
                    "aarch64" | "arm64" => ArchKind::Arm64,
                    _ => return Err(unsupported_arch()),
                };
                (OsKind::Windows, arch)
            }
            _ => return Err(PlatformError::UnsupportedOs { os: os_lower }),
        };

        Ok(HostPlatform {
            os: os_kind,
            arch: arch_kind,
        })
    }

    /// Executable file name for a logical binary name on this platform.
    pub fn exe_name(&self, base: &str) -> String {
        format!("{}{}", base, self.os.exe_suffix())
    }

    /// Conventional package directory name: `<product>-<os>-<arch>`.
    pub fn package_dir_name(&self, product: &str) -> String {
        format!("{}-{}-{}", product, self.os, self.arch)
    }

    /// Default vcpkg triplet for this host.
    pub fn vcpkg_triplet(&self) -> String {
        let arch = match self.arch {
            ArchKind::Arm64 => "arm64",
            ArchKind::X64 | ArchKind::Intel => "x64",
        };
        let os = match self.os {
            OsKind::Windows => "windows",
            OsKind::Linux => "linux",
            OsKind::MacOs => "osx",
        };
        format!("{}-{}", arch, os)
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.os, self.arch)
    }
}
