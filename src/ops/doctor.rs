//! Host health checks.
//!
//! Two entry points share the same report type:
//!
//! - [`preflight`] runs before packaging on Windows and checks the host
//!   tools vcpkg depends on (PowerShell 7, 7-Zip, the VC++ runtime).
//! - [`check_dependencies`] backs `neutron-pack check-deps` and checks the
//!   toolchain needed to build Neutron at all, with per-distribution
//!   install hints.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::builder::toolchain::{Tool, ToolLocator};
use crate::core::platform::{HostPlatform, OsKind};
use crate::util::diagnostic::suggestions;
use crate::util::process::{CommandRunner, ProcessBuilder};

/// Result of a single health check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Human-readable status message
    pub message: String,

    /// Path to the tool (if applicable)
    pub path: Option<PathBuf>,

    /// Version string (if applicable)
    pub version: Option<String>,

    /// Package that provides the missing dependency
    pub package: Option<String>,

    /// How long the check took
    #[serde(skip)]
    pub duration: Duration,

    /// Whether this check is required or optional
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: true,
            message: message.into(),
            path: None,
            version: None,
            package: None,
            duration: Duration::ZERO,
            required: true,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            passed: false,
            ..CheckResult::pass(name, message)
        }
    }

    /// Mark this check as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Summary of all health checks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,

    /// Total time taken
    #[serde(skip)]
    pub total_duration: Duration,

    /// Environment information
    pub environment: BTreeMap<String, String>,

    /// Suggested next steps, in order
    pub hints: Vec<String>,
}

impl DoctorReport {
    pub fn new() -> Self {
        DoctorReport::default()
    }

    pub fn add(&mut self, check: CheckResult) {
        self.checks.push(check);
    }

    /// Check if all required checks passed.
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    pub fn required_failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .count()
    }

    /// Packages providing the failed checks, in check order.
    pub fn missing_packages(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .filter_map(|c| c.package.clone())
            .collect()
    }

    fn record_host(&mut self, host: &HostPlatform) {
        self.environment
            .insert("os".to_string(), host.os.to_string());
        self.environment
            .insert("arch".to_string(), host.arch.to_string());
    }
}

/// Facts about the host the checks read, gathered once.
#[derive(Debug, Clone)]
pub struct HostFacts {
    /// PATH to search (None = the process PATH)
    pub search_path: Option<OsString>,

    /// Windows system root (`%SystemRoot%`)
    pub system_root: PathBuf,

    /// Contents of `/etc/os-release`, when readable
    pub os_release: Option<String>,

    /// Directories searched for the jsoncpp dylib on macOS
    pub library_dirs: Vec<PathBuf>,
}

impl HostFacts {
    /// Gather facts about the running host.
    pub fn system() -> Self {
        HostFacts {
            search_path: None,
            system_root: env::var_os("SystemRoot")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(r"C:\Windows")),
            os_release: std::fs::read_to_string("/etc/os-release").ok(),
            library_dirs: vec![
                PathBuf::from("/opt/homebrew/lib"),
                PathBuf::from("/usr/local/lib"),
            ],
        }
    }

    /// Resolve a command on the configured PATH.
    pub fn find_command(&self, name: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(paths) => {
                let cwd = env::current_dir().unwrap_or_default();
                which::which_in(name, Some(paths), cwd).ok()
            }
            None => which::which(name).ok(),
        }
    }

    fn find_any(&self, names: &[&str]) -> Option<(String, PathBuf)> {
        names
            .iter()
            .find_map(|n| self.find_command(n).map(|p| (n.to_string(), p)))
    }
}

/// Windows host prerequisites for vcpkg.
///
/// PowerShell 7 is required; 7-Zip and the VC++ runtime only produce
/// warnings. Every failed check adds its remediation to
/// [`DoctorReport::hints`].
pub fn preflight(
    runner: &dyn CommandRunner,
    locator: &ToolLocator,
    facts: &HostFacts,
    timeout: Duration,
) -> DoctorReport {
    let start = Instant::now();
    let mut report = DoctorReport::new();

    let pwsh = check_runnable(runner, locator, Tool::Pwsh, "PowerShell 7", "--version", timeout);
    if !pwsh.passed {
        report.hints.push(suggestions::INSTALL_PWSH.to_string());
    }
    report.add(pwsh);

    let seven_zip =
        check_runnable(runner, locator, Tool::SevenZip, "7-Zip", "--help", timeout).optional();
    if !seven_zip.passed {
        report.hints.push(suggestions::INSTALL_7ZIP.to_string());
    }
    report.add(seven_zip);

    let runtime = check_vc_runtime(&facts.system_root);
    if !runtime.passed {
        report.hints.push(suggestions::INSTALL_VC_REDIST.to_string());
    }
    report.add(runtime);

    if !report.all_required_passed() {
        report.hints.push(suggestions::SKIP_VCPKG.to_string());
    }

    report.total_duration = start.elapsed();
    report
}

fn check_runnable(
    runner: &dyn CommandRunner,
    locator: &ToolLocator,
    tool: Tool,
    name: &str,
    flag: &str,
    timeout: Duration,
) -> CheckResult {
    let start = Instant::now();
    let location = locator.locate(tool);
    if !location.is_found() {
        return CheckResult::fail(name, format!("{} not found in PATH", tool))
            .with_duration(start.elapsed());
    }

    let cmd = ProcessBuilder::new(&location.path).arg(flag);
    let result = match runner.run_timed(&cmd, timeout) {
        Ok(output) if output.status.success() => {
            let version = output.stdout.lines().next().unwrap_or("").trim().to_string();
            let check = CheckResult::pass(name, format!("{} runs", tool));
            if version.is_empty() || flag != "--version" {
                check
            } else {
                check.with_version(version)
            }
        }
        Ok(output) => CheckResult::fail(
            name,
            format!("{} exists but failed to run ({})", tool, output.status),
        ),
        Err(e) => CheckResult::fail(name, format!("{} exists but failed to run: {:#}", tool, e)),
    };
    result
        .with_path(location.path)
        .with_duration(start.elapsed())
}

fn check_vc_runtime(system_root: &Path) -> CheckResult {
    let system32 = system_root.join("System32");
    let found = ["vcruntime140.dll", "msvcp140.dll"]
        .iter()
        .map(|dll| system32.join(dll))
        .find(|p| p.is_file());

    match found {
        Some(path) => CheckResult::pass("VC++ runtime", "Visual C++ runtime present")
            .with_path(path)
            .optional(),
        None => CheckResult::fail(
            "VC++ runtime",
            format!("vcruntime140.dll not found in {}", system32.display()),
        )
        .optional(),
    }
}

/// Linux package manager families with known install commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distro {
    Debian,
    Arch,
    Fedora,
    Unknown,
}

impl Distro {
    /// Classify the contents of `/etc/os-release`.
    pub fn from_os_release(contents: &str) -> Self {
        let lower = contents.to_ascii_lowercase();
        if lower.contains("ubuntu") || lower.contains("debian") {
            Distro::Debian
        } else if lower.contains("arch") {
            Distro::Arch
        } else if lower.contains("fedora") {
            Distro::Fedora
        } else {
            Distro::Unknown
        }
    }

    fn install_command(&self) -> Option<&'static str> {
        match self {
            Distro::Debian => Some("sudo apt-get install -y"),
            Distro::Arch => Some("sudo pacman -S --noconfirm"),
            Distro::Fedora => Some("sudo dnf install -y"),
            Distro::Unknown => None,
        }
    }

    fn jsoncpp_package(&self) -> &'static str {
        match self {
            Distro::Debian => "libjsoncpp-dev",
            Distro::Arch => "jsoncpp",
            Distro::Fedora => "jsoncpp-devel",
            Distro::Unknown => "jsoncpp (dev)",
        }
    }
}

/// Check the toolchain needed to build Neutron on this host.
pub fn check_dependencies(
    runner: &dyn CommandRunner,
    host: &HostPlatform,
    facts: &HostFacts,
) -> DoctorReport {
    let start = Instant::now();
    let mut report = DoctorReport::new();
    report.record_host(host);

    report.add(check_command(facts, "CMake", &["cmake"], "cmake"));
    report.add(check_command(facts, "Git", &["git"], "git"));

    match host.os {
        OsKind::MacOs => {
            report.add(check_command(facts, "C++ compiler", &["clang++", "g++"], "clang++"));
            let dylib = facts
                .library_dirs
                .iter()
                .map(|d| d.join("libjsoncpp.dylib"))
                .find(|p| p.is_file());
            report.add(match dylib {
                Some(path) => CheckResult::pass("jsoncpp", "libjsoncpp.dylib found").with_path(path),
                None => CheckResult::fail("jsoncpp", "libjsoncpp.dylib not found")
                    .with_package("jsoncpp"),
            });
        }
        OsKind::Linux => {
            let distro = facts
                .os_release
                .as_deref()
                .map(Distro::from_os_release)
                .unwrap_or(Distro::Unknown);
            report
                .environment
                .insert("distro".to_string(), format!("{:?}", distro).to_lowercase());

            report.add(check_command(facts, "C++ compiler", &["g++", "clang++"], "g++"));
            let pkg_config = check_command(facts, "pkg-config", &["pkg-config"], "pkg-config");
            let jsoncpp = match &pkg_config.path {
                Some(path) => check_pkg_config_module(runner, path, "jsoncpp"),
                None => CheckResult::fail("jsoncpp", "cannot check without pkg-config"),
            };
            report.add(pkg_config);
            report.add(jsoncpp.with_package(distro.jsoncpp_package()));
        }
        OsKind::Windows => {
            report.add(check_command(
                facts,
                "C++ compiler",
                &["cl", "g++"],
                "Visual Studio (C++ Desktop Development) or MinGW",
            ));
        }
    }

    report.hints = install_hints(host.os, facts, &report);
    report.total_duration = start.elapsed();
    report
}

fn check_command(facts: &HostFacts, name: &str, candidates: &[&str], package: &str) -> CheckResult {
    let start = Instant::now();
    match facts.find_any(candidates) {
        Some((found, path)) => CheckResult::pass(name, format!("Found {}", found))
            .with_path(path)
            .with_duration(start.elapsed()),
        None => CheckResult::fail(
            name,
            format!("{} not found in PATH", candidates.join(" or ")),
        )
        .with_package(package)
        .with_duration(start.elapsed()),
    }
}

fn check_pkg_config_module(runner: &dyn CommandRunner, pkg_config: &Path, module: &str) -> CheckResult {
    let cmd = ProcessBuilder::new(pkg_config).args(["--exists", module]);
    match runner.run(&cmd) {
        Ok(status) if status.success() => {
            CheckResult::pass(module, format!("pkg-config knows {}", module))
        }
        Ok(_) => CheckResult::fail(module, format!("pkg-config cannot find {}", module)),
        Err(e) => CheckResult::fail(module, format!("pkg-config failed: {:#}", e)),
    }
}

fn install_hints(os: OsKind, facts: &HostFacts, report: &DoctorReport) -> Vec<String> {
    let missing = report.missing_packages();
    if missing.is_empty() {
        return Vec::new();
    }

    match os {
        OsKind::Windows => vec![
            "Install Visual Studio Community with the C++ workload".to_string(),
            "Install CMake: winget install Kitware.CMake".to_string(),
            "Install Git: winget install Git.Git".to_string(),
        ],
        OsKind::MacOs => vec![format!("brew install {}", missing.join(" "))],
        OsKind::Linux => {
            let distro = facts
                .os_release
                .as_deref()
                .map(Distro::from_os_release)
                .unwrap_or(Distro::Unknown);
            match distro.install_command() {
                Some(cmd) => vec![format!("{} {}", cmd, missing.join(" "))],
                None => vec![format!(
                    "Install with your package manager: {}",
                    missing.join(" ")
                )],
            }
        }
    }
}

/// Format a report for the console.
pub fn format_report(title: &str, report: &DoctorReport, verbose: bool) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "{}", title);
    let _ = writeln!(output, "{}\n", "=".repeat(title.len()));

    if verbose && !report.environment.is_empty() {
        let _ = writeln!(output, "Environment:");
        for (key, value) in &report.environment {
            let _ = writeln!(output, "  {}: {}", key, value);
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "Checks:");
    for check in &report.checks {
        let status = if check.passed { "[OK]" } else { "[!!]" };
        let required = if check.required { "" } else { " (optional)" };
        let _ = writeln!(output, "  {} {}{}", status, check.name, required);

        if verbose || !check.passed {
            let _ = writeln!(output, "      {}", check.message);
        }
        if verbose {
            if let Some(path) = &check.path {
                let _ = writeln!(output, "      Path: {}", path.display());
            }
            if let Some(version) = &check.version {
                let _ = writeln!(output, "      Version: {}", version);
            }
        }
    }
    let _ = writeln!(output);

    let missing = report.missing_packages();
    if !missing.is_empty() {
        let _ = writeln!(output, "Missing dependencies:");
        for package in &missing {
            let _ = writeln!(output, "  - {}", package);
        }
        let _ = writeln!(output);
    }

    if !report.hints.is_empty() {
        let _ = writeln!(output, "Next steps:");
        for hint in &report.hints {
            let _ = writeln!(output, "  {}", hint);
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(
        output,
        "Summary: {} passed, {} failed",
        report.passed_count(),
        report.failed_count()
    );
    if verbose {
        let _ = writeln!(output, "Completed in {:.2}s", report.total_duration.as_secs_f64());
    }

    output
}
