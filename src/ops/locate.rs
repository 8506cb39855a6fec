//! Artifact location and smoke testing.
//!
//! Build trees lay binaries out differently depending on the generator:
//! single-config generators write them to the build root, multi-config
//! generators to a per-configuration subdirectory. Candidates are checked
//! in a fixed order and the first existing file wins.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::builder::cmake::CMake;
use crate::core::platform::HostPlatform;
use crate::core::target::Profile;
use crate::util::process::{CommandRunner, ProcessBuilder};
use crate::util::shell::{Shell, Status};

/// Multi-config subdirectories, in search order.
const CONFIG_DIRS: [&str; 4] = ["Release", "Debug", "MinSizeRel", "RelWithDebInfo"];

static VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+)").ok());

/// Version reported when the interpreter cannot be queried.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Executables the package may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Artifact {
    Interpreter,
    PackageManager,
    LanguageServer,
}

impl Artifact {
    /// Logical executable name, without the platform suffix.
    pub fn name(&self) -> &'static str {
        match self {
            Artifact::Interpreter => "neutron",
            Artifact::PackageManager => "box",
            Artifact::LanguageServer => "neutron-lsp",
        }
    }

    /// Harmless flag used for the smoke test.
    pub fn smoke_flag(&self) -> &'static str {
        match self {
            Artifact::PackageManager => "--help",
            Artifact::Interpreter | Artifact::LanguageServer => "--version",
        }
    }
}

/// Ordered candidate paths for an executable.
pub fn candidate_paths(build_dir: &Path, root: &Path, exe: &str) -> Vec<PathBuf> {
    let mut paths = vec![build_dir.join(exe)];
    paths.extend(CONFIG_DIRS.iter().map(|dir| build_dir.join(dir).join(exe)));
    paths.push(root.join(exe));
    paths
}

/// First candidate that exists as a file.
pub fn locate(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// A located executable and whether its smoke test passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedBinary {
    pub artifact: Artifact,
    pub path: PathBuf,
    pub verified: bool,
}

/// Where each artifact is looked for.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    host: HostPlatform,
    root: PathBuf,
    interpreter_build_dir: PathBuf,
    package_manager_build_dir: PathBuf,
}

impl ArtifactLocator {
    pub fn new(
        host: HostPlatform,
        root: impl Into<PathBuf>,
        interpreter_build_dir: impl Into<PathBuf>,
        package_manager_build_dir: impl Into<PathBuf>,
    ) -> Self {
        ArtifactLocator {
            host,
            root: root.into(),
            interpreter_build_dir: interpreter_build_dir.into(),
            package_manager_build_dir: package_manager_build_dir.into(),
        }
    }

    /// Build directory an artifact is produced in.
    pub fn build_dir(&self, artifact: Artifact) -> &Path {
        match artifact {
            Artifact::PackageManager => &self.package_manager_build_dir,
            Artifact::Interpreter | Artifact::LanguageServer => &self.interpreter_build_dir,
        }
    }

    pub fn exe_name(&self, artifact: Artifact) -> String {
        self.host.exe_name(artifact.name())
    }

    pub fn candidates(&self, artifact: Artifact) -> Vec<PathBuf> {
        candidate_paths(
            self.build_dir(artifact),
            &self.root,
            &self.exe_name(artifact),
        )
    }

    pub fn find(&self, artifact: Artifact) -> Option<PathBuf> {
        let found = locate(&self.candidates(artifact));
        match &found {
            Some(path) => tracing::debug!("{} found at {}", artifact.name(), path.display()),
            None => tracing::debug!("{} not found in any candidate location", artifact.name()),
        }
        found
    }
}

/// Run the artifact's smoke test.
///
/// Failures never abort packaging: a non-zero exit, a timeout or a spawn
/// error is reported as a warning and the binary is still used.
pub fn verify(
    runner: &dyn CommandRunner,
    shell: &Shell,
    artifact: Artifact,
    path: &Path,
    timeout: Duration,
) -> bool {
    let cmd = ProcessBuilder::new(path).arg(artifact.smoke_flag());
    match runner.run_timed(&cmd, timeout) {
        Ok(output) if output.status.success() => {
            shell.status(
                Status::Verified,
                format!("{} ({})", artifact.name(), path.display()),
            );
            true
        }
        Ok(output) => {
            shell.warn(format!(
                "{} failed verification ({}); packaging it anyway",
                artifact.name(),
                output.status
            ));
            false
        }
        Err(e) => {
            shell.warn(format!(
                "{} could not be run for verification: {:#}",
                artifact.name(),
                e
            ));
            false
        }
    }
}

/// Locate and smoke-test one artifact.
pub fn resolve(
    locator: &ArtifactLocator,
    runner: &dyn CommandRunner,
    shell: &Shell,
    artifact: Artifact,
    timeout: Duration,
) -> Option<ResolvedBinary> {
    let path = locator.find(artifact)?;
    let verified = verify(runner, shell, artifact, &path, timeout);
    Some(ResolvedBinary {
        artifact,
        path,
        verified,
    })
}

/// Best-effort build of the language server alone, followed by another lookup.
///
/// Only attempted when the interpreter's build tree exists.
pub fn build_language_server(
    locator: &ArtifactLocator,
    runner: &dyn CommandRunner,
    shell: &Shell,
    cmake: &CMake,
    profile: Profile,
) -> Option<PathBuf> {
    let build_dir = locator.build_dir(Artifact::LanguageServer);
    if !build_dir.is_dir() {
        return None;
    }

    shell.status(Status::Building, "neutron-lsp target");
    let cmd = cmake.build_named_target(build_dir, Artifact::LanguageServer.name(), profile);
    match runner.run(&cmd) {
        Ok(status) if !status.success() => {
            tracing::warn!("neutron-lsp build failed ({})", status)
        }
        Err(e) => tracing::warn!("neutron-lsp build failed: {:#}", e),
        Ok(_) => {}
    }

    locator.find(Artifact::LanguageServer)
}

/// Extract a `MAJOR.MINOR.PATCH` version from `--version` output.
pub fn parse_version(output: &str) -> Option<String> {
    let re = VERSION_RE.as_ref()?;
    let found = re.captures(output)?.get(1)?.as_str();
    semver::Version::parse(found).ok().map(|v| v.to_string())
}

/// Query the interpreter for its version, falling back to [`UNKNOWN_VERSION`].
pub fn detect_version(runner: &dyn CommandRunner, interpreter: &Path, timeout: Duration) -> String {
    let cmd = ProcessBuilder::new(interpreter).arg("--version");
    match runner.run_timed(&cmd, timeout) {
        Ok(output) if output.status.success() => {
            let text = format!("{}\n{}", output.stdout, output.stderr);
            parse_version(&text).unwrap_or_else(|| UNKNOWN_VERSION.to_string())
        }
        Ok(output) => {
            tracing::debug!("version query exited with {}", output.status);
            UNKNOWN_VERSION.to_string()
        }
        Err(e) => {
            tracing::debug!("version query failed: {:#}", e);
            UNKNOWN_VERSION.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{ArchKind, OsKind};
    use crate::test_support::{
        write_fake_binary, CommandExpectation, CommandPattern, FakeRunner, MockProcessOutput,
    };
    use crate::util::env::BuildEnv;
    use tempfile::TempDir;

    fn linux() -> HostPlatform {
        HostPlatform {
            os: OsKind::Linux,
            arch: ArchKind::X64,
        }
    }

    fn locator(root: &Path) -> ArtifactLocator {
        ArtifactLocator::new(
            linux(),
            root,
            root.join("build"),
            root.join("nt-box").join("build"),
        )
    }

    #[test]
    fn test_candidate_order() {
        let paths = candidate_paths(Path::new("/p/build"), Path::new("/p"), "neutron.exe");
        let expected: Vec<PathBuf> = [
            "/p/build/neutron.exe",
            "/p/build/Release/neutron.exe",
            "/p/build/Debug/neutron.exe",
            "/p/build/MinSizeRel/neutron.exe",
            "/p/build/RelWithDebInfo/neutron.exe",
            "/p/neutron.exe",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a").join("neutron");
        let b = write_fake_binary(&tmp.path().join("b").join("neutron"));
        let c = write_fake_binary(&tmp.path().join("c").join("neutron"));

        assert_eq!(locate(&[a, b.clone(), c]), Some(b));
    }

    #[test]
    fn test_directories_are_not_binaries() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("build").join("box");
        std::fs::create_dir_all(&dir).unwrap();
        assert_eq!(locate(&[dir]), None);
    }

    #[test]
    fn test_locator_uses_target_build_dirs() {
        let tmp = TempDir::new().unwrap();
        let box_bin = write_fake_binary(
            &tmp.path()
                .join("nt-box")
                .join("build")
                .join("Release")
                .join("box"),
        );
        let locator = locator(tmp.path());

        assert_eq!(locator.find(Artifact::PackageManager), Some(box_bin));
        assert_eq!(locator.find(Artifact::Interpreter), None);
    }

    #[test]
    fn test_verification_failure_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let bin = write_fake_binary(&tmp.path().join("build").join("neutron"));
        let runner = FakeRunner::new();
        runner.expect(CommandPattern::Contains("--version".into()), MockProcessOutput::timeout());

        let resolved = resolve(
            &locator(tmp.path()),
            &runner,
            &Shell::silent(),
            Artifact::Interpreter,
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(resolved.path, bin);
        assert!(!resolved.verified);
    }

    #[test]
    fn test_box_is_smoke_tested_with_help() {
        let tmp = TempDir::new().unwrap();
        let bin = write_fake_binary(&tmp.path().join("box"));
        let runner = FakeRunner::new();

        assert!(verify(
            &runner,
            &Shell::silent(),
            Artifact::PackageManager,
            &bin,
            Duration::from_secs(1)
        ));
        assert_eq!(runner.count_matching("box --help"), 1);
    }

    #[test]
    fn test_language_server_fallback_build() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        std::fs::create_dir_all(&build).unwrap();
        let lsp = build.join("Release").join("neutron-lsp");

        let runner = FakeRunner::new();
        runner.push(
            CommandExpectation::new(
                CommandPattern::Contains("--target neutron-lsp".into()),
                MockProcessOutput::success(""),
            )
            .creating(&lsp, "#!/bin/sh\n"),
        );

        let found = build_language_server(
            &locator(tmp.path()),
            &runner,
            &Shell::silent(),
            &CMake::new("cmake", BuildEnv::inherit()),
            Profile::Release,
        );
        assert_eq!(found, Some(lsp));
    }

    #[test]
    fn test_language_server_fallback_needs_build_tree() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();

        let found = build_language_server(
            &locator(tmp.path()),
            &runner,
            &Shell::silent(),
            &CMake::new("cmake", BuildEnv::inherit()),
            Profile::Release,
        );
        assert_eq!(found, None);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("Neutron 1.2.3 (build 42)"), Some("1.2.3".to_string()));
        assert_eq!(parse_version("neutron version 0.10.0-dev"), Some("0.10.0".to_string()));
        assert_eq!(parse_version("no version here"), None);
    }

    #[test]
    fn test_detect_version_falls_back_to_unknown() {
        let runner = FakeRunner::new();
        runner.push(
            CommandExpectation::new(
                CommandPattern::Contains("--version".into()),
                MockProcessOutput::success("Neutron v2.0.1\n"),
            )
            .times(1),
        );
        runner.expect(CommandPattern::Any, MockProcessOutput::not_found());

        let path = Path::new("/p/neutron");
        assert_eq!(detect_version(&runner, path, Duration::from_secs(1)), "2.0.1");
        assert_eq!(detect_version(&runner, path, Duration::from_secs(1)), UNKNOWN_VERSION);
    }

    #[test]
    fn test_version_pattern_compiles() {
        assert!(VERSION_RE.is_some());
    }
}
