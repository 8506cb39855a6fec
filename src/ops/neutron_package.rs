//! Implementation of `neutron-pack package`.
//!
//! The pipeline runs strictly in sequence:
//!
//! 1. Classify the host
//! 2. Windows only (unless vcpkg is skipped): preflight, vcpkg bootstrap
//!    and manifest install
//! 3. Build the interpreter, then box, each through the retry state machine
//! 4. Locate and smoke-test the binaries (building the language server on
//!    its own if it is missing)
//! 5. Assemble the package directory, the editor extension and, on request,
//!    the Windows installer
//!
//! Per-target outcomes are collected into a [`PackageReport`]; nothing is
//! tracked through global state.

use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::builder::cmake::CMake;
use crate::builder::machine::RetryPolicy;
use crate::builder::orchestrator::{Orchestrator, TargetReport};
use crate::builder::toolchain::{Tool, ToolLocator};
use crate::core::platform::HostPlatform;
use crate::core::target::{BuildTarget, Profile, TargetOptions};
use crate::ops::assemble::{assemble, build_manifest, AssemblyReport};
use crate::ops::doctor::{format_report, preflight, HostFacts};
use crate::ops::extension::build_extension;
use crate::ops::installer::{build_installer, stage_inputs, InstallerInputs};
use crate::ops::locate::{
    build_language_server, detect_version, resolve, verify, Artifact, ArtifactLocator,
    ResolvedBinary, UNKNOWN_VERSION,
};
use crate::recovery::RecoveryEngine;
use crate::util::config::Config;
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::env::BuildEnv;
use crate::util::process::{cpu_count, CommandRunner};
use crate::util::shell::{Shell, Status};
use crate::util::vcpkg::{self, VcpkgLayout};
use crate::util::GlobalContext;

/// Options for the package command.
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    /// Package directory (relative paths resolve against the project root)
    pub output: Option<PathBuf>,

    /// Also build the Windows installer
    pub installer: bool,

    /// Skip preflight and vcpkg bootstrap
    pub skip_vcpkg: bool,

    pub profile: Profile,

    /// Link the interpreter and language server statically (Linux)
    pub static_lsp: bool,

    /// Override `[build] max_attempts`
    pub max_attempts: Option<u32>,

    /// Override `[build] jobs`
    pub jobs: Option<usize>,
}

/// Result of a packaging run.
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub host: HostPlatform,
    pub targets: Vec<TargetReport>,
    pub binaries: Vec<ResolvedBinary>,
    pub version: String,
    pub package: AssemblyReport,
    pub extension: Vec<PathBuf>,
    pub installer: Option<PathBuf>,
}

impl PackageReport {
    /// Whether any target finished in degraded mode.
    pub fn is_degraded(&self) -> bool {
        self.targets.iter().any(|t| !t.outcome.is_success())
    }
}

/// Build and package Neutron for the running host.
pub fn package(
    ctx: &GlobalContext,
    config: &Config,
    shell: &Shell,
    runner: &dyn CommandRunner,
    opts: &PackageOptions,
) -> Result<PackageReport> {
    let host = HostPlatform::detect()?;
    package_for_host(ctx, config, shell, runner, host, opts)
}

/// Build and package Neutron, treating `host` as the running platform.
pub fn package_for_host(
    ctx: &GlobalContext,
    config: &Config,
    shell: &Shell,
    runner: &dyn CommandRunner,
    host: HostPlatform,
    opts: &PackageOptions,
) -> Result<PackageReport> {
    let root = ctx.root();
    shell.note(format!("packaging for {}-{}", host.os, host.arch));

    let tools = ToolLocator::new(&config.tools);
    let skip_vcpkg = opts.skip_vcpkg || config.vcpkg.skip;
    let layout = VcpkgLayout::new(ctx.vcpkg_dir(), &config.vcpkg, &host);
    let use_vcpkg = host.os.is_windows() && !skip_vcpkg;

    if use_vcpkg {
        run_preflight(shell, runner, &tools, config)?;
        acquire_dependencies(ctx, shell, runner, &tools, &layout);
    } else if host.os.is_windows() {
        shell.status(Status::Skipped, "vcpkg bootstrap and preflight");
    }

    // Builds
    let cmake_path = tools.path(Tool::Cmake);
    let env = if host.os.is_windows() {
        BuildEnv::msvc_from_process(cmake_path.parent())
    } else {
        BuildEnv::inherit()
    };
    let cmake = CMake::new(&cmake_path, env);

    let target_opts = TargetOptions {
        host,
        profile: opts.profile,
        jobs: opts.jobs.or(config.build.jobs).unwrap_or_else(cpu_count).max(1),
        static_lsp: opts.static_lsp || config.build.static_lsp,
    };
    let policy = RetryPolicy {
        max_attempts: opts
            .max_attempts
            .map(|n| n.max(1))
            .unwrap_or_else(|| config.max_attempts()),
        delay: config.retry_delay(),
    };
    let toolchain = use_vcpkg.then(|| layout.toolchain_file());
    let targets = [
        (
            BuildTarget::interpreter(root, &target_opts),
            Artifact::Interpreter,
        ),
        (
            BuildTarget::package_manager(root, &target_opts, toolchain),
            Artifact::PackageManager,
        ),
    ];

    let locator = ArtifactLocator::new(host, root, ctx.build_dir(), ctx.box_build_dir());
    let engine = RecoveryEngine::new(root, layout.downloads_dir());
    let orchestrator = Orchestrator::new(runner, shell, cmake, engine, policy);

    let mut target_reports = Vec::new();
    for (target, artifact) in &targets {
        let prior_artifact = locator.find(*artifact).is_some();
        let report = orchestrator.run_target(target, prior_artifact);
        shell.json_event(&serde_json::json!({
            "reason": "target-finished",
            "target": report.name,
            "outcome": report.outcome,
            "attempts": report.attempts.len(),
            "recovery_actions": report.recovery_actions,
        }));
        target_reports.push(report);
    }

    let fatal: Vec<&TargetReport> = target_reports
        .iter()
        .filter(|r| r.outcome.is_fatal())
        .collect();
    if !fatal.is_empty() {
        let names: Vec<&str> = fatal.iter().map(|r| r.name.as_str()).collect();
        let diagnostic = Diagnostic::error(format!("build failed for {}", names.join(", ")))
            .with_context("configure never succeeded and no usable binaries exist")
            .with_suggestion(suggestions::BUILD_FAILED);
        shell.block(&diagnostic.format(shell.use_color()));
        bail!("build failed for {}", names.join(", "));
    }

    let settle = config.settle_delay();
    if !settle.is_zero() {
        tracing::debug!("waiting {:?} for build outputs to settle", settle);
        thread::sleep(settle);
    }

    // Artifacts
    let timeout = config.verify_timeout();
    let interpreter = resolve(&locator, runner, shell, Artifact::Interpreter, timeout);
    let package_manager = resolve(&locator, runner, shell, Artifact::PackageManager, timeout);
    let language_server = resolve(&locator, runner, shell, Artifact::LanguageServer, timeout)
        .or_else(|| {
            let path = build_language_server(
                &locator,
                runner,
                shell,
                orchestrator.cmake(),
                opts.profile,
            )?;
            let verified = verify(runner, shell, Artifact::LanguageServer, &path, timeout);
            Some(ResolvedBinary {
                artifact: Artifact::LanguageServer,
                path,
                verified,
            })
        });

    if interpreter.is_none() && package_manager.is_none() {
        bail!(
            "no binaries found: neither {} nor {} was produced",
            locator.exe_name(Artifact::Interpreter),
            locator.exe_name(Artifact::PackageManager)
        );
    }
    for (binary, artifact) in [
        (&interpreter, Artifact::Interpreter),
        (&package_manager, Artifact::PackageManager),
        (&language_server, Artifact::LanguageServer),
    ] {
        if binary.is_none() {
            shell.warn(format!(
                "{} executable not found; the package will not include it",
                artifact.name()
            ));
        }
    }
    let binaries: Vec<ResolvedBinary> = [interpreter, package_manager, language_server]
        .into_iter()
        .flatten()
        .collect();

    // Package
    let output = package_dir(ctx, config, &host, opts.output.as_deref());
    let binary_refs: Vec<&ResolvedBinary> = binaries.iter().collect();
    let manifest = build_manifest(
        &host,
        root,
        &ctx.build_dir(),
        &binary_refs,
        &config.assets(),
    );
    let assembly = assemble(shell, &host, &manifest, &output)?;

    let npm = tools.locate(Tool::Npm);
    let extension = build_extension(
        runner,
        shell,
        npm.is_found().then_some(npm.path.as_path()),
        root,
        &output,
    );

    let version = match binaries.iter().find(|b| b.artifact == Artifact::Interpreter) {
        Some(neutron) => detect_version(runner, &neutron.path, timeout),
        None => {
            shell.warn("neutron executable not available; package version is 'unknown'");
            UNKNOWN_VERSION.to_string()
        }
    };
    shell.note(format!("version {}", version));

    let installer = if opts.installer {
        if host.os.is_windows() {
            Some(make_installer(ctx, shell, runner, &tools, &layout, &binaries, &version)?)
        } else {
            shell.warn("the installer can only be built on Windows; skipping");
            None
        }
    } else {
        None
    };

    let report = PackageReport {
        host,
        targets: target_reports,
        binaries,
        version,
        package: assembly,
        extension,
        installer,
    };
    shell.json_event(&serde_json::json!({
        "reason": "package-finished",
        "package": report.package.output,
        "version": report.version,
        "degraded": report.is_degraded(),
        "binaries": report.binaries,
        "installer": report.installer,
    }));
    Ok(report)
}

fn run_preflight(
    shell: &Shell,
    runner: &dyn CommandRunner,
    tools: &ToolLocator,
    config: &Config,
) -> Result<()> {
    shell.status(Status::Running, "Windows preflight checks");
    let report = preflight(runner, tools, &HostFacts::system(), config.verify_timeout());

    if report.failed_count() > 0 {
        shell.block(&format_report("Preflight", &report, shell.is_verbose()));
    }
    if report.all_required_passed() {
        return Ok(());
    }

    let mut diagnostic = Diagnostic::error("Windows preflight checks failed")
        .with_context("vcpkg downloads and runs PowerShell 7 while installing dependencies");
    for hint in &report.hints {
        diagnostic = diagnostic.with_suggestion(hint);
    }
    shell.block(&diagnostic.format(shell.use_color()));
    bail!("preflight checks failed; re-run with --skip-vcpkg to proceed anyway")
}

/// Bootstrap vcpkg and install the manifest dependencies. Best-effort:
/// failures surface later as configure failures the state machine handles.
fn acquire_dependencies(
    ctx: &GlobalContext,
    shell: &Shell,
    runner: &dyn CommandRunner,
    tools: &ToolLocator,
    layout: &VcpkgLayout,
) {
    shell.status(Status::Running, "vcpkg bootstrap");
    if !vcpkg::ensure_checkout(runner, ctx.root(), layout) {
        shell.warn("vcpkg is unavailable; continuing without it");
        return;
    }

    if !ctx.dependency_manifest().is_file() {
        tracing::debug!("no vcpkg.json; skipping manifest install");
        return;
    }

    let configured = tools.locate(Tool::Vcpkg);
    let vcpkg_exe = if configured.is_found() {
        configured.path
    } else {
        layout.vcpkg_binary()
    };
    shell.status(
        Status::Running,
        format!("vcpkg install --triplet {}", layout.triplet),
    );
    match vcpkg::install_manifest(runner, ctx.root(), &vcpkg_exe, layout) {
        Ok(true) => {}
        Ok(false) => shell.warn("vcpkg install failed; continuing"),
        Err(e) => shell.warn(format!("vcpkg install failed: {:#}", e)),
    }
}

fn make_installer(
    ctx: &GlobalContext,
    shell: &Shell,
    runner: &dyn CommandRunner,
    tools: &ToolLocator,
    layout: &VcpkgLayout,
    binaries: &[ResolvedBinary],
    version: &str,
) -> Result<PathBuf> {
    let makensis = tools.locate(Tool::Makensis);
    if !makensis.is_found() {
        let diagnostic = Diagnostic::error("makensis not found")
            .with_context("the installer is built with NSIS")
            .with_suggestion(suggestions::INSTALL_NSIS)
            .with_suggestion(suggestions::RERUN_PACKAGE);
        shell.block(&diagnostic.format(shell.use_color()));
        bail!("makensis not found in PATH or common locations");
    }

    let build_dir = ctx.build_dir();
    let inputs = InstallerInputs {
        binaries: binaries.iter().map(|b| b.path.clone()).collect(),
        vcpkg_bin_dirs: vec![
            layout.installed_bin_dir(),
            build_dir
                .join("vcpkg_installed")
                .join(&layout.triplet)
                .join("bin"),
        ],
        build_dir,
    };

    shell.status(Status::Packaging, "Windows installer");
    stage_inputs(shell, ctx.root(), &inputs).context("failed to stage installer inputs")?;
    build_installer(runner, shell, &makensis.path, ctx.root(), version)
}

/// Resolve the package directory a run would produce, without building.
pub fn package_dir(
    ctx: &GlobalContext,
    config: &Config,
    host: &HostPlatform,
    output: Option<&Path>,
) -> PathBuf {
    match output {
        Some(out) if out.is_absolute() => out.to_path_buf(),
        Some(out) => ctx.root().join(out),
        None => ctx.root().join(host.package_dir_name(config.product())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::machine::BuildOutcome;
    use crate::core::platform::{ArchKind, OsKind};
    use crate::test_support::{
        write_fake_binary, write_file, CommandExpectation, CommandPattern, FakeRunner,
        MockProcessOutput, ProjectFixture,
    };
    use tempfile::TempDir;

    fn linux() -> HostPlatform {
        HostPlatform {
            os: OsKind::Linux,
            arch: ArchKind::X64,
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.build.retry_delay_ms = Some(0);
        config.build.settle_delay_ms = Some(0);
        config.build.jobs = Some(2);
        config
    }

    fn project() -> (TempDir, GlobalContext) {
        let tmp = TempDir::new().unwrap();
        ProjectFixture::neutron().write_to(tmp.path()).unwrap();
        let ctx = GlobalContext::with_root(tmp.path().to_path_buf());
        (tmp, ctx)
    }

    #[test]
    fn test_missing_interpreter_packages_box() {
        let (tmp, ctx) = project();
        write_fake_binary(&tmp.path().join("nt-box").join("build").join("box"));
        let runner = FakeRunner::new();

        let report = package_for_host(
            &ctx,
            &fast_config(),
            &Shell::silent(),
            &runner,
            linux(),
            &PackageOptions::default(),
        )
        .unwrap();

        let out = tmp.path().join("neutron-linux-x64");
        assert_eq!(report.package.output, out);
        assert!(out.join("box").is_file());
        assert!(!out.join("neutron").exists());
        assert_eq!(report.version, UNKNOWN_VERSION);
        assert_eq!(report.binaries.len(), 1);
        assert_eq!(report.binaries[0].artifact, Artifact::PackageManager);
        assert_eq!(report.targets.len(), 2);
        // The language server fallback build was attempted once.
        assert_eq!(runner.count_matching("--target neutron-lsp"), 1);
    }

    #[test]
    fn test_full_package_with_version() {
        let (tmp, ctx) = project();
        let build = tmp.path().join("build");
        let runner = FakeRunner::new();
        runner.push(
            CommandExpectation::new(
                CommandPattern::Contains("--build .".into()),
                MockProcessOutput::success(""),
            )
            .times(1)
            .creating(build.join("neutron"), "#!/bin/sh\n")
            .creating(build.join("neutron-lsp"), "#!/bin/sh\n")
            .creating(build.join("libneutron_runtime.a"), "lib"),
        );
        runner.push(
            CommandExpectation::new(
                CommandPattern::Contains("--build .".into()),
                MockProcessOutput::success(""),
            )
            .creating(tmp.path().join("nt-box").join("build").join("box"), "#!/bin/sh\n"),
        );
        runner.expect(
            CommandPattern::Contains("neutron --version".into()),
            MockProcessOutput::success("Neutron 1.4.2\n"),
        );

        let opts = PackageOptions {
            output: Some(PathBuf::from("dist")),
            ..Default::default()
        };
        let report =
            package_for_host(&ctx, &fast_config(), &Shell::silent(), &runner, linux(), &opts)
                .unwrap();

        let out = tmp.path().join("dist");
        assert!(out.join("neutron").is_file());
        assert!(out.join("neutron-lsp").is_file());
        assert!(out.join("box").is_file());
        assert!(out.join("libneutron_runtime.a").is_file());
        assert!(out.join("lib").is_dir());
        assert_eq!(report.version, "1.4.2");
        assert!(!report.is_degraded());
        assert!(report
            .targets
            .iter()
            .all(|t| t.outcome == BuildOutcome::Success));
        assert_eq!(runner.count_matching("--target neutron-lsp"), 0);
    }

    #[test]
    fn test_fatal_target_fails_before_packaging() {
        let (tmp, ctx) = project();
        let runner = FakeRunner::new();
        runner.expect(
            CommandPattern::Contains("-DCMAKE_BUILD_TYPE".into()),
            MockProcessOutput::failure(1, "configure error"),
        );

        let err = package_for_host(
            &ctx,
            &fast_config(),
            &Shell::silent(),
            &runner,
            linux(),
            &PackageOptions::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("build failed"));
        // Both targets ran to completion before the failure was reported.
        assert_eq!(runner.count_matching("-DCMAKE_BUILD_TYPE"), 6);
        assert!(!tmp.path().join("neutron-linux-x64").exists());
    }

    #[test]
    fn test_prior_binary_keeps_target_degraded() {
        let (tmp, ctx) = project();
        write_fake_binary(&tmp.path().join("build").join("Release").join("neutron"));
        write_fake_binary(&tmp.path().join("nt-box").join("build").join("box"));
        let runner = FakeRunner::new();
        runner.expect(
            CommandPattern::Contains("-DCMAKE_BUILD_TYPE".into()),
            MockProcessOutput::failure(1, ""),
        );

        let mut config = fast_config();
        config.build.max_attempts = Some(2);
        let report = package_for_host(
            &ctx,
            &config,
            &Shell::silent(),
            &runner,
            linux(),
            &PackageOptions::default(),
        )
        .unwrap();

        assert!(report.is_degraded());
        assert!(report
            .targets
            .iter()
            .all(|t| matches!(t.outcome, BuildOutcome::Degraded(_))));
        assert_eq!(runner.count_matching("-DCMAKE_BUILD_TYPE"), 4);
        assert!(tmp.path().join("neutron-linux-x64").join("neutron").is_file());
    }

    #[test]
    fn test_no_binaries_is_an_error() {
        let (_tmp, ctx) = project();
        let runner = FakeRunner::new();

        let err = package_for_host(
            &ctx,
            &fast_config(),
            &Shell::silent(),
            &runner,
            linux(),
            &PackageOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no binaries found"));
    }

    #[test]
    fn test_installer_skipped_off_windows() {
        let (tmp, ctx) = project();
        write_fake_binary(&tmp.path().join("nt-box").join("build").join("box"));
        write_file(&tmp.path().join("installer.nsi"), "Name \"Neutron\"\n");
        let runner = FakeRunner::new();

        let opts = PackageOptions {
            installer: true,
            ..Default::default()
        };
        let report =
            package_for_host(&ctx, &fast_config(), &Shell::silent(), &runner, linux(), &opts)
                .unwrap();
        assert!(report.installer.is_none());
        assert_eq!(runner.count_matching("makensis"), 0);
    }

    #[test]
    fn test_package_dir_resolution() {
        let ctx = GlobalContext::with_root(PathBuf::from("/work/neutron"));
        let config = Config::default();
        let host = HostPlatform {
            os: OsKind::MacOs,
            arch: ArchKind::Intel,
        };
        assert_eq!(
            package_dir(&ctx, &config, &host, None),
            PathBuf::from("/work/neutron/neutron-macos-intel")
        );
        assert_eq!(
            package_dir(&ctx, &config, &host, Some(Path::new("out"))),
            PathBuf::from("/work/neutron/out")
        );
    }
}
