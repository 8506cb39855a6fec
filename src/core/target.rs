//! Build target definitions - what gets configured and built.
//!
//! A [`BuildTarget`] is created once per invocation from static
//! configuration and stays immutable while its retry loop runs.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::platform::{HostPlatform, OsKind};
use crate::util::process::ProcessBuilder;

/// Build profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Profile {
    Debug,
    #[default]
    Release,
}

impl Profile {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            Profile::Debug
        } else {
            Profile::Release
        }
    }

    /// Value for `CMAKE_BUILD_TYPE` and `--config`.
    pub fn cmake_config(&self) -> &'static str {
        match self {
            Profile::Debug => "Debug",
            Profile::Release => "Release",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cmake_config())
    }
}

/// Arguments and working directory for one build-tool invocation.
///
/// The program itself is resolved late by the toolchain locator, so the
/// template only carries what is known statically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandTemplate {
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandTemplate {
    pub fn new<I, S>(args: I, cwd: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandTemplate {
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.into(),
        }
    }

    /// Instantiate the template for a resolved program.
    pub fn to_process(&self, program: &Path) -> ProcessBuilder {
        ProcessBuilder::new(program)
            .args(&self.args)
            .cwd(&self.cwd)
    }
}

/// Options shared by every target in one invocation.
#[derive(Debug, Clone, Copy)]
pub struct TargetOptions {
    pub host: HostPlatform,
    pub profile: Profile,
    /// Parallelism hint for the native build tool.
    pub jobs: usize,
    /// Link the interpreter and language server statically (Linux only).
    pub static_lsp: bool,
}

/// A native project the orchestrator configures and builds.
#[derive(Debug, Clone, Serialize)]
pub struct BuildTarget {
    /// Display name (`neutron`, `box`).
    pub name: String,
    /// Logical name of the main executable the target produces.
    pub artifact: String,
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub configure: CommandTemplate,
    pub build: CommandTemplate,
    pub toolchain_file: Option<PathBuf>,
    pub profile: Profile,
}

impl BuildTarget {
    /// The interpreter (and language server) at the project root.
    ///
    /// Windows configures through the `winmsvc` preset from the project
    /// root; other hosts run an out-of-source configure inside `build/`.
    pub fn interpreter(root: &Path, opts: &TargetOptions) -> Self {
        let build_dir = root.join("build");

        let configure = if opts.host.os.is_windows() {
            CommandTemplate::new(["--preset", "winmsvc"], root)
        } else {
            let mut args = vec![
                "..".to_string(),
                format!("-DCMAKE_BUILD_TYPE={}", opts.profile),
            ];
            if opts.static_lsp && opts.host.os == OsKind::Linux {
                args.push("-DCMAKE_EXE_LINKER_FLAGS=-static-libgcc -static-libstdc++".to_string());
            }
            CommandTemplate::new(args, &build_dir)
        };

        BuildTarget {
            name: "neutron".to_string(),
            artifact: "neutron".to_string(),
            source_dir: root.to_path_buf(),
            build: build_template(&build_dir, opts),
            build_dir,
            configure,
            toolchain_file: None,
            profile: opts.profile,
        }
    }

    /// The box package manager under `nt-box/`.
    ///
    /// `vcpkg_toolchain` is passed to the configure step on Windows.
    pub fn package_manager(
        root: &Path,
        opts: &TargetOptions,
        vcpkg_toolchain: Option<PathBuf>,
    ) -> Self {
        let source_dir = root.join("nt-box");
        let build_dir = source_dir.join("build");

        let toolchain_file = if opts.host.os.is_windows() {
            vcpkg_toolchain
        } else {
            None
        };

        let mut args = vec!["..".to_string()];
        if let Some(ref toolchain) = toolchain_file {
            args.push(format!("-DCMAKE_TOOLCHAIN_FILE={}", toolchain.display()));
        }
        args.push(format!("-DCMAKE_BUILD_TYPE={}", opts.profile));

        BuildTarget {
            name: "box".to_string(),
            artifact: "box".to_string(),
            configure: CommandTemplate::new(args, &build_dir),
            build: build_template(&build_dir, opts),
            source_dir,
            build_dir,
            toolchain_file,
            profile: opts.profile,
        }
    }

    /// Whether the configure step left build-system state behind.
    pub fn has_configure_state(&self) -> bool {
        self.build_dir.join("CMakeCache.txt").is_file()
    }
}

fn build_template(build_dir: &Path, opts: &TargetOptions) -> CommandTemplate {
    CommandTemplate::new(
        [
            "--build".to_string(),
            ".".to_string(),
            "--config".to_string(),
            opts.profile.cmake_config().to_string(),
            format!("-j{}", opts.jobs.max(1)),
        ],
        build_dir,
    )
}
