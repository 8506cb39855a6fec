//! CMake invocations for the Neutron build targets.

use std::path::{Path, PathBuf};

use crate::core::target::{BuildTarget, Profile};
use crate::util::env::BuildEnv;
use crate::util::process::ProcessBuilder;

/// CMake driver bound to one resolved executable and child environment.
#[derive(Debug, Clone)]
pub struct CMake {
    program: PathBuf,
    env: BuildEnv,
}

impl CMake {
    pub fn new(program: impl Into<PathBuf>, env: BuildEnv) -> Self {
        CMake {
            program: program.into(),
            env,
        }
    }

    /// Configure step for a target.
    pub fn configure(&self, target: &BuildTarget) -> ProcessBuilder {
        self.env.apply(target.configure.to_process(&self.program))
    }

    /// Build step for a target.
    pub fn build(&self, target: &BuildTarget) -> ProcessBuilder {
        self.env.apply(target.build.to_process(&self.program))
    }

    /// Build a single named CMake target inside an existing build tree.
    pub fn build_named_target(&self, build_dir: &Path, name: &str, profile: Profile) -> ProcessBuilder {
        self.env.apply(
            ProcessBuilder::new(&self.program)
                .arg("--build")
                .arg(build_dir)
                .args(["--target", name, "--config", profile.cmake_config()]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{ArchKind, HostPlatform, OsKind};
    use crate::core::target::TargetOptions;

    #[test]
    fn test_configure_and_build_commands() {
        let opts = TargetOptions {
            host: HostPlatform {
                os: OsKind::Linux,
                arch: ArchKind::X64,
            },
            profile: Profile::Release,
            jobs: 4,
            static_lsp: false,
        };
        let target = BuildTarget::interpreter(Path::new("/p"), &opts);
        let cmake = CMake::new("/usr/bin/cmake", BuildEnv::inherit());

        let configure = cmake.configure(&target);
        assert_eq!(
            configure.display_command(),
            "/usr/bin/cmake .. -DCMAKE_BUILD_TYPE=Release"
        );
        assert_eq!(configure.get_cwd(), Some(Path::new("/p/build")));

        let build = cmake.build(&target);
        assert_eq!(
            build.display_command(),
            "/usr/bin/cmake --build . --config Release -j4"
        );
    }

    #[test]
    fn test_named_target_command() {
        let cmake = CMake::new("cmake", BuildEnv::inherit());
        let cmd = cmake.build_named_target(Path::new("build"), "neutron-lsp", Profile::Debug);
        assert_eq!(
            cmd.display_command(),
            "cmake --build build --target neutron-lsp --config Debug"
        );
    }
}
