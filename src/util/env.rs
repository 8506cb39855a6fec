//! Child-process environment for MSVC builds.
//!
//! MinGW and MSYS entries on PATH (or in the compiler search variables)
//! make CMake pick the wrong compiler and headers on Windows. Instead of
//! mutating the orchestrator's own environment, the filtered variables are
//! computed once and applied to each spawned build tool.

use std::env;
use std::path::{Path, PathBuf};

use crate::util::process::ProcessBuilder;

/// Compiler search variables that are filtered alongside PATH.
const SEARCH_VARS: &[&str] = &["INCLUDE", "LIB", "CPATH", "C_INCLUDE_PATH", "CPLUS_INCLUDE_PATH"];

/// Environment overrides applied to build-tool invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
    vars: Vec<(String, String)>,
}

impl BuildEnv {
    /// No overrides; children inherit the parent environment untouched.
    pub fn inherit() -> Self {
        BuildEnv::default()
    }

    /// Filter the current process environment for MSVC.
    ///
    /// `cmake_dir` is kept on PATH even when it lives inside an MSYS tree,
    /// since it may be the only CMake available.
    pub fn msvc_from_process(cmake_dir: Option<&Path>) -> Self {
        Self::msvc(|key| env::var(key).ok(), cmake_dir)
    }

    /// Filter an arbitrary environment (looked up through `get`) for MSVC.
    pub fn msvc(get: impl Fn(&str) -> Option<String>, cmake_dir: Option<&Path>) -> Self {
        let mut vars = Vec::new();

        if let Some(path) = get("PATH") {
            let kept: Vec<PathBuf> = env::split_paths(&path)
                .filter(|p| {
                    if !is_gnu_toolchain_dir(p) {
                        return true;
                    }
                    let keep = cmake_dir.is_some_and(|dir| same_dir(dir, p));
                    if keep {
                        tracing::info!("Keeping CMake at {}", p.display());
                    }
                    keep
                })
                .collect();
            if let Ok(joined) = env::join_paths(kept) {
                vars.push(("PATH".to_string(), joined.to_string_lossy().into_owned()));
            }
        }

        for key in SEARCH_VARS {
            if let Some(value) = get(key) {
                let kept: Vec<PathBuf> = env::split_paths(&value)
                    .filter(|p| !is_gnu_toolchain_dir(p))
                    .collect();
                if let Ok(joined) = env::join_paths(kept) {
                    vars.push((key.to_string(), joined.to_string_lossy().into_owned()));
                }
            }
        }

        BuildEnv { vars }
    }

    /// Overridden variables.
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// Apply the overrides to a command.
    pub fn apply(&self, cmd: ProcessBuilder) -> ProcessBuilder {
        cmd.envs(self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

fn is_gnu_toolchain_dir(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    lower.contains("mingw") || lower.contains("msys")
}

fn same_dir(a: &Path, b: &Path) -> bool {
    let norm = |p: &Path| {
        p.to_string_lossy()
            .replace('\\', "/")
            .trim_end_matches('/')
            .to_lowercase()
    };
    norm(a) == norm(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn joined(parts: &[&str]) -> String {
        env::join_paths(parts).unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn test_filters_mingw_and_msys_entries() {
        let mut vars = HashMap::new();
        vars.insert(
            "PATH",
            joined(&["/opt/msys64/usr/bin", "/usr/bin", "/opt/mingw64/bin", "/opt/cmake/bin"]),
        );
        vars.insert("CPATH", joined(&["/opt/mingw64/include", "/usr/include"]));

        let env = BuildEnv::msvc(|k| vars.get(k).cloned(), None);
        let map: HashMap<_, _> = env.vars().iter().cloned().collect();

        assert_eq!(map["PATH"], joined(&["/usr/bin", "/opt/cmake/bin"]));
        assert_eq!(map["CPATH"], joined(&["/usr/include"]));
        assert!(!map.contains_key("INCLUDE"));
    }

    #[test]
    fn test_keeps_cmake_dir_inside_msys() {
        let mut vars = HashMap::new();
        vars.insert("PATH", joined(&["/opt/msys64/mingw64/bin", "/usr/bin"]));

        let env = BuildEnv::msvc(
            |k| vars.get(k).cloned(),
            Some(Path::new("/opt/msys64/mingw64/bin/")),
        );
        assert_eq!(
            env.vars()[0].1,
            joined(&["/opt/msys64/mingw64/bin", "/usr/bin"])
        );
    }

    #[test]
    fn test_apply_sets_child_env() {
        let env = BuildEnv {
            vars: vec![("PATH".to_string(), "/usr/bin".to_string())],
        };
        let cmd = env.apply(ProcessBuilder::new("cmake"));
        assert_eq!(cmd.get_env("PATH"), Some("/usr/bin"));
        assert!(BuildEnv::inherit().vars().is_empty());
    }
}
