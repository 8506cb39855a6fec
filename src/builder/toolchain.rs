//! External tool location.
//!
//! Every tool the orchestrator drives is resolved through [`ToolLocator`],
//! which tries, in order:
//! 1. An explicit path from `[tools]` in the configuration
//! 2. A PATH search
//! 3. Well-known install locations (IDE-bundled CMake, NSIS, 7-Zip)
//! 4. The bare program name, leaving the real error to the invocation
//!
//! Resolution itself never fails. Results are cached per tool for the
//! lifetime of the locator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::util::config::ToolsConfig;

/// A tool the orchestrator may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Cmake,
    Makensis,
    Vcpkg,
    Npm,
    SevenZip,
    Pwsh,
    Git,
}

impl Tool {
    /// Program name searched for on PATH.
    pub fn program(&self) -> &'static str {
        match self {
            Tool::Cmake => "cmake",
            Tool::Makensis => "makensis",
            Tool::Vcpkg => "vcpkg",
            Tool::Npm => "npm",
            Tool::SevenZip => "7z",
            Tool::Pwsh => "pwsh",
            Tool::Git => "git",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// How a tool was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Configured,
    Path,
    KnownLocation,
    /// Not found anywhere; the bare program name is used.
    Fallback,
}

/// Resolved location of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainLocation {
    pub path: PathBuf,
    pub strategy: SearchStrategy,
}

impl ToolchainLocation {
    /// Whether the tool was actually found rather than guessed.
    pub fn is_found(&self) -> bool {
        self.strategy != SearchStrategy::Fallback
    }
}

/// Known absolute install locations for a tool on this host.
pub fn known_locations(tool: Tool) -> Vec<PathBuf> {
    if cfg!(windows) {
        windows_known_locations(tool, |key| env::var(key).ok())
    } else {
        unix_known_locations(tool)
    }
}

fn windows_known_locations(tool: Tool, get: impl Fn(&str) -> Option<String>) -> Vec<PathBuf> {
    let program_files = get("ProgramFiles").unwrap_or_else(|| r"C:\Program Files".to_string());
    let program_files_x86 =
        get("ProgramFiles(x86)").unwrap_or_else(|| r"C:\Program Files (x86)".to_string());

    match tool {
        Tool::Cmake => {
            const IDE_CMAKE: &str =
                r"Common7\IDE\CommonExtensions\Microsoft\CMake\CMake\bin\cmake.exe";
            [
                (program_files.as_str(), r"Microsoft Visual Studio\18\Community"),
                (program_files.as_str(), r"Microsoft Visual Studio\2022\Community"),
                (program_files.as_str(), r"Microsoft Visual Studio\2022\BuildTools"),
                (program_files_x86.as_str(), r"Microsoft Visual Studio\2019\Community"),
            ]
            .iter()
            .map(|(base, edition)| Path::new(base).join(edition).join(IDE_CMAKE))
            .collect()
        }
        Tool::Makensis => vec![
            Path::new(&program_files_x86).join(r"NSIS\makensis.exe"),
            Path::new(&program_files).join(r"NSIS\makensis.exe"),
        ],
        Tool::SevenZip => vec![Path::new(&program_files).join(r"7-Zip\7z.exe")],
        Tool::Pwsh => vec![Path::new(&program_files).join(r"PowerShell\7\pwsh.exe")],
        Tool::Vcpkg | Tool::Npm | Tool::Git => Vec::new(),
    }
}

fn unix_known_locations(tool: Tool) -> Vec<PathBuf> {
    let prefixes = ["/usr/local/bin", "/opt/homebrew/bin"];
    match tool {
        Tool::Cmake | Tool::Makensis | Tool::SevenZip | Tool::Pwsh => prefixes
            .iter()
            .map(|p| Path::new(p).join(tool.program()))
            .collect(),
        Tool::Vcpkg | Tool::Npm | Tool::Git => Vec::new(),
    }
}

/// Resolves and caches tool locations.
#[derive(Debug)]
pub struct ToolLocator {
    overrides: HashMap<Tool, PathBuf>,
    search_path: Option<OsString>,
    known: Option<HashMap<Tool, Vec<PathBuf>>>,
    cache: RefCell<HashMap<Tool, ToolchainLocation>>,
}

impl ToolLocator {
    /// Locator using configured overrides, the process PATH and the host's
    /// well-known install locations.
    pub fn new(tools: &ToolsConfig) -> Self {
        let mut overrides = HashMap::new();
        let pairs = [
            (Tool::Cmake, &tools.cmake),
            (Tool::Makensis, &tools.makensis),
            (Tool::Vcpkg, &tools.vcpkg),
            (Tool::Npm, &tools.npm),
        ];
        for (tool, path) in pairs {
            if let Some(path) = path {
                overrides.insert(tool, path.clone());
            }
        }

        ToolLocator {
            overrides,
            search_path: None,
            known: None,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Search `path` instead of the process PATH.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// Replace the well-known locations for `tool`.
    pub fn with_known_locations(mut self, tool: Tool, locations: Vec<PathBuf>) -> Self {
        self.known
            .get_or_insert_with(HashMap::new)
            .insert(tool, locations);
        self
    }

    /// Resolve a tool, consulting the cache first.
    pub fn locate(&self, tool: Tool) -> ToolchainLocation {
        if let Some(hit) = self.cache.borrow().get(&tool) {
            return hit.clone();
        }

        let location = self.resolve(tool);
        match location.strategy {
            SearchStrategy::Fallback => {
                tracing::debug!("{} not found; falling back to bare program name", tool)
            }
            strategy => tracing::debug!(
                "found {} at {} ({:?})",
                tool,
                location.path.display(),
                strategy
            ),
        }
        self.cache.borrow_mut().insert(tool, location.clone());
        location
    }

    /// Resolved path for a tool (possibly just its bare name).
    pub fn path(&self, tool: Tool) -> PathBuf {
        self.locate(tool).path
    }

    fn resolve(&self, tool: Tool) -> ToolchainLocation {
        if let Some(path) = self.overrides.get(&tool) {
            if path.exists() {
                return ToolchainLocation {
                    path: path.clone(),
                    strategy: SearchStrategy::Configured,
                };
            }
            tracing::warn!(
                "Configured {} not found: {}",
                tool,
                path.display()
            );
        }

        let on_path = match &self.search_path {
            Some(paths) => {
                let cwd = env::current_dir().unwrap_or_default();
                which::which_in(tool.program(), Some(paths), cwd).ok()
            }
            None => which::which(tool.program()).ok(),
        };
        if let Some(path) = on_path {
            return ToolchainLocation {
                path,
                strategy: SearchStrategy::Path,
            };
        }

        let known = match &self.known {
            Some(map) => map.get(&tool).cloned().unwrap_or_default(),
            None => known_locations(tool),
        };
        if let Some(path) = known.into_iter().find(|p| p.is_file()) {
            return ToolchainLocation {
                path,
                strategy: SearchStrategy::KnownLocation,
            };
        }

        ToolchainLocation {
            path: PathBuf::from(tool.program()),
            strategy: SearchStrategy::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_fake_binary;
    use tempfile::TempDir;

    fn isolated(tools: &ToolsConfig, path_dir: &Path) -> ToolLocator {
        ToolLocator::new(tools)
            .with_search_path(path_dir.as_os_str())
            .with_known_locations(Tool::Cmake, Vec::new())
    }

    #[test]
    fn test_configured_override_wins() {
        let tmp = TempDir::new().unwrap();
        let configured = write_fake_binary(&tmp.path().join("opt").join("cmake"));
        write_fake_binary(&tmp.path().join("bin").join("cmake"));

        let tools = ToolsConfig {
            cmake: Some(configured.clone()),
            ..Default::default()
        };
        let loc = isolated(&tools, &tmp.path().join("bin")).locate(Tool::Cmake);
        assert_eq!(loc.strategy, SearchStrategy::Configured);
        assert_eq!(loc.path, configured);
    }

    #[cfg(unix)]
    #[test]
    fn test_path_search() {
        let tmp = TempDir::new().unwrap();
        let bin = tmp.path().join("bin");
        let cmake = write_fake_binary(&bin.join("cmake"));

        let loc = isolated(&ToolsConfig::default(), &bin).locate(Tool::Cmake);
        assert_eq!(loc.strategy, SearchStrategy::Path);
        assert_eq!(loc.path, cmake);
    }

    #[test]
    fn test_known_location_then_fallback() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        let nsis = write_fake_binary(&tmp.path().join("NSIS").join("makensis.exe"));

        let locator = ToolLocator::new(&ToolsConfig::default())
            .with_search_path(empty.as_os_str())
            .with_known_locations(
                Tool::Makensis,
                vec![tmp.path().join("missing").join("makensis.exe"), nsis.clone()],
            )
            .with_known_locations(Tool::Cmake, Vec::new());

        let loc = locator.locate(Tool::Makensis);
        assert_eq!(loc.strategy, SearchStrategy::KnownLocation);
        assert_eq!(loc.path, nsis);

        let loc = locator.locate(Tool::Cmake);
        assert_eq!(loc.strategy, SearchStrategy::Fallback);
        assert_eq!(loc.path, PathBuf::from("cmake"));
        assert!(!loc.is_found());
    }

    #[test]
    fn test_results_are_cached() {
        let tmp = TempDir::new().unwrap();
        let nsis = write_fake_binary(&tmp.path().join("makensis.exe"));
        let locator = ToolLocator::new(&ToolsConfig::default())
            .with_search_path(tmp.path().join("none").as_os_str())
            .with_known_locations(Tool::Makensis, vec![nsis.clone()]);

        assert_eq!(locator.locate(Tool::Makensis).path, nsis);
        std::fs::remove_file(&nsis).unwrap();
        // Still served from the cache.
        assert_eq!(
            locator.locate(Tool::Makensis).strategy,
            SearchStrategy::KnownLocation
        );
    }

    #[test]
    fn test_windows_cmake_candidates_order() {
        let locations = windows_known_locations(Tool::Cmake, |key| match key {
            "ProgramFiles" => Some("C:/PF".to_string()),
            "ProgramFiles(x86)" => Some("C:/PF86".to_string()),
            _ => None,
        });
        assert_eq!(locations.len(), 4);
        let first = locations[0].to_string_lossy();
        assert!(first.starts_with("C:/PF"));
        assert!(first.contains("18"));
        assert!(locations[3].to_string_lossy().contains("2019"));
        assert!(locations[3].to_string_lossy().starts_with("C:/PF86"));
    }
}
