//! Package manifest - what goes into the distributable directory.

use std::path::PathBuf;

use serde::Serialize;

use crate::core::platform::OsKind;

/// Inclusion predicate for a manifest item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    OnlyOn(OsKind),
    NotOn(OsKind),
}

impl Condition {
    pub fn holds(&self, os: OsKind) -> bool {
        match self {
            Condition::Always => true,
            Condition::OnlyOn(only) => *only == os,
            Condition::NotOn(not) => *not != os,
        }
    }
}

/// What kind of thing an item copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A resolved executable; made 0755 on Unix.
    Binary,
    /// Files directly inside `source` matching any pattern, copied flat.
    LibraryGlob { patterns: Vec<String> },
    /// A directory tree, minus entries matching `exclude`.
    Directory { exclude: Vec<String> },
    /// A single file.
    File { executable: bool },
    /// An empty directory created in the package.
    EmptyDir,
}

/// One entry of a [`PackageManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestItem {
    pub kind: ItemKind,
    /// Source path (a directory for globs, unused for empty directories).
    pub source: PathBuf,
    /// Destination, relative to the package root.
    pub destination: PathBuf,
    pub condition: Condition,
    /// Missing optional items only produce a warning.
    pub optional: bool,
}

impl ManifestItem {
    pub fn binary(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        ManifestItem {
            kind: ItemKind::Binary,
            source: source.into(),
            destination: destination.into(),
            condition: Condition::Always,
            optional: false,
        }
    }

    pub fn libraries(source: impl Into<PathBuf>, patterns: &[&str]) -> Self {
        ManifestItem {
            kind: ItemKind::LibraryGlob {
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
            },
            source: source.into(),
            destination: PathBuf::new(),
            condition: Condition::Always,
            optional: true,
        }
    }

    pub fn directory(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        exclude: &[&str],
    ) -> Self {
        ManifestItem {
            kind: ItemKind::Directory {
                exclude: exclude.iter().map(|p| p.to_string()).collect(),
            },
            source: source.into(),
            destination: destination.into(),
            condition: Condition::Always,
            optional: true,
        }
    }

    pub fn file(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        ManifestItem {
            kind: ItemKind::File { executable: false },
            source: source.into(),
            destination: destination.into(),
            condition: Condition::Always,
            optional: true,
        }
    }

    pub fn empty_dir(destination: impl Into<PathBuf>) -> Self {
        ManifestItem {
            kind: ItemKind::EmptyDir,
            source: PathBuf::new(),
            destination: destination.into(),
            condition: Condition::Always,
            optional: false,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn executable(mut self) -> Self {
        if let ItemKind::File { ref mut executable } = self.kind {
            *executable = true;
        }
        self
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }
}

/// Ordered list of everything copied into the package.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageManifest {
    pub items: Vec<ManifestItem>,
}

impl PackageManifest {
    pub fn new() -> Self {
        PackageManifest::default()
    }

    pub fn push(&mut self, item: ManifestItem) {
        self.items.push(item);
    }

    /// Items whose condition holds on `os`, in manifest order.
    pub fn applicable(&self, os: OsKind) -> impl Iterator<Item = &ManifestItem> {
        self.items.iter().filter(move |item| item.condition.holds(os))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions() {
        assert!(Condition::Always.holds(OsKind::Linux));
        assert!(Condition::OnlyOn(OsKind::Windows).holds(OsKind::Windows));
        assert!(!Condition::OnlyOn(OsKind::Windows).holds(OsKind::MacOs));
        assert!(Condition::NotOn(OsKind::Windows).holds(OsKind::Linux));
        assert!(!Condition::NotOn(OsKind::Windows).holds(OsKind::Windows));
    }

    #[test]
    fn test_applicable_filters_by_os() {
        let mut manifest = PackageManifest::new();
        manifest.push(ManifestItem::file("README.md", "README.md"));
        manifest.push(
            ManifestItem::file("scripts/install.sh", "install.sh")
                .executable()
                .when(Condition::NotOn(OsKind::Windows)),
        );

        assert_eq!(manifest.applicable(OsKind::Windows).count(), 1);
        let linux: Vec<_> = manifest.applicable(OsKind::Linux).collect();
        assert_eq!(linux.len(), 2);
        assert_eq!(linux[1].kind, ItemKind::File { executable: true });
    }
}
