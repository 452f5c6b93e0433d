//! Vite build manifest and entry lookup.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// One chunk in the Vite manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Built file, relative to the build output directory.
    pub file: String,
    #[serde(default)]
    pub css: Vec<String>,
    /// Keys of chunks this one imports statically.
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub is_entry: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
}

/// Errors reading a manifest from disk.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Ways of finding a manifest entry for a logical asset name, in the order
/// they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The name is a manifest key.
    DirectKey,
    /// A key ends with, or else contains, the name.
    KeyPath,
    /// An entry chunk is named after the name or its file stem.
    EntryName,
    /// An entry's `src` or `file` contains the name.
    SourceOrFile,
}

impl Strategy {
    pub const ORDER: [Self; 4] = [
        Self::DirectKey,
        Self::KeyPath,
        Self::EntryName,
        Self::SourceOrFile,
    ];

    fn find<'m>(self, manifest: &'m Manifest, name: &str) -> Option<(&'m str, &'m ManifestEntry)> {
        let entries = || manifest.entries.iter().map(|(k, v)| (k.as_str(), v));
        match self {
            Self::DirectKey => manifest.entries.get_key_value(name).map(|(k, v)| (k.as_str(), v)),
            Self::KeyPath => entries()
                .find(|(key, _)| key.ends_with(name))
                .or_else(|| entries().find(|(key, _)| key.contains(name))),
            Self::EntryName => {
                let stem = file_stem(name);
                entries().find(|(_, entry)| {
                    entry.is_entry
                        && entry
                            .name
                            .as_deref()
                            .is_some_and(|n| n == name || n == stem)
                })
            }
            Self::SourceOrFile => entries().find(|(_, entry)| {
                entry.src.as_deref().is_some_and(|src| src.contains(name))
                    || entry.file.contains(name)
            }),
        }
    }
}

/// A parsed Vite manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Read and parse a manifest file.
    ///
    /// # Errors
    ///
    /// Returns `ManifestError` if the file is unreadable or not a manifest.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ManifestError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Parse manifest JSON.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed input.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    /// Find the entry for a logical asset name, trying each [`Strategy`] in
    /// order. Returns the matching key too.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<(&str, &ManifestEntry)> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Strategy::ORDER
            .iter()
            .find_map(|strategy| strategy.find(self, name))
    }

    /// Keys of every chunk reachable through `imports` from `key`, depth
    /// first, each once.
    #[must_use]
    pub fn transitive_imports(&self, key: &str) -> Vec<&str> {
        let mut seen = Vec::new();
        let mut stack: Vec<&str> = self
            .entries
            .get(key)
            .map(|e| e.imports.iter().rev().map(String::as_str).collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if next == key || seen.contains(&next) {
                continue;
            }
            seen.push(next);
            if let Some(entry) = self.entries.get(next) {
                stack.extend(entry.imports.iter().rev().map(String::as_str));
            }
        }
        seen
    }
}

fn file_stem(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.split_once('.').map_or(base, |(stem, _)| stem)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "src/main.js": {
            "file": "assets/main-4f2a.js",
            "src": "src/main.js",
            "name": "main",
            "isEntry": true,
            "css": ["assets/main-88c1.css"],
            "imports": ["_vendor-19ab.js"]
        },
        "_vendor-19ab.js": {
            "file": "assets/vendor-19ab.js",
            "css": ["assets/vendor-77de.css"],
            "imports": ["_shared-0c0c.js"]
        },
        "_shared-0c0c.js": {
            "file": "assets/shared-0c0c.js",
            "imports": ["_vendor-19ab.js"]
        },
        "src/checkout/index.ts": {
            "file": "assets/checkout-e3e3.js",
            "src": "src/checkout/index.ts",
            "name": "checkout",
            "isEntry": true
        },
        "src/styles/site.css": {
            "file": "assets/site-1a1a.css",
            "src": "src/styles/site.css",
            "isEntry": true
        }
    }"#;

    fn manifest() -> Manifest {
        Manifest::parse(MANIFEST).unwrap()
    }

    #[test]
    fn test_direct_key_wins() {
        let manifest = manifest();
        let (key, entry) = manifest.resolve("src/main.js").unwrap();
        assert_eq!(key, "src/main.js");
        assert_eq!(entry.file, "assets/main-4f2a.js");
    }

    #[test]
    fn test_key_path_match() {
        let manifest = manifest();
        let (key, _) = manifest.resolve("checkout/index.ts").unwrap();
        assert_eq!(key, "src/checkout/index.ts");
        let (key, _) = manifest.resolve("site.css").unwrap();
        assert_eq!(key, "src/styles/site.css");
    }

    #[test]
    fn test_entry_name_match() {
        let manifest = manifest();
        let (key, _) = manifest.resolve("checkout").unwrap();
        assert_eq!(key, "src/checkout/index.ts");
        let (key, _) = manifest.resolve("checkout.js").unwrap();
        assert_eq!(key, "src/checkout/index.ts");
    }

    #[test]
    fn test_file_match() {
        let manifest = manifest();
        let (key, _) = manifest.resolve("checkout-e3e3").unwrap();
        assert_eq!(key, "src/checkout/index.ts");
    }

    #[test]
    fn test_unknown_name_resolves_nothing() {
        let manifest = manifest();
        assert!(manifest.resolve("admin.js").is_none());
        assert!(manifest.resolve("  ").is_none());
        assert!(Manifest::default().resolve("main.js").is_none());
    }

    #[test]
    fn test_transitive_imports_handle_cycles() {
        let manifest = manifest();
        assert_eq!(
            manifest.transitive_imports("src/main.js"),
            vec!["_vendor-19ab.js", "_shared-0c0c.js"]
        );
        assert!(manifest.transitive_imports("missing").is_empty());
    }

    #[test]
    fn test_load_reports_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("manifest.json");
        assert!(matches!(Manifest::load(&missing), Err(ManifestError::Read { .. })));

        std::fs::write(&missing, "{ not json").unwrap();
        assert!(matches!(Manifest::load(&missing), Err(ManifestError::Parse { .. })));

        std::fs::write(&missing, MANIFEST).unwrap();
        assert_eq!(Manifest::load(&missing).unwrap().len(), 5);
    }
}
