//! Registry of well-known archives.

use std::collections::HashMap;

use crate::archive::ArchiveSource;

/// A public archive that can be added by name.
#[derive(Debug, Clone)]
pub struct KnownArchive {
    pub name: String,
    pub description: String,
    pub location: String,
}

impl KnownArchive {
    pub fn source(&self) -> ArchiveSource {
        ArchiveSource::new(&self.name, &self.location)
    }
}

/// Catalog of archives that can be configured without typing a URL.
#[derive(Debug, Clone, Default)]
pub struct ArchiveRegistry {
    entries: HashMap<String, KnownArchive>,
}

/// Archives enabled in a fresh configuration, in priority order.
pub const DEFAULT_ARCHIVES: &[&str] = &["gnu", "nongnu"];

impl ArchiveRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry populated with the public archives.
    pub fn with_known() -> Self {
        let mut registry = Self::new();
        for (name, description, location) in [
            ("gnu", "GNU ELPA", "https://elpa.gnu.org/packages/"),
            ("nongnu", "NonGNU ELPA", "https://elpa.nongnu.org/nongnu/"),
            ("melpa", "MELPA, built from upstream sources", "https://melpa.org/packages/"),
            (
                "melpa-stable",
                "MELPA Stable, built from tagged releases",
                "https://stable.melpa.org/packages/",
            ),
        ] {
            registry.register(KnownArchive {
                name: name.to_string(),
                description: description.to_string(),
                location: location.to_string(),
            });
        }
        registry
    }

    pub fn register(&mut self, entry: KnownArchive) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&KnownArchive> {
        self.entries.get(name)
    }

    /// List all known archive names (sorted).
    pub fn known_archives(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sources for [`DEFAULT_ARCHIVES`] that this registry knows.
    pub fn default_sources(&self) -> Vec<ArchiveSource> {
        DEFAULT_ARCHIVES
            .iter()
            .filter_map(|name| self.get(name))
            .map(KnownArchive::source)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
