//! Which available packages can run on this host.
//!
//! A package is compatible when every requirement on a built-in package
//! (the host included) is met by the built-in version. In
//! [`CompatMode::Deep`] every other requirement must also be met by some
//! compatible available version, transitively.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::descriptor::{PackageDescriptor, Requirement};
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatMode {
    #[default]
    Shallow,
    Deep,
}

/// Name to highest compatible version, plus the set of incompatible entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityIndex {
    highest: BTreeMap<String, Version>,
    incompatible: BTreeSet<(String, Version)>,
}

type Index = BTreeMap<String, Vec<PackageDescriptor>>;
type Key = (String, Version);

fn key(desc: &PackageDescriptor) -> Key {
    (desc.name().to_string(), desc.version().clone())
}

/// `Some(met)` when `req` names a built-in package, `None` otherwise.
fn builtin_meets(builtin: &Index, req: &Requirement) -> Option<bool> {
    builtin
        .get(&req.name)
        .map(|versions| versions.iter().any(|b| b.version() >= &req.min_version))
}

/// Whether every requirement not on a built-in package has a candidate in `compatible`.
fn requirements_available(
    desc: &PackageDescriptor,
    available: &Index,
    builtin: &Index,
    compatible: &BTreeSet<Key>,
) -> bool {
    desc.requirements()
        .iter()
        .filter(|req| !builtin.contains_key(&req.name))
        .all(|req| {
            available.get(&req.name).is_some_and(|candidates| {
                candidates
                    .iter()
                    .any(|c| c.version() >= &req.min_version && compatible.contains(&key(c)))
            })
        })
}

impl CompatibilityIndex {
    /// Evaluate every available descriptor against the built-in table.
    ///
    /// Deep mode starts from every entry whose built-in requirements hold
    /// and drops entries with an unmet requirement until nothing changes,
    /// so a dependency cycle stays compatible only if nothing in it fails.
    pub fn build(available: &Index, builtin: &Index, mode: CompatMode) -> Self {
        let all = || available.values().flatten();
        let mut compatible: BTreeSet<Key> = all()
            .filter(|desc| {
                desc.requirements()
                    .iter()
                    .all(|req| builtin_meets(builtin, req).unwrap_or(true))
            })
            .map(key)
            .collect();

        if mode == CompatMode::Deep {
            loop {
                let failing: Vec<Key> = all()
                    .filter(|desc| compatible.contains(&key(desc)))
                    .filter(|desc| !requirements_available(desc, available, builtin, &compatible))
                    .map(key)
                    .collect();
                if failing.is_empty() {
                    break;
                }
                for entry in &failing {
                    compatible.remove(entry);
                }
            }
        }

        let mut index = Self::default();
        for desc in all() {
            let entry = key(desc);
            if compatible.contains(&entry) {
                let best = index.highest.entry(entry.0).or_insert_with(|| entry.1.clone());
                if entry.1 > *best {
                    *best = entry.1;
                }
            } else {
                index.incompatible.insert(entry);
            }
        }

        tracing::debug!(
            compatible = index.highest.len(),
            incompatible = index.incompatible.len(),
            "built compatibility index"
        );
        index
    }

    /// Highest compatible available version of `name`.
    pub fn highest(&self, name: &str) -> Option<&Version> {
        self.highest.get(name)
    }

    pub fn is_compatible(&self, desc: &PackageDescriptor) -> bool {
        !self
            .incompatible
            .contains(&(desc.name().to_string(), desc.version().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PackageKind;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn desc(name: &str, version: &str, reqs: &[(&str, &str)]) -> PackageDescriptor {
        PackageDescriptor::new(name, v(version), PackageKind::Bundle)
            .unwrap()
            .with_requirements(reqs.iter().map(|(n, m)| Requirement::new(*n, v(m))).collect())
    }

    fn index(descs: Vec<PackageDescriptor>) -> Index {
        let mut map: Index = BTreeMap::new();
        for d in descs {
            map.entry(d.name().to_string()).or_default().push(d);
        }
        map
    }

    fn host(version: &str) -> Index {
        index(vec![
            PackageDescriptor::new("emacs", v(version), PackageKind::Builtin).unwrap(),
        ])
    }

    #[test]
    fn host_requirement_decides_compatibility() {
        let available = index(vec![
            desc("new", "2.0", &[("emacs", "29.1")]),
            desc("new", "1.0", &[("emacs", "26.1")]),
        ]);
        let compat = CompatibilityIndex::build(&available, &host("28.2"), CompatMode::Shallow);
        assert_eq!(compat.highest("new"), Some(&v("1.0")));
        assert!(!compat.is_compatible(&available["new"][0]));
        assert!(compat.is_compatible(&available["new"][1]));
    }

    #[test]
    fn deep_mode_follows_dependencies() {
        let available = index(vec![
            desc("app", "1.0", &[("lib", "1.0")]),
            desc("lib", "1.0", &[("emacs", "30.1")]),
        ]);

        let shallow = CompatibilityIndex::build(&available, &host("29.1"), CompatMode::Shallow);
        assert_eq!(shallow.highest("app"), Some(&v("1.0")));

        let deep = CompatibilityIndex::build(&available, &host("29.1"), CompatMode::Deep);
        assert_eq!(deep.highest("app"), None);
        assert_eq!(deep.highest("lib"), None);
    }

    #[test]
    fn deep_mode_tolerates_cycles() {
        let available = index(vec![
            desc("a", "1", &[("b", "1")]),
            desc("b", "1", &[("a", "1")]),
        ]);
        let deep = CompatibilityIndex::build(&available, &host("29.1"), CompatMode::Deep);
        assert_eq!(deep.highest("a"), Some(&v("1")));
        assert_eq!(deep.highest("b"), Some(&v("1")));
    }

    #[test]
    fn deep_mode_cycle_shares_a_failure() {
        let available = index(vec![
            desc("a", "1", &[("b", "1"), ("emacs", "30.1")]),
            desc("b", "1", &[("a", "1")]),
        ]);
        let deep = CompatibilityIndex::build(&available, &host("29.1"), CompatMode::Deep);
        assert_eq!(deep.highest("a"), None);
        assert_eq!(deep.highest("b"), None);
        assert!(!deep.is_compatible(&available["b"][0]));

        let shallow = CompatibilityIndex::build(&available, &host("29.1"), CompatMode::Shallow);
        assert_eq!(shallow.highest("b"), Some(&v("1")));
    }

    #[test]
    fn deep_mode_uses_any_compatible_candidate() {
        let available = index(vec![
            desc("app", "1.0", &[("lib", "1.0")]),
            desc("lib", "2.0", &[("emacs", "30.1")]),
            desc("lib", "1.5", &[("emacs", "27.1")]),
        ]);
        let deep = CompatibilityIndex::build(&available, &host("29.1"), CompatMode::Deep);
        assert_eq!(deep.highest("app"), Some(&v("1.0")));
        assert_eq!(deep.highest("lib"), Some(&v("1.5")));
    }
}
