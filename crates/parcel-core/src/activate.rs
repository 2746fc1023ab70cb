//! Making installed packages visible to the host.
//!
//! Activating a package adds its directory to the host's load path and
//! evaluates its autoloads file, after activating whatever it requires.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parcel_fs::PackageFile;

use crate::descriptor::PackageDescriptor;
use crate::error::ActivationError;
use crate::sexp;
use crate::store::DescriptorStore;

/// The program packages are activated into.
pub trait Host: Send {
    fn load_path(&self) -> &[PathBuf];

    /// Add `dir` to the front of the load path unless it is already there.
    fn add_load_path(&mut self, dir: &Path);

    fn eval_file(&mut self, file: &Path) -> Result<(), String>;

    /// Files evaluated so far, oldest first.
    fn loaded_files(&self) -> &[PathBuf];
}

/// A host that lives in this process.
///
/// Evaluating a file reads it and checks that it is a well-formed sequence
/// of forms; nothing is executed.
#[derive(Debug, Clone, Default)]
pub struct ProcessHost {
    load_path: Vec<PathBuf>,
    loaded: Vec<PathBuf>,
}

impl ProcessHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Host for ProcessHost {
    fn load_path(&self) -> &[PathBuf] {
        &self.load_path
    }

    fn add_load_path(&mut self, dir: &Path) {
        if !self.load_path.iter().any(|p| p == dir) {
            self.load_path.insert(0, dir.to_path_buf());
        }
    }

    fn eval_file(&mut self, file: &Path) -> Result<(), String> {
        let text = std::fs::read_to_string(file).map_err(|e| e.to_string())?;
        let forms = sexp::parse_all(&text).map_err(|e| e.to_string())?;
        tracing::debug!(file = %file.display(), forms = forms.len(), "evaluated");
        self.loaded.retain(|f| f != file);
        self.loaded.push(file.to_path_buf());
        Ok(())
    }

    fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    #[default]
    Inactive,
    Activating,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivateOptions {
    /// Activate again even if already active, re-evaluating loaded files.
    pub reload: bool,
    pub with_dependencies: bool,
}

impl Default for ActivateOptions {
    fn default() -> Self {
        Self {
            reload: false,
            with_dependencies: true,
        }
    }
}

/// Outcome of [`ActivationEngine::activate_all`].
#[derive(Debug, Default)]
pub struct ActivationReport {
    pub activated: Vec<String>,
    pub failures: Vec<(String, ActivationError)>,
}

impl ActivationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ActivationEngine {
    host: Box<dyn Host>,
    states: BTreeMap<String, ActivationState>,
    activated: BTreeMap<String, PackageDescriptor>,
}

impl std::fmt::Debug for ActivationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationEngine")
            .field("states", &self.states)
            .field("activated", &self.activated.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for ActivationEngine {
    fn default() -> Self {
        Self::new(Box::new(ProcessHost::new()))
    }
}

impl ActivationEngine {
    pub fn new(host: Box<dyn Host>) -> Self {
        Self {
            host,
            states: BTreeMap::new(),
            activated: BTreeMap::new(),
        }
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn state(&self, name: &str) -> ActivationState {
        self.states.get(name).copied().unwrap_or_default()
    }

    /// The descriptor most recently activated under `name`.
    pub fn activated(&self, name: &str) -> Option<&PackageDescriptor> {
        self.activated.get(name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.state(name) == ActivationState::Active
    }

    pub fn activate(
        &mut self,
        store: &DescriptorStore,
        desc: &PackageDescriptor,
        options: ActivateOptions,
    ) -> Result<(), ActivationError> {
        let name = desc.name().to_string();
        match self.state(&name) {
            // Reached again through a dependency cycle
            ActivationState::Activating => return Ok(()),
            ActivationState::Active if !options.reload => return Ok(()),
            _ => {}
        }

        self.states.insert(name.clone(), ActivationState::Activating);
        let result = self.activate_inner(store, desc, options);
        // A package that was active before keeps its old activation
        let next = if result.is_ok() || self.activated.contains_key(&name) {
            ActivationState::Active
        } else {
            ActivationState::Inactive
        };
        self.states.insert(name, next);
        result
    }

    fn activate_inner(
        &mut self,
        store: &DescriptorStore,
        desc: &PackageDescriptor,
        options: ActivateOptions,
    ) -> Result<(), ActivationError> {
        if options.with_dependencies {
            for req in desc.requirements() {
                if store.builtin(&req.name).iter().any(|b| b.satisfies(req)) {
                    continue;
                }
                let Some(dep) = store.find_installed(req) else {
                    return Err(ActivationError::MissingDependency {
                        package: desc.full_name(),
                        dependency: req.name.clone(),
                        required: req.min_version.clone(),
                    });
                };
                let dep = dep.clone();
                let dep_options = ActivateOptions {
                    reload: false,
                    ..options
                };
                self.activate(store, &dep, dep_options)?;
            }
        }

        let dir = desc
            .install_dir()
            .ok_or_else(|| ActivationError::NotInstalled {
                package: desc.full_name(),
            })?
            .to_path_buf();

        let previous_dir = self
            .activated
            .get(desc.name())
            .and_then(|prev| prev.install_dir())
            .filter(|prev| *prev != dir)
            .map(Path::to_path_buf);

        self.host.add_load_path(&dir);
        self.load(desc, &dir.join(PackageFile::autoloads_file(desc.name())), true)?;

        if options.reload {
            if let Some(previous_dir) = previous_dir {
                let stale: Vec<PathBuf> = self
                    .host
                    .loaded_files()
                    .iter()
                    .filter(|f| f.parent() == Some(previous_dir.as_path()))
                    .filter_map(|f| f.file_name().map(|n| dir.join(n)))
                    .filter(|f| f.is_file())
                    .collect();
                for file in stale {
                    self.load(desc, &file, false)?;
                }
            }
        }

        tracing::info!(package = %desc, "activated");
        self.activated.insert(desc.name().to_string(), desc.clone());
        Ok(())
    }

    fn load(&mut self, desc: &PackageDescriptor, file: &Path, optional: bool) -> Result<(), ActivationError> {
        if optional && !file.is_file() {
            tracing::warn!(package = %desc, file = %file.display(), "no autoloads file");
            return Ok(());
        }
        self.host
            .eval_file(file)
            .map_err(|reason| ActivationError::LoadFailed {
                package: desc.full_name(),
                file: file.to_path_buf(),
                reason,
            })
    }

    /// Activate the newest installed version of every package.
    ///
    /// Failures are collected; one broken package does not stop the rest.
    pub fn activate_all(&mut self, store: &DescriptorStore) -> ActivationReport {
        let newest: Vec<PackageDescriptor> = store
            .all_installed()
            .filter(|d| store.installed(d.name()).first() == Some(*d))
            .cloned()
            .collect();

        let mut report = ActivationReport::default();
        for desc in newest {
            match self.activate(store, &desc, ActivateOptions::default()) {
                Ok(()) => report.activated.push(desc.full_name()),
                Err(e) => {
                    tracing::warn!(package = %desc, error = %e, "activation failed");
                    report.failures.push((desc.full_name(), e));
                }
            }
        }
        report
    }
}
