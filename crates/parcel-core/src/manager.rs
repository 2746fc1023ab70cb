//! Top-level package operations.
//!
//! [`PackageManager`] owns the store and the engines and runs whole
//! transactions: resolve, download, unpack, activate. Operations take
//! `&mut self`, so one transaction is in flight per manager.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::activate::{ActivateOptions, ActivationEngine, ActivationReport};
use crate::archive::{ArchiveClient, RefreshOutcome, SourceFetcher};
use crate::config::Settings;
use crate::descriptor::PackageDescriptor;
use crate::error::{Error, InstallError, Result, UnsatisfiableError};
use crate::install::{CommandCompiler, InstallEngine, InstalledPackage};
use crate::resolver::TransactionResolver;
use crate::store::{DescriptorStore, LoadFailure};
use crate::version::Version;

/// What [`PackageManager::initialize`] found.
#[derive(Debug, Default)]
pub struct InitReport {
    pub load_failures: Vec<LoadFailure>,
    pub activation: ActivationReport,
}

/// Outcome of an install or upgrade batch.
///
/// A package whose activation failed is both in `installed` and in
/// `failures`: it is on disk but not active.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<InstalledPackage>,
    /// Transaction entries already installed at the same version.
    pub skipped: Vec<String>,
    /// Old versions removed by an upgrade.
    pub removed: Vec<String>,
    pub failures: Vec<(String, Error)>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: InstallReport) {
        self.installed.extend(other.installed);
        self.skipped.extend(other.skipped);
        self.removed.extend(other.removed);
        self.failures.extend(other.failures);
    }

    fn installed_version(&self, name: &str) -> Option<&PackageDescriptor> {
        self.installed
            .iter()
            .map(|p| &p.descriptor)
            .find(|d| d.name() == name)
    }
}

#[derive(Debug)]
pub struct PackageManager {
    settings: Settings,
    settings_path: Option<PathBuf>,
    store: DescriptorStore,
    client: ArchiveClient,
    installer: InstallEngine,
    activation: ActivationEngine,
}

impl PackageManager {
    /// Build a manager from settings with the shipped fetcher, keyring and compiler.
    pub fn new(settings: Settings) -> Result<Self> {
        let client = ArchiveClient::new(
            settings.archives.clone(),
            &settings.core.cache_dir,
            Arc::new(SourceFetcher::new()?),
        )
        .with_verifier(Arc::new(settings.keyring()?))
        .with_policy(settings.core.signature_policy);

        let mut installer = InstallEngine::new(&settings.core.install_root);
        if let Some(command) = &settings.core.compile_command {
            installer = installer.with_compiler(Arc::new(CommandCompiler::new(command)));
        }

        Self::from_parts(settings, client, installer, ActivationEngine::default())
    }

    /// Build a manager from explicitly constructed engines.
    pub fn from_parts(
        settings: Settings,
        client: ArchiveClient,
        installer: InstallEngine,
        activation: ActivationEngine,
    ) -> Result<Self> {
        let store = settings.new_store()?;
        Ok(Self {
            settings,
            settings_path: None,
            store,
            client,
            installer,
            activation,
        })
    }

    /// Persist selection changes to `path`.
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &DescriptorStore {
        &self.store
    }

    pub fn client(&self) -> &ArchiveClient {
        &self.client
    }

    pub fn installer(&self) -> &InstallEngine {
        &self.installer
    }

    pub fn activation(&self) -> &ActivationEngine {
        &self.activation
    }

    fn save_selection(&mut self) -> Result<()> {
        self.settings.selected = self.store.selected().to_vec();
        if let Some(path) = &self.settings_path {
            self.settings.save(path)?;
        }
        Ok(())
    }

    /// Load installed packages and cached indexes, then activate everything.
    pub fn initialize(&mut self) -> Result<InitReport> {
        let load_failures = self.store.load_installed(self.installer.root())?;
        let cached = self.client.load_cached_indexes();
        self.store
            .replace_available(cached, &self.client.source_names());
        tracing::info!(
            installed = self.store.all_installed().count(),
            available = self.store.all_available().count(),
            "initialized"
        );

        let activation = self.activation.activate_all(&self.store);
        Ok(InitReport {
            load_failures,
            activation,
        })
    }

    /// Fetch every archive index and replace `available` with the union.
    pub async fn refresh(&mut self) -> RefreshOutcome {
        let outcome = self.client.refresh_all().await;
        self.store
            .replace_available(outcome.descriptors.clone(), &self.client.source_names());
        tracing::info!(
            refreshed = outcome.refreshed.len(),
            failed = outcome.failures.len(),
            "refreshed archives"
        );
        outcome
    }

    /// Best available descriptor for `name` under the configured holds.
    pub fn lookup(&self, name: &str) -> Result<PackageDescriptor> {
        let candidates = self.store.available(name);
        if let Some(best) = self.store.best_available(name, &self.settings.holds) {
            return Ok(best.clone());
        }
        // Every candidate is blocked; no particular version was asked for
        match candidates.first() {
            Some(first) => {
                let cause = self
                    .settings
                    .holds
                    .blocks(first)
                    .unwrap_or(crate::error::BlockReason::Absent);
                Err(UnsatisfiableError {
                    name: name.to_string(),
                    required: Version::default(),
                    cause,
                }
                .into())
            }
            None => Err(Error::UnknownPackage(name.to_string())),
        }
    }

    /// Install the best available version of `name` and its requirements.
    ///
    /// An already installed package is only marked as selected.
    pub async fn install(&mut self, name: &str, dont_select: bool) -> Result<InstallReport> {
        if self.store.is_installed(name) {
            tracing::info!(package = name, "already installed");
            if !dont_select && self.store.select(name) {
                self.save_selection()?;
            }
            return Ok(InstallReport {
                skipped: vec![name.to_string()],
                ..InstallReport::default()
            });
        }
        let desc = self.lookup(name)?;
        self.install_descriptor(&desc, dont_select).await
    }

    /// Install `desc` and whatever it requires.
    ///
    /// Resolution happens before any download and fails as a whole.
    pub async fn install_descriptor(&mut self, desc: &PackageDescriptor, dont_select: bool) -> Result<InstallReport> {
        let transaction = TransactionResolver::new(&self.store, &self.settings.holds)
            .compute_transaction(std::slice::from_ref(desc))?;
        tracing::info!(
            package = %desc,
            plan = ?transaction.iter().map(PackageDescriptor::full_name).collect::<Vec<_>>(),
            "resolved transaction"
        );

        let mut report = InstallReport::default();
        let mut failed: BTreeSet<String> = BTreeSet::new();

        for entry in transaction {
            if self
                .store
                .installed(entry.name())
                .iter()
                .any(|d| d.version() == entry.version())
            {
                report.skipped.push(entry.full_name());
                continue;
            }
            if let Some(dep) = entry.requirements().iter().find(|r| failed.contains(&r.name)) {
                tracing::warn!(package = %entry, dependency = %dep.name, "skipping, dependency failed");
                failed.insert(entry.name().to_string());
                report.failures.push((
                    entry.full_name(),
                    Error::DependencyFailed {
                        package: entry.full_name(),
                        dependency: dep.name.clone(),
                    },
                ));
                continue;
            }

            match self.install_one(&entry).await {
                Ok((installed, activation)) => {
                    if let Err(e) = activation {
                        report.failures.push((entry.full_name(), e));
                    }
                    report.installed.push(installed);
                }
                Err(e) => {
                    tracing::warn!(package = %entry, error = %e, "install failed");
                    failed.insert(entry.name().to_string());
                    report.failures.push((entry.full_name(), e));
                }
            }
        }

        if !dont_select && self.store.is_installed(desc.name()) && self.store.select(desc.name()) {
            self.save_selection()?;
        }
        Ok(report)
    }

    /// Download, unpack, record and activate one transaction entry.
    ///
    /// Activation failures are returned separately; the install stands.
    async fn install_one(&mut self, desc: &PackageDescriptor) -> Result<(InstalledPackage, Result<()>)> {
        let artifact = self.client.download(desc).await?;
        let installed = self
            .installer
            .unpack(&artifact.descriptor, &artifact.bytes, &artifact.signatures)?;
        let activation = self.record_and_activate(&installed);
        Ok((installed, activation))
    }

    fn record_and_activate(&mut self, installed: &InstalledPackage) -> Result<()> {
        let desc = &installed.descriptor;
        self.store.insert_installed(desc.clone());
        let options = ActivateOptions {
            reload: self.activation.is_active(desc.name()),
            ..ActivateOptions::default()
        };
        self.activation.activate(&self.store, desc, options)?;
        Ok(())
    }

    /// Install the package in the local directory `path` and select it.
    pub fn install_directory(&mut self, path: &Path) -> Result<InstalledPackage> {
        let installed = self.installer.install_directory(path)?;
        if let Err(e) = self.record_and_activate(&installed) {
            tracing::warn!(package = %installed.descriptor, error = %e, "activation failed");
        }
        if self.store.select(installed.descriptor.name()) {
            self.save_selection()?;
        }
        Ok(installed)
    }

    /// Installed packages that still need `desc`.
    fn dependents_of(&self, desc: &PackageDescriptor) -> Vec<String> {
        self.store
            .reverse_dependencies(desc.name())
            .into_iter()
            .filter(|dependent| {
                dependent
                    .requirements()
                    .iter()
                    .filter(|r| r.name == desc.name())
                    .any(|r| {
                        let elsewhere = self
                            .store
                            .installed(desc.name())
                            .iter()
                            .any(|other| other.version() != desc.version() && other.satisfies(r))
                            || self.store.builtin(desc.name()).iter().any(|b| b.satisfies(r));
                        !elsewhere
                    })
            })
            .map(PackageDescriptor::full_name)
            .collect()
    }

    /// Delete one installed version.
    ///
    /// Fails with [`Error::InUse`] while another installed package requires
    /// it, unless `force` is set.
    pub fn delete_descriptor(&mut self, desc: &PackageDescriptor, force: bool) -> Result<()> {
        if self.store.is_builtin(desc.name()) && !self.store.is_installed(desc.name()) {
            return Err(InstallError::Builtin {
                package: desc.name().to_string(),
            }
            .into());
        }
        let dependents = self.dependents_of(desc);
        if !dependents.is_empty() {
            if !force {
                return Err(Error::InUse {
                    package: desc.name().to_string(),
                    dependents,
                });
            }
            tracing::warn!(package = %desc, ?dependents, "deleting a package others require");
        }

        self.installer.delete(desc)?;
        self.store.remove_installed(desc.name(), desc.version());
        if !self.store.is_installed(desc.name()) && self.store.deselect(desc.name()) {
            self.save_selection()?;
        }
        Ok(())
    }

    /// Delete every installed version of `name`; returns the removed full names.
    pub fn delete(&mut self, name: &str, force: bool) -> Result<Vec<String>> {
        let versions = self.store.installed(name).to_vec();
        if versions.is_empty() {
            if self.store.is_builtin(name) {
                return Err(InstallError::Builtin {
                    package: name.to_string(),
                }
                .into());
            }
            return Err(Error::UnknownPackage(name.to_string()));
        }
        let mut removed = Vec::with_capacity(versions.len());
        for desc in versions {
            // Other versions of the same package do not count as dependents
            self.delete_descriptor(&desc, force)?;
            removed.push(desc.full_name());
        }
        Ok(removed)
    }

    /// Delete every package that nothing selected needs.
    pub fn autoremove(&mut self) -> Result<Vec<String>> {
        let removable: Vec<PackageDescriptor> = self.store.removable().into_iter().cloned().collect();
        let mut removed = Vec::with_capacity(removable.len());
        for desc in removable {
            self.delete_descriptor(&desc, true)?;
            removed.push(desc.full_name());
        }
        if removed.is_empty() {
            tracing::info!("nothing to remove");
        }
        Ok(removed)
    }

    /// Install the newest allowed version of `name`, then remove the old one.
    pub async fn upgrade(&mut self, name: &str) -> Result<InstallReport> {
        let Some(current) = self.store.installed(name).first().cloned() else {
            return Err(Error::UnknownPackage(name.to_string()));
        };
        let newer = self
            .store
            .upgradeable(&self.settings.holds)
            .into_iter()
            .find(|(installed, _)| installed.name() == name)
            .map(|(_, newer)| newer.clone());
        let Some(newer) = newer else {
            tracing::info!(package = %current, "already up to date");
            return Ok(InstallReport::default());
        };

        let mut report = self.install_descriptor(&newer, true).await?;
        if report
            .installed_version(name)
            .is_some_and(|d| d.version() == newer.version())
        {
            self.installer.delete(&current)?;
            self.store.remove_installed(current.name(), current.version());
            tracing::info!(from = %current, to = %newer, "upgraded");
            report.removed.push(current.full_name());
        }
        Ok(report)
    }

    /// Upgrade every package with a newer allowed version.
    pub async fn upgrade_all(&mut self) -> Result<InstallReport> {
        let names: Vec<String> = self
            .store
            .upgradeable(&self.settings.holds)
            .into_iter()
            .map(|(installed, _)| installed.name().to_string())
            .collect();

        let mut report = InstallReport::default();
        for name in names {
            // An earlier upgrade may already have pulled this one in
            if self
                .store
                .upgradeable(&self.settings.holds)
                .iter()
                .all(|(installed, _)| installed.name() != name)
            {
                continue;
            }
            match self.upgrade(&name).await {
                Ok(one) => report.merge(one),
                Err(e) => {
                    tracing::warn!(package = %name, error = %e, "upgrade failed");
                    report.failures.push((name, e));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveSource, LocalFetcher, SignaturePolicy};
    use crate::descriptor::{PackageKind, Requirement};
    use crate::hold::Hold;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn single_file(name: &str, version: &str, requires: &str) -> String {
        format!(
            ";;; {name}.el --- The {name} package\n;; Version: {version}\n;; Package-Requires: ({requires})\n;;; Code:\n;;;###autoload\n(defun {name}-hello () \"Hi.\" (interactive) nil)\n(provide '{name})\n"
        )
    }

    /// A local archive serving single-file packages `(name, version, [(dep, min)])`.
    struct Fixture {
        tmp: TempDir,
        settings: Settings,
    }

    impl Fixture {
        fn new(packages: &[(&str, &str, &[(&str, &str)])]) -> Self {
            let tmp = TempDir::new().unwrap();
            let archive = tmp.path().join("archive");
            std::fs::create_dir_all(&archive).unwrap();

            let mut index = String::from("(1");
            for (name, version, deps) in packages {
                let dotted = |s: &str| s.replace('.', " ");
                let reqs: String = deps
                    .iter()
                    .map(|(d, m)| format!("({d} ({}))", dotted(m)))
                    .collect();
                let reqs = if reqs.is_empty() { "nil".to_string() } else { format!("({reqs})") };
                index.push_str(&format!(
                    "\n ({name} . [({}) {reqs} \"The {name} package\" single nil])",
                    dotted(version)
                ));
                let header_reqs: String = deps.iter().map(|(d, m)| format!("({d} \"{m}\")")).collect();
                std::fs::write(
                    archive.join(format!("{name}-{version}.el")),
                    single_file(name, version, &header_reqs),
                )
                .unwrap();
            }
            index.push(')');
            std::fs::write(archive.join("archive-contents"), index).unwrap();

            let mut settings = Settings::rooted_at(&tmp.path().join("home"));
            settings.archives = vec![ArchiveSource::new("local", archive.to_string_lossy())];
            settings.core.signature_policy = SignaturePolicy::AllowUnsigned;
            Self { tmp, settings }
        }

        fn manager(&self) -> PackageManager {
            let client = ArchiveClient::new(
                self.settings.archives.clone(),
                &self.settings.core.cache_dir,
                Arc::new(LocalFetcher),
            )
            .with_policy(self.settings.core.signature_policy);
            let installer = InstallEngine::new(&self.settings.core.install_root);
            PackageManager::from_parts(self.settings.clone(), client, installer, ActivationEngine::default()).unwrap()
        }
    }

    fn installed_names(manager: &PackageManager) -> Vec<String> {
        manager.store().all_installed().map(PackageDescriptor::full_name).collect()
    }

    #[tokio::test]
    async fn install_pulls_requirements_in_order() {
        let fixture = Fixture::new(&[
            ("foo", "1.0", &[("bar", "2.0")]),
            ("bar", "2.1", &[]),
            ("bar", "1.9", &[]),
        ]);
        let mut manager = fixture.manager();
        manager.refresh().await;

        let report = manager.install("foo", false).await.unwrap();

        let order: Vec<String> = report.installed.iter().map(|p| p.descriptor.full_name()).collect();
        assert_eq!(order, vec!["bar-2.1", "foo-1.0"]);
        assert!(report.is_complete());
        assert_eq!(manager.store().selected(), ["foo".to_string()]);
        assert!(manager.activation().is_active("bar"));
        assert!(manager.activation().is_active("foo"));
    }

    #[tokio::test]
    async fn held_dependency_fails_before_download() {
        let fixture = Fixture::new(&[("foo", "1.0", &[("bar", "2.0")]), ("bar", "2.1", &[])]);
        let mut manager = fixture.manager();
        manager.settings.holds.set("bar", Hold::Held(v("1.5")));
        manager.refresh().await;

        let err = manager.install("foo", false).await.unwrap_err();

        assert!(matches!(err, Error::Unsatisfiable(ref e) if e.name == "bar"));
        assert!(installed_names(&manager).is_empty());
        assert!(!fixture.settings.core.install_root.exists());
    }

    #[tokio::test]
    async fn lookup_of_fully_held_package_asks_for_no_version() {
        let fixture = Fixture::new(&[("bar", "2.1", &[])]);
        let mut manager = fixture.manager();
        manager.settings.holds.set("bar", Hold::Held(v("1.5")));
        manager.refresh().await;

        match manager.lookup("bar").unwrap_err() {
            Error::Unsatisfiable(e) => {
                assert_eq!(e.required, Version::default());
                assert_eq!(e.cause, crate::error::BlockReason::Held { held: v("1.5") });
            }
            other => panic!("expected an unsatisfiable lookup, got {other}"),
        }
    }

    #[tokio::test]
    async fn install_picks_newest_version_the_host_can_run() {
        let fixture = Fixture::new(&[
            ("new", "2.0", &[("emacs", "30.1")]),
            ("new", "1.0", &[("emacs", "26.1")]),
        ]);
        let mut manager = fixture.manager();
        manager.refresh().await;

        assert_eq!(manager.lookup("new").unwrap().full_name(), "new-1.0");
        let report = manager.install("new", false).await.unwrap();

        let order: Vec<String> = report.installed.iter().map(|p| p.descriptor.full_name()).collect();
        assert_eq!(order, vec!["new-1.0"]);
    }

    #[tokio::test]
    async fn missing_artifact_skips_dependents() {
        let fixture = Fixture::new(&[("foo", "1.0", &[("bar", "2.0")]), ("bar", "2.1", &[])]);
        std::fs::remove_file(fixture.tmp.path().join("archive/bar-2.1.el")).unwrap();
        let mut manager = fixture.manager();
        manager.refresh().await;

        let report = manager.install("foo", false).await.unwrap();

        let failed: Vec<&str> = report.failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["bar-2.1", "foo-1.0"]);
        assert!(matches!(report.failures[1].1, Error::DependencyFailed { .. }));
        assert!(manager.store().selected().is_empty());
    }

    #[tokio::test]
    async fn delete_refuses_required_package() {
        let fixture = Fixture::new(&[("foo", "1.0", &[("bar", "2.0")]), ("bar", "2.1", &[])]);
        let mut manager = fixture.manager();
        manager.refresh().await;
        manager.install("foo", false).await.unwrap();

        let err = manager.delete("bar", false).unwrap_err();
        assert!(matches!(err, Error::InUse { ref dependents, .. } if dependents == &["foo-1.0".to_string()]));

        manager.delete("foo", false).unwrap();
        assert!(manager.store().selected().is_empty());
        assert_eq!(manager.autoremove().unwrap(), vec!["bar-2.1"]);
        assert!(installed_names(&manager).is_empty());
    }

    #[tokio::test]
    async fn forced_delete_ignores_dependents() {
        let fixture = Fixture::new(&[("foo", "1.0", &[("bar", "2.0")]), ("bar", "2.1", &[])]);
        let mut manager = fixture.manager();
        manager.refresh().await;
        manager.install("foo", false).await.unwrap();

        assert_eq!(manager.delete("bar", true).unwrap(), vec!["bar-2.1"]);
        assert!(!fixture.settings.core.install_root.join("bar-2.1").exists());
    }

    #[tokio::test]
    async fn upgrade_replaces_old_version() {
        let fixture = Fixture::new(&[("bar", "1.0", &[])]);
        let mut manager = fixture.manager();
        manager.refresh().await;
        manager.install("bar", false).await.unwrap();

        // A newer release appears in the archive
        let archive = fixture.tmp.path().join("archive");
        std::fs::write(archive.join("bar-2.0.el"), single_file("bar", "2.0", "")).unwrap();
        std::fs::write(
            archive.join("archive-contents"),
            "(1 (bar . [(2 0) nil \"The bar package\" single nil]))",
        )
        .unwrap();
        manager.refresh().await;

        let report = manager.upgrade_all().await.unwrap();

        assert_eq!(report.removed, vec!["bar-1.0"]);
        assert_eq!(installed_names(&manager), vec!["bar-2.0"]);
        assert_eq!(manager.store().selected(), ["bar".to_string()]);
        assert_eq!(manager.activation().activated("bar").unwrap().version(), &v("2.0"));
        assert!(!fixture.settings.core.install_root.join("bar-1.0").exists());
    }

    #[tokio::test]
    async fn initialize_restores_state_from_disk() {
        let fixture = Fixture::new(&[("foo", "1.0", &[("bar", "2.0")]), ("bar", "2.1", &[])]);
        {
            let mut manager = fixture.manager();
            manager.refresh().await;
            manager.install("foo", false).await.unwrap();
        }

        let mut manager = fixture.manager();
        let report = manager.initialize().unwrap();

        assert!(report.load_failures.is_empty());
        assert_eq!(report.activation.activated.len(), 2);
        assert_eq!(installed_names(&manager), vec!["bar-2.1", "foo-1.0"]);
        // Cached index is available without a refresh
        assert_eq!(manager.store().available("bar").len(), 1);
        let foo = &manager.store().installed("foo")[0];
        assert_eq!(foo.requirements(), [Requirement::new("bar", v("2.0"))]);
        assert_eq!(foo.kind(), PackageKind::SingleFile);
    }

    #[tokio::test]
    async fn install_directory_selects_package() {
        let fixture = Fixture::new(&[]);
        let src = fixture.tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("mine.el"), single_file("mine", "0.1", "")).unwrap();
        let mut manager = fixture.manager();

        let installed = manager.install_directory(&src).unwrap();

        assert_eq!(installed.descriptor.kind(), PackageKind::Directory);
        assert_eq!(manager.store().selected(), ["mine".to_string()]);
        assert!(manager.activation().is_active("mine"));
    }

    #[tokio::test]
    async fn unknown_package_is_reported() {
        let fixture = Fixture::new(&[("bar", "1.0", &[])]);
        let mut manager = fixture.manager();
        manager.refresh().await;

        assert!(matches!(
            manager.install("nope", false).await,
            Err(Error::UnknownPackage(ref n)) if n == "nope"
        ));
    }
}
