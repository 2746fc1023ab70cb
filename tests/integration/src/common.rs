//! Shared setup for the end-to-end scenarios.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use parcel_core::config::TrustedKey;
use parcel_core::{ArchiveSource, InstallReport, PackageManager, Settings, SignaturePolicy};
use parcel_test_utils::archive::TestArchive;
use parcel_test_utils::signing::TestSigner;
use tempfile::TempDir;

/// A home directory plus settings pointing at test archives.
pub struct Env {
    pub home: TempDir,
    pub settings: Settings,
}

impl Env {
    pub fn new(archives: &[&TestArchive], policy: SignaturePolicy) -> Self {
        let home = TempDir::new().unwrap();
        let mut settings = Settings::rooted_at(home.path());
        settings.archives = archives
            .iter()
            .map(|a| ArchiveSource::new(a.name(), a.location()))
            .collect();
        settings.core.signature_policy = policy;
        Self { home, settings }
    }

    pub fn trust(mut self, signer: &TestSigner) -> Self {
        self.settings.keys.push(TrustedKey {
            signer: signer.name().to_string(),
            public_key: signer.public_key_hex(),
        });
        self
    }

    pub fn root(&self) -> &Path {
        &self.settings.core.install_root
    }

    pub fn package_dir(&self, full_name: &str) -> PathBuf {
        self.root().join(full_name)
    }

    /// A manager built the way the binary builds it.
    pub fn manager(&self) -> PackageManager {
        PackageManager::new(self.settings.clone()).unwrap()
    }
}

pub fn installed_names(report: &InstallReport) -> Vec<String> {
    report.installed.iter().map(|p| p.descriptor.full_name()).collect()
}

pub fn failed_names(report: &InstallReport) -> Vec<String> {
    report.failures.iter().map(|(name, _)| name.clone()).collect()
}
