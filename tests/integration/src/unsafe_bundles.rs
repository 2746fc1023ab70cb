//! Bundles that try to write outside their package directory.

mod common;

use common::{Env, failed_names};
use parcel_core::{Error, InstallError, SignaturePolicy};
use parcel_test_utils::archive::{TestArchive, single_file_source};
use parcel_test_utils::tarball::{self, TarEntry};

/// Install `evil-1.0` built from a valid main file followed by `extra`.
async fn install_evil(extra: &[TarEntry<'_>]) -> (Env, parcel_core::InstallReport) {
    let main = single_file_source("evil", "1.0", &[]);
    let mut entries = vec![TarEntry::Dir("evil-1.0/"), TarEntry::File("evil-1.0/evil.el", &main)];
    entries.extend_from_slice(extra);
    let bytes = tarball::build(&entries);
    let mut archive = TestArchive::new("local");
    archive.add_raw_bundle("evil", "1.0", &[], &bytes).publish();

    let env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    let mut manager = env.manager();
    manager.refresh().await;
    let report = manager.install("evil", false).await.unwrap();
    (env, report)
}

fn assert_nothing_written(env: &Env, report: &parcel_core::InstallReport) {
    assert_eq!(failed_names(report), vec!["evil-1.0".to_string()]);
    assert!(report.installed.is_empty());
    assert!(!env.package_dir("evil-1.0").exists());
    assert!(!env.home.path().join("escape.el").exists());
    assert!(!env.root().join("escape.el").exists());
}

#[tokio::test]
async fn parent_components_are_rejected() {
    let (env, report) = install_evil(&[TarEntry::File("evil-1.0/../../escape.el", "(pwned)")]).await;

    assert!(matches!(
        &report.failures[0].1,
        Error::Install(InstallError::UnsafePath { entry, .. }) if entry.contains("..")
    ));
    assert_nothing_written(&env, &report);
}

#[tokio::test]
async fn absolute_paths_are_rejected() {
    let (env, report) = install_evil(&[TarEntry::File("/tmp/escape.el", "(pwned)")]).await;

    assert!(matches!(
        report.failures[0].1,
        Error::Install(InstallError::UnsafePath { .. })
    ));
    assert_nothing_written(&env, &report);
}

#[tokio::test]
async fn escaping_symlinks_are_rejected() {
    let (env, report) = install_evil(&[TarEntry::Symlink("evil-1.0/link", "../../..")]).await;

    assert!(matches!(
        report.failures[0].1,
        Error::Install(InstallError::UnsafePath { .. })
    ));
    assert_nothing_written(&env, &report);
}

#[tokio::test]
async fn chained_symlinks_are_rejected() {
    let (env, report) = install_evil(&[
        TarEntry::Symlink("evil-1.0/d", "."),
        TarEntry::Symlink("evil-1.0/d/up", ".."),
        TarEntry::File("evil-1.0/up/escape.el", "(pwned)"),
    ])
    .await;

    assert!(matches!(
        report.failures[0].1,
        Error::Install(InstallError::UnsafePath { .. })
    ));
    assert_nothing_written(&env, &report);
}

#[tokio::test]
async fn hard_links_are_rejected() {
    let (env, report) = install_evil(&[TarEntry::HardLink("evil-1.0/passwd", "/etc/passwd")]).await;

    assert!(matches!(
        report.failures[0].1,
        Error::Install(InstallError::UnsafePath { .. })
    ));
    assert_nothing_written(&env, &report);
}

#[tokio::test]
async fn entries_outside_the_package_root_are_rejected() {
    let (env, report) = install_evil(&[TarEntry::File("other-1.0/escape.el", "(pwned)")]).await;

    assert!(matches!(
        report.failures[0].1,
        Error::Install(InstallError::BadLayout { .. })
    ));
    assert_nothing_written(&env, &report);
}

#[tokio::test]
async fn symlinks_inside_the_package_are_kept() {
    let (env, report) = install_evil(&[TarEntry::Symlink("evil-1.0/alias.el", "evil.el")]).await;

    assert!(report.is_complete());
    let alias = env.package_dir("evil-1.0").join("alias.el");
    #[cfg(unix)]
    assert!(alias.symlink_metadata().unwrap().file_type().is_symlink());
    #[cfg(not(unix))]
    assert!(!alias.exists());
}
