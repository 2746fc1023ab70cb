//! Install, delete, upgrade and refresh scenarios against on-disk archives.

mod common;

use std::fs;

use common::{Env, failed_names, installed_names};
use parcel_core::{BlockReason, Error, FetchError, PackageDescriptor, Settings, SignaturePolicy, Version};
use parcel_test_utils::archive::TestArchive;
use pretty_assertions::assert_eq;

fn v(s: &str) -> Version {
    s.parse().unwrap()
}

fn foo_bar_archive() -> TestArchive {
    let mut archive = TestArchive::new("local");
    archive
        .add_single("foo", "1.0", &[("bar", "2.0")])
        .add_single("bar", "2.1", &[])
        .add_single("bar", "1.9", &[])
        .publish();
    archive
}

#[tokio::test]
async fn install_orders_requirements_first() {
    let archive = foo_bar_archive();
    let env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    let mut manager = env.manager();
    assert!(manager.refresh().await.is_complete());

    let report = manager.install("foo", false).await.unwrap();

    assert_eq!(installed_names(&report), vec!["bar-2.1", "foo-1.0"]);
    for full_name in ["bar-2.1", "foo-1.0"] {
        let dir = env.package_dir(full_name);
        let name = full_name.split('-').next().unwrap();
        assert!(dir.join(format!("{name}.el")).is_file());
        assert!(dir.join(format!("{name}-pkg.el")).is_file());
        assert!(dir.join(format!("{name}-autoloads.el")).is_file());
    }
    assert!(!env.package_dir("bar-1.9").exists());

    // Requirements load before the package that needs them
    let host = manager.activation().host();
    assert_eq!(host.load_path()[0], env.package_dir("foo-1.0"));
    let loaded: Vec<String> = host
        .loaded_files()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(loaded, vec!["bar-autoloads.el", "foo-autoloads.el"]);
}

#[tokio::test]
async fn held_dependency_blocks_whole_transaction() {
    let archive = foo_bar_archive();
    let mut env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    env.settings.holds.set("bar", parcel_core::Hold::Held(v("1.9")));
    let mut manager = env.manager();
    manager.refresh().await;

    let err = manager.install("foo", false).await.unwrap_err();

    match err {
        Error::Unsatisfiable(e) => {
            assert_eq!(e.name, "bar");
            assert_eq!(e.required, v("2.0"));
            assert_eq!(e.cause, BlockReason::Held { held: v("1.9") });
        }
        other => panic!("expected an unsatisfiable requirement, got {other}"),
    }
    assert!(!env.root().exists());
}

#[tokio::test]
async fn builtin_satisfies_requirement() {
    let archive = foo_bar_archive();
    let mut env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    env.settings.builtin.insert("bar".to_string(), v("3.0"));
    let mut manager = env.manager();
    manager.refresh().await;

    let report = manager.install("foo", false).await.unwrap();

    assert_eq!(installed_names(&report), vec!["foo-1.0"]);
    assert!(manager.activation().is_active("foo"));
}

#[tokio::test]
async fn delete_in_use_then_autoremove() {
    let archive = foo_bar_archive();
    let env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    let mut manager = env.manager();
    manager.refresh().await;
    manager.install("foo", false).await.unwrap();

    match manager.delete("bar", false) {
        Err(Error::InUse { package, dependents }) => {
            assert_eq!(package, "bar");
            assert_eq!(dependents, vec!["foo-1.0"]);
        }
        other => panic!("expected InUse, got {other:?}"),
    }
    assert!(env.package_dir("bar-2.1").is_dir());

    // Nothing is removable while foo is selected
    assert!(manager.autoremove().unwrap().is_empty());

    assert_eq!(manager.delete("foo", false).unwrap(), vec!["foo-1.0"]);
    assert_eq!(manager.autoremove().unwrap(), vec!["bar-2.1"]);
    assert!(!env.package_dir("bar-2.1").exists());
    assert_eq!(manager.store().all_installed().count(), 0);
}

#[tokio::test]
async fn refresh_survives_a_broken_archive() {
    let archive = foo_bar_archive();
    let missing = TestArchive::new("broken");
    // `broken` never publishes an index
    let env = Env::new(&[&missing, &archive], SignaturePolicy::AllowUnsigned);
    let mut manager = env.manager();

    let outcome = manager.refresh().await;

    assert_eq!(outcome.refreshed, vec!["local"]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, "broken");
    assert!(matches!(outcome.failures[0].1, FetchError::NotFound { .. }));
    assert_eq!(manager.store().available("bar").len(), 2);
    assert_eq!(manager.store().available("foo")[0].archive(), Some("local"));
}

#[tokio::test]
async fn deeply_nested_index_fails_only_its_archive() {
    let archive = foo_bar_archive();
    let hostile = TestArchive::new("hostile");
    let text = format!("(1 {}{})", "(".repeat(100_000), ")".repeat(100_000));
    hostile.write_file("archive-contents", text.as_bytes());
    let env = Env::new(&[&hostile, &archive], SignaturePolicy::AllowUnsigned);
    let mut manager = env.manager();

    let outcome = manager.refresh().await;

    assert_eq!(outcome.refreshed, vec!["local"]);
    assert_eq!(outcome.failures[0].0, "hostile");
    assert!(matches!(outcome.failures[0].1, FetchError::Parse { .. }));
    assert_eq!(manager.store().available("bar").len(), 2);
}

#[tokio::test]
async fn bundle_installs_every_file() {
    let mut archive = TestArchive::new("local");
    archive
        .add_bundle(
            "tools",
            "0.3",
            &[],
            &[
                ("tools-extra.el", ";;;###autoload\n(defun tools-extra () nil)\n(provide 'tools-extra)\n"),
                ("doc/tools.txt", "manual\n"),
            ],
        )
        .publish();
    let env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    let mut manager = env.manager();
    manager.refresh().await;

    let report = manager.install("tools", false).await.unwrap();

    assert!(report.is_complete());
    let dir = env.package_dir("tools-0.3");
    assert!(dir.join("tools.el").is_file());
    assert_eq!(fs::read_to_string(dir.join("doc/tools.txt")).unwrap(), "manual\n");
    let autoloads = fs::read_to_string(dir.join("tools-autoloads.el")).unwrap();
    assert!(autoloads.contains("tools-hello"));
    assert!(autoloads.contains("tools-extra"));
    assert_eq!(
        manager.store().installed("tools")[0].kind(),
        parcel_core::PackageKind::Bundle
    );
}

#[tokio::test]
async fn upgrade_keeps_selection_and_removes_old_version() {
    let mut archive = TestArchive::new("local");
    archive.add_single("bar", "1.0", &[]).publish();
    let env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    let mut manager = env.manager();
    manager.refresh().await;
    manager.install("bar", false).await.unwrap();

    archive.add_single("bar", "1.5", &[]).publish();
    manager.refresh().await;
    let report = manager.upgrade("bar").await.unwrap();

    assert_eq!(installed_names(&report), vec!["bar-1.5"]);
    assert_eq!(report.removed, vec!["bar-1.0"]);
    assert!(!env.package_dir("bar-1.0").exists());
    assert_eq!(manager.store().selected(), ["bar".to_string()]);
    assert_eq!(manager.activation().activated("bar").map(PackageDescriptor::version), Some(&v("1.5")));

    // A second upgrade has nothing to do
    let again = manager.upgrade("bar").await.unwrap();
    assert!(again.installed.is_empty());
}

#[tokio::test]
async fn selection_persists_to_settings_file() {
    let archive = foo_bar_archive();
    let env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    let config = env.home.path().join("config.toml");
    env.settings.save(&config).unwrap();

    let mut manager = parcel_core::PackageManager::new(Settings::load(&config).unwrap())
        .unwrap()
        .with_settings_path(&config);
    manager.refresh().await;
    manager.install("foo", false).await.unwrap();
    manager.install("bar", true).await.unwrap();

    assert_eq!(Settings::load(&config).unwrap().selected, vec!["foo".to_string()]);

    // A fresh manager sees the same world
    let mut restarted = env.manager();
    let init = restarted.initialize().unwrap();
    assert!(init.activation.is_complete());
    assert_eq!(restarted.store().all_installed().count(), 2);
}

#[tokio::test]
async fn missing_artifact_fails_dependents_only() {
    let mut archive = TestArchive::new("local");
    archive
        .add_single("foo", "1.0", &[("bar", "2.0")])
        .add_single("bar", "2.1", &[])
        .add_single("solo", "1.0", &[])
        .publish();
    archive.remove_file("bar-2.1.el");
    let env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    let mut manager = env.manager();
    manager.refresh().await;

    let report = manager.install("foo", false).await.unwrap();
    assert_eq!(failed_names(&report), vec!["bar-2.1", "foo-1.0"]);
    assert!(matches!(report.failures[0].1, Error::Fetch(FetchError::NotFound { .. })));
    assert!(matches!(report.failures[1].1, Error::DependencyFailed { .. }));

    let solo = manager.install("solo", false).await.unwrap();
    assert_eq!(installed_names(&solo), vec!["solo-1.0"]);
}
