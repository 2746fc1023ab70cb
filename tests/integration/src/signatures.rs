//! Signature policy scenarios with Ed25519-signed test archives.

mod common;

use std::fs;

use common::{Env, failed_names, installed_names};
use parcel_core::{Error, FetchError, SignatureError, SignaturePolicy};
use parcel_test_utils::archive::TestArchive;
use parcel_test_utils::signing::TestSigner;
use pretty_assertions::assert_eq;

fn signed_archive(signer: &TestSigner) -> TestArchive {
    let mut archive = TestArchive::new("signed").signed_by(signer.clone());
    archive
        .add_single("bar", "1.0", &[])
        .add_single("foo", "1.0", &[("bar", "1.0")])
        .publish();
    archive
}

#[tokio::test]
async fn required_policy_rejects_unsigned_index() {
    let mut archive = TestArchive::new("plain");
    archive.add_single("bar", "1.0", &[]).publish();
    let env = Env::new(&[&archive], SignaturePolicy::Required);
    let mut manager = env.manager();

    let outcome = manager.refresh().await;

    assert!(outcome.refreshed.is_empty());
    match &outcome.failures[0].1 {
        FetchError::Signature { archive, source } => {
            assert_eq!(archive, "plain");
            assert!(matches!(source, SignatureError::Missing { .. }));
        }
        other => panic!("expected a signature failure, got {other}"),
    }
    assert!(matches!(
        manager.install("bar", false).await,
        Err(Error::UnknownPackage(_))
    ));
}

#[tokio::test]
async fn good_signature_is_recorded() {
    let signer = TestSigner::new("archive-key", 11);
    let archive = signed_archive(&signer);
    let env = Env::new(&[&archive], SignaturePolicy::Required).trust(&signer);
    let mut manager = env.manager();
    assert!(manager.refresh().await.is_complete());

    let report = manager.install("foo", false).await.unwrap();

    assert_eq!(installed_names(&report), vec!["bar-1.0", "foo-1.0"]);
    assert!(report.installed.iter().all(|p| p.descriptor.is_signed()));
    let record = fs::read_to_string(env.package_dir("foo-1.0").join("foo-1.0.signed")).unwrap();
    assert_eq!(record, format!("{} archive-key\n", signer.key_id()));
}

#[tokio::test]
async fn unknown_key_is_unsigned_under_allow_unsigned() {
    let signer = TestSigner::new("stranger", 12);
    let archive = signed_archive(&signer);
    // No key trusted
    let env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned);
    let mut manager = env.manager();
    assert!(manager.refresh().await.is_complete());

    let report = manager.install("bar", false).await.unwrap();

    assert!(report.is_complete());
    assert!(!report.installed[0].descriptor.is_signed());
    assert!(!env.package_dir("bar-1.0").join("bar-1.0.signed").exists());
}

#[tokio::test]
async fn unknown_key_is_rejected_under_required() {
    let signer = TestSigner::new("stranger", 13);
    let archive = signed_archive(&signer);
    let env = Env::new(&[&archive], SignaturePolicy::Required);
    let mut manager = env.manager();

    let outcome = manager.refresh().await;

    assert!(matches!(
        outcome.failures[0].1,
        FetchError::Signature {
            source: SignatureError::UnknownKey { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn bad_signature_is_rejected_even_when_unsigned_is_allowed() {
    let signer = TestSigner::new("archive-key", 14);
    let archive = signed_archive(&signer);
    let bar = fs::read(archive.path().join("bar-1.0.el")).unwrap();
    archive.write_sidecar("bar-1.0.el", &signer.forged_sidecar(&bar));
    let env = Env::new(&[&archive], SignaturePolicy::AllowUnsigned).trust(&signer);
    let mut manager = env.manager();
    manager.refresh().await;

    let report = manager.install("foo", false).await.unwrap();

    assert_eq!(failed_names(&report), vec!["bar-1.0", "foo-1.0"]);
    match &report.failures[0].1 {
        Error::Signature(SignatureError::Bad { key_id, .. }) => assert_eq!(key_id, &signer.key_id()),
        other => panic!("expected a bad signature, got {other}"),
    }
    assert!(!env.package_dir("bar-1.0").exists());
    assert!(!env.package_dir("foo-1.0").exists());
}

#[tokio::test]
async fn missing_artifact_signature_under_required() {
    let signer = TestSigner::new("archive-key", 15);
    let archive = signed_archive(&signer);
    archive.remove_file("bar-1.0.el.sig");
    let env = Env::new(&[&archive], SignaturePolicy::Required).trust(&signer);
    let mut manager = env.manager();
    manager.refresh().await;

    let report = manager.install("bar", false).await.unwrap();

    assert!(matches!(
        report.failures[0].1,
        Error::Signature(SignatureError::Missing { .. })
    ));
    assert!(manager.store().all_installed().next().is_none());
}

#[tokio::test]
async fn off_policy_ignores_forged_signatures() {
    let signer = TestSigner::new("archive-key", 16);
    let archive = signed_archive(&signer);
    let index = fs::read(archive.path().join("archive-contents")).unwrap();
    archive.write_sidecar("archive-contents", &signer.forged_sidecar(&index));
    let env = Env::new(&[&archive], SignaturePolicy::Off).trust(&signer);
    let mut manager = env.manager();

    assert!(manager.refresh().await.is_complete());
    let report = manager.install("bar", false).await.unwrap();
    assert!(!report.installed[0].descriptor.is_signed());
}
