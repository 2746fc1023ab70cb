//! Talking to package archives.
//!
//! [`ArchiveClient`] fetches archive indexes and package artifacts through a
//! [`Fetcher`], checks detached signatures through a [`SignatureVerifier`]
//! according to the [`SignaturePolicy`], and keeps the last good index of
//! every archive in the cache directory:
//!
//! ```text
//! <cache>/archives/<archive>/archive-contents
//! <cache>/archives/<archive>/<name>-<version>.tar
//! ```

pub mod fetch;
pub mod signature;
pub mod tracker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use parcel_fs::{NormalizedPath, PackageFile, RobustnessConfig};
use serde::{Deserialize, Serialize};

use crate::descriptor::PackageDescriptor;
use crate::error::{Error, FetchError, SignatureError};
use crate::metadata;

pub use fetch::{Fetcher, HttpFetcher, LocalFetcher, Location, SourceFetcher};
pub use signature::{
    Ed25519Keyring, GoodSignature, SignaturePolicy, SignatureStatus, SignatureVerifier,
};
pub use tracker::{DownloadGuard, DownloadTracker};

/// A named archive. List order is priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSource {
    pub name: String,
    /// `http(s)://` base URL or absolute directory.
    pub location: String,
}

impl ArchiveSource {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Artifact bytes that passed the signature policy.
#[derive(Debug, Clone)]
pub struct VerifiedArtifact {
    /// The requested descriptor, marked signed when a good signature was found.
    pub descriptor: PackageDescriptor,
    pub bytes: Vec<u8>,
    /// `sha256:<hex>` of `bytes`.
    pub checksum: String,
    pub signatures: Vec<GoodSignature>,
}

/// Result of fetching every archive index.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    /// Union of all indexes that were fetched, verified and parsed.
    pub descriptors: Vec<PackageDescriptor>,
    pub refreshed: Vec<String>,
    pub failures: Vec<(String, FetchError)>,
}

impl RefreshOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ArchiveClient {
    sources: Vec<ArchiveSource>,
    fetcher: Arc<dyn Fetcher>,
    verifier: Arc<dyn SignatureVerifier>,
    policy: SignaturePolicy,
    cache_dir: PathBuf,
    tracker: DownloadTracker,
    robustness: RobustnessConfig,
}

impl std::fmt::Debug for ArchiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveClient")
            .field("sources", &self.sources)
            .field("policy", &self.policy)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl ArchiveClient {
    /// A client with an empty keyring and the default signature policy.
    pub fn new(sources: Vec<ArchiveSource>, cache_dir: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            sources,
            fetcher,
            verifier: Arc::new(Ed25519Keyring::new()),
            policy: SignaturePolicy::default(),
            cache_dir: cache_dir.into(),
            tracker: DownloadTracker::new(),
            robustness: RobustnessConfig::default(),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_policy(mut self, policy: SignaturePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tracker(mut self, tracker: DownloadTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn sources(&self) -> &[ArchiveSource] {
        &self.sources
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }

    pub fn source(&self, name: &str) -> Option<&ArchiveSource> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn policy(&self) -> SignaturePolicy {
        self.policy
    }

    pub fn tracker(&self) -> &DownloadTracker {
        &self.tracker
    }

    fn archive_dir(&self, archive: &str) -> PathBuf {
        self.cache_dir
            .join(PackageFile::ArchivesDir.as_str())
            .join(archive)
    }

    /// Path of the cached index for `archive`.
    pub fn cached_index_path(&self, archive: &str) -> PathBuf {
        self.archive_dir(archive)
            .join(PackageFile::ArchiveContents.as_str())
    }

    async fn fetch_raw(&self, location: &Location, file: &str) -> Result<Vec<u8>, FetchError> {
        self.fetcher.fetch(location, file).await
    }

    /// A missing sidecar is `None`; any other failure is an error.
    async fn fetch_signature(&self, location: &Location, file: &str) -> Result<Option<Vec<u8>>, FetchError> {
        if self.policy == SignaturePolicy::Off {
            return Ok(None);
        }
        match self.fetch_raw(location, &PackageFile::signature_for(file)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(FetchError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn cache_write(&self, path: &Path, bytes: &[u8]) {
        if let Err(e) = parcel_fs::io::write_atomic(&NormalizedPath::new(path), bytes, self.robustness) {
            tracing::warn!(path = %path.display(), error = %e, "failed to update cache");
        }
    }

    /// Fetch, verify, parse and cache the index of one archive.
    pub async fn fetch_archive_index(&self, archive: &ArchiveSource) -> Result<Vec<PackageDescriptor>, FetchError> {
        let _guard = self.tracker.begin(&archive.name)?;
        let location = Location::parse(&archive.location)?;
        let file = PackageFile::ArchiveContents.as_str();

        let bytes = self.fetch_raw(&location, file).await?;
        let signature = self.fetch_signature(&location, file).await?;
        self.check_signature(&format!("{}/{}", archive.name, file), &bytes, signature.as_deref())
            .map_err(|source| FetchError::Signature {
                archive: archive.name.clone(),
                source,
            })?;

        let text = String::from_utf8_lossy(&bytes);
        let descriptors =
            metadata::parse_archive_contents(&archive.name, &text).map_err(|e| FetchError::Parse {
                archive: archive.name.clone(),
                reason: e.to_string(),
            })?;

        self.cache_write(&self.cached_index_path(&archive.name), &bytes);
        tracing::info!(archive = %archive.name, packages = descriptors.len(), "fetched archive index");
        Ok(descriptors)
    }

    /// Raw artifact bytes for `desc` from `archive`; no signature check.
    pub async fn fetch_artifact(&self, archive: &ArchiveSource, desc: &PackageDescriptor) -> Result<Vec<u8>, FetchError> {
        let _guard = self.tracker.begin(&archive.name)?;
        let location = Location::parse(&archive.location)?;
        let file = artifact_file(desc, &location)?;
        self.fetch_raw(&location, &file).await
    }

    /// Verify a sidecar over `data` without applying the policy.
    pub fn verify_signature(&self, file: &str, data: &[u8], signature: &[u8]) -> Result<Vec<GoodSignature>, SignatureError> {
        let statuses = self.verifier.verify(file, data, signature)?;
        signature::summarize(file, statuses)
    }

    /// Apply the signature policy to `data` and its optional sidecar.
    pub fn check_signature(
        &self,
        file: &str,
        data: &[u8],
        signature: Option<&[u8]>,
    ) -> Result<Vec<GoodSignature>, SignatureError> {
        let allow_unsigned = match self.policy {
            SignaturePolicy::Off => return Ok(Vec::new()),
            SignaturePolicy::Required => false,
            SignaturePolicy::AllowUnsigned => true,
        };

        let Some(signature) = signature else {
            if allow_unsigned {
                tracing::warn!(file, "no signature found; accepting unsigned file");
                return Ok(Vec::new());
            }
            return Err(SignatureError::Missing { file: file.to_string() });
        };

        match self.verify_signature(file, data, signature) {
            Ok(good) => {
                tracing::debug!(file, signatures = good.len(), "signature verified");
                Ok(good)
            }
            Err(SignatureError::UnknownKey { key_id, .. }) if allow_unsigned => {
                tracing::warn!(file, key_id, "signed with an unknown key; accepting as unsigned");
                Ok(Vec::new())
            }
            Err(SignatureError::Unsupported { format, .. }) if allow_unsigned => {
                tracing::warn!(file, format, "cannot check this signature format; accepting as unsigned");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch the artifact for `desc` with its sidecar and apply the policy.
    ///
    /// The verified bytes are also written to the archive's cache directory.
    pub async fn download(&self, desc: &PackageDescriptor) -> Result<VerifiedArtifact, Error> {
        let archive_name = desc
            .archive()
            .ok_or_else(|| Error::UnknownPackage(format!("{desc} has no archive")))?;
        let archive = self.source(archive_name).ok_or_else(|| FetchError::UnsupportedLocation {
            location: format!("unknown archive '{archive_name}'"),
        })?;

        let _guard = self.tracker.begin(&archive.name)?;
        let location = Location::parse(&archive.location)?;
        let file = artifact_file(desc, &location)?;

        let bytes = self.fetch_raw(&location, &file).await?;
        let signature = self.fetch_signature(&location, &file).await?;
        let signatures = self.check_signature(&file, &bytes, signature.as_deref())?;

        self.cache_write(&self.archive_dir(&archive.name).join(&file), &bytes);
        let checksum = parcel_fs::checksum::sha256(&bytes);
        tracing::info!(package = %desc, archive = %archive.name, bytes = bytes.len(), %checksum, "downloaded");

        Ok(VerifiedArtifact {
            descriptor: desc.clone().with_signed(!signatures.is_empty()),
            bytes,
            checksum,
            signatures,
        })
    }

    /// Fetch every archive index concurrently.
    ///
    /// One archive failing never affects the others.
    pub async fn refresh_all(&self) -> RefreshOutcome {
        let results = join_all(self.sources.iter().map(|s| self.fetch_archive_index(s))).await;

        let mut outcome = RefreshOutcome::default();
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(descs) => {
                    outcome.descriptors.extend(descs);
                    outcome.refreshed.push(source.name.clone());
                }
                Err(e) => {
                    tracing::warn!(archive = %source.name, error = %e, "failed to refresh archive");
                    outcome.failures.push((source.name.clone(), e));
                }
            }
        }
        outcome
    }

    /// Indexes from the cache, without any network access.
    pub fn load_cached_indexes(&self) -> Vec<PackageDescriptor> {
        let mut all = Vec::new();
        for source in &self.sources {
            let path = self.cached_index_path(&source.name);
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable cached index");
                    continue;
                }
            };
            match metadata::parse_archive_contents(&source.name, &text) {
                Ok(descs) => {
                    tracing::debug!(archive = %source.name, packages = descs.len(), "loaded cached index");
                    all.extend(descs);
                }
                Err(e) => tracing::warn!(archive = %source.name, error = %e, "corrupt cached index"),
            }
        }
        all
    }
}

fn artifact_file(desc: &PackageDescriptor, location: &Location) -> Result<String, FetchError> {
    desc.artifact_name().ok_or_else(|| FetchError::NotFound {
        location: location.describe(&format!("{} ({} packages are not served)", desc.full_name(), desc.kind())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PackageKind;
    use async_trait::async_trait;
    use ed25519_dalek::{Signer, SigningKey};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory archive contents keyed by `(base, file)`.
    #[derive(Default)]
    struct MemoryFetcher {
        files: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    }

    impl MemoryFetcher {
        fn put(&self, base: &str, file: &str, bytes: impl Into<Vec<u8>>) {
            self.files
                .lock()
                .unwrap()
                .insert((base.to_string(), file.to_string()), bytes.into());
        }
    }

    #[async_trait]
    impl Fetcher for MemoryFetcher {
        async fn fetch(&self, location: &Location, file: &str) -> Result<Vec<u8>, FetchError> {
            let Location::Http(base) = location else {
                unreachable!("tests only use http locations")
            };
            if base.contains("broken") {
                return Err(FetchError::Http {
                    url: location.describe(file),
                    status: Some(500),
                    message: "HTTP 500".into(),
                });
            }
            self.files
                .lock()
                .unwrap()
                .get(&(base.clone(), file.to_string()))
                .cloned()
                .ok_or_else(|| FetchError::NotFound {
                    location: location.describe(file),
                })
        }
    }

    const INDEX: &str = r#"(1 (foo . [(1 0) ((bar (2 0))) "Foo" tar nil]) (bar . [(2 1) nil "Bar" single nil]))"#;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[42; 32])
    }

    fn sidecar(data: &[u8]) -> String {
        let k = key();
        format!(
            "{} {}\n",
            signature::key_id(&k.verifying_key()),
            hex::encode(k.sign(data).to_bytes())
        )
    }

    fn keyring() -> Arc<Ed25519Keyring> {
        let mut keyring = Ed25519Keyring::new();
        keyring.add_key("test", key().verifying_key());
        Arc::new(keyring)
    }

    fn client(fetcher: Arc<MemoryFetcher>, cache: &Path, policy: SignaturePolicy) -> ArchiveClient {
        ArchiveClient::new(
            vec![
                ArchiveSource::new("gnu", "https://gnu.test"),
                ArchiveSource::new("broken", "https://broken.test"),
            ],
            cache,
            fetcher,
        )
        .with_verifier(keyring())
        .with_policy(policy)
    }

    fn bar() -> PackageDescriptor {
        PackageDescriptor::new("bar", "2.1".parse().unwrap(), PackageKind::SingleFile)
            .unwrap()
            .with_archive("gnu")
    }

    #[tokio::test]
    async fn refresh_survives_a_failing_archive_and_caches_index() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.put("https://gnu.test", "archive-contents", INDEX);
        let client = client(fetcher, cache.path(), SignaturePolicy::AllowUnsigned);

        let outcome = client.refresh_all().await;
        assert_eq!(outcome.refreshed, vec!["gnu"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "broken");
        assert_eq!(outcome.descriptors.len(), 2);
        assert!(!outcome.is_complete());

        let cached = client.load_cached_indexes();
        assert_eq!(cached.len(), 2);
        assert!(cached.iter().all(|d| d.archive() == Some("gnu")));
    }

    #[tokio::test]
    async fn required_policy_rejects_unsigned_artifact() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.put("https://gnu.test", "bar-2.1.el", ";;; bar.el --- Bar\n");
        let client = client(fetcher, cache.path(), SignaturePolicy::Required);

        let err = client.download(&bar()).await.unwrap_err();
        assert!(matches!(err, Error::Signature(SignatureError::Missing { .. })));
        assert!(!cache.path().join("archives/gnu/bar-2.1.el").exists());
    }

    #[tokio::test]
    async fn allow_unsigned_accepts_missing_signature() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.put("https://gnu.test", "bar-2.1.el", "data");
        let client = client(fetcher, cache.path(), SignaturePolicy::AllowUnsigned);

        let artifact = client.download(&bar()).await.unwrap();
        assert_eq!(artifact.bytes, b"data");
        assert!(parcel_fs::checksum::matches(b"data", &artifact.checksum));
        assert!(!artifact.descriptor.is_signed());
        assert!(cache.path().join("archives/gnu/bar-2.1.el").is_file());
    }

    #[tokio::test]
    async fn good_signature_marks_descriptor_signed() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.put("https://gnu.test", "bar-2.1.el", "data");
        fetcher.put("https://gnu.test", "bar-2.1.el.sig", sidecar(b"data"));
        let client = client(fetcher, cache.path(), SignaturePolicy::Required);

        let artifact = client.download(&bar()).await.unwrap();
        assert!(artifact.descriptor.is_signed());
        assert_eq!(artifact.signatures[0].signer, "test");
    }

    #[tokio::test]
    async fn bad_signature_fails_even_when_unsigned_is_allowed() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.put("https://gnu.test", "bar-2.1.el", "tampered");
        fetcher.put("https://gnu.test", "bar-2.1.el.sig", sidecar(b"data"));
        let client = client(fetcher, cache.path(), SignaturePolicy::AllowUnsigned);

        let err = client.download(&bar()).await.unwrap_err();
        assert!(matches!(err, Error::Signature(SignatureError::Bad { .. })));
    }

    #[tokio::test]
    async fn off_policy_ignores_signatures() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.put("https://gnu.test", "bar-2.1.el", "tampered");
        fetcher.put("https://gnu.test", "bar-2.1.el.sig", sidecar(b"data"));
        let client = client(fetcher, cache.path(), SignaturePolicy::Off);

        assert!(client.download(&bar()).await.is_ok());
    }

    #[test]
    fn unknown_key_is_downgraded_only_when_allowed() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        let stranger = SigningKey::from_bytes(&[1; 32]);
        let sig = format!(
            "{} {}",
            signature::key_id(&stranger.verifying_key()),
            hex::encode(stranger.sign(b"data").to_bytes())
        );

        let lenient = client(fetcher.clone(), cache.path(), SignaturePolicy::AllowUnsigned);
        assert!(lenient
            .check_signature("f", b"data", Some(sig.as_bytes()))
            .unwrap()
            .is_empty());

        let strict = client(fetcher, cache.path(), SignaturePolicy::Required);
        assert!(matches!(
            strict.check_signature("f", b"data", Some(sig.as_bytes())),
            Err(SignatureError::UnknownKey { .. })
        ));
    }

    #[tokio::test]
    async fn openpgp_index_signature_is_unchecked_unless_required() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.put("https://gnu.test", "archive-contents", INDEX);
        fetcher.put(
            "https://gnu.test",
            "archive-contents.sig",
            "-----BEGIN PGP SIGNATURE-----\n\niHUEABYKAB0WIQ\n-----END PGP SIGNATURE-----\n",
        );
        let gnu = ArchiveSource::new("gnu", "https://gnu.test");

        let lenient = client(fetcher.clone(), cache.path(), SignaturePolicy::AllowUnsigned);
        let descriptors = lenient.fetch_archive_index(&gnu).await.unwrap();
        assert_eq!(descriptors.len(), 2);
        assert!(descriptors.iter().all(|d| !d.is_signed()));

        let strict = client(fetcher, cache.path(), SignaturePolicy::Required);
        assert!(matches!(
            strict.fetch_archive_index(&gnu).await,
            Err(FetchError::Signature {
                source: SignatureError::Unsupported { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn index_signature_failure_is_a_fetch_error() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.put("https://gnu.test", "archive-contents", INDEX);
        fetcher.put("https://gnu.test", "archive-contents.sig", sidecar(b"something else"));
        let client = client(fetcher, cache.path(), SignaturePolicy::AllowUnsigned);

        let err = client
            .fetch_archive_index(&ArchiveSource::new("gnu", "https://gnu.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Signature { ref archive, .. } if archive == "gnu"));
        assert!(!client.cached_index_path("gnu").exists());
    }

    #[tokio::test]
    async fn busy_archive_is_rejected() {
        let cache = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.put("https://gnu.test", "archive-contents", INDEX);
        let client = client(fetcher, cache.path(), SignaturePolicy::Off);

        let held = client.tracker().begin("gnu").unwrap();
        let err = client
            .fetch_archive_index(&ArchiveSource::new("gnu", "https://gnu.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Busy { .. }));
        drop(held);
        assert!(client.fetch_archive_index(&client.sources()[0].clone()).await.is_ok());
    }
}
