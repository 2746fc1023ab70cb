//! Settings from `config.toml`.
//!
//! ```toml
//! selected = ["magit"]
//!
//! [core]
//! install_root = "/home/me/.local/share/parcel/packages"
//! cache_dir = "/home/me/.cache/parcel"
//! signature_policy = "allow-unsigned"
//! compile_command = "make"
//!
//! [host]
//! name = "emacs"
//! version = "29.1"
//!
//! [builtin]
//! seq = "2.24"
//!
//! [[archives]]
//! name = "gnu"
//! location = "https://elpa.gnu.org/packages/"
//!
//! [holds]
//! dash = "2.19.1"
//!
//! [[keys]]
//! signer = "gnu"
//! public_key = "<64 hex digits>"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parcel_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveSource, Ed25519Keyring, SignaturePolicy};
use crate::compat::CompatMode;
use crate::descriptor::{PackageDescriptor, PackageKind};
use crate::error::{Error, Result};
use crate::hold::HoldPolicy;
use crate::registry::ArchiveRegistry;
use crate::store::{DEFAULT_HOST, DescriptorStore};
use crate::version::Version;

/// Name of the settings file inside the config directory.
pub const CONFIG_FILENAME: &str = "config.toml";

const APP_DIR: &str = "parcel";

fn default_base(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    pub install_root: PathBuf,
    pub cache_dir: PathBuf,
    pub signature_policy: SignaturePolicy,
    /// Shell command run in each package directory after it is unpacked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_command: Option<String>,
    pub compat_mode: CompatMode,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            install_root: default_base(dirs::data_dir()).join("packages"),
            cache_dir: default_base(dirs::cache_dir()),
            signature_policy: SignaturePolicy::default(),
            compile_command: None,
            compat_mode: CompatMode::default(),
        }
    }
}

/// The program packages are installed for, modeled as a built-in package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub name: String,
    pub version: Version,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_HOST.to_string(),
            version: Version::new([29, 1]),
        }
    }
}

/// A public key trusted to sign archive files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedKey {
    pub signer: String,
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Packages installed explicitly, in installation order.
    pub selected: Vec<String>,
    pub core: CoreSettings,
    pub host: HostSettings,
    /// Packages shipped with the host, by name.
    pub builtin: BTreeMap<String, Version>,
    pub archives: Vec<ArchiveSource>,
    pub holds: HoldPolicy,
    pub keys: Vec<TrustedKey>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected: Vec::new(),
            core: CoreSettings::default(),
            host: HostSettings::default(),
            builtin: BTreeMap::new(),
            archives: ArchiveRegistry::with_known().default_sources(),
            holds: HoldPolicy::new(),
            keys: Vec::new(),
        }
    }
}

impl Settings {
    /// `<config dir>/parcel/config.toml`
    pub fn default_path() -> PathBuf {
        default_base(dirs::config_dir()).join(CONFIG_FILENAME)
    }

    /// Settings rooted in one directory, used for self-contained setups.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            core: CoreSettings {
                install_root: base.join("packages"),
                cache_dir: base.join("cache"),
                ..CoreSettings::default()
            },
            ..Self::default()
        }
    }

    /// Load from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let settings: Self = ConfigStore::new().load(&NormalizedPath::new(path))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ConfigStore::new().save(&NormalizedPath::new(path), self)?;
        tracing::debug!(path = %path.display(), "saved settings");
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.archives.len());
        for archive in &self.archives {
            parcel_fs::validate_path_identifier(&archive.name)
                .map_err(|e| Error::Config(format!("archive name '{}': {e}", archive.name)))?;
            if seen.contains(&archive.name.as_str()) {
                return Err(Error::Config(format!("archive '{}' is listed twice", archive.name)));
            }
            seen.push(archive.name.as_str());
        }
        Ok(())
    }

    pub fn archive_names(&self) -> Vec<String> {
        self.archives.iter().map(|a| a.name.clone()).collect()
    }

    /// Keyring holding every configured key.
    pub fn keyring(&self) -> Result<Ed25519Keyring> {
        let mut keyring = Ed25519Keyring::new();
        for key in &self.keys {
            keyring
                .add_hex(&key.signer, &key.public_key)
                .map_err(|e| Error::Config(format!("key for '{}': {e}", key.signer)))?;
        }
        Ok(keyring)
    }

    /// A store holding the host and the configured built-in packages.
    pub fn new_store(&self) -> Result<DescriptorStore> {
        let mut store = DescriptorStore::new(&self.host.name, self.host.version.clone())
            .with_compat_mode(self.core.compat_mode);
        for (name, version) in &self.builtin {
            let desc = PackageDescriptor::new(name, version.clone(), PackageKind::Builtin)?;
            store.add_builtin(desc);
        }
        store.set_selected(self.selected.clone());
        Ok(store)
    }
}
