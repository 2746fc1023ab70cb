//! Package management core for parcel.
//!
//! This crate resolves, downloads, verifies, installs, upgrades and
//! activates versioned packages from remote or local archives. The
//! [`PackageManager`] ties the pieces together:
//!
//! - [`DescriptorStore`]: installed, built-in and available packages
//! - [`ArchiveClient`]: index and artifact fetching with signature checks
//! - [`TransactionResolver`]: dependency-closed, ordered install plans
//! - [`InstallEngine`]: unpacking, autoloads, description files, compile step
//! - [`ActivationEngine`]: wiring installed packages into a [`Host`]

pub mod activate;
pub mod archive;
pub mod compat;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod hold;
pub mod install;
pub mod manager;
pub mod metadata;
pub mod registry;
pub mod resolver;
pub mod sexp;
pub mod store;
pub mod version;

pub use activate::{ActivateOptions, ActivationEngine, ActivationReport, ActivationState, Host, ProcessHost};
pub use archive::{
    ArchiveClient, ArchiveSource, Ed25519Keyring, Fetcher, GoodSignature, LocalFetcher, RefreshOutcome,
    SignaturePolicy, SignatureVerifier, SourceFetcher, VerifiedArtifact,
};
pub use config::{CONFIG_FILENAME, Settings};
pub use descriptor::{PackageDescriptor, PackageKind, Requirement};
pub use error::{
    ActivationError, BlockReason, CompileError, Error, FetchError, InstallError, MetadataError, Result,
    SignatureError, UnsatisfiableError,
};
pub use hold::{Hold, HoldPolicy};
pub use install::{CommandCompiler, Compiler, InstallEngine, InstalledPackage, NoopCompiler};
pub use manager::{InitReport, InstallReport, PackageManager};
pub use registry::{ArchiveRegistry, KnownArchive};
pub use resolver::TransactionResolver;
pub use store::DescriptorStore;
pub use version::Version;
