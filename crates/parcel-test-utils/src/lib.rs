//! Shared test fixtures for the parcel workspace.
//!
//! A dev-dependency only; never published.
//!
//! # Modules
//!
//! - [`archive`]: [`TestArchive`](archive::TestArchive), a package archive in a temporary directory
//! - [`signing`]: deterministic Ed25519 signers producing signature sidecars
//! - [`tarball`]: tar bundles, including malformed and malicious ones

pub mod archive;
pub mod signing;
pub mod tarball;
