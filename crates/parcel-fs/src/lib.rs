//! Filesystem primitives for parcel
//!
//! Provides dot-resolving path handling, atomic locked writes, checksums and
//! a format-agnostic configuration store.

pub mod checksum;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod path;

pub use config::{ConfigStore, Format};
pub use constants::PackageFile;
pub use error::{Error, Result};
pub use io::RobustnessConfig;
pub use path::{NormalizedPath, validate_path_identifier};
