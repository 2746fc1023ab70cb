//! Error types for parcel-core.
//!
//! Each failure class has its own type so callers can branch on it:
//! [`FetchError`], [`SignatureError`], [`UnsatisfiableError`],
//! [`InstallError`] and [`ActivationError`]. [`Error`] wraps all of them for
//! the top-level [`PackageManager`](crate::PackageManager) operations.

use std::fmt;
use std::path::PathBuf;

use crate::sexp::SexpError;
use crate::version::{Version, VersionParseError};

/// Result type for parcel-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Network or I/O failure while talking to an archive.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{location} not found")]
    NotFound { location: String },

    #[error("HTTP request to {url} failed: {message}")]
    Http {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse index of archive '{archive}': {reason}")]
    Parse { archive: String, reason: String },

    #[error("index of archive '{archive}' failed verification: {source}")]
    Signature {
        archive: String,
        #[source]
        source: SignatureError,
    },

    #[error("a download from archive '{archive}' is already in progress")]
    Busy { archive: String },

    #[error("unsupported archive location '{location}'")]
    UnsupportedLocation { location: String },
}

/// Signature verification failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("no signature found for {file}")]
    Missing { file: String },

    #[error("signature on {file} uses unknown key {key_id}")]
    UnknownKey { file: String, key_id: String },

    #[error("bad signature on {file} from key {key_id}")]
    Bad { file: String, key_id: String },

    #[error("malformed signature file for {file}: {reason}")]
    Malformed { file: String, reason: String },

    #[error("no good signature found for {file}")]
    NoGood { file: String },

    /// A signature this build cannot check, such as OpenPGP.
    #[error("signature file for {file} is {format}, which cannot be checked")]
    Unsupported { file: String, format: String },
}

/// Why no candidate satisfied a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// No descriptor with that name exists anywhere.
    Absent,
    /// Candidates exist but all are older than required.
    TooOld { best: Version },
    /// A sufficient candidate exists but the package is held at another version.
    Held { held: Version },
    /// A sufficient candidate exists but the package is disabled.
    Disabled,
}

/// A requirement that no installed, built-in or available package satisfies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiableError {
    pub name: String,
    /// Minimum version asked for; empty when any version would do.
    pub required: Version,
    pub cause: BlockReason,
}

impl fmt::Display for UnsatisfiableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let any_version = self.required.parts().is_empty();
        match &self.cause {
            BlockReason::Absent if any_version => write!(f, "package '{}' is unavailable", self.name),
            BlockReason::Absent => {
                write!(f, "package '{}-{}' is unavailable", self.name, self.required)
            }
            BlockReason::TooOld { best } => write!(
                f,
                "need package '{}-{}', but only {} is available",
                self.name, self.required, best
            ),
            BlockReason::Held { held } if any_version => {
                write!(f, "package '{}' is held at version {}", self.name, held)
            }
            BlockReason::Held { held } => write!(
                f,
                "package '{}' held at version {}, but version {} required",
                self.name, held, self.required
            ),
            BlockReason::Disabled => write!(f, "required package '{}' is disabled", self.name),
        }
    }
}

impl std::error::Error for UnsatisfiableError {}

/// Malformed metadata: archive index, description file or file headers.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    Syntax(#[from] SexpError),

    #[error(transparent)]
    Version(#[from] VersionParseError),

    #[error("unknown package kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("invalid {what}: {reason}")]
    Invalid { what: String, reason: String },
}

impl MetadataError {
    pub fn invalid(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to place a package on disk.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("archive for {package} contains unsafe path '{entry}'")]
    UnsafePath { package: String, entry: String },

    #[error("archive for {package} has a bad layout: {reason}")]
    BadLayout { package: String, reason: String },

    #[error("failed to read archive for {package}: {source}")]
    Tar {
        package: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error installing {package} at {path}: {source}")]
    Io {
        package: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metadata for {package}: {source}")]
    Metadata {
        package: String,
        #[source]
        source: MetadataError,
    },

    #[error(transparent)]
    Fs(#[from] parcel_fs::Error),

    #[error("{package} is built in and cannot be installed")]
    Builtin { package: String },

    #[error("refusing to touch {path}: outside the install root")]
    OutsideRoot { path: PathBuf },
}

impl InstallError {
    pub fn io(package: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            package: package.to_string(),
            path: path.into(),
            source,
        }
    }
}

/// The build step failed. Reported, never rolled back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("compiling {package} with '{command}' failed{}", .exit_code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
pub struct CompileError {
    pub package: String,
    pub command: String,
    pub exit_code: Option<i32>,
}

/// Failure to wire an installed package into the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    #[error("unable to activate {package}: required package {dependency}-{required} is unavailable")]
    MissingDependency {
        package: String,
        dependency: String,
        required: Version,
    },

    #[error("failed to load {file} for {package}: {reason}")]
    LoadFailed {
        package: String,
        file: PathBuf,
        reason: String,
    },

    #[error("{package} is not installed")]
    NotInstalled { package: String },
}

/// Errors that can occur in parcel-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Unsatisfiable(#[from] UnsatisfiableError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Deleting a package that other installed packages still require.
    #[error("package '{package}' is used by {}", .dependents.join(", "))]
    InUse {
        package: String,
        dependents: Vec<String>,
    },

    /// Skipped because a package it requires failed earlier in the batch.
    #[error("skipped {package}: required package '{dependency}' failed to install")]
    DependencyFailed { package: String, dependency: String },

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Fs(#[from] parcel_fs::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn unsatisfiable_messages_carry_name_and_versions() {
        let held = UnsatisfiableError {
            name: "bar".into(),
            required: v("2.0"),
            cause: BlockReason::Held { held: v("1.5") },
        };
        assert_eq!(
            held.to_string(),
            "package 'bar' held at version 1.5, but version 2.0 required"
        );

        let too_old = UnsatisfiableError {
            name: "bar".into(),
            required: v("2.0"),
            cause: BlockReason::TooOld { best: v("1.5") },
        };
        assert!(too_old.to_string().contains("only 1.5 is available"));

        let absent = UnsatisfiableError {
            name: "baz".into(),
            required: v("1"),
            cause: BlockReason::Absent,
        };
        assert_eq!(absent.to_string(), "package 'baz-1' is unavailable");

        let held_any = UnsatisfiableError {
            name: "bar".into(),
            required: Version::default(),
            cause: BlockReason::Held { held: v("1.5") },
        };
        assert_eq!(held_any.to_string(), "package 'bar' is held at version 1.5");
    }

    #[test]
    fn in_use_lists_dependents() {
        let err = Error::InUse {
            package: "dash".into(),
            dependents: vec!["magit-3.3".into(), "s-1.12".into()],
        };
        assert_eq!(err.to_string(), "package 'dash' is used by magit-3.3, s-1.12");
    }
}
