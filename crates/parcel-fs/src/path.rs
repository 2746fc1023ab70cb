//! Normalized path handling for cross-platform compatibility

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A path normalized to use forward slashes internally.
///
/// Dot segments are resolved on construction. A `..` that would climb above
/// the start of a relative path is dropped, and one that would climb above
/// the root of an absolute path stays at the root, so a normalized path can
/// be checked against a base directory with [`NormalizedPath::is_within`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedPath {
    /// Internal representation always uses forward slashes
    inner: String,
}

impl NormalizedPath {
    /// Create a new NormalizedPath from any path-like input.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let raw = path.as_ref().to_string_lossy().replace('\\', "/");
        Self {
            inner: clean(&raw),
        }
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to a platform-native PathBuf for I/O operations.
    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// Join this path with a segment, resolving dot segments in the result.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.replace('\\', "/");
        let joined = if self.inner.ends_with('/') {
            format!("{}{}", self.inner, segment)
        } else {
            format!("{}/{}", self.inner, segment)
        };
        Self {
            inner: clean(&joined),
        }
    }

    /// Get the parent directory.
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.inner.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) if idx > 0 => Some(Self {
                inner: trimmed[..idx].to_string(),
            }),
            Some(0) if trimmed.len() > 1 => Some(Self {
                inner: "/".to_string(),
            }),
            _ => None,
        }
    }

    /// Get the file name component.
    pub fn file_name(&self) -> Option<&str> {
        let trimmed = self.inner.trim_end_matches('/');
        trimmed.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Whether this path is `base` itself or lies below it.
    pub fn is_within(&self, base: &NormalizedPath) -> bool {
        if self.inner == base.inner {
            return true;
        }
        let prefix = if base.inner.ends_with('/') {
            base.inner.clone()
        } else {
            format!("{}/", base.inner)
        };
        self.inner.starts_with(&prefix)
    }

    /// Check if this path exists on the filesystem.
    pub fn exists(&self) -> bool {
        self.to_native().exists()
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.to_native().is_dir()
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.to_native().is_file()
    }

    /// Check if this appears to be a network path (`//server/share`).
    pub fn is_network_path(&self) -> bool {
        self.inner.starts_with("//")
    }

    /// Get the extension if present.
    pub fn extension(&self) -> Option<&str> {
        self.file_name().and_then(|name| {
            let idx = name.rfind('.')?;
            if idx == 0 {
                None
            } else {
                Some(&name[idx + 1..])
            }
        })
    }
}

/// Resolve `.` and `..` segments and collapse repeated separators.
fn clean(raw: &str) -> String {
    let (prefix, rest) = if raw.starts_with("//") && !raw.starts_with("///") {
        ("//", &raw[2..])
    } else if let Some(rest) = raw.strip_prefix('/') {
        ("/", rest)
    } else if has_drive_prefix(raw) {
        (&raw[..3], &raw[3..])
    } else {
        ("", raw)
    };

    let mut parts: Vec<&str> = Vec::new();
    for component in rest.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let body = parts.join("/");
    if prefix.is_empty() && body.is_empty() {
        ".".to_string()
    } else {
        format!("{prefix}{body}")
    }
}

fn has_drive_prefix(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

/// Validate a single path component used as an identifier.
///
/// Package and archive names become directory names, so they must not be
/// empty, hidden, or contain separators, parent references or control
/// characters.
pub fn validate_path_identifier(value: &str) -> Result<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.starts_with('.') {
        Some("must not start with '.'")
    } else if value.contains('/') || value.contains('\\') {
        Some("must not contain path separators")
    } else if value.contains("..") {
        Some("must not contain '..'")
    } else if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        Some("must not contain whitespace or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidIdentifier {
            value: value.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl std::fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<&str> for NormalizedPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NormalizedPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for NormalizedPath {
    fn from(p: PathBuf) -> Self {
        Self::new(p)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}
