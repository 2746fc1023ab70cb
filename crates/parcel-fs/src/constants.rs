//! Well-known file names inside package and cache directories.

/// Fixed file names used by archives and installed packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFile {
    /// The archive index served at the root of every archive
    ArchiveContents,
    /// Directory under the cache root holding one subdirectory per archive
    ArchivesDir,
    /// Suffix of the description file (`<name>-pkg.el`)
    DescriptionSuffix,
    /// Suffix of the generated autoloads file (`<name>-autoloads.el`)
    AutoloadsSuffix,
    /// Extension of detached signature sidecars
    SignatureExtension,
    /// Extension of the marker recording verified signatures
    SignedExtension,
}

impl PackageFile {
    /// Get the string representation of the name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArchiveContents => "archive-contents",
            Self::ArchivesDir => "archives",
            Self::DescriptionSuffix => "-pkg.el",
            Self::AutoloadsSuffix => "-autoloads.el",
            Self::SignatureExtension => "sig",
            Self::SignedExtension => "signed",
        }
    }

    /// Description file name for a package.
    pub fn description_file(name: &str) -> String {
        format!("{}{}", name, Self::DescriptionSuffix.as_str())
    }

    /// Autoloads file name for a package.
    pub fn autoloads_file(name: &str) -> String {
        format!("{}{}", name, Self::AutoloadsSuffix.as_str())
    }

    /// Signature sidecar name for a file served by an archive.
    pub fn signature_for(file: &str) -> String {
        format!("{}.{}", file, Self::SignatureExtension.as_str())
    }
}

impl AsRef<str> for PackageFile {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for PackageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
