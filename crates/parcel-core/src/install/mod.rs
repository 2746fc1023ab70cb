//! Placing packages on disk and removing them.
//!
//! Every package lives in `<root>/<name>-<version>/`. After the payload is
//! written the engine generates `<name>-autoloads.el`, writes the
//! `<name>-pkg.el` description, records verified signatures in
//! `<name>-<version>.signed` and runs the compile step.

pub mod autoloads;
pub mod bundle;
pub mod compile;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parcel_fs::{NormalizedPath, PackageFile, RobustnessConfig};

use crate::archive::GoodSignature;
use crate::descriptor::{PackageDescriptor, PackageKind};
use crate::error::{CompileError, InstallError};
use crate::metadata;

pub use compile::{CommandCompiler, Compiler, NoopCompiler};

/// A package that was written to disk.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    /// The descriptor with `install_dir` set.
    pub descriptor: PackageDescriptor,
    /// Payload files written, excluding generated ones.
    pub files: Vec<PathBuf>,
    /// Set when the compile step failed; the install itself stands.
    pub compile_error: Option<CompileError>,
}

/// Writes and removes package directories below one install root.
#[derive(Clone)]
pub struct InstallEngine {
    root: PathBuf,
    compiler: Arc<dyn Compiler>,
    robustness: RobustnessConfig,
}

impl std::fmt::Debug for InstallEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallEngine")
            .field("root", &self.root)
            .field("robustness", &self.robustness)
            .finish_non_exhaustive()
    }
}

impl InstallEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            compiler: Arc::new(NoopCompiler),
            robustness: RobustnessConfig::default(),
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.robustness = robustness;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<name>-<version>`
    pub fn package_dir(&self, desc: &PackageDescriptor) -> PathBuf {
        self.root.join(desc.full_name())
    }

    fn write(&self, path: &Path, content: &[u8]) -> Result<(), InstallError> {
        parcel_fs::io::write_atomic(&NormalizedPath::new(path), content, self.robustness)?;
        Ok(())
    }

    /// Write a fetched artifact into its package directory and finish the install.
    ///
    /// Existing files in the directory are overwritten.
    pub fn unpack(
        &self,
        desc: &PackageDescriptor,
        bytes: &[u8],
        signatures: &[GoodSignature],
    ) -> Result<InstalledPackage, InstallError> {
        let dir = self.package_dir(desc);
        tracing::info!(package = %desc, dir = %dir.display(), "unpacking");

        let files = match desc.kind() {
            PackageKind::Builtin => {
                return Err(InstallError::Builtin {
                    package: desc.name().to_string(),
                });
            }
            PackageKind::Directory => {
                return Err(InstallError::BadLayout {
                    package: desc.full_name(),
                    reason: "directory packages are installed from a local path".into(),
                });
            }
            PackageKind::SingleFile => {
                let path = dir.join(format!("{}.el", desc.name()));
                self.write(&path, bytes)?;
                vec![path]
            }
            PackageKind::Bundle => bundle::extract(desc, bytes, &dir)?,
        };

        self.finish(desc, &dir, files, signatures)
    }

    /// Install the package found in the local directory `src`.
    ///
    /// The description comes from a `*-pkg.el` file in `src`, or else from
    /// the headers of the `.el` file named after the package.
    pub fn install_directory(&self, src: &Path) -> Result<InstalledPackage, InstallError> {
        let label = src.display().to_string();
        let desc = read_directory_description(src)?.with_kind(PackageKind::Directory);
        let dir = self.package_dir(&desc);
        tracing::info!(package = %desc, src = %src.display(), "installing from directory");

        let sources = autoloads::source_files(src).map_err(|e| InstallError::io(&label, src, e))?;
        let mut files = Vec::with_capacity(sources.len());
        for source in sources {
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let target = dir.join(file_name);
            if target != source {
                let content = std::fs::read(&source).map_err(|e| InstallError::io(&label, &source, e))?;
                self.write(&target, &content)?;
            }
            files.push(target);
        }

        self.finish(&desc, &dir, files, &[])
    }

    fn finish(
        &self,
        desc: &PackageDescriptor,
        dir: &Path,
        files: Vec<PathBuf>,
        signatures: &[GoodSignature],
    ) -> Result<InstalledPackage, InstallError> {
        std::fs::create_dir_all(dir).map_err(|e| InstallError::io(desc.name(), dir, e))?;
        autoloads::generate(desc.name(), dir)?;

        let description = dir.join(PackageFile::description_file(desc.name()));
        self.write(&description, metadata::write_description_file(desc).as_bytes())?;

        if !signatures.is_empty() {
            let record: String = signatures.iter().map(|s| format!("{s}\n")).collect();
            let path = dir.join(format!("{}.{}", desc.full_name(), PackageFile::SignedExtension));
            self.write(&path, record.as_bytes())?;
        }

        let compile_error = match self.compiler.compile(desc, dir) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(package = %desc, error = %e, "compile step failed, keeping the install");
                Some(e)
            }
        };

        let descriptor = desc
            .clone()
            .with_install_dir(dir)
            .with_signed(desc.is_signed() || !signatures.is_empty());
        Ok(InstalledPackage {
            descriptor,
            files,
            compile_error,
        })
    }

    /// Remove the install directory of `desc`.
    ///
    /// Directories that do not lie strictly below the install root are refused.
    pub fn delete(&self, desc: &PackageDescriptor) -> Result<(), InstallError> {
        if desc.kind() == PackageKind::Builtin {
            return Err(InstallError::Builtin {
                package: desc.name().to_string(),
            });
        }
        let dir = desc
            .install_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.package_dir(desc));

        let root = NormalizedPath::new(resolve(&self.root));
        let target = NormalizedPath::new(resolve(&dir));
        if target == root || !target.is_within(&root) {
            return Err(InstallError::OutsideRoot { path: dir });
        }

        if !dir.exists() {
            tracing::warn!(package = %desc, dir = %dir.display(), "install directory already gone");
            return Ok(());
        }
        std::fs::remove_dir_all(&dir).map_err(|e| InstallError::io(desc.name(), &dir, e))?;
        tracing::info!(package = %desc, "deleted");
        Ok(())
    }
}

/// Canonical form of `path` when it exists, the path itself otherwise.
fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn read_directory_description(src: &Path) -> Result<PackageDescriptor, InstallError> {
    let label = src.display().to_string();
    let metadata_error = |source| InstallError::Metadata {
        package: label.clone(),
        source,
    };
    let entries = std::fs::read_dir(src).map_err(|e| InstallError::io(&label, src, e))?;
    let mut names: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    names.sort();

    let suffix = PackageFile::DescriptionSuffix.as_str();
    if let Some(description) = names
        .iter()
        .find(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(suffix)))
    {
        let text = std::fs::read_to_string(description).map_err(|e| InstallError::io(&label, description, e))?;
        return metadata::parse_description_file(&text).map_err(metadata_error);
    }

    let sources = autoloads::source_files(src).map_err(|e| InstallError::io(&label, src, e))?;
    let mut last_error = None;
    for source in &sources {
        let text = std::fs::read_to_string(source).map_err(|e| InstallError::io(&label, source, e))?;
        match metadata::parse_file_headers(&text) {
            Ok(desc) if source.file_stem().and_then(|s| s.to_str()) == Some(desc.name()) => return Ok(desc),
            Ok(desc) => {
                tracing::debug!(file = %source.display(), package = %desc, "header names another package");
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(metadata_error(last_error.unwrap_or_else(|| {
        crate::error::MetadataError::invalid("package directory", "no description file and no package headers")
    })))
}
