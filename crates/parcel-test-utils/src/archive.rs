//! [`TestArchive`]: a package archive laid out in a temporary directory.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::signing::TestSigner;
use crate::tarball;

/// Source text of a single-file package with the usual headers.
pub fn single_file_source(name: &str, version: &str, deps: &[(&str, &str)]) -> String {
    let requires: String = deps.iter().map(|(d, m)| format!("({d} \"{m}\")")).collect();
    format!(
        ";;; {name}.el --- The {name} package  -*- lexical-binding: t -*-\n\
         ;; Version: {version}\n\
         ;; Package-Requires: ({requires})\n\
         ;;; Code:\n\n\
         ;;;###autoload\n\
         (defun {name}-hello ()\n  \"Say hello from {name}.\"\n  (interactive)\n  (message \"{name}\"))\n\n\
         (provide '{name})\n\
         ;;; {name}.el ends here\n"
    )
}

/// `"1.2.3"` as the index form `(1 2 3)`.
fn version_list(version: &str) -> String {
    format!("({})", version.replace('.', " "))
}

/// A directory served as an archive: `archive-contents` plus artifacts.
///
/// Entries are collected as they are added; [`TestArchive::publish`] writes
/// the index. With a signer every file gets a `.sig` sidecar.
///
/// # Example
///
/// ```rust,no_run
/// use parcel_test_utils::archive::TestArchive;
///
/// let mut archive = TestArchive::new("local");
/// archive
///     .add_single("bar", "2.1", &[])
///     .add_single("foo", "1.0", &[("bar", "2.0")])
///     .publish();
/// assert!(archive.path().join("foo-1.0.el").is_file());
/// ```
pub struct TestArchive {
    name: String,
    dir: TempDir,
    entries: Vec<String>,
    signer: Option<TestSigner>,
}

impl TestArchive {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dir: TempDir::new().unwrap(),
            entries: Vec::new(),
            signer: None,
        }
    }

    /// Sign every file written from now on.
    pub fn signed_by(mut self, signer: TestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The location string to configure for this archive.
    pub fn location(&self) -> String {
        self.path().to_string_lossy().into_owned()
    }

    /// Write `file` and, with a signer, its sidecar.
    pub fn write_file(&self, file: &str, content: &[u8]) {
        fs::write(self.path().join(file), content).unwrap();
        if let Some(signer) = &self.signer {
            fs::write(self.path().join(format!("{file}.sig")), signer.sidecar(content)).unwrap();
        }
    }

    /// Replace the sidecar of `file`.
    pub fn write_sidecar(&self, file: &str, sidecar: &str) {
        fs::write(self.path().join(format!("{file}.sig")), sidecar).unwrap();
    }

    pub fn remove_file(&self, file: &str) {
        fs::remove_file(self.path().join(file)).unwrap();
    }

    fn index_entry(&mut self, name: &str, version: &str, deps: &[(&str, &str)], kind: &str) {
        let reqs: String = deps
            .iter()
            .map(|(d, m)| format!("({d} {})", version_list(m)))
            .collect();
        let reqs = if reqs.is_empty() { "nil".to_string() } else { format!("({reqs})") };
        self.entries.push(format!(
            "({name} . [{} {reqs} \"The {name} package\" {kind} ((:url . \"https://example.org/{name}\"))])",
            version_list(version)
        ));
    }

    /// Add a single-file package `<name>-<version>.el`.
    pub fn add_single(&mut self, name: &str, version: &str, deps: &[(&str, &str)]) -> &mut Self {
        let source = single_file_source(name, version, deps);
        self.write_file(&format!("{name}-{version}.el"), source.as_bytes());
        self.index_entry(name, version, deps, "single");
        self
    }

    /// Add a bundle `<name>-<version>.tar` holding `<name>.el` and `files`.
    pub fn add_bundle(&mut self, name: &str, version: &str, deps: &[(&str, &str)], files: &[(&str, &str)]) -> &mut Self {
        let main = format!("{name}.el");
        let source = single_file_source(name, version, deps);
        let mut all: Vec<(&str, &str)> = vec![(main.as_str(), source.as_str())];
        all.extend_from_slice(files);
        let bytes = tarball::bundle(&format!("{name}-{version}"), &all);
        self.add_raw_bundle(name, version, deps, &bytes)
    }

    /// Add a bundle whose tar bytes are given verbatim.
    pub fn add_raw_bundle(&mut self, name: &str, version: &str, deps: &[(&str, &str)], bytes: &[u8]) -> &mut Self {
        self.write_file(&format!("{name}-{version}.tar"), bytes);
        self.index_entry(name, version, deps, "tar");
        self
    }

    /// The index text for everything added so far.
    pub fn contents(&self) -> String {
        format!("(1\n {})\n", self.entries.join("\n "))
    }

    /// Write `archive-contents` (and its sidecar with a signer).
    pub fn publish(&self) -> &Self {
        self.write_file("archive-contents", self.contents().as_bytes());
        self
    }
}
