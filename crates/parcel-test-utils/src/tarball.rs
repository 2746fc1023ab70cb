//! Tar bundles for install tests.
//!
//! Headers are written byte by byte so that entries the `tar` crate refuses
//! to create (absolute paths, `..` components) can still be produced.

use tar::{EntryType, Header};

/// One entry of a test bundle.
#[derive(Debug, Clone, Copy)]
pub enum TarEntry<'a> {
    File(&'a str, &'a str),
    Dir(&'a str),
    Symlink(&'a str, &'a str),
    HardLink(&'a str, &'a str),
}

fn copy_field(field: &mut [u8; 100], value: &str) {
    assert!(value.len() < field.len(), "tar name too long for a test fixture: {value}");
    field[..value.len()].copy_from_slice(value.as_bytes());
}

fn raw_header(path: &str, entry_type: EntryType, size: u64, link: Option<&str>) -> Header {
    let mut header = Header::new_gnu();
    {
        let old = header.as_old_mut();
        copy_field(&mut old.name, path);
        if let Some(link) = link {
            copy_field(&mut old.linkname, link);
        }
    }
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(if entry_type == EntryType::Directory { 0o755 } else { 0o644 });
    header.set_mtime(0);
    header.set_cksum();
    header
}

/// Build a tar archive from `entries`, paths taken verbatim.
pub fn build(entries: &[TarEntry<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let result = match *entry {
            TarEntry::File(path, content) => {
                let header = raw_header(path, EntryType::Regular, content.len() as u64, None);
                builder.append(&header, content.as_bytes())
            }
            TarEntry::Dir(path) => builder.append(&raw_header(path, EntryType::Directory, 0, None), std::io::empty()),
            TarEntry::Symlink(path, target) => {
                builder.append(&raw_header(path, EntryType::Symlink, 0, Some(target)), std::io::empty())
            }
            TarEntry::HardLink(path, target) => {
                builder.append(&raw_header(path, EntryType::Link, 0, Some(target)), std::io::empty())
            }
        };
        result.expect("appending to an in-memory tar");
    }
    builder.into_inner().expect("finishing an in-memory tar")
}

/// A well-formed bundle: every file under `<root>/`.
pub fn bundle(root: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let dir = format!("{root}/");
    let paths: Vec<String> = files.iter().map(|(name, _)| format!("{root}/{name}")).collect();
    let mut entries = vec![TarEntry::Dir(&dir)];
    entries.extend(
        paths
            .iter()
            .zip(files)
            .map(|(path, (_, content))| TarEntry::File(path, content)),
    );
    build(&entries)
}
