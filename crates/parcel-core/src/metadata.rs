//! Reading and writing package metadata.
//!
//! Three formats describe packages:
//!
//! - the archive index (`archive-contents`), one entry per available version:
//!
//!   ```text
//!   (1
//!    (foo . [(1 0) ((bar (2 0))) "Foo things" tar ((:url . "https://example.org"))])
//!    (bar . [(2 1) nil "Bar" single nil]))
//!   ```
//!
//! - the description file `<name>-pkg.el` in every install directory:
//!
//!   ```text
//!   (define-package "foo" "1.0" "Foo things" '((bar "2.0")) :url "https://example.org")
//!   ```
//!
//! - the header comments of a single `.el` file (`;; Version:`,
//!   `;; Package-Requires:` and friends).

use std::sync::LazyLock;

use regex::Regex;

use crate::descriptor::{PackageDescriptor, PackageKind, Requirement};
use crate::error::MetadataError;
use crate::sexp::{self, Value};
use crate::version::Version;

/// Archive index format understood by this reader.
pub const ARCHIVE_FORMAT_VERSION: i64 = 1;

/// Version from either a list of integers `(1 0)` or a string `"1.0"`.
fn version_from_value(value: &Value) -> Result<Version, MetadataError> {
    if let Some(text) = value.as_str() {
        return Ok(text.parse()?);
    }
    let items = value
        .as_list()
        .ok_or_else(|| MetadataError::invalid("version", format!("expected a list, got {value}")))?;
    let parts = items
        .iter()
        .map(|item| {
            item.as_int()
                .ok_or_else(|| MetadataError::invalid("version", format!("non-integer component {item}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Version::new(parts))
}

/// Requirements from `((name version) ...)`.
fn requirements_from_value(value: &Value) -> Result<Vec<Requirement>, MetadataError> {
    let items = value.unquote().as_list().ok_or_else(|| {
        MetadataError::invalid("requirements", format!("expected a list, got {value}"))
    })?;
    items
        .iter()
        .map(|item| {
            let pair = item.as_list().ok_or_else(|| {
                MetadataError::invalid("requirement", format!("expected (name version), got {item}"))
            })?;
            let name = pair.first().and_then(Value::as_symbol).ok_or_else(|| {
                MetadataError::invalid("requirement", format!("missing package name in {item}"))
            })?;
            let min_version = match pair.get(1) {
                Some(version) => version_from_value(version)?,
                None => Version::default(),
            };
            Ok(Requirement::new(name, min_version))
        })
        .collect()
}

/// Extras from an alist: `((:url . "x") (:keywords "a" "b"))`.
fn extras_from_alist(value: &Value) -> Result<Vec<(String, Value)>, MetadataError> {
    let items = value
        .as_list()
        .ok_or_else(|| MetadataError::invalid("extras", format!("expected an alist, got {value}")))?;
    let mut extras = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Dotted(head, tail) if head.len() == 1 => {
                if let Some(key) = head[0].as_symbol() {
                    extras.push((key.to_string(), (**tail).clone()));
                }
            }
            Value::List(entry) if !entry.is_empty() => {
                if let Some(key) = entry[0].as_symbol() {
                    extras.push((key.to_string(), Value::List(entry[1..].to_vec())));
                }
            }
            other => {
                return Err(MetadataError::invalid("extras", format!("unexpected entry {other}")));
            }
        }
    }
    Ok(extras)
}

fn descriptor_from_entry(archive: &str, entry: &Value) -> Result<PackageDescriptor, MetadataError> {
    // `(name . [fields])` or, after dotted-list splicing, `(name fields...)`
    let (name, fields): (&Value, Vec<Value>) = match entry {
        Value::Dotted(head, tail) if head.len() == 1 => match &**tail {
            Value::Vector(fields) => (&head[0], fields.clone()),
            other => {
                return Err(MetadataError::invalid("archive entry", format!("unexpected body {other}")));
            }
        },
        Value::List(items) if items.len() >= 2 => match &items[1] {
            Value::Vector(fields) if items.len() == 2 => (&items[0], fields.clone()),
            _ => (&items[0], items[1..].to_vec()),
        },
        other => {
            return Err(MetadataError::invalid("archive entry", format!("unexpected form {other}")));
        }
    };

    let name = name
        .as_symbol()
        .ok_or_else(|| MetadataError::invalid("archive entry", format!("package name {name} is not a symbol")))?;
    if fields.len() < 4 {
        return Err(MetadataError::invalid(
            "archive entry",
            format!("{name}: expected at least 4 fields, got {}", fields.len()),
        ));
    }

    let version = version_from_value(&fields[0])?;
    let requirements = requirements_from_value(&fields[1])?;
    let summary = fields[2].as_str().unwrap_or_default();
    let kind_tag = fields[3].as_symbol().ok_or_else(|| {
        MetadataError::invalid("archive entry", format!("{name}: kind {} is not a symbol", fields[3]))
    })?;
    let kind = PackageKind::from_tag(kind_tag)?;
    if kind == PackageKind::Builtin || kind == PackageKind::Directory {
        return Err(MetadataError::invalid(
            "archive entry",
            format!("{name}: archives cannot serve '{kind_tag}' packages"),
        ));
    }

    let mut desc = PackageDescriptor::new(name, version, kind)?
        .with_summary(summary)
        .with_requirements(requirements)
        .with_archive(archive);
    if let Some(extras) = fields.get(4) {
        for (key, value) in extras_from_alist(extras)? {
            desc = desc.with_extra(&key, value);
        }
    }
    Ok(desc)
}

/// Parse an archive index.
///
/// Entries with an unknown kind are skipped with a warning; any other
/// malformed entry fails the whole index.
pub fn parse_archive_contents(archive: &str, text: &str) -> Result<Vec<PackageDescriptor>, MetadataError> {
    let root = sexp::parse_one(text)?;
    let items = root
        .as_list()
        .ok_or_else(|| MetadataError::invalid("archive index", "expected a list"))?;
    let (format, entries) = items
        .split_first()
        .ok_or_else(|| MetadataError::invalid("archive index", "missing format version"))?;
    if format.as_int() != Some(ARCHIVE_FORMAT_VERSION) {
        return Err(MetadataError::invalid(
            "archive index",
            format!("unsupported format version {format}"),
        ));
    }

    let mut descriptors = Vec::with_capacity(entries.len());
    for entry in entries {
        match descriptor_from_entry(archive, entry) {
            Ok(desc) => descriptors.push(desc),
            Err(MetadataError::UnknownKind { kind }) => {
                tracing::warn!(archive, kind = %kind, "skipping archive entry of unknown kind");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(descriptors)
}

/// Parse a `define-package` description file.
///
/// The returned descriptor has kind [`PackageKind::Bundle`] unless the file
/// carries a `:kind` property.
pub fn parse_description_file(text: &str) -> Result<PackageDescriptor, MetadataError> {
    let form = sexp::parse_all(text)?
        .into_iter()
        .find(|form| {
            form.as_list()
                .and_then(|items| items.first())
                .and_then(Value::as_symbol)
                == Some("define-package")
        })
        .ok_or_else(|| MetadataError::invalid("description file", "no define-package form"))?;
    let items = form.as_list().unwrap_or_default();

    let name = items
        .get(1)
        .and_then(Value::as_text)
        .ok_or_else(|| MetadataError::invalid("description file", "missing package name"))?;
    let version: Version = items
        .get(2)
        .and_then(Value::as_str)
        .ok_or_else(|| MetadataError::invalid("description file", "missing version string"))?
        .parse()?;
    let summary = items.get(3).and_then(Value::as_str).unwrap_or_default();
    let requirements = match items.get(4) {
        Some(value) if !value.unquote().is_nil() => requirements_from_value(value)?,
        _ => Vec::new(),
    };

    let mut kind = PackageKind::Bundle;
    let mut extras = Vec::new();
    let mut props = items.get(5..).unwrap_or_default().iter();
    while let Some(key) = props.next() {
        let key = key
            .as_symbol()
            .filter(|k| k.starts_with(':'))
            .ok_or_else(|| MetadataError::invalid("description file", format!("expected keyword, got {key}")))?;
        let value = props
            .next()
            .ok_or_else(|| MetadataError::invalid("description file", format!("{key} has no value")))?
            .unquote()
            .clone();
        if key == ":kind" {
            kind = PackageKind::from_tag(value.as_text().unwrap_or_default())?;
        } else {
            extras.push((key.to_string(), value));
        }
    }

    let mut desc = PackageDescriptor::new(name, version, kind)?
        .with_summary(summary)
        .with_requirements(requirements);
    for (key, value) in extras {
        desc = desc.with_extra(&key, value);
    }
    Ok(desc)
}

fn quote_if_list(value: &Value) -> Value {
    match value {
        Value::List(items) if !items.is_empty() => Value::quote(value.clone()),
        Value::Dotted(..) | Value::Symbol(_) => Value::quote(value.clone()),
        other => other.clone(),
    }
}

/// Render the description file for an installed package.
pub fn write_description_file(desc: &PackageDescriptor) -> String {
    let requirements: Vec<Value> = desc
        .requirements()
        .iter()
        .map(|req| {
            Value::List(vec![
                Value::symbol(&req.name),
                Value::string(req.min_version.to_string()),
            ])
        })
        .collect();

    let mut form = vec![
        Value::symbol("define-package"),
        Value::string(desc.name()),
        Value::string(desc.version().to_string()),
        Value::string(desc.summary()),
        if requirements.is_empty() {
            Value::symbol("nil")
        } else {
            Value::quote(Value::List(requirements))
        },
    ];
    if desc.kind() != PackageKind::Bundle {
        form.push(Value::symbol(":kind"));
        form.push(Value::quote(Value::symbol(desc.kind().tag())));
    }
    for (key, value) in desc.extras() {
        form.push(Value::symbol(format!(":{key}")));
        form.push(quote_if_list(value));
    }

    format!(
        ";; Generated package description for {}  -*- no-byte-compile: t -*-\n{}\n",
        desc.name(),
        Value::List(form)
    )
}

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^;+\s*([A-Za-z][A-Za-z-]*)\s*:\s*(.*?)\s*$").expect("valid header regex"));

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^;;;\s*(\S+?)\.el\s+---\s*(.*?)\s*(?:-\*-.*-\*-)?\s*$").expect("valid title regex")
});

/// Build a descriptor from the header comments of a single `.el` file.
///
/// `Package-Version` wins over `Version`; one of them is required.
pub fn parse_file_headers(text: &str) -> Result<PackageDescriptor, MetadataError> {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default();
    let captures = TITLE_RE
        .captures(first)
        .ok_or_else(|| MetadataError::invalid("file header", "first line must be ';;; NAME.el --- SUMMARY'"))?;
    let name = captures[1].to_string();
    let summary = captures[2].to_string();

    let mut version = None;
    let mut package_version = None;
    let mut requires = None;
    let mut extras: Vec<(String, Value)> = Vec::new();

    for line in lines {
        if line.starts_with(";;; Code:") {
            break;
        }
        let Some(captures) = HEADER_RE.captures(line) else {
            continue;
        };
        let value = captures[2].to_string();
        match captures[1].to_ascii_lowercase().as_str() {
            "version" => version = Some(value),
            "package-version" => package_version = Some(value),
            "package-requires" => requires = Some(value),
            "keywords" => {
                let words = value
                    .split([',', ' '])
                    .filter(|w| !w.is_empty())
                    .map(Value::string)
                    .collect();
                extras.push(("keywords".into(), Value::List(words)));
            }
            "url" | "homepage" => extras.push(("url".into(), Value::string(value))),
            "maintainer" => extras.push(("maintainer".into(), Value::string(value))),
            "author" => extras.push(("authors".into(), Value::List(vec![Value::string(value)]))),
            _ => {}
        }
    }

    let version: Version = package_version
        .or(version)
        .ok_or_else(|| MetadataError::invalid("file header", format!("{name}.el has no Version header")))?
        .parse()?;
    let requirements = match requires {
        Some(text) => requirements_from_value(&sexp::parse_one(&text)?)?,
        None => Vec::new(),
    };

    let mut desc = PackageDescriptor::new(name, version, PackageKind::SingleFile)?
        .with_summary(summary)
        .with_requirements(requirements);
    for (key, value) in extras {
        desc = desc.with_extra(&key, value);
    }
    Ok(desc)
}
