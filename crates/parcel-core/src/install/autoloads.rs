//! Autoload file generation.
//!
//! Every form preceded by a `;;;###autoload` cookie is exported. Definitions
//! (`defun`, `defmacro`, `define-minor-mode`, ...) become `autoload` stubs
//! pointing at their file; any other form is copied verbatim. A cookie
//! followed by text on the same line exports that text instead.

use std::path::{Path, PathBuf};

use parcel_fs::{NormalizedPath, PackageFile};

use crate::error::InstallError;
use crate::sexp::{self, Value};

pub const AUTOLOAD_COOKIE: &str = ";;;###autoload";

const DEFINERS: &[&str] = &[
    "defun",
    "defmacro",
    "cl-defun",
    "cl-defmacro",
    "defsubst",
    "define-minor-mode",
    "define-globalized-minor-mode",
    "define-derived-mode",
    "define-generic-mode",
    "transient-define-prefix",
];

/// Stub for a definition form, or `None` if `form` defines nothing.
fn autoload_stub(form: &Value, file_stem: &str) -> Option<Value> {
    let items = form.as_list()?;
    let definer = items.first()?.as_symbol()?;
    if !DEFINERS.contains(&definer) {
        return None;
    }
    let name = items.get(1)?.as_symbol()?;

    let is_mode = definer.starts_with("define-") && definer.ends_with("-mode");
    // (define-derived-mode NAME PARENT "Name" "doc"), (define-minor-mode NAME "doc")
    let doc_index = match definer {
        "define-derived-mode" => 4,
        _ if is_mode => 2,
        _ => 3,
    };
    let doc = items
        .get(doc_index)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let interactive = is_mode
        || definer == "transient-define-prefix"
        || items.iter().skip(2).any(|item| {
            item.as_list()
                .and_then(|inner| inner.first())
                .and_then(Value::as_symbol)
                == Some("interactive")
        });

    let mut stub = vec![
        Value::symbol("autoload"),
        Value::quote(Value::symbol(name)),
        Value::string(file_stem),
        Value::string(doc),
        Value::symbol(if interactive { "t" } else { "nil" }),
    ];
    if definer.ends_with("defmacro") {
        stub.push(Value::quote(Value::symbol("macro")));
    }
    Some(Value::List(stub))
}

/// Autoload forms exported by one source file, in file order.
pub fn scan_source(text: &str, file_stem: &str) -> Vec<String> {
    let mut forms = Vec::new();
    let mut rest = text;

    while let Some(idx) = rest.find(AUTOLOAD_COOKIE) {
        let after = &rest[idx + AUTOLOAD_COOKIE.len()..];
        let (same_line, remainder) = after.split_once('\n').unwrap_or((after, ""));

        if !same_line.trim().is_empty() {
            forms.push(same_line.trim().to_string());
            rest = remainder;
            continue;
        }

        match sexp::parse_prefix(remainder) {
            Ok(Some((form, used))) => {
                let exported = autoload_stub(&form, file_stem).unwrap_or(form);
                forms.push(exported.to_string());
                rest = &remainder[used..];
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(file = file_stem, error = %e, "unreadable form after autoload cookie");
                rest = remainder;
            }
        }
    }
    forms
}

fn is_generated(file_name: &str) -> bool {
    file_name.ends_with(PackageFile::DescriptionSuffix.as_str())
        || file_name.ends_with(PackageFile::AutoloadsSuffix.as_str())
}

/// Source files of a package directory, sorted, generated files excluded.
pub fn source_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == "el")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !is_generated(n))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Write `<name>-autoloads.el` into `dir`; returns its path.
pub fn generate(name: &str, dir: &Path) -> Result<PathBuf, InstallError> {
    let file_name = PackageFile::autoloads_file(name);
    let sources = source_files(dir).map_err(|e| InstallError::io(name, dir, e))?;

    let mut body = String::new();
    for source in &sources {
        let text = std::fs::read_to_string(source).map_err(|e| InstallError::io(name, source, e))?;
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let forms = scan_source(&text, stem);
        tracing::debug!(package = name, file = stem, autoloads = forms.len(), "scanned for autoloads");
        if forms.is_empty() {
            continue;
        }
        body.push_str(&format!("\n;;; Generated autoloads from {stem}.el\n\n"));
        for form in forms {
            body.push_str(&form);
            body.push_str("\n\n");
        }
    }

    let content = format!(
        ";;; {file_name} --- automatically extracted autoloads  -*- lexical-binding: t -*-\n\
         ;;\n\
         ;;; Code:\n\
         {body}\n\
         (provide '{name}-autoloads)\n\
         ;;; {file_name} ends here\n"
    );

    let path = dir.join(&file_name);
    parcel_fs::io::write_text(&NormalizedPath::new(&path), &content)?;
    Ok(path)
}
