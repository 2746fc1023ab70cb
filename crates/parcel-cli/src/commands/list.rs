//! List, info and archives commands

use std::collections::BTreeMap;

use colored::Colorize;
use parcel_core::{ArchiveRegistry, PackageDescriptor, PackageManager, Settings};
use serde::Serialize;

use crate::error::Result;

/// Which packages `parcel list` shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFilter {
    #[default]
    All,
    Installed,
    Available,
    Upgradeable,
}

impl ListFilter {
    pub fn from_flags(installed: bool, available: bool, upgradeable: bool) -> Self {
        match (installed, available, upgradeable) {
            (true, _, _) => Self::Installed,
            (_, true, _) => Self::Available,
            (_, _, true) => Self::Upgradeable,
            _ => Self::All,
        }
    }
}

/// One row of `parcel list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRow {
    pub name: String,
    pub version: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newer: Option<String>,
    pub summary: String,
}

impl PackageRow {
    fn new(desc: &PackageDescriptor, status: &'static str) -> Self {
        Self {
            name: desc.name().to_string(),
            version: desc.version().to_string(),
            status,
            archive: desc.archive().map(str::to_string),
            newer: None,
            summary: desc.summary().to_string(),
        }
    }
}

/// Rows for `filter`, sorted by name then status.
pub fn collect_rows(manager: &PackageManager, filter: ListFilter) -> Vec<PackageRow> {
    let store = manager.store();
    let holds = &manager.settings().holds;
    let mut rows = Vec::new();

    if matches!(filter, ListFilter::All | ListFilter::Installed) {
        for desc in store.all_installed() {
            let status = if store.selected().iter().any(|s| s == desc.name()) {
                "installed"
            } else {
                "dependency"
            };
            rows.push(PackageRow::new(desc, status));
        }
        for name in manager.settings().builtin.keys() {
            if let Some(desc) = store.builtin(name).first() {
                rows.push(PackageRow::new(desc, "built-in"));
            }
        }
    }
    if matches!(filter, ListFilter::All | ListFilter::Available) {
        for desc in store.all_available() {
            let installed = store.installed(desc.name());
            if installed.iter().any(|i| i.version() == desc.version()) {
                continue;
            }
            let status = if holds.blocks(desc).is_some() {
                "held"
            } else if !store.compatibility().is_compatible(desc) {
                "incompat"
            } else if installed.iter().any(|i| i.version() > desc.version()) {
                "obsolete"
            } else {
                "available"
            };
            rows.push(PackageRow::new(desc, status));
        }
    }
    if filter == ListFilter::Upgradeable {
        for (installed, newer) in store.upgradeable(holds) {
            let mut row = PackageRow::new(installed, "upgradeable");
            row.newer = Some(newer.version().to_string());
            rows.push(row);
        }
    }

    rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.status.cmp(b.status)));
    rows
}

pub fn run_list(manager: &PackageManager, filter: ListFilter, json: bool) -> Result<()> {
    let rows = collect_rows(manager, filter);
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("{}", "No packages".dimmed());
        return Ok(());
    }
    for row in &rows {
        let status = match row.status {
            "installed" => row.status.green(),
            "dependency" => row.status.cyan(),
            "held" | "obsolete" => row.status.yellow(),
            "incompat" => row.status.red(),
            "built-in" => row.status.dimmed(),
            "upgradeable" => row.status.magenta(),
            _ => row.status.normal(),
        };
        let version = match &row.newer {
            Some(newer) => format!("{} -> {newer}", row.version),
            None => row.version.clone(),
        };
        println!(
            "  {:<24} {:<16} {:<12} {}",
            row.name.bold(),
            version,
            status,
            row.summary.dimmed()
        );
    }
    println!();
    println!("{} {} packages", "Total:".dimmed(), rows.len());
    Ok(())
}

pub fn run_info(manager: &PackageManager, name: &str, json: bool) -> Result<()> {
    let store = manager.store();
    let installed = store.installed(name);
    let desc = match installed.first() {
        Some(desc) => desc.clone(),
        None => match store.builtin(name).first() {
            Some(desc) => desc.clone(),
            None => manager.lookup(name)?,
        },
    };
    let reverse: Vec<String> = store
        .reverse_dependencies(name)
        .into_iter()
        .map(PackageDescriptor::full_name)
        .collect();
    let requires: BTreeMap<String, String> = desc
        .requirements()
        .iter()
        .map(|r| (r.name.clone(), r.min_version.to_string()))
        .collect();

    if json {
        let output = serde_json::json!({
            "name": desc.name(),
            "version": desc.version().to_string(),
            "kind": desc.kind().tag(),
            "summary": desc.summary(),
            "archive": desc.archive(),
            "url": desc.url(),
            "keywords": desc.keywords(),
            "requires": requires,
            "required_by": reverse,
            "installed": installed.iter().map(PackageDescriptor::full_name).collect::<Vec<_>>(),
            "active": manager.activation().is_active(name),
            "signed": desc.is_signed(),
            "hold": manager.settings().holds.get(name).to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} {}", desc.name().bold(), desc.version().to_string().cyan());
    println!("  {}", desc.summary());
    println!();
    println!("{}:     {}", "Kind".dimmed(), desc.kind().tag());
    if let Some(archive) = desc.archive() {
        println!("{}:  {}", "Archive".dimmed(), archive);
    }
    if let Some(url) = desc.url() {
        println!("{}:      {}", "URL".dimmed(), url);
    }
    if let Some(dir) = desc.install_dir() {
        println!("{}:      {}", "Dir".dimmed(), dir.display());
    }
    println!(
        "{}:   {}",
        "Status".dimmed(),
        if manager.activation().is_active(name) {
            "active".green()
        } else if installed.is_empty() {
            "not installed".normal()
        } else {
            "installed".cyan()
        }
    );
    if !requires.is_empty() {
        println!("{}:", "Requires".bold());
        for (dep, min) in &requires {
            println!("  {} {} >= {}", "+".green(), dep.cyan(), min);
        }
    }
    if !reverse.is_empty() {
        println!("{}: {}", "Required by".bold(), reverse.join(", "));
    }
    Ok(())
}

/// Configured archives, then every known one with configured ones starred.
pub fn run_archives(settings: &Settings) -> Result<()> {
    let registry = ArchiveRegistry::with_known();

    println!("{}", "Configured Archives".bold());
    for source in &settings.archives {
        println!("  {:<14} {}", source.name.green(), source.location.dimmed());
    }
    println!();

    println!("{}", "Known Archives".bold());
    for name in registry.known_archives() {
        if let Some(known) = registry.get(&name) {
            let marker = if settings.archives.iter().any(|a| a.name == name) {
                "*".green()
            } else {
                " ".normal()
            };
            println!("  {} {:<14} {}", marker, name.cyan(), known.description);
        }
    }
    Ok(())
}
