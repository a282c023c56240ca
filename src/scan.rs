use anyhow::Result;
use ignore::WalkBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::coordinate::Coordinate;
use crate::jar::list_top_level_packages;

/// Top-level packages of the classpath jars that belong to an endpoint.
pub fn discover_prefixes(classpath: &[PathBuf], endpoints: &[Coordinate]) -> Result<Vec<String>> {
    let mut prefixes = BTreeSet::new();
    for jar in classpath {
        if !endpoints.iter().any(|c| c.matches_jar(jar)) {
            continue;
        }
        prefixes.extend(list_top_level_packages(jar)?);
    }
    Ok(prefixes.into_iter().collect())
}

pub fn is_under(package: &str, prefix: &str) -> bool {
    package == prefix
        || package
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Packages to emit: every package with classes under a prefix, the prefixes
/// themselves, and the intermediate packages between them.
pub fn select_packages<'a>(
    packages_with_classes: impl IntoIterator<Item = &'a String>,
    prefixes: &[String],
) -> BTreeSet<String> {
    let mut selected = BTreeSet::new();
    for prefix in prefixes {
        selected.insert(prefix.clone());
    }
    for package in packages_with_classes {
        let Some(prefix) = prefixes.iter().find(|p| is_under(package, p)) else {
            continue;
        };
        let mut current = package.as_str();
        while current.len() > prefix.len() {
            selected.insert(current.to_string());
            match current.rsplit_once('.') {
                Some((parent, _)) => current = parent,
                None => break,
            }
        }
    }
    selected
}

/// Direct children of each selected package.
pub fn child_packages(selected: &BTreeSet<String>) -> BTreeMap<String, Vec<String>> {
    let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for package in selected {
        if let Some((parent, _)) = package.rsplit_once('.')
            && selected.contains(parent)
        {
            children
                .entry(parent.to_string())
                .or_default()
                .push(package.clone());
        }
    }
    children
}

/// Generated Python sources under `base_path`, sorted.
pub fn scan_python_files(base_path: &Path) -> Result<Vec<PathBuf>> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "py" || e == "pyi") {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut files: Vec<PathBuf> = rx.iter().collect();
    files.sort();
    Ok(files)
}
