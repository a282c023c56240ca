//! End-to-end stub generation and the `pyproject.toml` build hook.

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cache::{ModelCache, hash_bytes};
use crate::config::HookConfig;
use crate::coordinate::Coordinate;
use crate::jar::{Jar, sources_jar_for};
use crate::javadoc::JavadocIndex;
use crate::maven::Maven;
use crate::model::{JavaClass, assemble_packages};
use crate::pytypes::python_module;
use crate::render::{RenderOptions, render_module};
use crate::ruff;
use crate::scan::{child_packages, discover_prefixes, scan_python_files, select_packages};

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub endpoints: Vec<Coordinate>,
    /// Empty means discover from the endpoint jars.
    pub prefixes: Vec<String>,
    pub output_dir: PathBuf,
    pub convert_strings: bool,
    pub include_javadoc: bool,
    pub runtime_imports: bool,
    pub remove_namespace_only_stubs: bool,
    pub runtime_module: String,
    pub format: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerateReport {
    pub output_dir: String,
    pub endpoints: Vec<String>,
    pub prefixes: Vec<String>,
    pub classpath_jars: usize,
    pub classes: usize,
    pub stubs_written: usize,
    pub runtime_modules_written: usize,
    pub namespace_stubs_removed: usize,
    pub formatted: bool,
    pub duration_ms: u64,
}

pub fn generate_stubs(
    maven: &Maven,
    cache: Option<&ModelCache>,
    options: &GenerateOptions,
) -> Result<GenerateReport> {
    let start = Instant::now();
    if options.endpoints.is_empty() {
        bail!("at least one endpoint is required");
    }
    let endpoint_names: Vec<String> = options.endpoints.iter().map(|c| c.to_string()).collect();
    tracing::info!(endpoints = ?endpoint_names, "resolving endpoints");

    let classpath = maven.resolve_classpath(&options.endpoints)?;
    if options.include_javadoc {
        for endpoint in &options.endpoints {
            maven.fetch_sources(endpoint);
        }
    }

    let per_jar: Vec<Vec<JavaClass>> = classpath
        .par_iter()
        .map(|jar| match load_jar_classes(jar, cache, options.include_javadoc) {
            Ok(classes) => classes,
            Err(err) => {
                tracing::warn!(jar = %jar.display(), "skipping jar: {err:#}");
                Vec::new()
            }
        })
        .collect();
    let packages = assemble_packages(per_jar.into_iter().flatten().collect());

    let prefixes = if options.prefixes.is_empty() {
        discover_prefixes(&classpath, &options.endpoints)?
    } else {
        let unique: BTreeSet<String> = options.prefixes.iter().cloned().collect();
        unique.into_iter().collect()
    };
    if prefixes.is_empty() {
        tracing::warn!("no packages found in the endpoint jars");
    }
    tracing::info!(?prefixes, "generating stubs");
    tracing::info!(output = %options.output_dir.display(), "writing stubs");

    let selected = select_packages(packages.keys(), &prefixes);
    let emitted: BTreeSet<String> = selected
        .iter()
        .filter(|p| !options.remove_namespace_only_stubs || packages.contains_key(*p))
        .cloned()
        .collect();
    let children = child_packages(&emitted);

    let render_options = RenderOptions {
        convert_strings: options.convert_strings,
        include_javadoc: options.include_javadoc,
    };
    let shim = runtime_shim(&options.runtime_module, &endpoint_names);

    let mut report = GenerateReport {
        output_dir: options.output_dir.to_string_lossy().to_string(),
        endpoints: endpoint_names.clone(),
        prefixes: prefixes.clone(),
        classpath_jars: classpath.len(),
        classes: 0,
        stubs_written: 0,
        runtime_modules_written: 0,
        namespace_stubs_removed: 0,
        formatted: false,
        duration_ms: 0,
    };

    for package in &selected {
        let dir = package_dir(&options.output_dir, package);
        let stub = dir.join("__init__.pyi");
        let classes = packages.get(package).map_or(&[][..], Vec::as_slice);

        if !emitted.contains(package) {
            if stub.exists() {
                tracing::info!(stub = %stub.display(), "removing namespace only stub");
                fs::remove_file(&stub)
                    .with_context(|| format!("Failed to remove {}", stub.display()))?;
                report.namespace_stubs_removed += 1;
            }
            continue;
        }

        let subpackages = children.get(package).map_or(&[][..], Vec::as_slice);
        let text = render_module(package, classes, subpackages, &render_options);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        fs::write(&stub, text).with_context(|| format!("Failed to write {}", stub.display()))?;
        report.stubs_written += 1;
        report.classes += classes.iter().map(count_classes).sum::<usize>();

        if options.runtime_imports && !classes.is_empty() {
            let module = dir.join("__init__.py");
            fs::write(&module, &shim)
                .with_context(|| format!("Failed to write {}", module.display()))?;
            report.runtime_modules_written += 1;
        }
    }

    if options.format && options.output_dir.exists() {
        let files = scan_python_files(&options.output_dir)?;
        report.formatted = ruff::format_files(&files)?;
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    Ok(report)
}

/// Class models of one jar, with javadoc from its sibling sources jar.
fn load_jar_classes(
    jar_path: &Path,
    cache: Option<&ModelCache>,
    include_javadoc: bool,
) -> Result<Vec<JavaClass>> {
    if !jar_path.is_file() {
        tracing::debug!(path = %jar_path.display(), "classpath entry is not a file");
        return Ok(Vec::new());
    }
    let jar = Jar::open(jar_path)?;
    let hash = hash_bytes(jar.bytes());

    let cached = match cache {
        Some(c) => c.get_jar_models(&hash)?,
        None => None,
    };
    let mut classes = match cached {
        Some(classes) => classes,
        None => {
            let classes = jar.load_classes()?;
            if let Some(c) = cache {
                c.put_jar_models(&hash, &classes)?;
            }
            classes
        }
    };

    if include_javadoc
        && let Some(sources) = sources_jar_for(jar_path)
    {
        match load_javadoc(&sources, cache) {
            Ok(docs) => {
                for class in &mut classes {
                    docs.apply(class);
                }
            }
            Err(err) => {
                tracing::warn!(sources = %sources.display(), "ignoring sources jar: {err:#}");
            }
        }
    }
    Ok(classes)
}

fn load_javadoc(sources: &Path, cache: Option<&ModelCache>) -> Result<JavadocIndex> {
    let hash = hash_bytes(Jar::open(sources)?.bytes());
    if let Some(c) = cache
        && let Some(docs) = c.get_source_docs(&hash)?
    {
        return Ok(docs);
    }
    let docs = JavadocIndex::from_sources_jar(sources)?;
    if docs.is_empty() {
        tracing::debug!(sources = %sources.display(), "sources jar has no javadoc");
    }
    if let Some(c) = cache {
        c.put_source_docs(&hash, &docs)?;
    }
    Ok(docs)
}

fn count_classes(class: &JavaClass) -> usize {
    1 + class.nested.iter().map(count_classes).sum::<usize>()
}

pub fn package_dir(output_dir: &Path, package: &str) -> PathBuf {
    let mut dir = output_dir.to_path_buf();
    for segment in python_module(package).split('.') {
        dir.push(segment);
    }
    dir
}

/// The `__init__.py` that loads the Java package at runtime.
pub fn runtime_shim(runtime_module: &str, endpoints: &[String]) -> String {
    let args = endpoints
        .iter()
        .map(|e| python_str(e))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "from {runtime_module} import dynamic_import\n\n__all__, __getattr__ = dynamic_import(__name__, __file__, {args})\n"
    )
}

fn python_str(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[derive(Debug, Serialize)]
pub struct BuildReport {
    pub endpoint: String,
    pub output_dir: String,
    /// Top-level package directories, relative to the project.
    pub packages: Vec<String>,
    pub generate: GenerateReport,
}

/// Regenerates the stubs of a stub-package project from its `pyproject.toml`.
pub fn build(
    maven: &Maven,
    cache: Option<&ModelCache>,
    project_dir: &Path,
    template: &GenerateOptions,
) -> Result<BuildReport> {
    let config = HookConfig::load(project_dir)?;
    let endpoint: Coordinate = config
        .endpoint()
        .parse()
        .with_context(|| format!("Invalid maven_coord {:?}", config.maven_coord))?;

    if config.output_dir.exists() {
        fs::remove_dir_all(&config.output_dir).with_context(|| {
            format!("Failed to remove old stubs: {}", config.output_dir.display())
        })?;
    }

    let options = GenerateOptions {
        endpoints: vec![endpoint.clone()],
        prefixes: config.prefixes.clone(),
        output_dir: config.output_dir.clone(),
        ..template.clone()
    };
    let generate = generate_stubs(maven, cache, &options)?;

    let mut packages = Vec::new();
    if config.output_dir.is_dir() {
        for entry in fs::read_dir(&config.output_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let rel = path.strip_prefix(&config.project_dir).unwrap_or(&path);
            packages.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    packages.sort();

    Ok(BuildReport {
        endpoint: endpoint.to_string(),
        output_dir: config.output_dir.to_string_lossy().to_string(),
        packages,
        generate,
    })
}
