use anyhow::{Context, Result};
use memmap2::Mmap;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::classfile::ClassFile;
use crate::model::JavaClass;

/// A read-only, memory-mapped jar.
pub struct Jar {
    path: PathBuf,
    mmap: Mmap,
}

impl Jar {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open jar: {}", path.display()))?;
        // SAFETY: The file is opened read-only and remains valid for the lifetime of the mmap.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to mmap jar: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    fn archive(&self) -> Result<ZipArchive<Cursor<&[u8]>>> {
        ZipArchive::new(Cursor::new(&self.mmap[..]))
            .with_context(|| format!("Failed to read zip structure: {}", self.path.display()))
    }

    /// Names of the entries accepted by `is_class_entry`.
    pub fn class_entries(&self) -> Result<Vec<String>> {
        let mut archive = self.archive()?;
        let mut names = Vec::new();
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if is_class_entry(entry.name()) {
                names.push(entry.name().to_string());
            }
        }
        Ok(names)
    }

    /// Entries with the given suffix, read in one pass over the archive.
    pub fn read_entries_with_suffix(&self, suffix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut archive = self.archive()?;
        let mut out = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if !entry.name().ends_with(suffix) {
                continue;
            }
            let name = entry.name().to_string();
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            out.push((name, buf));
        }
        Ok(out)
    }

    /// Parses every class in the jar; unreadable class files are logged and skipped.
    pub fn load_classes(&self) -> Result<Vec<JavaClass>> {
        let mut archive = self.archive()?;
        let mut classes = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            if !is_class_entry(&name) {
                continue;
            }
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;

            let parsed = ClassFile::parse(&buf)
                .map_err(anyhow::Error::from)
                .and_then(|cf| JavaClass::from_class_file(&cf));
            match parsed {
                Ok(Some(class)) => classes.push(class),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(jar = %self.path.display(), entry = %name, "skipping class: {err:#}");
                }
            }
        }
        Ok(classes)
    }
}

/// Class files that describe types: no module/package descriptors and
/// nothing under `META-INF/` (multi-release variants).
fn is_class_entry(name: &str) -> bool {
    name.ends_with(".class")
        && !name.starts_with("META-INF/")
        && !name.ends_with("module-info.class")
        && !name.ends_with("package-info.class")
}

/// Top-level Java packages of a jar: class directories with no other class
/// directory above them.
pub fn list_top_level_packages(jar_path: &Path) -> Result<BTreeSet<String>> {
    let jar = Jar::open(jar_path)?;
    let mut class_dirs: BTreeSet<String> = BTreeSet::new();
    for name in jar.class_entries()? {
        if let Some((dir, _)) = name.rsplit_once('/') {
            class_dirs.insert(dir.to_string());
        }
    }

    let mut dirs: Vec<&String> = class_dirs.iter().collect();
    dirs.sort_by_key(|d| d.split('/').count());

    let mut roots: Vec<&str> = Vec::new();
    for dir in dirs {
        let covered = roots
            .iter()
            .any(|root| dir.strip_prefix(root).is_some_and(|rest| rest.starts_with('/')));
        if !covered {
            roots.push(dir);
        }
    }
    Ok(roots.into_iter().map(|r| r.replace('/', ".")).collect())
}

/// The `-sources.jar` published next to a jar in a Maven repository layout.
pub fn sources_jar_for(jar_path: &Path) -> Option<PathBuf> {
    let stem = jar_path.file_stem()?.to_str()?;
    let candidate = jar_path.with_file_name(format!("{stem}-sources.jar"));
    candidate.exists().then_some(candidate)
}
