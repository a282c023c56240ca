#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;

pub fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "maven_stubgen_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

pub fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
    use std::io::Write;
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

#[cfg(unix)]
pub fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

/// A fake `mvn` that answers `dependency:build-classpath` with `classpath`
/// and succeeds on every other goal.
#[cfg(unix)]
pub fn fake_mvn(path: &Path, classpath: &[&Path]) -> anyhow::Result<()> {
    let joined = classpath
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(":");
    write_file(
        path,
        &format!(
            r#"#!/bin/sh
for a in "$@"; do
  case "$a" in
    -Dmdep.outputFile=*) printf '%s' "{joined}" > "${{a#-Dmdep.outputFile=}}" ;;
  esac
done
exit 0
"#
        ),
    )?;
    make_executable(path)
}

/// Field or method of a synthesized class.
pub struct Member {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub params: Vec<String>,
}

impl Member {
    pub fn new(access: u16, name: &str, descriptor: &str) -> Self {
        Self {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            params: Vec::new(),
        }
    }

    pub fn params(mut self, names: &[&str]) -> Self {
        self.params = names.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Minimal class-file writer: constant pool, members and `MethodParameters`.
pub fn class_file(access: u16, this: &str, fields: &[Member], methods: &[Member]) -> Vec<u8> {
    let mut pool = Pool::default();
    let mut body = Vec::new();
    body.extend_from_slice(&access.to_be_bytes());
    let this_index = pool.class(this);
    let super_index = pool.class("java/lang/Object");
    body.extend_from_slice(&this_index.to_be_bytes());
    body.extend_from_slice(&super_index.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());

    for members in [fields, methods] {
        body.extend_from_slice(&(members.len() as u16).to_be_bytes());
        for m in members {
            body.extend_from_slice(&m.access.to_be_bytes());
            body.extend_from_slice(&pool.utf8(&m.name).to_be_bytes());
            body.extend_from_slice(&pool.utf8(&m.descriptor).to_be_bytes());
            if m.params.is_empty() {
                body.extend_from_slice(&0u16.to_be_bytes());
                continue;
            }
            body.extend_from_slice(&1u16.to_be_bytes());
            let mut attr = vec![m.params.len() as u8];
            for p in &m.params {
                attr.extend_from_slice(&pool.utf8(p).to_be_bytes());
                attr.extend_from_slice(&0u16.to_be_bytes());
            }
            body.extend_from_slice(&pool.utf8("MethodParameters").to_be_bytes());
            body.extend_from_slice(&(attr.len() as u32).to_be_bytes());
            body.extend_from_slice(&attr);
        }
    }
    body.extend_from_slice(&0u16.to_be_bytes());

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&52u16.to_be_bytes());
    out.extend_from_slice(&((pool.entries.len() + 1) as u16).to_be_bytes());
    for entry in &pool.entries {
        out.extend_from_slice(entry);
    }
    out.extend_from_slice(&body);
    out
}

#[derive(Default)]
struct Pool {
    entries: Vec<Vec<u8>>,
    index: HashMap<(u8, String), u16>,
}

impl Pool {
    fn utf8(&mut self, s: &str) -> u16 {
        if let Some(i) = self.index.get(&(1, s.to_string())) {
            return *i;
        }
        let mut entry = vec![1u8];
        entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
        entry.extend_from_slice(s.as_bytes());
        self.push(1, s, entry)
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(i) = self.index.get(&(7, name.to_string())) {
            return *i;
        }
        let name_index = self.utf8(name);
        let mut entry = vec![7u8];
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.push(7, name, entry)
    }

    fn push(&mut self, tag: u8, key: &str, entry: Vec<u8>) -> u16 {
        self.entries.push(entry);
        let index = self.entries.len() as u16;
        self.index.insert((tag, key.to_string()), index);
        index
    }
}
