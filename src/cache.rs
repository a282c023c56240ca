//! Persistent cache for parsed jar models and extracted javadoc.
//!
//! Uses LMDB (via heed). Keys are content hashes, so a jar that changes on
//! disk simply misses; values are JSON.

use anyhow::{Context, Result};
use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::javadoc::JavadocIndex;
use crate::model::JavaClass;

pub const JAR_MODELS_DB: &str = "jar_models";
pub const SOURCE_DOCS_DB: &str = "source_docs";

/// Bumped whenever the cached model layout or extraction rules change.
pub const SCHEMA_VERSION: u32 = 2;

const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 8;

type StrDb = Database<Str, Str>;

#[derive(Debug)]
pub struct ModelCache {
    env: Env,
    db_path: PathBuf,
    jar_models: StrDb,
    source_docs: StrDb,
}

impl ModelCache {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let env = open_env(&db_path)?;
        let mut wtxn = env.write_txn()?;
        let jar_models = env.create_database::<Str, Str>(&mut wtxn, Some(JAR_MODELS_DB))?;
        let source_docs = env.create_database::<Str, Str>(&mut wtxn, Some(SOURCE_DOCS_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db_path,
            jar_models,
            source_docs,
        })
    }

    pub fn get_jar_models(&self, jar_hash: &str) -> Result<Option<Vec<JavaClass>>> {
        self.get_json(&self.jar_models, &versioned_key(jar_hash))
    }

    pub fn put_jar_models(&self, jar_hash: &str, classes: &[JavaClass]) -> Result<()> {
        self.put_json(&self.jar_models, &versioned_key(jar_hash), &classes)
    }

    pub fn get_source_docs(&self, sources_hash: &str) -> Result<Option<JavadocIndex>> {
        self.get_json(&self.source_docs, &versioned_key(sources_hash))
    }

    pub fn put_source_docs(&self, sources_hash: &str, docs: &JavadocIndex) -> Result<()> {
        self.put_json(&self.source_docs, &versioned_key(sources_hash), docs)
    }

    fn get_json<T: DeserializeOwned>(&self, db: &StrDb, key: &str) -> Result<Option<T>> {
        let rtxn = self.env.read_txn()?;
        let Some(raw) = db.get(&rtxn, key)? else {
            return Ok(None);
        };
        match serde_json::from_str(raw) {
            Ok(v) => Ok(Some(v)),
            Err(err) => {
                tracing::warn!(key, "ignoring unreadable cache entry: {err}");
                Ok(None)
            }
        }
    }

    fn put_json<T: Serialize + ?Sized>(&self, db: &StrDb, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize cache entry")?;
        let mut wtxn = self.env.write_txn()?;
        db.put(&mut wtxn, key, json.as_str())?;
        wtxn.commit()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let rtxn = self.env.read_txn()?;
        Ok(CacheStats {
            db_path: self.db_path.to_string_lossy().to_string(),
            schema_version: SCHEMA_VERSION,
            jar_models: table_len(&self.jar_models, &rtxn)?,
            source_docs: table_len(&self.source_docs, &rtxn)?,
        })
    }
}

fn versioned_key(hash: &str) -> String {
    format!("v{SCHEMA_VERSION}:{hash}")
}

/// Hex SHA-256 of some bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn open_env(db_path: &Path) -> Result<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(DEFAULT_MAP_SIZE);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: Default LMDB locking is kept; NO_SUB_DIR makes --db a single file.
    unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        options
            .open(db_path)
            .with_context(|| format!("Failed to create/open db env: {}", db_path.display()))
    }
}

fn table_len(db: &StrDb, rtxn: &RoTxn<'_>) -> Result<u64> {
    let mut count = 0u64;
    for item in db.iter(rtxn)? {
        let _ = item?;
        count += 1;
    }
    Ok(count)
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStats {
    pub db_path: String,
    pub schema_version: u32,
    pub jar_models: u64,
    pub source_docs: u64,
}
