use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

use crate::cli::Cli;
use crate::maven::ensure_mvn;

pub fn resolve_db_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.db.clone() {
        return Ok(p);
    }

    Ok(stubgen_home()?.join("cache.lmdb"))
}

pub fn resolve_mvn(cli: &Cli) -> Result<PathBuf> {
    let tools = stubgen_home()?.join("tools");
    ensure_mvn(cli.mvn.as_deref(), &tools)
}

pub fn clear_db(db_path: &Path) -> Result<()> {
    remove_file_if_exists(db_path, "db")?;
    remove_file_if_exists(&lmdb_lock_path(db_path), "db lock")?;
    Ok(())
}

fn stubgen_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("maven-stubgen"))
}

fn lmdb_lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push("-lock");
    PathBuf::from(os)
}

fn remove_file_if_exists(path: &Path, kind: &str) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {kind} file: {}", path.display()))?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PyProject {
    project: Option<ProjectTable>,
    tool: Option<ToolTable>,
}

#[derive(Debug, Deserialize)]
struct ProjectTable {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolTable {
    #[serde(rename = "maven-stubgen")]
    maven_stubgen: Option<HookTable>,
}

#[derive(Debug, Deserialize)]
struct HookTable {
    maven_coord: String,
    #[serde(default)]
    prefixes: Vec<String>,
    output_dir: Option<PathBuf>,
}

/// Settings of the packaging hook, read from a project's `pyproject.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookConfig {
    /// `group:artifact`, versioned with the project's version.
    pub maven_coord: String,
    pub version: String,
    pub prefixes: Vec<String>,
    /// Absolute project directory.
    pub project_dir: PathBuf,
    /// Absolute, and always strictly inside `project_dir`.
    pub output_dir: PathBuf,
}

impl HookConfig {
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join("pyproject.toml");
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text, project_dir).with_context(|| format!("Invalid {}", path.display()))
    }

    fn parse(text: &str, project_dir: &Path) -> Result<Self> {
        let doc: PyProject = toml::from_str(text)?;
        let Some(hook) = doc.tool.and_then(|t| t.maven_stubgen) else {
            bail!("missing [tool.maven-stubgen] table");
        };
        let Some(version) = doc.project.and_then(|p| p.version) else {
            bail!("missing [project].version");
        };
        let project_dir = normalize(&std::path::absolute(project_dir)?);
        let output_dir = hook.output_dir.unwrap_or_else(|| PathBuf::from("src"));
        let resolved = normalize(&project_dir.join(&output_dir));
        // build wipes this directory before generating
        if resolved == project_dir || !resolved.starts_with(&project_dir) {
            bail!(
                "output_dir {:?} must be a subdirectory of {}",
                output_dir,
                project_dir.display()
            );
        }
        Ok(Self {
            maven_coord: hook.maven_coord,
            version,
            prefixes: hook.prefixes,
            project_dir,
            output_dir: resolved,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.maven_coord, self.version)
    }
}

/// Lexical normalization: drops `.` and folds `..` into its parent.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
