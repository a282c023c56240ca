use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

const RULES: &str = "--select=E,W,F,I,UP,C4,B,RUF,TC,TID";

/// Runs `ruff check --fix-only` then `ruff format` over generated files.
/// Returns false when ruff is not installed; ruff failures are only logged.
pub fn format_files(files: &[PathBuf]) -> Result<bool> {
    let Ok(ruff) = which::which("ruff") else {
        tracing::info!("ruff not found on PATH, skipping formatting");
        return Ok(false);
    };
    if files.is_empty() {
        return Ok(true);
    }
    format_with(&ruff, files)?;
    Ok(true)
}

fn format_with(ruff: &Path, files: &[PathBuf]) -> Result<()> {
    tracing::info!(files = files.len(), "running ruff check");
    let status = Command::new(ruff)
        .arg("check")
        .args(files)
        .args(["--quiet", "--fix-only", "--unsafe-fixes", RULES])
        .status()
        .with_context(|| format!("Failed to execute {}", ruff.display()))?;
    if !status.success() {
        tracing::warn!(code = ?status.code(), "ruff check exited with failure");
    }

    tracing::info!("running ruff format");
    let status = Command::new(ruff)
        .arg("format")
        .args(files)
        .arg("--quiet")
        .status()
        .with_context(|| format!("Failed to execute {}", ruff.display()))?;
    if !status.success() {
        tracing::warn!(code = ?status.code(), "ruff format exited with failure");
    }
    Ok(())
}
