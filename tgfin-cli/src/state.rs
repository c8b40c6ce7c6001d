use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `$TGFIN_HOME`, else `~/.tgfin`.
pub fn tgfin_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("TGFIN_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".tgfin"))
}

pub fn ensure_tgfin_home() -> Result<PathBuf> {
    let dir = tgfin_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(tgfin_home()?.join("config.toml"))
}

pub fn default_store_path() -> Result<PathBuf> {
    Ok(tgfin_home()?.join("transactions.json"))
}
