use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tgfin_core::{DEFAULT_CURRENCY, GroupId, GroupTypeMap, TxType};
use tgfin_ingest::GroupConfig;
use thiserror::Error;

use crate::state::{self, ensure_tgfin_home};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("environment variable {var}: {reason}")]
    Env { var: &'static str, reason: String },
    #[error("source.messages_file is not set (or TGFIN_MESSAGES_FILE)")]
    MissingMessagesFile,
    #[error("no group types configured ([groups.types] or GROUP_TYPES)")]
    NoGroupTypes,
    #[error("group {group}: type {value:?} is neither income nor expense")]
    InvalidGroupType { group: String, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Informational; amounts are never converted
    pub currency: String,
    pub source: SourceSection,
    pub groups: GroupsSection,
    pub refresh: RefreshSection,
    pub store: StoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// JSON message dump read by the file source
    pub messages_file: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupsSection {
    /// Groups to ingest. Empty means "whatever the source lists".
    pub ids: Vec<GroupId>,
    /// group id -> "income" | "expense"
    pub types: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSection {
    pub interval_secs: u64,
    pub per_group_limit: usize,
    /// Run the push listener next to the refresh loop
    pub realtime: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            source: SourceSection::default(),
            groups: GroupsSection::default(),
            refresh: RefreshSection::default(),
            store: StoreSection::default(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            messages_file: None,
            poll_interval_secs: 5,
            fetch_timeout_secs: 20,
        }
    }
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            per_group_limit: 100,
            realtime: true,
        }
    }
}

impl Config {
    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get("GROUP_IDS") {
            self.groups.ids = parse_group_ids(&raw)?;
        }
        if let Some(raw) = get("GROUP_TYPES") {
            self.groups.types = serde_json::from_str(&raw).map_err(|e| ConfigError::Env {
                var: "GROUP_TYPES",
                reason: e.to_string(),
            })?;
        }
        if let Some(raw) = get("TGFIN_MESSAGES_FILE") {
            self.source.messages_file = Some(PathBuf::from(raw));
        }
        if let Some(raw) = get("TGFIN_STORE") {
            self.store.path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = get("TGFIN_REFRESH_INTERVAL") {
            self.refresh.interval_secs =
                raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
                    var: "TGFIN_REFRESH_INTERVAL",
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Checks needed before anything talks to the source.
    pub fn validate_for_ingestion(&self) -> Result<(), ConfigError> {
        if self.source.messages_file.is_none() {
            return Err(ConfigError::MissingMessagesFile);
        }
        if self.groups.types.is_empty() {
            return Err(ConfigError::NoGroupTypes);
        }
        for (group, value) in &self.groups.types {
            if value.parse::<TxType>().is_err() {
                return Err(ConfigError::InvalidGroupType {
                    group: group.clone(),
                    value: value.clone(),
                });
            }
        }
        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::Zero("refresh.interval_secs"));
        }
        if self.refresh.per_group_limit == 0 {
            return Err(ConfigError::Zero("refresh.per_group_limit"));
        }
        if self.source.fetch_timeout_secs == 0 {
            return Err(ConfigError::Zero("source.fetch_timeout_secs"));
        }
        Ok(())
    }

    pub fn group_type_map(&self) -> GroupTypeMap {
        GroupTypeMap::from_raw(&self.groups.types)
    }

    /// Explicitly configured groups with their raw declared type, or `None`
    /// when the list should come from the source.
    pub fn configured_groups(&self) -> Option<Vec<GroupConfig>> {
        if self.groups.ids.is_empty() {
            return None;
        }
        let raw: BTreeMap<GroupId, &String> = self
            .groups
            .types
            .iter()
            .map(|(k, v)| (GroupId::parse(k), v))
            .collect();
        Some(
            self.groups
                .ids
                .iter()
                .map(|id| GroupConfig {
                    id: id.clone(),
                    kind: raw.get(id).map(|v| v.to_string()),
                    title: None,
                })
                .collect(),
        )
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(p) => Ok(p.clone()),
            None => state::default_store_path(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.source.fetch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.source.poll_interval_secs.max(1))
    }
}

/// JSON array (ints, strings, or `{id, name}` objects) or a comma-separated list.
fn parse_group_ids(raw: &str) -> Result<Vec<GroupId>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| ConfigError::Env {
            var: "GROUP_IDS",
            reason: e.to_string(),
        });
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(GroupId::parse)
        .collect())
}

pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Config file plus environment overrides.
pub fn load_config() -> Result<Config> {
    let p = state::config_path()?;
    let mut cfg = read_config(&p)?;
    cfg.apply_env(|var| std::env::var(var).ok())?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config) -> Result<PathBuf> {
    let p = ensure_tgfin_home()?.join("config.toml");
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(p)
}

pub fn init_config() -> Result<()> {
    let p = state::config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    let p = save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    fn ingestible() -> Config {
        let mut cfg = Config::default();
        cfg.source.messages_file = Some(PathBuf::from("/tmp/messages.json"));
        cfg.groups
            .types
            .insert("-4884869527".to_string(), "income".to_string());
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.currency, "RUB");
        assert_eq!(cfg.refresh.interval_secs, 30);
        assert_eq!(cfg.refresh.per_group_limit, 100);
        assert!(cfg.refresh.realtime);
        assert_eq!(cfg.source.fetch_timeout_secs, 20);
    }

    #[test]
    fn test_parse_toml_with_mixed_group_ids() {
        let cfg: Config = toml::from_str(
            r#"
            [source]
            messages_file = "/data/messages.json"

            [groups]
            ids = [-4884869527, "-100123", { id = 42, name = "Home" }]

            [groups.types]
            "-4884869527" = "income"
            "-100123" = "expense"
            "#,
        )
        .unwrap();

        assert_eq!(
            cfg.groups.ids,
            vec![
                GroupId::parse("-4884869527"),
                GroupId::parse("-100123"),
                GroupId::parse("42"),
            ]
        );
        // untouched sections keep their defaults
        assert_eq!(cfg.refresh.interval_secs, 30);
        assert!(cfg.validate_for_ingestion().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[
            ("GROUP_IDS", "-1, -2 ,"),
            ("GROUP_TYPES", r#"{"-1": "income", "-2": "expense"}"#),
            ("TGFIN_MESSAGES_FILE", "/tmp/m.json"),
            ("TGFIN_REFRESH_INTERVAL", "60"),
        ]))
        .unwrap();

        assert_eq!(cfg.groups.ids, vec![GroupId::from(-1_i64), GroupId::from(-2_i64)]);
        assert_eq!(cfg.group_type_map().lookup(&GroupId::from(-2_i64)), Some(TxType::Expense));
        assert_eq!(cfg.source.messages_file, Some(PathBuf::from("/tmp/m.json")));
        assert_eq!(cfg.refresh.interval_secs, 60);
    }

    #[test]
    fn test_group_ids_env_as_json() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("GROUP_IDS", r#"[-1, "-2", {"id": -3, "name": "x"}]"#)]))
            .unwrap();
        assert_eq!(cfg.groups.ids.len(), 3);
        assert_eq!(cfg.groups.ids[2], GroupId::from(-3_i64));
    }

    #[test]
    fn test_bad_env_is_config_error() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_env(env(&[("TGFIN_REFRESH_INTERVAL", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "TGFIN_REFRESH_INTERVAL", .. }));
    }

    #[test]
    fn test_validate_for_ingestion() {
        assert!(ingestible().validate_for_ingestion().is_ok());

        let mut cfg = ingestible();
        cfg.source.messages_file = None;
        assert!(matches!(cfg.validate_for_ingestion(), Err(ConfigError::MissingMessagesFile)));

        let mut cfg = ingestible();
        cfg.groups.types.clear();
        assert!(matches!(cfg.validate_for_ingestion(), Err(ConfigError::NoGroupTypes)));

        let mut cfg = ingestible();
        cfg.groups.types.insert("-5".to_string(), "transfer".to_string());
        assert!(matches!(
            cfg.validate_for_ingestion(),
            Err(ConfigError::InvalidGroupType { .. })
        ));

        let mut cfg = ingestible();
        cfg.refresh.interval_secs = 0;
        assert!(matches!(cfg.validate_for_ingestion(), Err(ConfigError::Zero(_))));
    }

    #[test]
    fn test_configured_groups_carry_declared_type() {
        let mut cfg = ingestible();
        assert!(cfg.configured_groups().is_none());

        cfg.groups.ids = vec![GroupId::from(-4884869527_i64), GroupId::from(-7_i64)];
        let groups = cfg.configured_groups().unwrap();
        assert_eq!(groups[0].tx_type(), Some(TxType::Income));
        assert_eq!(groups[1].kind, None);
    }

    #[test]
    fn test_read_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = read_config(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg.refresh.interval_secs, 30);
    }

    #[test]
    fn test_read_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(&p, "[refresh\ninterval_secs = ").unwrap();
        assert!(matches!(read_config(&p), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_serialized_defaults_parse_back() {
        let s = toml::to_string_pretty(&ingestible()).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.groups.types, ingestible().groups.types);
        assert_eq!(back.source.messages_file, ingestible().source.messages_file);
    }
}
