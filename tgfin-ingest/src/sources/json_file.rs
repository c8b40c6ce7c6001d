//! File-backed message source: reads an exported chat dump.
//!
//! Expected shape:
//!   { "groups": [ { "id": -100123, "title": "Расходы", "type": "expense",
//!                   "messages": [ { "id": 1, "text": "...", "timestamp": "..." } ] } ] }
//!
//! Messages are listed oldest first, as exporters write them. `subscribe`
//! polls the file and pushes anything that was not there when it started.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tgfin_core::GroupId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::source::{MessageSource, SourceError, Subscription};
use crate::types::{GroupConfig, IncomingMessage, SourceMessage};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Deserialize)]
struct Dump {
    #[serde(default)]
    groups: Vec<DumpGroup>,
}

#[derive(Debug, Clone, Deserialize)]
struct DumpGroup {
    #[serde(flatten)]
    config: GroupConfig,
    #[serde(default)]
    messages: Vec<SourceMessage>,
}

#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
        }
    }

    async fn read_dump(&self) -> Result<Dump, SourceError> {
        read_dump(&self.path).await
    }
}

async fn read_dump(path: &Path) -> Result<Dump, SourceError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SourceError::Unavailable(format!("read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SourceError::Unavailable(format!("parse {}: {e}", path.display())))
}

fn find<'a>(dump: &'a Dump, group_id: &GroupId) -> Option<&'a DumpGroup> {
    dump.groups.iter().find(|g| &g.config.id == group_id)
}

fn seen_keys(dump: &Dump, wanted: &HashSet<GroupId>) -> HashSet<(GroupId, String)> {
    dump.groups
        .iter()
        .filter(|g| wanted.contains(&g.config.id))
        .flat_map(|g| g.messages.iter().map(|m| (g.config.id.clone(), m.id.clone())))
        .collect()
}

#[async_trait]
impl MessageSource for JsonFileSource {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn connect(&self) -> Result<(), SourceError> {
        self.read_dump().await.map(|_| ())
    }

    async fn list_groups_config(&self) -> Result<Vec<GroupConfig>, SourceError> {
        Ok(self
            .read_dump()
            .await?
            .groups
            .into_iter()
            .map(|g| g.config)
            .collect())
    }

    async fn group_title(&self, group_id: &GroupId) -> Option<String> {
        let dump = self.read_dump().await.ok()?;
        find(&dump, group_id).and_then(|g| g.config.title.clone())
    }

    async fn fetch_recent(
        &self,
        group_id: &GroupId,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        let dump = self.read_dump().await?;
        let group = find(&dump, group_id).ok_or_else(|| SourceError::Group {
            group: group_id.clone(),
            reason: format!("not present in {}", self.path.display()),
        })?;
        Ok(group.messages.iter().rev().take(limit).cloned().collect())
    }

    async fn subscribe(&self, group_ids: &[GroupId]) -> Result<Subscription, SourceError> {
        let wanted: HashSet<GroupId> = group_ids.iter().cloned().collect();
        let mut seen = seen_keys(&self.read_dump().await?, &wanted);

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let path = self.path.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tx.closed() => break,
                }

                let dump = match read_dump(&path).await {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(error = %e, "poll failed; retrying next tick");
                        continue;
                    }
                };

                for group in dump.groups.iter().filter(|g| wanted.contains(&g.config.id)) {
                    for msg in &group.messages {
                        let key = (group.config.id.clone(), msg.id.clone());
                        if !seen.insert(key) {
                            continue;
                        }
                        debug!(group = %group.config.id, id = %msg.id, "new message in dump");
                        let incoming = IncomingMessage {
                            group_id: group.config.id.clone(),
                            group_title: group.config.title.clone(),
                            message: msg.clone(),
                        };
                        if tx.send(incoming).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tgfin_core::TxType;

    fn write_dump(path: &Path, messages: serde_json::Value) {
        let dump = json!({
            "groups": [
                {"id": -100, "title": "Расходы", "type": "expense", "messages": messages},
                {"id": "-200", "title": "Доходы", "type": "income", "messages": [
                    {"id": 1, "text": "Зарплата 50000 руб", "timestamp": "2026-02-01T09:00:00Z"}
                ]}
            ]
        });
        std::fs::write(path, serde_json::to_vec(&dump).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_groups_and_recent_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        write_dump(
            &path,
            json!([
                {"id": 1, "text": "Такси 350"},
                {"id": 2, "text": "Кофе 200 руб"},
                {"id": 3, "text": "Обед 600"}
            ]),
        );
        let src = JsonFileSource::new(&path, Duration::from_secs(1));

        let groups = src.list_groups_config().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].tx_type(), Some(TxType::Income));
        assert_eq!(
            src.group_title(&GroupId::parse("-100")).await.as_deref(),
            Some("Расходы")
        );

        let recent = src.fetch_recent(&GroupId::from(-100_i64), 2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["3", "2"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let src = JsonFileSource::new(dir.path().join("nope.json"), Duration::from_secs(1));
        assert!(matches!(src.connect().await, Err(SourceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unknown_group_is_group_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        write_dump(&path, json!([]));
        let src = JsonFileSource::new(&path, Duration::from_secs(1));
        let err = src.fetch_recent(&GroupId::parse("-999"), 10).await.unwrap_err();
        assert!(matches!(err, SourceError::Group { .. }));
    }

    #[tokio::test]
    async fn test_subscribe_pushes_only_new_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        write_dump(&path, json!([{"id": 1, "text": "Такси 350"}]));
        let src = JsonFileSource::new(&path, Duration::from_millis(20));

        let mut rx = src.subscribe(&[GroupId::from(-100_i64)]).await.unwrap();
        write_dump(
            &path,
            json!([{"id": 1, "text": "Такси 350"}, {"id": 2, "text": "Аптека 640"}]),
        );

        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.message.id, "2");
        assert_eq!(got.group_id.as_str(), "-100");
        assert_eq!(got.group_title.as_deref(), Some("Расходы"));
    }
}
