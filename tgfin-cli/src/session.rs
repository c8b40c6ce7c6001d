//! One ingestion pass: fetch recent messages from every configured group,
//! classify them, and merge the whole batch into the store in one go.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tgfin_core::{GroupId, GroupTypeMap, Transaction};
use tgfin_ingest::{Classifier, GroupConfig, IncomingMessage, MessageSource, SourceError};
use tgfin_ledger::{MergeResult, TransactionStore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub merge: MergeResult,
    pub groups_ok: usize,
    pub failed_groups: Vec<GroupId>,
    /// Messages that classified as transactions (before dedup)
    pub classified: usize,
}

/// Everything a pass needs, shared with the listener.
#[derive(Clone)]
pub struct Pipeline {
    pub source: Arc<dyn MessageSource>,
    pub classifier: Arc<Classifier>,
    pub store: Arc<TransactionStore>,
    pub group_types: GroupTypeMap,
    /// Bound for every individual source call
    pub call_timeout: Duration,
}

pub struct IngestionSession {
    pipeline: Pipeline,
}

impl IngestionSession {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Fetch up to `per_group_limit` messages per group and merge what
    /// classifies. A group that fails is logged and skipped; when every group
    /// fails the pass is an error and nothing is merged.
    pub async fn run(&self, groups: &[GroupConfig], per_group_limit: usize) -> Result<SessionReport> {
        let mut report = SessionReport::default();
        let mut batch = Vec::new();

        for group in groups {
            match self.fetch_group(group, per_group_limit).await {
                Ok(txns) => {
                    debug!(group = %group.id, classified = txns.len(), "group fetched");
                    report.groups_ok += 1;
                    batch.extend(txns);
                }
                Err(e) => {
                    warn!(group = %group.id, error = %e, "group fetch failed; skipping");
                    report.failed_groups.push(group.id.clone());
                }
            }
        }

        if !groups.is_empty() && report.groups_ok == 0 {
            return Err(SourceError::Unavailable(format!(
                "all {} groups failed to fetch",
                groups.len()
            ))
            .into());
        }

        report.classified = batch.len();
        report.merge = self
            .pipeline
            .store
            .merge(batch)
            .await
            .context("merge ingestion batch")?;

        info!(
            groups_ok = report.groups_ok,
            failed = report.failed_groups.len(),
            added = report.merge.added(),
            skipped = report.merge.skipped_duplicates,
            "ingestion session finished"
        );
        Ok(report)
    }

    async fn fetch_group(
        &self,
        group: &GroupConfig,
        limit: usize,
    ) -> Result<Vec<Transaction>, SourceError> {
        let p = &self.pipeline;
        let messages = timeout(p.call_timeout, p.source.fetch_recent(&group.id, limit))
            .await
            .map_err(|_| SourceError::Timeout(p.call_timeout))??;

        let title = match &group.title {
            Some(t) => Some(t.clone()),
            None => timeout(p.call_timeout, p.source.group_title(&group.id))
                .await
                .ok()
                .flatten(),
        };

        Ok(messages
            .into_iter()
            .filter_map(|message| {
                let incoming = IncomingMessage {
                    group_id: group.id.clone(),
                    group_title: title.clone(),
                    message,
                };
                p.classifier.classify_message(&incoming, &p.group_types)
            })
            .collect())
    }
}

/// Groups to ingest: the configured list, or the source's own listing when
/// none is configured. Titles from the source listing are kept.
pub async fn resolve_groups(
    cfg: &Config,
    source: &dyn MessageSource,
    call_timeout: Duration,
) -> Result<Vec<GroupConfig>> {
    if let Some(groups) = cfg.configured_groups() {
        return Ok(groups);
    }
    let listed = timeout(call_timeout, source.list_groups_config())
        .await
        .map_err(|_| SourceError::Timeout(call_timeout))?
        .with_context(|| format!("list groups from {}", source.name()))?;
    if listed.is_empty() {
        return Err(ConfigError::NoGroupTypes.into());
    }
    Ok(listed)
}
