//! The chat transport seam.
//!
//! Real transports (Telegram and friends) live outside this workspace; the
//! pipeline only sees this trait. Every call may be slow or fail, callers wrap
//! them in timeouts.

use std::time::Duration;

use async_trait::async_trait;
use tgfin_core::GroupId;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{GroupConfig, IncomingMessage, SourceMessage};

/// Push channel for new messages. Closure means the connection is gone.
pub type Subscription = mpsc::Receiver<IncomingMessage>;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport unreachable or not authenticated
    #[error("message source unavailable: {0}")]
    Unavailable(String),
    /// Lookup/fetch for a single group failed
    #[error("group {group}: {reason}")]
    Group { group: GroupId, reason: String },
    #[error("message source did not answer within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Open/authenticate the transport.
    async fn connect(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Groups the transport knows about, with their declared type.
    async fn list_groups_config(&self) -> Result<Vec<GroupConfig>, SourceError>;

    /// Best-effort group title.
    async fn group_title(&self, _group_id: &GroupId) -> Option<String> {
        None
    }

    /// Up to `limit` most recent messages, newest first.
    async fn fetch_recent(
        &self,
        group_id: &GroupId,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError>;

    /// Start push delivery of new messages from `group_ids`.
    async fn subscribe(&self, group_ids: &[GroupId]) -> Result<Subscription, SourceError>;
}
