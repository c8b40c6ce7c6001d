//! In-process message source. Used by tests and demos; behaves like a
//! transport that can be made to fail, stall, or drop its connection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tgfin_core::{GroupId, TxType};
use tokio::sync::{Mutex, mpsc};

use crate::source::{MessageSource, SourceError, Subscription};
use crate::types::{GroupConfig, IncomingMessage, SourceMessage};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
struct Feed {
    config: GroupConfig,
    /// Oldest first
    history: Vec<SourceMessage>,
}

#[derive(Debug, Default)]
struct Inner {
    feeds: Vec<Feed>,
    failing: HashSet<GroupId>,
    unavailable: bool,
    fetch_delay: Option<Duration>,
    subscribers: Vec<(HashSet<GroupId>, mpsc::Sender<IncomingMessage>)>,
}

impl Inner {
    fn feed_mut(&mut self, group_id: &GroupId) -> Option<&mut Feed> {
        self.feeds.iter_mut().find(|f| &f.config.id == group_id)
    }
}

#[derive(Debug, Default)]
pub struct MemorySource {
    inner: Mutex<Inner>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, id: impl Into<GroupId>, tx_type: TxType, title: &str) -> Self {
        let mut config = GroupConfig::new(id, tx_type);
        config.title = Some(title.to_string());
        self.inner.get_mut().feeds.push(Feed {
            config,
            history: Vec::new(),
        });
        self
    }

    /// Append to a group's history without pushing to subscribers.
    pub fn with_message(mut self, group_id: impl Into<GroupId>, msg: SourceMessage) -> Self {
        let group_id = group_id.into();
        if let Some(feed) = self.inner.get_mut().feed_mut(&group_id) {
            feed.history.push(msg);
        }
        self
    }

    /// Record a new message and push it to every subscriber of its group.
    /// Returns how many subscribers received it.
    pub async fn send(&self, group_id: impl Into<GroupId>, msg: SourceMessage) -> usize {
        let group_id = group_id.into();
        let mut inner = self.inner.lock().await;
        let title = match inner.feed_mut(&group_id) {
            Some(feed) => {
                feed.history.push(msg.clone());
                feed.config.title.clone()
            }
            None => None,
        };

        let mut delivered = 0;
        let mut alive = Vec::with_capacity(inner.subscribers.len());
        for (groups, tx) in inner.subscribers.drain(..) {
            if groups.contains(&group_id) {
                let incoming = IncomingMessage {
                    group_id: group_id.clone(),
                    group_title: title.clone(),
                    message: msg.clone(),
                };
                if tx.send(incoming).await.is_err() {
                    continue;
                }
                delivered += 1;
            }
            alive.push((groups, tx));
        }
        inner.subscribers = alive;
        delivered
    }

    /// Make fetches for `group_id` fail.
    pub async fn fail_group(&self, group_id: impl Into<GroupId>) {
        self.inner.lock().await.failing.insert(group_id.into());
    }

    /// Toggle whole-transport availability (affects connect and fetch).
    pub async fn set_available(&self, available: bool) {
        self.inner.lock().await.unavailable = !available;
    }

    /// Delay every fetch, to exercise caller timeouts.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        self.inner.lock().await.fetch_delay = Some(delay);
    }

    /// Drop all subscriptions, as a lost connection would.
    pub async fn disconnect(&self) {
        self.inner.lock().await.subscribers.clear();
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> Result<(), SourceError> {
        if self.inner.lock().await.unavailable {
            return Err(SourceError::Unavailable("memory source switched off".to_string()));
        }
        Ok(())
    }

    async fn list_groups_config(&self) -> Result<Vec<GroupConfig>, SourceError> {
        Ok(self.inner.lock().await.feeds.iter().map(|f| f.config.clone()).collect())
    }

    async fn group_title(&self, group_id: &GroupId) -> Option<String> {
        let mut inner = self.inner.lock().await;
        inner.feed_mut(group_id).and_then(|f| f.config.title.clone())
    }

    async fn fetch_recent(
        &self,
        group_id: &GroupId,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.inner.lock().await.fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().await;
        if inner.unavailable {
            return Err(SourceError::Unavailable("memory source switched off".to_string()));
        }
        if inner.failing.contains(group_id) {
            return Err(SourceError::Group {
                group: group_id.clone(),
                reason: "lookup failed".to_string(),
            });
        }
        let feed = inner.feed_mut(group_id).ok_or_else(|| SourceError::Group {
            group: group_id.clone(),
            reason: "no such group".to_string(),
        })?;
        Ok(feed.history.iter().rev().take(limit).cloned().collect())
    }

    async fn subscribe(&self, group_ids: &[GroupId]) -> Result<Subscription, SourceError> {
        let mut inner = self.inner.lock().await;
        if inner.unavailable {
            return Err(SourceError::Unavailable("memory source switched off".to_string()));
        }
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        inner.subscribers.push((group_ids.iter().cloned().collect(), tx));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> MemorySource {
        MemorySource::new()
            .with_group(-1_i64, TxType::Expense, "Расходы")
            .with_message(-1_i64, SourceMessage::new("1", "первое 10"))
            .with_message(-1_i64, SourceMessage::new("2", "второе 20"))
            .with_message(-1_i64, SourceMessage::new("3", "третье 30"))
    }

    #[tokio::test]
    async fn test_fetch_recent_is_newest_first_and_limited() {
        let msgs = source().fetch_recent(&GroupId::from(-1_i64), 2).await.unwrap();
        let ids: Vec<_> = msgs.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["3", "2"]);
    }

    #[tokio::test]
    async fn test_failing_group() {
        let src = source();
        src.fail_group(-1_i64).await;
        let err = src.fetch_recent(&GroupId::from(-1_i64), 5).await.unwrap_err();
        assert!(matches!(err, SourceError::Group { .. }));
    }

    #[tokio::test]
    async fn test_send_reaches_matching_subscribers_only() {
        let src = source();
        let mut rx = src.subscribe(&[GroupId::from(-1_i64)]).await.unwrap();
        let mut other = src.subscribe(&[GroupId::from(-2_i64)]).await.unwrap();

        assert_eq!(src.send(-1_i64, SourceMessage::new("4", "кофе 200")).await, 1);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.message.id, "4");
        assert_eq!(got.group_title.as_deref(), Some("Расходы"));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_closes_subscriptions() {
        let src = source();
        let mut rx = src.subscribe(&[GroupId::from(-1_i64)]).await.unwrap();
        src.disconnect().await;
        assert!(rx.recv().await.is_none());
    }
}
