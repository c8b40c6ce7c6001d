//! Periodic refresh: one ingestion session per tick, never two at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tgfin_ingest::GroupConfig;
use tokio::sync::{RwLock, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::session::{IngestionSession, SessionReport};

/// Shared between the loop, manual triggers, and status readers.
#[derive(Debug, Default)]
pub struct RefreshState {
    is_refreshing: AtomicBool,
    last_update: RwLock<Option<DateTime<Utc>>>,
}

/// Held while a refresh runs; clears the flag on drop, even on panic.
#[derive(Debug)]
pub struct RefreshGuard {
    state: Arc<RefreshState>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.state.is_refreshing.store(false, Ordering::SeqCst);
    }
}

impl RefreshState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a known last update (e.g. the store's `last_updated`).
    pub fn seeded(last_update: Option<DateTime<Utc>>) -> Self {
        Self {
            is_refreshing: AtomicBool::new(false),
            last_update: RwLock::new(last_update),
        }
    }

    /// Claim the refresh slot. `None` when a refresh is already in flight.
    pub fn try_begin(self: &Arc<Self>) -> Option<RefreshGuard> {
        self.is_refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RefreshGuard {
                state: self.clone(),
            })
    }

    pub fn is_refreshing(&self) -> bool {
        self.is_refreshing.load(Ordering::SeqCst)
    }

    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.read().await
    }

    pub async fn mark_updated(&self, at: DateTime<Utc>) {
        *self.last_update.write().await = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Completed(SessionReport),
    /// Another refresh was in flight
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    Started,
    AlreadyRunning,
    /// No ingestion pipeline configured (read-only mode)
    Unavailable,
}

pub struct Refresher {
    session: IngestionSession,
    groups: Vec<GroupConfig>,
    per_group_limit: usize,
    state: Arc<RefreshState>,
}

impl Refresher {
    pub fn new(
        session: IngestionSession,
        groups: Vec<GroupConfig>,
        per_group_limit: usize,
        state: Arc<RefreshState>,
    ) -> Self {
        Self {
            session,
            groups,
            per_group_limit,
            state,
        }
    }

    pub fn state(&self) -> &Arc<RefreshState> {
        &self.state
    }

    /// Run a refresh now, unless one is already running.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        match self.state.try_begin() {
            Some(guard) => self.run_guarded(guard).await,
            None => {
                debug!("refresh already in flight; skipping");
                RefreshOutcome::Skipped
            }
        }
    }

    /// Start a refresh in the background and return immediately.
    pub fn trigger(self: &Arc<Self>) -> TriggerResult {
        let Some(guard) = self.state.try_begin() else {
            return TriggerResult::AlreadyRunning;
        };
        let this = self.clone();
        tokio::spawn(async move {
            this.run_guarded(guard).await;
        });
        TriggerResult::Started
    }

    async fn run_guarded(&self, _guard: RefreshGuard) -> RefreshOutcome {
        match self.session.run(&self.groups, self.per_group_limit).await {
            Ok(report) => {
                self.state.mark_updated(Utc::now()).await;
                RefreshOutcome::Completed(report)
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "refresh failed; will retry next tick");
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Refresh immediately, then every `every`, until `shutdown` flips or its
/// sender goes away. A tick that lands during a refresh is dropped.
pub async fn run_refresh_loop(
    refresher: Arc<Refresher>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(every_secs = every.as_secs(), "refresh loop started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let RefreshOutcome::Completed(report) = refresher.refresh_once().await {
                    debug!(added = report.merge.added(), "scheduled refresh done");
                }
            }
        }
        if *shutdown.borrow() {
            break;
        }
    }
    info!("refresh loop stopped");
}
