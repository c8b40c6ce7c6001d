//! Read/command facade used by the CLI commands. Works without an ingestion
//! pipeline, in which case refreshes are unavailable but queries still answer.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tgfin_core::{Transaction, TxType, time};
use tgfin_ledger::{CategoryTotal, Summary, TransactionStore};

use crate::scheduler::{RefreshState, Refresher, TriggerResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub is_refreshing: bool,
    pub last_update: Option<String>,
    pub transaction_count: usize,
}

pub struct FinanceService {
    store: Arc<TransactionStore>,
    refresh: Arc<RefreshState>,
    refresher: Option<Arc<Refresher>>,
}

impl FinanceService {
    pub fn new(store: Arc<TransactionStore>, refresh: Arc<RefreshState>) -> Self {
        Self {
            store,
            refresh,
            refresher: None,
        }
    }

    /// Attach an ingestion pipeline; its refresh state replaces ours.
    pub fn with_refresher(mut self, refresher: Arc<Refresher>) -> Self {
        self.refresh = refresher.state().clone();
        self.refresher = Some(refresher);
        self
    }

    /// Last update recorded in the store file, for seeding a fresh process.
    pub async fn stored_last_update(store: &TransactionStore) -> Option<DateTime<Utc>> {
        time::parse_timestamp(&store.snapshot().await.last_updated)
    }

    pub async fn list(
        &self,
        type_filter: Option<TxType>,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<Transaction> {
        let snap = self.store.snapshot().await;
        tgfin_ledger::list(&snap, type_filter, offset, limit)
    }

    pub async fn summary(&self) -> Summary {
        let last = self.refresh.last_update().await;
        let snap = self.store.snapshot().await;
        tgfin_ledger::summary(&snap, last)
    }

    pub async fn category_totals(&self, tx_type: TxType) -> Vec<CategoryTotal> {
        let snap = self.store.snapshot().await;
        tgfin_ledger::category_totals(&snap, tx_type)
    }

    pub fn trigger_refresh(&self) -> TriggerResult {
        match &self.refresher {
            Some(r) => r.trigger(),
            None => TriggerResult::Unavailable,
        }
    }

    pub async fn status(&self) -> Status {
        Status {
            is_refreshing: self.refresh.is_refreshing(),
            last_update: self.refresh.last_update().await.map(time::to_rfc3339_utc),
            transaction_count: self.store.snapshot().await.len(),
        }
    }

    /// Empty the store; counts as an update.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await.context("clear transaction store")?;
        self.refresh.mark_updated(Utc::now()).await;
        Ok(())
    }
}
