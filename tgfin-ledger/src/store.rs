//! TransactionStore: the two-partition state, its on-disk mirror, and the only
//! two mutations (merge, clear).
//!
//! Invariants:
//! - no id appears twice inside one partition
//! - mutations are serialized by `write_lock`; each one builds a complete new
//!   state, writes it to disk (temp file + rename), and only then swaps it in
//! - readers clone an `Arc` of the current state and never see a half merge

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tgfin_core::{Transaction, TxType, time};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::StorageError;
use crate::format::{self, Shape, StoreState};

/// Outcome of admitting a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeResult {
    pub added_income: usize,
    pub added_expense: usize,
    pub skipped_duplicates: usize,
}

impl MergeResult {
    pub fn added(&self) -> usize {
        self.added_income + self.added_expense
    }
}

/// How the state was obtained on load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file yet
    Fresh,
    Canonical,
    UpgradedLegacy { dropped: usize },
    /// Unreadable or corrupt file; started empty
    Recovered { reason: String },
}

#[derive(Debug)]
pub struct Loaded {
    pub state: StoreState,
    pub outcome: LoadOutcome,
    /// Whether the state differs from what is on disk
    pub needs_save: bool,
}

#[derive(Debug)]
pub struct TransactionStore {
    path: PathBuf,
    state: RwLock<Arc<StoreState>>,
    write_lock: Mutex<()>,
}

impl TransactionStore {
    /// Read the file at `path` into a canonical state. Never fails: missing
    /// and corrupt files both yield an empty state.
    pub async fn load(path: &Path) -> Loaded {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Loaded {
                    state: StoreState::empty(),
                    outcome: LoadOutcome::Fresh,
                    needs_save: true,
                };
            }
            Err(e) => {
                let err = StorageError::io(path, e);
                error!(error = %err, "store unreadable; starting empty");
                return Loaded {
                    state: StoreState::empty(),
                    outcome: LoadOutcome::Recovered {
                        reason: err.to_string(),
                    },
                    needs_save: false,
                };
            }
        };

        match format::decode(&bytes) {
            Ok(decoded) => {
                if decoded.duplicates_removed > 0 {
                    warn!(removed = decoded.duplicates_removed, "duplicate ids removed from store");
                }
                let outcome = match decoded.shape {
                    Shape::Canonical => LoadOutcome::Canonical,
                    Shape::Legacy => LoadOutcome::UpgradedLegacy {
                        dropped: decoded.dropped,
                    },
                };
                Loaded {
                    needs_save: decoded.needs_rewrite(),
                    state: decoded.state,
                    outcome,
                }
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "store corrupt; starting empty");
                Loaded {
                    state: StoreState::empty(),
                    outcome: LoadOutcome::Recovered {
                        reason: err.to_string(),
                    },
                    needs_save: false,
                }
            }
        }
    }

    /// Load (upgrading/initializing the file when needed) and wrap in a store.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = Self::load(&path).await;
        match &loaded.outcome {
            LoadOutcome::Fresh => info!(path = %path.display(), "initializing empty store"),
            LoadOutcome::UpgradedLegacy { dropped } => {
                info!(path = %path.display(), dropped, "upgrading legacy flat-list store")
            }
            LoadOutcome::Canonical => debug!(
                path = %path.display(),
                income = loaded.state.income.len(),
                expense = loaded.state.expense.len(),
                "store loaded"
            ),
            LoadOutcome::Recovered { .. } => {}
        }
        if loaded.needs_save {
            if let Err(e) = write_atomic(&path, &loaded.state).await {
                error!(error = %e, "could not persist store on open");
            }
        }
        Self {
            path,
            state: RwLock::new(Arc::new(loaded.state)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state. Cheap: clones an `Arc`.
    pub async fn snapshot(&self) -> Arc<StoreState> {
        self.state.read().await.clone()
    }

    /// Admit a batch. Each transaction goes to the partition named by its own
    /// type; ids already present there (or earlier in the batch) are skipped.
    /// Accepted records are placed in front of the partition, keeping batch
    /// order, so partitions stay newest-first.
    pub async fn merge(&self, batch: Vec<Transaction>) -> Result<MergeResult, StorageError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot().await;

        let mut seen_income: HashSet<&str> = current.income.iter().map(|t| t.id.as_str()).collect();
        let mut seen_expense: HashSet<&str> =
            current.expense.iter().map(|t| t.id.as_str()).collect();

        let mut result = MergeResult::default();
        let mut fresh_income = Vec::new();
        let mut fresh_expense = Vec::new();

        for t in &batch {
            let (seen, fresh) = match t.tx_type {
                TxType::Income => (&mut seen_income, &mut fresh_income),
                TxType::Expense => (&mut seen_expense, &mut fresh_expense),
            };
            if seen.insert(t.id.as_str()) {
                fresh.push(t.clone());
            } else {
                result.skipped_duplicates += 1;
            }
        }
        result.added_income = fresh_income.len();
        result.added_expense = fresh_expense.len();

        fresh_income.extend(current.income.iter().cloned());
        fresh_expense.extend(current.expense.iter().cloned());
        let next = StoreState {
            income: fresh_income,
            expense: fresh_expense,
            last_updated: time::now_rfc3339(),
        };

        write_atomic(&self.path, &next).await?;
        *self.state.write().await = Arc::new(next);

        debug!(
            added_income = result.added_income,
            added_expense = result.added_expense,
            skipped = result.skipped_duplicates,
            "merge committed"
        );
        Ok(result)
    }

    /// Drop every record in both partitions.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let next = StoreState::empty();
        write_atomic(&self.path, &next).await?;
        *self.state.write().await = Arc::new(next);
        info!(path = %self.path.display(), "store cleared");
        Ok(())
    }
}

/// Write `state` next to `path`, then rename over it.
async fn write_atomic(path: &Path, state: &StoreState) -> Result<(), StorageError> {
    let bytes = format::encode(state)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::io(dir, e))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| StorageError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::io(path, e))
}
