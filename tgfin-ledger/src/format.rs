//! On-disk store format.
//!
//! Canonical shape:
//!   { "income": [record, ..], "expense": [record, ..], "last_updated": "<rfc3339>" }
//!
//! Legacy shape (read only, upgraded on load):
//!   [ { .., "type": "income" }, { .., "type": "expense" } ]
//!
//! Records are decoded leniently because several generations of tools wrote
//! this file: numeric ids, `date` instead of `timestamp`, `group_name` instead
//! of `group_title`, `text` instead of `description`, localized categories.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use tgfin_core::{
    Category, DEFAULT_CURRENCY, GroupId, Transaction, TxType, UNKNOWN_GROUP_TITLE, time,
};
use tracing::warn;

use crate::error::StorageError;

/// The two partitions plus the last write time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreState {
    /// Newest first
    pub income: Vec<Transaction>,
    /// Newest first
    pub expense: Vec<Transaction>,
    pub last_updated: String,
}

impl StoreState {
    pub fn empty() -> Self {
        Self {
            income: Vec::new(),
            expense: Vec::new(),
            last_updated: time::now_rfc3339(),
        }
    }

    pub fn partition(&self, tx_type: TxType) -> &[Transaction] {
        match tx_type {
            TxType::Income => &self.income,
            TxType::Expense => &self.expense,
        }
    }

    pub fn len(&self) -> usize {
        self.income.len() + self.expense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Income partition, then expense partition.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.income.iter().chain(self.expense.iter())
    }
}

/// Which shape the file had when read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Canonical,
    Legacy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub state: StoreState,
    pub shape: Shape,
    /// Legacy records whose `type` was neither income nor expense
    pub dropped: usize,
    /// Repeated ids removed inside a partition
    pub duplicates_removed: usize,
}

impl Decoded {
    /// Whether the file should be rewritten in canonical, deduplicated form.
    pub fn needs_rewrite(&self) -> bool {
        self.shape == Shape::Legacy || self.dropped > 0 || self.duplicates_removed > 0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FileIn {
    Legacy(Vec<RecordIn>),
    Canonical(CanonicalIn),
}

#[derive(Deserialize)]
struct CanonicalIn {
    #[serde(default)]
    income: Vec<RecordIn>,
    #[serde(default)]
    expense: Vec<RecordIn>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Deserialize)]
struct RecordIn {
    #[serde(default, deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    group_id: Option<GroupId>,
    #[serde(default)]
    group_title: Option<String>,
    #[serde(default)]
    group_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    amount: f64,
    #[serde(default)]
    currency: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    raw_text: Option<String>,
}

impl RecordIn {
    fn into_transaction(self, tx_type: TxType) -> Transaction {
        let description = self
            .description
            .or_else(|| self.text.clone())
            .or_else(|| self.raw_text.clone())
            .unwrap_or_default();
        Transaction {
            id: self.id,
            timestamp: self
                .timestamp
                .or(self.date)
                .unwrap_or_else(time::now_rfc3339),
            group_id: self.group_id.unwrap_or_else(|| GroupId::parse("")),
            group_title: self
                .group_title
                .or(self.group_name)
                .unwrap_or_else(|| UNKNOWN_GROUP_TITLE.to_string()),
            amount: self.amount,
            currency: self.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            tx_type,
            category: self
                .category
                .and_then(|c| c.parse().ok())
                .unwrap_or(Category::Other),
            description,
            raw_text: self.raw_text.or(self.text),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Scalar::deserialize(d)? {
        Scalar::Int(n) => n.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Str(s) => s,
    })
}

/// Amounts are finite and non-negative; anything else reads as 0.
fn lenient_amount<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let amount = match Scalar::deserialize(d)? {
        Scalar::Int(n) => n as f64,
        Scalar::Float(f) => f,
        Scalar::Str(s) => match s.trim().replace(',', "").parse::<f64>() {
            Ok(f) => f,
            Err(_) => {
                warn!(value = %s, "unparseable stored amount; using 0");
                return Ok(0.0);
            }
        },
    };
    if !amount.is_finite() || amount < 0.0 {
        warn!(amount, "stored amount out of range; using 0");
        return Ok(0.0);
    }
    Ok(amount)
}

/// Keep the first record for every id, in order.
fn dedup(records: &mut Vec<Transaction>) -> usize {
    let before = records.len();
    let mut seen = HashSet::new();
    records.retain(|t| seen.insert(t.id.clone()));
    before - records.len()
}

/// Decode either shape into the canonical state.
pub fn decode(bytes: &[u8]) -> Result<Decoded, StorageError> {
    let file: FileIn = serde_json::from_slice(bytes).map_err(StorageError::Malformed)?;

    let (mut state, shape, dropped) = match file {
        FileIn::Canonical(c) => {
            let state = StoreState {
                income: c
                    .income
                    .into_iter()
                    .map(|r| r.into_transaction(TxType::Income))
                    .collect(),
                expense: c
                    .expense
                    .into_iter()
                    .map(|r| r.into_transaction(TxType::Expense))
                    .collect(),
                last_updated: c.last_updated.unwrap_or_else(time::now_rfc3339),
            };
            (state, Shape::Canonical, 0)
        }
        FileIn::Legacy(records) => {
            let mut state = StoreState::empty();
            let mut dropped = 0;
            for record in records {
                match record.kind.as_deref().and_then(|k| k.parse::<TxType>().ok()) {
                    Some(TxType::Income) => state.income.push(record.into_transaction(TxType::Income)),
                    Some(TxType::Expense) => {
                        state.expense.push(record.into_transaction(TxType::Expense))
                    }
                    None => {
                        warn!(id = %record.id, kind = ?record.kind, "legacy record without income/expense type dropped");
                        dropped += 1;
                    }
                }
            }
            (state, Shape::Legacy, dropped)
        }
    };

    let duplicates_removed = dedup(&mut state.income) + dedup(&mut state.expense);
    Ok(Decoded {
        state,
        shape,
        dropped,
        duplicates_removed,
    })
}

#[derive(Serialize)]
struct RecordOut<'a> {
    id: &'a str,
    timestamp: &'a str,
    group_id: &'a GroupId,
    group_title: &'a str,
    amount: f64,
    currency: &'a str,
    category: Category,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_text: Option<&'a str>,
}

impl<'a> From<&'a Transaction> for RecordOut<'a> {
    fn from(t: &'a Transaction) -> Self {
        Self {
            id: &t.id,
            timestamp: &t.timestamp,
            group_id: &t.group_id,
            group_title: &t.group_title,
            amount: t.amount,
            currency: &t.currency,
            category: t.category,
            description: &t.description,
            raw_text: t.raw_text.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct FileOut<'a> {
    income: Vec<RecordOut<'a>>,
    expense: Vec<RecordOut<'a>>,
    last_updated: &'a str,
}

/// Encode in canonical shape. The partition carries the type.
pub fn encode(state: &StoreState) -> Result<Vec<u8>, StorageError> {
    let out = FileOut {
        income: state.income.iter().map(RecordOut::from).collect(),
        expense: state.expense.iter().map(RecordOut::from).collect(),
        last_updated: &state.last_updated,
    };
    serde_json::to_vec_pretty(&out).map_err(StorageError::Encode)
}
