//! Message → transaction classification. Pure: no I/O, no clock except the
//! timestamp fallback in [`Classification::into_transaction`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use tgfin_core::{
    Category, DEFAULT_CURRENCY, DESCRIPTION_LIMIT, GroupId, GroupTypeMap, RAW_TEXT_LIMIT,
    Transaction, TxType, UNKNOWN_GROUP_TITLE, categorize, time, truncate_chars,
};
use tracing::trace;

use crate::parsers::amount::{AmountExtractor, detect_currency};
use crate::types::IncomingMessage;

/// Everything derived from message content plus the group's type
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub tx_type: TxType,
    pub amount: f64,
    pub currency: String,
    pub category: Category,
    pub description: String,
    pub raw_text: String,
}

impl Classification {
    /// Attach message identity. Missing timestamps fall back to now.
    pub fn into_transaction(
        self,
        id: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
        group_id: GroupId,
        group_title: Option<&str>,
    ) -> Transaction {
        Transaction {
            id: id.into(),
            timestamp: timestamp.map(time::to_rfc3339_utc).unwrap_or_else(time::now_rfc3339),
            group_id,
            group_title: group_title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(UNKNOWN_GROUP_TITLE)
                .to_string(),
            amount: self.amount,
            currency: self.currency,
            tx_type: self.tx_type,
            category: self.category,
            description: self.description,
            raw_text: Some(self.raw_text),
        }
    }
}

/// Classification engine; holds the compiled amount patterns.
#[derive(Debug, Clone)]
pub struct Classifier {
    amounts: AmountExtractor,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            amounts: AmountExtractor::new()?,
        })
    }

    /// Classify raw text from `group_id`.
    ///
    /// `None` when the text is empty, the group is unmapped, or no amount is
    /// found. The group's mapping alone decides income vs expense.
    pub fn classify(
        &self,
        text: &str,
        group_id: &GroupId,
        group_types: &GroupTypeMap,
    ) -> Option<Classification> {
        if text.trim().is_empty() {
            trace!(group = %group_id, "skip: empty text");
            return None;
        }
        let Some(tx_type) = group_types.lookup(group_id) else {
            trace!(group = %group_id, "skip: group not mapped");
            return None;
        };
        let Some(amount) = self.amounts.amount(text) else {
            trace!(group = %group_id, "skip: no amount");
            return None;
        };

        Some(Classification {
            tx_type,
            amount,
            currency: detect_currency(text).unwrap_or(DEFAULT_CURRENCY).to_string(),
            category: categorize(text),
            description: truncate_chars(&text.trim().to_lowercase(), DESCRIPTION_LIMIT),
            raw_text: truncate_chars(text, RAW_TEXT_LIMIT),
        })
    }

    /// Classify a pushed/fetched message into a full transaction.
    pub fn classify_message(
        &self,
        incoming: &IncomingMessage,
        group_types: &GroupTypeMap,
    ) -> Option<Transaction> {
        let msg = &incoming.message;
        let text = msg.text()?;
        self.classify(text, &incoming.group_id, group_types).map(|c| {
            c.into_transaction(
                msg.id.clone(),
                msg.timestamp,
                incoming.group_id.clone(),
                incoming.group_title.as_deref(),
            )
        })
    }
}
