//! Read-side views over a store snapshot.
//!
//! Ordering contract for [`list`]: every income record (partition order,
//! newest first) followed by every expense record (partition order). Records
//! are not re-sorted by timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tgfin_core::{Category, Transaction, TxType};

use crate::format::StoreState;

/// Filter by type, then skip `offset`, then take `limit` (all when `None`).
pub fn list(
    state: &StoreState,
    type_filter: Option<TxType>,
    offset: usize,
    limit: Option<usize>,
) -> Vec<Transaction> {
    state
        .iter()
        .filter(|t| type_filter.is_none_or(|wanted| t.tx_type == wanted))
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Totals for the dashboard header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_income: f64,
    pub total_expense: f64,
    pub balance: f64,
    pub income_count: usize,
    pub expense_count: usize,
    pub total_count: usize,
    pub last_update: Option<String>,
}

pub fn summary(state: &StoreState, last_update: Option<DateTime<Utc>>) -> Summary {
    let total_income: f64 = state.income.iter().map(|t| t.amount).sum();
    let total_expense: f64 = state.expense.iter().map(|t| t.amount).sum();
    Summary {
        total_income,
        total_expense,
        balance: total_income - total_expense,
        income_count: state.income.len(),
        expense_count: state.expense.len(),
        total_count: state.len(),
        last_update: last_update.map(|dt| dt.to_rfc3339()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub total: f64,
    pub count: usize,
}

/// Per-category sums for one partition, largest first.
pub fn category_totals(state: &StoreState, tx_type: TxType) -> Vec<CategoryTotal> {
    let mut by_cat: BTreeMap<Category, (f64, usize)> = BTreeMap::new();
    for t in state.partition(tx_type) {
        let e = by_cat.entry(t.category).or_insert((0.0, 0));
        e.0 += t.amount;
        e.1 += 1;
    }
    let mut totals: Vec<CategoryTotal> = by_cat
        .into_iter()
        .map(|(category, (total, count))| CategoryTotal {
            category,
            total,
            count,
        })
        .collect();
    totals.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.category.as_str().cmp(b.category.as_str()))
    });
    totals
}
