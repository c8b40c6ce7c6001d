//! Transaction record types shared by the classifier, the store and the views.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::group::GroupId;

/// Currency assumed when the message carries no explicit marker.
pub const DEFAULT_CURRENCY: &str = "RUB";
/// Title used when the source cannot tell us the group's name.
pub const UNKNOWN_GROUP_TITLE: &str = "Unknown";
/// Max characters kept in `description`.
pub const DESCRIPTION_LIMIT: usize = 100;
/// Max characters kept in `raw_text`.
pub const RAW_TEXT_LIMIT: usize = 200;

/// A classified income or expense, derived from one chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Source message id; unique only inside its partition
    pub id: String,
    /// RFC 3339 origination time of the message
    pub timestamp: String,
    pub group_id: GroupId,
    pub group_title: String,
    /// Non-negative amount as written in the message
    pub amount: f64,
    pub currency: String,
    /// Fixed by the origin group, never by message content
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub category: Category,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl Transaction {
    pub fn is_income(&self) -> bool {
        self.tx_type == TxType::Income
    }

    pub fn is_expense(&self) -> bool {
        self.tx_type == TxType::Expense
    }
}

/// Partition a transaction belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Income,
    Expense,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Income => "income",
            TxType::Expense => "expense",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxType {
    type Err = String;

    /// Accepts `income`/`expense` in any case, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(TxType::Income),
            "expense" => Ok(TxType::Expense),
            other => Err(format!("unknown transaction type: {other:?}")),
        }
    }
}

/// Spending/earning categories matched by keyword
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Transport,
    Utilities,
    Entertainment,
    Health,
    Clothing,
    Education,
    Work,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Food,
        Category::Transport,
        Category::Utilities,
        Category::Entertainment,
        Category::Health,
        Category::Clothing,
        Category::Education,
        Category::Work,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Utilities => "utilities",
            Category::Entertainment => "entertainment",
            Category::Health => "health",
            Category::Clothing => "clothing",
            Category::Education => "education",
            Category::Work => "work",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown category: {s:?}"))
    }
}

/// Keep at most `limit` characters (not bytes) of `text`.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction {
            id: "17".to_string(),
            timestamp: "2026-02-18T10:00:00+00:00".to_string(),
            group_id: GroupId::parse("-4884869527"),
            group_title: "Расходы".to_string(),
            amount: 1500.0,
            currency: DEFAULT_CURRENCY.to_string(),
            tx_type: TxType::Expense,
            category: Category::Food,
            description: "купил продукты на 1500 руб".to_string(),
            raw_text: None,
        }
    }

    #[test]
    fn test_type_serializes_as_type_field() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["type"], "expense");
        assert_eq!(value["category"], "food");
        assert_eq!(value["group_id"], "-4884869527");
        assert!(value.get("raw_text").is_none());
    }

    #[test]
    fn test_tx_type_from_str_is_lenient_on_case() {
        assert_eq!(" Income ".parse::<TxType>(), Ok(TxType::Income));
        assert_eq!("EXPENSE".parse::<TxType>(), Ok(TxType::Expense));
        assert!("other".parse::<TxType>().is_err());
    }

    #[test]
    fn test_category_round_trips_through_str() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>(), Ok(c));
        }
        assert_eq!(Category::default(), Category::Other);
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let text = "проверка";
        assert_eq!(truncate_chars(text, 3), "про");
        assert_eq!(truncate_chars(text, 100), text);
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_partition_helpers() {
        let t = sample();
        assert!(t.is_expense());
        assert!(!t.is_income());
    }
}
