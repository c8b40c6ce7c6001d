//! Group identifiers and the group → transaction type mapping.
//!
//! Chat transports hand out group ids as integers, config files spell them as
//! strings, and the settings page used to send `{"id": .., "name": ..}` objects.
//! Every one of those enters through [`GroupId::parse`] so that `-100123` and
//! `"-100123"` compare equal everywhere.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::transaction::TxType;

/// Canonical, normalized chat group identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    /// Normalize a raw id: trim, and re-render integers in plain decimal form.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(n) => GroupId(n.to_string()),
            Err(_) => GroupId(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for GroupId {
    fn from(n: i64) -> Self {
        GroupId(n.to_string())
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        GroupId::parse(s)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for GroupId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawGroupId {
    Int(i64),
    Str(String),
    Obj { id: Box<RawGroupId> },
}

impl RawGroupId {
    fn into_group_id(self) -> GroupId {
        match self {
            RawGroupId::Int(n) => GroupId::from(n),
            RawGroupId::Str(s) => GroupId::parse(&s),
            RawGroupId::Obj { id } => id.into_group_id(),
        }
    }
}

impl<'de> Deserialize<'de> for GroupId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawGroupId::deserialize(deserializer).map(RawGroupId::into_group_id)
    }
}

/// Static per-group type assignment. Groups absent here are not financial.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupTypeMap {
    types: HashMap<GroupId, TxType>,
}

impl GroupTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw string pairs. Values other than income/expense are dropped.
    pub fn from_raw<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = Self::new();
        for (id, kind) in entries {
            if let Ok(tx_type) = kind.as_ref().parse::<TxType>() {
                map.insert(GroupId::parse(id.as_ref()), tx_type);
            }
        }
        map
    }

    pub fn insert(&mut self, id: GroupId, tx_type: TxType) {
        self.types.insert(id, tx_type);
    }

    pub fn lookup(&self, id: &GroupId) -> Option<TxType> {
        self.types.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Mapped group ids, sorted for stable output.
    pub fn group_ids(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.types.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupId, &TxType)> {
        self.types.iter()
    }
}

impl FromIterator<(GroupId, TxType)> for GroupTypeMap {
    fn from_iter<I: IntoIterator<Item = (GroupId, TxType)>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_normalizes_numeric_ids() {
        assert_eq!(GroupId::parse(" -4884869527 ").as_str(), "-4884869527");
        assert_eq!(GroupId::parse("+42").as_str(), "42");
        assert_eq!(GroupId::from(-4884869527_i64), GroupId::parse("-4884869527"));
        assert_eq!(GroupId::parse("@finance_chat").as_str(), "@finance_chat");
    }

    #[test]
    fn test_deserialize_accepts_int_string_and_object() {
        let ids: Vec<GroupId> =
            serde_json::from_value(json!([-100, "-100", {"id": "-100", "name": "Расходы"}, {"id": -100}]))
                .unwrap();
        assert!(ids.iter().all(|id| id.as_str() == "-100"));
    }

    #[test]
    fn test_serializes_as_string() {
        let v = serde_json::to_value(GroupId::from(-7_i64)).unwrap();
        assert_eq!(v, json!("-7"));
    }

    #[test]
    fn test_type_map_drops_unknown_values() {
        let map = GroupTypeMap::from_raw([
            ("-1", "income"),
            ("-2", "Expense"),
            ("-3", "other"),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup(&GroupId::from(-1_i64)), Some(TxType::Income));
        assert_eq!(map.lookup(&GroupId::parse("-2")), Some(TxType::Expense));
        assert_eq!(map.lookup(&GroupId::parse("-3")), None);
    }

    #[test]
    fn test_group_ids_sorted() {
        let map = GroupTypeMap::from_raw([("b", "income"), ("a", "expense")]);
        assert_eq!(map.group_ids(), vec![GroupId::parse("a"), GroupId::parse("b")]);
    }
}
