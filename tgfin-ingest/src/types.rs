use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tgfin_core::{GroupId, TxType};

/// One chat message as handed out by a [`crate::MessageSource`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMessage {
    #[serde(deserialize_with = "string_or_int")]
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_string_or_int")]
    pub sender_id: Option<String>,
}

impl SourceMessage {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: Some(text.into()),
            timestamp: None,
            sender_id: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Text if present and not just whitespace.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// A pushed message together with the group it arrived in
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub group_id: GroupId,
    pub group_title: Option<String>,
    pub message: SourceMessage,
}

/// A configured group: its id and declared transaction type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: GroupId,
    /// Raw declared type; anything but income/expense means "not financial"
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl GroupConfig {
    pub fn new(id: impl Into<GroupId>, tx_type: TxType) -> Self {
        Self {
            id: id.into(),
            kind: Some(tx_type.as_str().to_string()),
            title: None,
        }
    }

    pub fn tx_type(&self) -> Option<TxType> {
        self.kind.as_deref().and_then(|k| k.parse().ok())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrInt {
    Int(i64),
    Str(String),
}

impl StringOrInt {
    fn into_string(self) -> String {
        match self {
            StringOrInt::Int(n) => n.to_string(),
            StringOrInt::Str(s) => s,
        }
    }
}

fn string_or_int<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    StringOrInt::deserialize(d).map(StringOrInt::into_string)
}

fn opt_string_or_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Option::<StringOrInt>::deserialize(d).map(|v| v.map(StringOrInt::into_string))
}

/// Unparseable dates degrade to `None`; the record then takes ingestion time.
fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.as_deref().and_then(tgfin_core::time::parse_timestamp))
}
