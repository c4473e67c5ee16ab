//! JSON shapes of the Feedbin-compatible endpoints.
//!
//! Ids arrive as numbers from the real service but are kept opaque, so they
//! are accepted as either numbers or strings and stored as strings.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawSubscription {
    #[serde(default, deserialize_with = "opaque_id_opt")]
    pub id: Option<String>,
    #[serde(deserialize_with = "opaque_id")]
    pub feed_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub feed_url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub site_url: String,
    #[serde(default)]
    pub json_feed: Option<JsonFeedMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JsonFeedMeta {
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawEntry {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default, deserialize_with = "opaque_id_opt")]
    pub feed_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl RawEntry {
    /// Publication timestamp as sent, falling back to the creation time.
    pub fn timestamp(&self) -> Option<&str> {
        self.published
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.created_at.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawIcon {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub host: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
}

/// Body of the unread/starred mutation endpoints.
#[derive(Debug, Serialize)]
pub struct EntryIdsBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_entries: Option<Vec<WireId<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred_entries: Option<Vec<WireId<'a>>>,
}

/// Numeric ids go out as JSON numbers, anything else as a string.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WireId<'a> {
    Number(i64),
    Text(&'a str),
}

impl<'a> WireId<'a> {
    pub fn from_id(id: &'a str) -> Self {
        match id.parse::<i64>() {
            Ok(n) => WireId::Number(n),
            Err(_) => WireId::Text(id),
        }
    }

    pub fn list(ids: &'a [String]) -> Vec<Self> {
        ids.iter()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .map(Self::from_id)
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Text(String),
}

impl From<IdRepr> for String {
    fn from(repr: IdRepr) -> Self {
        match repr {
            IdRepr::Int(n) => n.to_string(),
            IdRepr::Text(s) => s,
        }
    }
}

fn opaque_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    IdRepr::deserialize(d).map(String::from)
}

fn opaque_id_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<IdRepr>::deserialize(d)?.map(String::from))
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Decode a JSON array of ids (numbers or strings).
pub fn decode_id_list(bytes: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    let ids: Vec<IdRepr> = serde_json::from_slice(bytes)?;
    Ok(ids.into_iter().map(String::from).collect())
}
