//! Boundaries the engine talks through: the remote feed service, the local
//! read store and the navigation history.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use super::post::TimelineData;
use crate::feed::ApiError;

/// Remote feed-aggregation service.
#[async_trait]
pub trait FeedApi: Send + Sync {
    /// Posts, subscriptions and server-side read state in one call.
    async fn load_timeline_data(&self) -> Result<TimelineData, ApiError>;

    /// Site host to icon URL.
    async fn load_icon_map(&self) -> Result<HashMap<String, String>, ApiError>;

    async fn load_starred_ids(&self) -> Result<HashSet<String>, ApiError>;

    async fn set_starred(&self, ids: &[String]) -> Result<(), ApiError>;

    async fn clear_starred(&self, ids: &[String]) -> Result<(), ApiError>;

    async fn mark_entries_read(&self, ids: &[String]) -> Result<(), ApiError>;

    async fn mark_entries_unread(&self, ids: &[String]) -> Result<(), ApiError>;
}

/// Persistent per-device read ledger and view preferences.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn load_read_ids(&self) -> anyhow::Result<HashSet<String>>;

    async fn persist_read_id(&self, id: &str) -> anyhow::Result<()>;

    /// Union with the stored set; never overwrites it.
    async fn persist_read_ids(&self, ids: &[String]) -> anyhow::Result<()>;

    async fn clear_persisted_read_id(&self, id: &str) -> anyhow::Result<()>;

    async fn load_hide_read(&self) -> anyhow::Result<bool>;

    async fn save_hide_read(&self, enabled: bool) -> anyhow::Result<()>;
}

/// Location fragment storage. Replacing rewrites the current entry, pushing
/// adds a new one.
pub trait History: Send + Sync {
    fn read_location(&self) -> String;

    fn replace_location(&self, fragment: &str);

    fn push_location(&self, fragment: &str);
}
