use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use super::schema::Database;
use crate::timeline::LocalStore;

#[async_trait]
impl LocalStore for Database {
    async fn load_read_ids(&self) -> Result<HashSet<String>> {
        Database::load_read_ids(self).await
    }

    async fn persist_read_id(&self, post_id: &str) -> Result<()> {
        self.mark_read(post_id).await
    }

    async fn persist_read_ids(&self, post_ids: &[String]) -> Result<()> {
        let inserted = self.mark_read_many(post_ids).await?;
        tracing::debug!(requested = post_ids.len(), inserted, "Persisted read ids");
        Ok(())
    }

    async fn clear_persisted_read_id(&self, post_id: &str) -> Result<()> {
        self.mark_unread(post_id).await.map(|_| ())
    }

    async fn load_hide_read(&self) -> Result<bool> {
        self.hide_read().await
    }

    async fn save_hide_read(&self, enabled: bool) -> Result<()> {
        self.set_hide_read(enabled).await
    }
}
