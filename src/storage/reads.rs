use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;

use super::schema::Database;

impl Database {
    // ========================================================================
    // Read Posts
    // ========================================================================

    /// All post ids recorded as read.
    pub async fn load_read_ids(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT post_id FROM read_posts")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Record one post as read. Re-marking keeps the first timestamp.
    pub async fn mark_read(&self, post_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO read_posts (post_id, read_at) VALUES (?, ?)")
            .bind(post_id)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record many posts as read in one transaction, leaving existing ids in
    /// place.
    pub async fn mark_read_many(&self, post_ids: &[String]) -> Result<u64> {
        if post_ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for post_id in post_ids {
            inserted += sqlx::query(
                "INSERT OR IGNORE INTO read_posts (post_id, read_at) VALUES (?, ?)",
            )
            .bind(post_id)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Forget that a post was read. Returns whether a row was removed.
    pub async fn mark_unread(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM read_posts WHERE post_id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_database_has_no_reads() {
        let db = test_db().await;
        assert!(db.load_read_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let db = test_db().await;
        db.mark_read("p1").await.unwrap();
        db.mark_read("p1").await.unwrap();

        let ids = db.load_read_ids().await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("p1"));
    }

    #[tokio::test]
    async fn test_mark_read_many_unions_with_existing() {
        let db = test_db().await;
        db.mark_read("p1").await.unwrap();

        let inserted = db
            .mark_read_many(&["p1".to_string(), "p2".to_string(), "p3".to_string()])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let ids = db.load_read_ids().await.unwrap();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_mark_read_many_empty() {
        let db = test_db().await;
        assert_eq!(db.mark_read_many(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_unread() {
        let db = test_db().await;
        db.mark_read("p1").await.unwrap();

        assert!(db.mark_unread("p1").await.unwrap());
        assert!(!db.mark_unread("p1").await.unwrap());
        assert!(db.load_read_ids().await.unwrap().is_empty());
    }
}
