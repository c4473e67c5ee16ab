use anyhow::Result;

use super::schema::Database;

/// Preference key for the hide-read toggle.
pub(crate) const HIDE_READ_KEY: &str = "timeline.hide_read";

impl Database {
    // ========================================================================
    // User Preferences
    // ========================================================================

    /// Get a single preference value by key, or `None` if unset.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT).
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stored hide-read preference. Unset or unrecognized values read as off.
    pub async fn hide_read(&self) -> Result<bool> {
        let value = self.get_preference(HIDE_READ_KEY).await?;
        Ok(matches!(value.as_deref(), Some("true")))
    }

    pub async fn set_hide_read(&self, enabled: bool) -> Result<()> {
        self.set_preference(HIDE_READ_KEY, if enabled { "true" } else { "false" })
            .await
    }
}
