//! Key-value document repository for `SQLite` persistence.
//!
//! Each document is a JSON body stored under a fixed key and rewritten in
//! full on every save.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

use super::db::Database;

/// Document holding every course record, keyed by course id.
pub const COURSES: &str = "courses";
/// Document holding course overview message handles.
pub const MESSAGE_IDS: &str = "message_ids";
/// Document holding the deadline overview message handle.
pub const DEADLINE_MESSAGE: &str = "deadline_message";
/// Document holding the general reminder ledger.
pub const REMINDERS: &str = "reminders";
/// Document holding the last-day reminder ledger.
pub const LAST_DAY_REMINDERS: &str = "last_day_reminders";

/// Repository for whole-document reads and writes.
#[derive(Clone)]
pub struct DocumentRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct DocumentRow {
    body: String,
}

impl DocumentRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load a document, or its default when it has never been saved.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the stored body does
    /// not deserialize.
    pub async fn load<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let row: Option<DocumentRow> = sqlx::query_as("SELECT body FROM document WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.db.as_ref())
            .await?;

        match row {
            Some(row) => Ok(serde_json::from_str(&row.body)?),
            None => Ok(T::default()),
        }
    }

    /// Replace a document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization or the upsert fails.
    pub async fn save<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_string(value)?;
        let updated_at = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO document (key, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(&body)
        .bind(&updated_at)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Whether a document has ever been saved.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document WHERE key = ?1")
            .bind(key)
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }
}
