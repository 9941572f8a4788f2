//! `SQLite` schema for the document store.
//!
//! Monitor state lives in a single key/value table: one row per named JSON
//! document, rewritten whole on every save.

use sqlx::SqlitePool;

use crate::Result;

/// Create the `document` table if it does not exist yet.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS document (
    key             TEXT PRIMARY KEY NOT NULL,
    body            TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
