//! Persistence layer modules.

pub mod db;
pub mod document_repo;
pub mod schema;
pub mod state;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
