//! Repository implementations, one per table.

pub mod node;
pub mod task;

use sqlx::error::Error as SqlxError;

/// Whether a sqlx error is a SQLite UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &SqlxError) -> bool {
    matches!(
        err,
        SqlxError::Database(db_err) if db_err.message().contains("UNIQUE constraint failed")
    )
}
