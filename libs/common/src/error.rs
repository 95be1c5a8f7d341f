//! Database error types shared by the services

use sqlx::Error as SqlxError;
use thiserror::Error;

/// SQLSTATE for a unique-constraint violation
pub const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for a CHECK-constraint violation
pub const CHECK_VIOLATION: &str = "23514";
/// SQLSTATE for a foreign-key violation
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[from] SqlxError),

    /// A row collided with a unique constraint
    #[error("Duplicate value violates {0}")]
    Duplicate(String),

    /// A row broke a CHECK or foreign-key constraint
    #[error("Value violates {0}")]
    ConstraintViolation(String),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// SQLSTATE code of a server-side error, if any
pub fn sqlstate(err: &SqlxError) -> Option<String> {
    match err {
        SqlxError::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}

impl DatabaseError {
    /// Sort a query error by the constraint it hit
    pub fn classify(err: SqlxError) -> Self {
        let constraint = match &err {
            SqlxError::Database(db_err) => db_err
                .constraint()
                .unwrap_or("a table constraint")
                .to_string(),
            _ => return DatabaseError::Query(err),
        };

        match sqlstate(&err).as_deref() {
            Some(UNIQUE_VIOLATION) => DatabaseError::Duplicate(constraint),
            Some(CHECK_VIOLATION) | Some(FOREIGN_KEY_VIOLATION) => {
                DatabaseError::ConstraintViolation(constraint)
            }
            _ => DatabaseError::Query(err),
        }
    }

    /// Whether the caller sent data the schema refuses, as opposed to a fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::Duplicate(_) | DatabaseError::ConstraintViolation(_)
        )
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
