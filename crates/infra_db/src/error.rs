//! Database error types
//!
//! This module defines the error types that can occur during database operations
//! and their translation into the ledger's `PortError`.

use core_kernel::PortError;
use thiserror::Error;

/// Errors that can occur during database operations
///
/// This enum captures all possible database-related errors, including
/// connection issues, query failures, and constraint violations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Serialization failure or deadlock; the transaction must be retried
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// `lock_timeout` expired while waiting for a row lock
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A column value could not be mapped onto a domain type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("{} with id '{}' not found", entity, id))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if the transaction may succeed when run again
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            DatabaseError::SerializationFailure(_) | DatabaseError::LockTimeout(_) | DatabaseError::PoolExhausted
        )
    }

    /// Translates into the port error reported to the ledger
    ///
    /// `waited_ms` is the lock timeout in force, reported on contention.
    pub fn into_port_error(self, operation: &str, waited_ms: u64) -> PortError {
        if self.is_contention() {
            return PortError::contention(operation, waited_ms);
        }
        match self {
            DatabaseError::DuplicateEntry(message) => PortError::conflict(message),
            DatabaseError::NotFound(message) => PortError::not_found(operation, message),
            DatabaseError::ConnectionFailed(message) => PortError::connection(message),
            DatabaseError::Decode(message) => PortError::transformation(message),
            other => PortError::internal(other.to_string()),
        }
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
///
/// This function analyzes the SQLx error and maps it to the appropriate
/// DatabaseError variant based on the PostgreSQL error code.
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(err) => DatabaseError::ConnectionFailed(err.to_string()),
            sqlx::Error::Decode(err) => DatabaseError::Decode(err.to_string()),
            sqlx::Error::ColumnDecode { index, source } => {
                DatabaseError::Decode(format!("column {}: {}", index, source))
            }
            sqlx::Error::Database(db_err) => {
                // PostgreSQL error codes
                // https://www.postgresql.org/docs/current/errcodes-appendix.html
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    Some("40001") | Some("40P01") => DatabaseError::SerializationFailure(message),
                    Some("55P03") => DatabaseError::LockTimeout(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::from(&error)
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}
