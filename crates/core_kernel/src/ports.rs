//! Ports and Adapters Infrastructure
//!
//! Storage for the ledger is reached through port traits defined in the
//! domain crate. Adapters (in-memory, PostgreSQL) report failures with the
//! shared `PortError` so the domain can classify them without knowing which
//! backend produced them.
//!
//! ```text
//! ┌───────────────────────────────┐
//! │   Ledger services (domain)    │
//! └───────────────────────────────┘
//!                │
//!                ▼
//! ┌───────────────────────────────┐
//! │  LedgerStore / LedgerTx port  │
//! └───────────────────────────────┘
//!        ▲                 ▲
//!        │                 │
//! ┌──────┴──────┐   ┌──────┴──────┐
//! │  In-memory  │   │ PostgreSQL  │
//! └─────────────┘   └─────────────┘
//! ```

use std::fmt;
use thiserror::Error;

/// Error type for port operations
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// The operation conflicts with existing data
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
    },

    /// A lock wait or serialization conflict aborted the transaction
    #[error("Contention aborted {operation} after {waited_ms}ms")]
    Contention {
        operation: String,
        waited_ms: u64,
    },

    /// Connection to the underlying system failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Stored data could not be mapped back into domain types
    #[error("Transformation error: {message}")]
    Transformation {
        message: String,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates a Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    /// Creates a Contention error
    pub fn contention(operation: impl Into<String>, waited_ms: u64) -> Self {
        PortError::Contention {
            operation: operation.into(),
            waited_ms,
        }
    }

    /// Creates a Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a Transformation error
    pub fn transformation(message: impl Into<String>) -> Self {
        PortError::Transformation {
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Contention { .. } | PortError::Connection { .. }
        )
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Marker trait for all domain ports
///
/// All port traits should extend this marker to ensure they are
/// thread-safe and can be used in async contexts.
pub trait DomainPort: Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_error_not_found() {
        let error = PortError::not_found("Account", "1000");
        assert!(error.is_not_found());
        assert!(!error.is_transient());
        assert!(error.to_string().contains("Account"));
        assert!(error.to_string().contains("1000"));
    }

    #[test]
    fn test_contention_is_transient() {
        let error = PortError::contention("post", 5000);
        assert!(error.is_transient());
        assert_eq!(error.to_string(), "Contention aborted post after 5000ms");
    }

    #[test]
    fn test_conflict_is_permanent() {
        assert!(!PortError::conflict("duplicate code").is_transient());
    }
}
