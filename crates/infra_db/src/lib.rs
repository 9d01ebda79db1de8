//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL storage for the ledger using SQLx:
//! connection pooling, embedded schema migrations, and the `PgLedgerStore`
//! adapter implementing the ledger storage port.
//!
//! # Architecture
//!
//! The domain layer owns the `LedgerStore` / `LedgerTx` traits; this crate
//! implements them without leaking SQL into the domain. Every unit of work is
//! a `SERIALIZABLE` transaction, and serialization failures, deadlocks and
//! lock timeouts surface as `PortError::Contention` so the ledger can retry.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::from_env()?).await?;
//! run_migrations(&pool).await?;
//! let store = PgLedgerStore::new(pool, Duration::from_secs(5));
//! ```

pub mod error;
pub mod pool;
pub mod store;

pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool, MIGRATOR};
pub use store::{PgLedgerStore, PgLedgerTx};
