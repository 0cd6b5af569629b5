//! # Database Crate
//!
//! Persistence for accounts, orders, positions, the ledger and price bars.
//!
//! - `LedgerStore` / `StoreTx`: the transactional interface the execution
//!   engine is written against. Locks are row-level and held until commit.
//! - `DbRepository`: the PostgreSQL implementation, built on a `PgPool`.
//! - `InMemoryStore`: a process-local implementation with identical locking
//!   semantics. Enable the `testkit` feature for its fault-injection hooks.
//! - `connect` / `run_migrations`: pool setup and the embedded schema.

pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

pub use connection::{connect, connect_from_env, run_migrations};
pub use error::DbError;
pub use memory::{InMemoryStore, MemoryTx};
pub use repository::{DbRepository, PgStoreTx};
pub use store::{LedgerStore, StoreTx};
pub use sqlx::PgPool;
