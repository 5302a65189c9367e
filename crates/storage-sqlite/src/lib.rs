//! SQLite persistent cache tier for finrelay.
//!
//! This crate provides the durable (L2) half of the multi-level cache using
//! Diesel ORM with SQLite. It implements the `PersistentCache` trait defined in
//! `finrelay-core` and contains:
//! - Database connection pooling and pragmas
//! - Embedded Diesel migrations
//! - A single-writer actor that serializes every write
//! - The generic `cache_entries` table plus denormalized OHLCV tables
//!
//! # Architecture
//!
//! This crate is the only place where Diesel dependencies exist. `core` and
//! `market-data` are database-agnostic and only see the trait.
//!
//! ```text
//! market-data (providers, router)
//!        │
//!        ▼
//! core (MultiLevelCache, DataService) ── PersistentCache trait
//!                                              │
//!                                              ▼
//!                                storage-sqlite (this crate)
//!                                              │
//!                                              ▼
//!                                          SQLite DB
//! ```

pub mod cache;
pub mod db;
pub mod errors;
pub mod schema;

pub use cache::SqliteCacheStore;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, get_db_path, init, init_at, run_migrations, spawn_writer,
    DbConnection, DbPool, WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

// Re-export from finrelay-core for convenience
pub use finrelay_core::errors::{DatabaseError, Error, Result};
