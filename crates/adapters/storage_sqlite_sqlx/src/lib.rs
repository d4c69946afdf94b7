//! # devicehub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `Repository` port defined in `devicehub-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `devicehub-app` (for the port trait) and `devicehub-domain`
//! (for domain types). The `app` and `domain` crates must never reference
//! this adapter.

mod error;
mod pool;
mod repository;

pub use error::StorageError;
pub use pool::{Config, Database};
pub use repository::SqliteRepository;
