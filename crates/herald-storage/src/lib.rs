//! Herald Storage crate - SQLite persistence for items, authors and the
//! audit log.
//!
//! Provides a WAL-mode SQLite database with migrations and the `ItemStore`
//! trait together with its SQLite implementation.

pub mod audit;
pub mod db;
pub mod migrations;
pub mod repository;
pub mod store;

pub use db::Database;
pub use repository::SqliteStore;
pub use store::{ItemStore, UpsertOutcome};
