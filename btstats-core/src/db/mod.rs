//! Database layer for btstats
//!
//! The event store is a SQLite database:
//! - Schema migrations
//! - Append and count operations for the import path
//! - The [`EventStore`] query facility used by the dispatcher

pub mod repo;
pub mod schema;

pub use repo::{Database, EventStore, NewEvent};
