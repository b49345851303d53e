//! # btstats-core
//!
//! Core library for btstats - read-only analytics over archived berrytube events.
//!
//! This library provides:
//! - A small aggregation pipeline (match, project, unwind, group, sort, limit)
//! - The registry of named actions and the shared window/ranking policy
//! - SQLite event storage with migrations
//! - Compact JSON encoding of result documents
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A request flows through four steps:
//! - **Resolve:** the action name is looked up in the [`ActionRegistry`]
//! - **Compose:** window, transform and ranking stages are concatenated
//! - **Execute:** the store runs the stages over the action's event stream
//! - **Encode:** rows are shaped and serialized (see [`serialize`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use btstats_core::{Database, Dispatcher, Outcome};
//!
//! let db = Database::open_read_only(std::path::Path::new("btlogs.db")).expect("failed to open database");
//! let dispatcher = Dispatcher::builtin();
//! if let Outcome::Rows(rows) = dispatcher.run("drinks", &db, chrono::Utc::now()).unwrap() {
//!     println!("{}", btstats_core::serialize::to_json(&rows).unwrap());
//! }
//! ```

// Re-export commonly used items at the crate root
pub use actions::{Action, ActionRegistry, CustomAction};
pub use config::{Config, StoreSettings};
pub use db::{Database, EventStore, NewEvent};
pub use dispatch::{Dispatcher, Outcome};
pub use error::{Error, Result};
pub use service::{QueryService, Reply};
pub use value::{Document, ObjectId, Value};

// Public modules
pub mod actions;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod pipeline;
pub mod serialize;
pub mod service;
pub mod usercolors;
pub mod value;
