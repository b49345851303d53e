//! btstats - ranked, time-windowed analytics over a chat and video event log
//!
//! The binary wires configuration, logging and the store into a
//! [`btstats_core::QueryService`] and exposes it over HTTP ([`api`]) or as
//! one-shot CLI commands. [`import`] loads events into a store.

pub mod api;
pub mod import;

pub use api::{router, ApiError, SharedState};
