//! inkwell: timeline synchronization and read-state reconciliation for a
//! Feedbin-compatible feed reader.
//!
//! - [`timeline`] - the engine: post store, read ledger, sync scheduling,
//!   filtering and routing
//! - [`feed`] - HTTP client for the remote feed service
//! - [`storage`] - SQLite persistence for read ids and preferences
//! - [`config`] - `config.toml` loading

pub mod config;
pub mod feed;
pub mod storage;
pub mod timeline;
pub mod util;
