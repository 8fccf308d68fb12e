//! tempinbox library entrypoint.
//!
//! Modules:
//! - `app`: startup, shutdown, shared state
//! - `config`: environment configuration
//! - `smtp`: inbound SMTP listener, DATA buffering and recipient fan-out
//! - `parser`: MIME parsing into a fixed message shape
//! - `recipient`: domain allow-list checks
//! - `store`: idempotent SQLite mailstore
//! - `sweeper`: retention sweep
//! - `http`: Axum router for the mailbox API and page
//! - `db`: connection and migrations
//! - `models`: typed records used across layers
//! - `util`: tracing setup and HTML escaping

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod parser;
pub mod recipient;
pub mod smtp;
pub mod store;
pub mod sweeper;
pub mod util;
