//! Quill server library logic.
//!
//! The [`App`] is the host: it owns configuration, the request-scoped
//! [`quill_db::Database`], the teardown hooks fired after every request and
//! command, and the administrative command table.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod middleware;
pub mod server;

pub use app::{App, AppState};
