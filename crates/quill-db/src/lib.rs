//! Request-scoped SQLite access for Quill.
//!
//! Every request (and every administrative command run) gets a
//! [`RequestScope`]. The first call to [`Database::acquire`] within a scope
//! opens a connection and caches it there; later calls return the same
//! handle. When the request ends the host calls [`Database::release`], which
//! removes the handle from the scope and closes it.
//!
//! # Design decisions
//!
//! - **Explicit scope passing**: there is no ambient per-request state.
//!   Anything that needs the connection takes `&RequestScope`.
//! - **One connection per request**: no pooling. A handle is never shared
//!   between scopes and is never reopened after close.
//! - **Bundled schema**: `schema.sql` is compiled into the binary via
//!   `include_str!`. Initialization drops and recreates every table.
//! - **Named rows**: queries return [`Record`]s whose columns are addressed
//!   by declared name, with `TIMESTAMP` and `DATE` columns decoded into
//!   `chrono` values.

mod connection;
mod error;
mod manager;
mod record;
mod schema;
mod scope;

pub use connection::ConnectionHandle;
pub use error::DbError;
pub use manager::{Database, DatabaseSettings, CONNECTION_KEY};
pub use record::{Record, Value};
pub use schema::{SchemaSource, BUNDLED_SCHEMA};
pub use scope::RequestScope;
