//! The request-scoped connection manager.

use crate::connection::ConnectionHandle;
use crate::error::DbError;
use crate::schema::SchemaSource;
use crate::scope::RequestScope;
use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::Arc;

/// Scope key under which the request's connection handle is stored.
pub const CONNECTION_KEY: &str = "db";

/// Resolved settings for the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// Path to the SQLite file. Use `:memory:` for a throwaway store.
    pub path: PathBuf,
    /// Script used by [`Database::init_schema`].
    pub schema: SchemaSource,
    /// Busy timeout applied to every connection, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Whether `PRAGMA foreign_keys` is enabled on open. Off by default,
    /// which is SQLite's own default.
    pub foreign_keys: bool,
}

impl DatabaseSettings {
    /// Settings for `path` with the bundled schema and default pragmas.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema: SchemaSource::Bundled,
            busy_timeout_ms: 5_000,
            foreign_keys: false,
        }
    }
}

/// Hands out one connection per request scope and closes it at teardown.
#[derive(Debug, Clone)]
pub struct Database {
    settings: DatabaseSettings,
}

impl Database {
    /// Creates a manager for the store described by `settings`. Nothing is
    /// opened until a scope calls [`Database::acquire`].
    pub fn new(settings: DatabaseSettings) -> Self {
        Self { settings }
    }

    /// The settings every connection is opened with.
    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Returns the scope's connection, opening it on first use.
    ///
    /// Repeated calls with the same scope return the identical handle.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Open` if the store cannot be opened. Nothing is
    /// stored in the scope in that case.
    pub fn acquire(&self, scope: &RequestScope) -> Result<Arc<ConnectionHandle>, DbError> {
        scope.get_or_try_insert_with::<_, DbError, _>(CONNECTION_KEY, || {
            let handle = ConnectionHandle::open(
                &self.settings.path,
                self.settings.busy_timeout_ms,
                self.settings.foreign_keys,
            )?;
            tracing::debug!(
                scope = %scope.id(),
                handle = handle.id(),
                path = %self.settings.path.display(),
                "opened request database connection"
            );
            Ok(handle)
        })
    }

    /// Removes the scope's connection, if any, and closes it.
    ///
    /// `error` is the failure that ended the request. It is only logged;
    /// cleanup is unconditional. Calling this on a scope without a
    /// connection does nothing.
    pub fn release(&self, scope: &RequestScope, error: Option<&(dyn StdError + 'static)>) {
        let Some(handle) = scope.remove::<ConnectionHandle>(CONNECTION_KEY) else {
            return;
        };

        match error {
            Some(error) => tracing::debug!(
                scope = %scope.id(),
                handle = handle.id(),
                %error,
                "closing request database connection after failed request"
            ),
            None => tracing::debug!(
                scope = %scope.id(),
                handle = handle.id(),
                "closing request database connection"
            ),
        }

        if let Err(e) = handle.close() {
            tracing::warn!(
                scope = %scope.id(),
                handle = handle.id(),
                "failed to close database connection cleanly: {}",
                e
            );
        }
    }

    /// Drops and recreates every table by running the schema script on the
    /// scope's connection.
    ///
    /// Foreign key enforcement is suspended while the script runs, so the
    /// script may drop tables in any order. The configured setting is
    /// restored afterwards, whether or not the script succeeded.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Open` if no connection can be opened, the schema
    /// read errors if the script is unavailable, and
    /// `DbError::SchemaExecution` if the script fails.
    pub fn init_schema(&self, scope: &RequestScope) -> Result<(), DbError> {
        let handle = self.acquire(scope)?;
        let script = self.settings.schema.load()?;

        tracing::info!(
            path = %self.settings.path.display(),
            schema = ?self.settings.schema,
            "initializing database schema"
        );

        handle.with_connection(|conn| {
            if self.settings.foreign_keys {
                conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
            }
            let result = conn.execute_batch(&script).map_err(DbError::SchemaExecution);
            if self.settings.foreign_keys {
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            }
            result
        })
    }
}
