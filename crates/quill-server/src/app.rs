//! The application host: configuration, teardown hooks and commands.

use crate::cli::{CommandError, CommandFuture, CommandTable};
use crate::config::Config;
use crate::middleware::{self, RequestFailure, TeardownHook, TeardownHooks};
use crate::{api, db, server};
use axum::{Extension, Router};
use futures_util::FutureExt;
use quill_db::{Database, RequestScope};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// State shared with every request handler.
#[derive(Debug)]
pub struct AppState {
    /// Request-scoped connection manager.
    pub database: Arc<Database>,
}

/// The host that request handling and administrative commands hang off.
pub struct App {
    config: Config,
    root: PathBuf,
    state: Arc<AppState>,
    teardown: Vec<TeardownHook>,
    commands: CommandTable,
}

impl App {
    /// Builds the app from `config`. Relative paths resolve against `root`.
    ///
    /// Registers the `serve` command and the database integration.
    pub fn new(config: Config, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let database = Arc::new(Database::new(config.database.settings(&root)));

        let mut app = Self {
            config,
            root,
            state: Arc::new(AppState { database }),
            teardown: Vec::new(),
            commands: CommandTable::new(),
        };

        app.add_command("serve", "Run the HTTP server.", |app, _scope| {
            server::serve(app).boxed()
        });
        db::init_app(&mut app);

        app
    }

    /// The loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory relative paths were resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The request-scoped connection manager.
    pub fn database(&self) -> &Arc<Database> {
        &self.state.database
    }

    /// The registered administrative commands.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Registers `hook` to run at the end of every request and command.
    pub fn teardown_request<F>(&mut self, hook: F)
    where
        F: Fn(&RequestScope, Option<&RequestFailure>) + Send + Sync + 'static,
    {
        self.teardown.push(Arc::new(hook));
    }

    /// Registers an administrative command.
    pub fn add_command<F>(&mut self, name: &'static str, about: &'static str, handler: F)
    where
        F: Fn(Arc<App>, RequestScope) -> CommandFuture + Send + Sync + 'static,
    {
        self.commands.add(name, about, Arc::new(handler));
    }

    /// Snapshot of the registered teardown hooks.
    pub fn teardown_hooks(&self) -> TeardownHooks {
        TeardownHooks::new(self.teardown.clone())
    }

    /// The full HTTP router.
    pub fn router(&self) -> Router {
        self.wrap(api::routes())
    }

    /// Applies shared state, per-request scopes and request tracing to
    /// `router`.
    pub fn wrap(&self, router: Router) -> Router {
        router
            .layer(Extension(Arc::clone(&self.state)))
            .layer(axum::middleware::from_fn_with_state(
                self.teardown_hooks(),
                middleware::request_scope,
            ))
            .layer(TraceLayer::new_for_http())
    }

    /// Parses `args` and runs the selected command inside a fresh scope.
    ///
    /// Teardown hooks run after the command, with its failure if it failed.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Usage` for bad arguments (including `--help`)
    /// and whatever the command itself returns.
    pub async fn run<I, T>(self, args: I) -> Result<(), CommandError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.commands.cli().try_get_matches_from(args)?;
        let name = matches
            .subcommand_name()
            .ok_or_else(|| CommandError::UnknownCommand(String::new()))?;
        let handler = self
            .commands
            .handler(name)
            .cloned()
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;

        let hooks = self.teardown_hooks();
        let scope = RequestScope::new();
        tracing::debug!(command = name, scope = %scope.id(), "running command");

        let result = handler(Arc::new(self), scope.clone()).await;

        let failure = result
            .as_ref()
            .err()
            .map(|e| RequestFailure::new(e.to_string()));
        hooks.run_blocking(scope, failure).await;

        result
    }
}
