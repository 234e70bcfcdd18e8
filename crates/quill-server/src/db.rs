//! Wires the request-scoped database into the app.

use crate::cli::CommandError;
use crate::App;
use futures_util::FutureExt;
use quill_db::RequestScope;
use std::error::Error as StdError;
use std::sync::Arc;

/// Printed by `init-db` on success.
pub const INIT_DB_MESSAGE: &str = "Initialized the database.";

/// Registers connection teardown and the `init-db` command with `app`.
pub fn init_app(app: &mut App) {
    let database = Arc::clone(app.database());
    app.teardown_request(move |scope, failure| {
        database.release(scope, failure.map(|f| f as &(dyn StdError + 'static)));
    });

    app.add_command(
        "init-db",
        "Clear the existing data and create new tables.",
        |app, scope| init_db_command(app, scope).boxed(),
    );
}

async fn init_db_command(app: Arc<App>, scope: RequestScope) -> Result<(), CommandError> {
    let database = Arc::clone(app.database());
    tokio::task::spawn_blocking(move || database.init_schema(&scope)).await??;
    println!("{INIT_DB_MESSAGE}");
    Ok(())
}
