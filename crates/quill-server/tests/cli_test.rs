use futures_util::FutureExt;
use quill_db::{ConnectionHandle, DbError, RequestScope, CONNECTION_KEY};
use quill_server::{cli::CommandError, config::Config, App};
use std::sync::{Arc, Mutex};

fn table_names(app: &App) -> Vec<String> {
    let scope = RequestScope::new();
    let names = app
        .database()
        .acquire(&scope)
        .expect("failed to acquire connection")
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            [],
        )
        .expect("failed to list tables")
        .iter()
        .filter_map(|r| r["name"].as_str().map(str::to_string))
        .collect();
    app.database().release(&scope, None);
    names
}

#[tokio::test]
async fn init_db_creates_store_with_schema_tables() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let app = App::new(Config::default(), dir.path());

    app.run(["quill", "init-db"])
        .await
        .expect("init-db should succeed");

    assert!(dir.path().join("quill.sqlite").exists());
    let check = App::new(Config::default(), dir.path());
    assert_eq!(table_names(&check), vec!["post", "user"]);
}

#[tokio::test]
async fn init_db_twice_resets_data() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    App::new(Config::default(), dir.path())
        .run(["quill", "init-db"])
        .await
        .expect("first init-db should succeed");

    let app = App::new(Config::default(), dir.path());
    let scope = RequestScope::new();
    app.database()
        .acquire(&scope)
        .expect("should open")
        .execute(
            "INSERT INTO user (username, password) VALUES ('ada', 'pw')",
            [],
        )
        .expect("insert should succeed");
    app.database().release(&scope, None);

    app.run(["quill", "init-db"])
        .await
        .expect("second init-db should succeed");

    let app = App::new(Config::default(), dir.path());
    let scope = RequestScope::new();
    let count = app
        .database()
        .acquire(&scope)
        .expect("should open")
        .query_one("SELECT COUNT(*) AS n FROM user", [])
        .expect("count should succeed")
        .expect("count row");
    assert_eq!(count["n"].as_i64(), Some(0));
    app.database().release(&scope, None);
}

#[tokio::test]
async fn init_db_uses_configured_schema_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::write(
        dir.path().join("notes.sql"),
        "DROP TABLE IF EXISTS note;
         CREATE TABLE note (id INTEGER PRIMARY KEY, due DATE);",
    )
    .expect("failed to write schema");

    let mut config = Config::default();
    config.database.path = "notes.sqlite".to_string();
    config.database.schema = Some("notes.sql".to_string());

    App::new(config.clone(), dir.path())
        .run(["quill", "init-db"])
        .await
        .expect("init-db should succeed");

    assert_eq!(table_names(&App::new(config, dir.path())), vec!["note"]);
}

#[tokio::test]
async fn init_db_fails_for_unopenable_path() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let mut config = Config::default();
    config.database.path = "missing/dir/quill.sqlite".to_string();

    let mut app = App::new(config, dir.path());
    let failures = Arc::new(Mutex::new(Vec::new()));
    let hook_failures = Arc::clone(&failures);
    app.teardown_request(move |_scope, failure| {
        hook_failures
            .lock()
            .unwrap()
            .push(failure.map(|f| f.message().to_string()));
    });

    let err = app
        .run(["quill", "init-db"])
        .await
        .expect_err("init-db should fail");
    assert!(
        matches!(err, CommandError::Database(DbError::Open { .. })),
        "got {err:?}"
    );

    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0]
        .as_deref()
        .is_some_and(|m| m.starts_with("database error: failed to open database")));
}

#[tokio::test]
async fn commands_run_inside_a_torn_down_scope() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let mut app = App::new(Config::default(), dir.path());

    let seen: Arc<Mutex<Vec<Arc<ConnectionHandle>>>> = Arc::new(Mutex::new(Vec::new()));
    let handler_seen = Arc::clone(&seen);
    app.add_command("touch-db", "Open the database once.", move |app, scope| {
        let seen = Arc::clone(&handler_seen);
        async move {
            let conn = app.database().acquire(&scope)?;
            assert!(scope.contains(CONNECTION_KEY));
            seen.lock().unwrap().push(conn);
            Ok(())
        }
        .boxed()
    });

    app.run(["quill", "touch-db"]).await.expect("touch-db should succeed");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_closed(), "teardown should close the connection");
}

#[tokio::test]
async fn bad_arguments_are_usage_errors() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    let err = App::new(Config::default(), dir.path())
        .run(["quill", "bogus"])
        .await
        .expect_err("unknown subcommand should fail");
    assert!(matches!(err, CommandError::Usage(_)));

    let err = App::new(Config::default(), dir.path())
        .run(["quill", "init-db", "--force"])
        .await
        .expect_err("init-db takes no flags");
    assert!(matches!(err, CommandError::Usage(_)));
}

#[test]
fn builtin_commands_are_registered() {
    let app = App::new(Config::default(), ".");
    let names: Vec<_> = app.commands().names().collect();
    assert_eq!(names, vec!["serve", "init-db"]);
}
