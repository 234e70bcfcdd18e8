//! HTTP handlers.

use crate::middleware::RequestFailure;
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use quill_db::{DbError, Record, RequestScope};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

const LIST_TABLES_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

const DESCRIBE_TABLE_SQL: &str =
    "SELECT name, type, \"notnull\" AS not_null, pk FROM pragma_table_info(?1) ORDER BY cid";

/// Error type for API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        ApiError::InternalServerError(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let failure = RequestFailure::new(self.to_string());
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => {
                tracing::error!("request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": message
        }));

        let mut response = (status, body).into_response();
        response.extensions_mut().insert(failure);
        response
    }
}

/// Builds the API routes.
pub fn routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tables", get(list_tables_handler))
        .route("/api/tables/{name}", get(describe_table_handler))
        .fallback(not_found_handler)
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler for `GET /api/tables`.
pub async fn list_tables_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(scope): Extension<RequestScope>,
) -> Result<Json<Value>, ApiError> {
    let rows = run_query(state, scope, |conn| conn.query(LIST_TABLES_SQL, [])).await?;
    let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();

    Ok(Json(json!({ "tables": names })))
}

/// Handler for `GET /api/tables/{name}`.
///
/// Lists the columns of one table.
pub async fn describe_table_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(scope): Extension<RequestScope>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let table = name.clone();
    let columns = run_query(state, scope, move |conn| {
        conn.query(DESCRIBE_TABLE_SQL, [table.as_str()])
    })
    .await?;

    if columns.is_empty() {
        return Err(ApiError::NotFound(format!("table not found: {}", name)));
    }

    Ok(Json(json!({ "table": name, "columns": columns })))
}

async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}

/// Runs `f` on the request's connection on the blocking pool.
async fn run_query<F>(
    state: Arc<AppState>,
    scope: RequestScope,
    f: F,
) -> Result<Vec<Record>, ApiError>
where
    F: FnOnce(&quill_db::ConnectionHandle) -> Result<Vec<Record>, DbError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<Vec<Record>, ApiError> {
        let conn = state.database.acquire(&scope)?;
        Ok(f(&conn)?)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}
