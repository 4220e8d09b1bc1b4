//! REST surface over an [`InMemoryBackend`], in the PostgREST dialect the
//! client filters speak.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `GET /health` returns `{ "ok": true }`.
//! - `GET /rest/v1/:table?col=op.value&order=col.desc&limit=n` selects rows.
//! - `POST /rest/v1/:table` inserts a JSON object (or an array of them).
//! - `PATCH /rest/v1/:table?id=eq.<id>` merges the body into matching rows.
//! - `DELETE /rest/v1/:table?id=eq.<id>` deletes matching rows.
//!
//! `Authorization: Bearer <token>` is resolved through [`InMemoryAuth`];
//! requests without it run anonymously.
//!
//! ## Example
//!
//! ```ignore
//! use cuizly_sync::{http, InMemoryAuth, InMemoryBackend};
//!
//! let api = http::RestApi::new(InMemoryBackend::new(), InMemoryAuth::new());
//! http::serve(api, "0.0.0.0:3000").await?;
//! ```

use std::sync::Arc;

use axum::extract::{Path, Query as QueryParams, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::debug;

use crate::filter::{Filter, FilterError, Order, Query};
use crate::session::{AuthError, InMemoryAuth};
use crate::store::{InMemoryBackend, InMemoryRowStore, Row, RowStore, StoreError};

/// Shared state of the REST surface.
#[derive(Clone)]
pub struct RestApi {
    backend: InMemoryBackend,
    auth: InMemoryAuth,
}

impl RestApi {
    pub fn new(backend: InMemoryBackend, auth: InMemoryAuth) -> Arc<Self> {
        Arc::new(RestApi { backend, auth })
    }

    pub fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }

    pub fn auth(&self) -> &InMemoryAuth {
        &self.auth
    }

    fn store_for(&self, headers: &HeaderMap) -> Result<InMemoryRowStore, RestError> {
        match bearer_token(headers)? {
            Some(token) => Ok(self.backend.connect(self.auth.session_for_token(token)?)),
            None => Ok(self.backend.anonymous()),
        }
    }
}

/// Failure of a REST request, rendered as `{ "error": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl RestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::Store(StoreError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            RestError::Store(StoreError::Unauthorized) | RestError::Auth(_) => {
                StatusCode::UNAUTHORIZED
            }
            RestError::Store(StoreError::Constraint { .. }) => StatusCode::CONFLICT,
            RestError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            RestError::Store(StoreError::Network(_)) => StatusCode::SERVICE_UNAVAILABLE,
            RestError::Store(StoreError::Filter(_) | StoreError::Serde(_))
            | RestError::Filter(_)
            | RestError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build an axum `Router` over the given API state.
pub fn router(api: Arc<RestApi>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/rest/v1/:table",
            get(select_handler)
                .post(insert_handler)
                .patch(update_handler)
                .delete(delete_handler),
        )
        .with_state(api)
}

/// Serve the API at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve(api: Arc<RestApi>, addr: &str) -> Result<(), std::io::Error> {
    let app = router(api);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn select_handler(
    State(api): State<Arc<RestApi>>,
    Path(table): Path<String>,
    QueryParams(params): QueryParams<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let store = api.store_for(&headers)?;
    let query = parse_query(&table, &params)?;
    let rows = store.select(&query)?;
    Ok(Json(rows_to_json(rows)))
}

async fn insert_handler(
    State(api): State<Arc<RestApi>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), RestError> {
    let store = api.store_for(&headers)?;
    let inserted = match body {
        Value::Array(items) => {
            let mut rows = Vec::with_capacity(items.len());
            for item in items {
                rows.push(store.insert(&table, Row::from_value(item)?)?);
            }
            rows_to_json(rows)
        }
        other => store.insert(&table, Row::from_value(other)?)?.into_value(),
    };
    debug!(table = %table, "rest insert");
    Ok((StatusCode::CREATED, Json(inserted)))
}

async fn update_handler(
    State(api): State<Arc<RestApi>>,
    Path(table): Path<String>,
    QueryParams(params): QueryParams<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, RestError> {
    let store = api.store_for(&headers)?;
    let query = parse_filtered_query(&table, &params)?;
    let patch = Row::from_value(body)?;

    let mut updated = Vec::new();
    for row in store.select(&query)? {
        if let Some(id) = row.id() {
            updated.push(store.update(&table, id, patch.clone())?);
        }
    }
    debug!(table = %table, rows = updated.len(), "rest update");
    Ok(Json(rows_to_json(updated)))
}

async fn delete_handler(
    State(api): State<Arc<RestApi>>,
    Path(table): Path<String>,
    QueryParams(params): QueryParams<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let store = api.store_for(&headers)?;
    let query = parse_filtered_query(&table, &params)?;

    let mut deleted = Vec::new();
    for row in store.select(&query)? {
        let removed = match row.id() {
            Some(id) => store.delete(&table, id)?,
            None => false,
        };
        if removed {
            deleted.push(row);
        }
    }
    debug!(table = %table, rows = deleted.len(), "rest delete");
    Ok(Json(rows_to_json(deleted)))
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, RestError> {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| RestError::BadRequest("authorization header is not ascii".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or(RestError::Auth(AuthError::NoSession))
}

/// Translate PostgREST query parameters: `order=col.desc`, `limit=n`,
/// `select=...` (ignored) and `col=op.value` filters.
fn parse_query(table: &str, params: &[(String, String)]) -> Result<Query, RestError> {
    let mut query = Query::new(table);
    for (key, value) in params {
        match key.as_str() {
            "select" => {}
            "limit" => {
                let limit = value
                    .parse()
                    .map_err(|_| RestError::BadRequest(format!("invalid limit {:?}", value)))?;
                query = query.limit(limit);
            }
            "order" => query = query.order_by(Order::parse(value)?),
            column => {
                let filter = Filter::parse(table, &format!("{}={}", column, value))?;
                query = query.filter(filter)?;
            }
        }
    }
    Ok(query)
}

/// Like [`parse_query`], but refuses unfiltered writes.
fn parse_filtered_query(table: &str, params: &[(String, String)]) -> Result<Query, RestError> {
    let query = parse_query(table, params)?;
    if query.filters().is_empty() {
        return Err(RestError::BadRequest(
            "updates and deletes require a filter".into(),
        ));
    }
    Ok(query)
}

fn rows_to_json(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Row::into_value).collect())
}
