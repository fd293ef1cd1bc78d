//! # API Handlers
//!
//! Axum handlers for the suggestion hub. Authenticated routes receive the
//! caller's [`Identity`] from the auth middleware as a request extension.

use crate::auth::{CreateApiKeyRequest, Identity};
use crate::failures::IndexingFailure;
use crate::index::shard::ShardStats;
use crate::index::{IncomingEvent, IngestReport};
use crate::streams::{CatalogError, CreateStreamRequest, StreamInfo};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use qy_core::{PrefixCase, SuggestError, SuggestRequest, SuggestionResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

// =============================================================================
// Status
// =============================================================================

#[derive(Serialize)]
pub struct SystemStatus {
    version: &'static str,
    uptime_seconds: u64,
    streams: usize,
    indexing_failures: usize,
    shards: usize,
    prefix_case: PrefixCase,
    default_range_secs: i64,
    limit: usize,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        streams: state.catalog.len().await,
        indexing_failures: state.failures.len().await,
        shards: state.suggest.engine().shard_count(),
        prefix_case: state.config.suggest.prefix_case,
        default_range_secs: state.config.suggest.default_range_secs,
        limit: state.config.suggest.limit,
    })
}

// =============================================================================
// Suggestions
// =============================================================================

pub async fn suggest(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<SuggestRequest>, JsonRejection>,
) -> ApiResult<SuggestionResponse> {
    // A body that does not decode (e.g. an unparseable window) is malformed too.
    let Json(req) = body.map_err(|rejection| {
        let err = SuggestError::malformed(rejection.body_text());
        (suggest_error_status(&err), err.to_string())
    })?;
    state
        .suggest
        .suggest(&identity, req)
        .await
        .map(Json)
        .map_err(|e| (suggest_error_status(&e), e.to_string()))
}

pub fn suggest_error_status(err: &SuggestError) -> StatusCode {
    match err {
        SuggestError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        SuggestError::RetrievalFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        SuggestError::AccessDenied => StatusCode::FORBIDDEN,
    }
}

// =============================================================================
// Streams
// =============================================================================

/// Only streams the caller may read are listed.
pub async fn list_streams(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Json<Vec<StreamInfo>> {
    let streams = state
        .catalog
        .list()
        .await
        .into_iter()
        .filter(|s| identity.may_read(&s.id))
        .collect();
    Json(streams)
}

pub async fn create_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateStreamRequest>,
) -> ApiResult<StreamInfo> {
    state
        .catalog
        .create(req)
        .await
        .map(Json)
        .map_err(|e| (catalog_error_status(&e), e.to_string()))
}

pub async fn delete_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .catalog
        .remove(&id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| (catalog_error_status(&e), e.to_string()))
}

fn catalog_error_status(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::InvalidId(_) => StatusCode::BAD_REQUEST,
        CatalogError::Duplicate(_) => StatusCode::CONFLICT,
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
    }
}

// =============================================================================
// Index
// =============================================================================

/// A single event or a batch.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum IngestBody {
    Batch(Vec<IncomingEvent>),
    One(IncomingEvent),
}

pub async fn ingest_events(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestBody>,
) -> (StatusCode, Json<IngestReport>) {
    let events = match body {
        IngestBody::Batch(events) => events,
        IngestBody::One(event) => vec![event],
    };
    let report = state.index.ingest(events).await;
    (StatusCode::ACCEPTED, Json(report))
}

pub async fn list_shards(State(state): State<Arc<AppState>>) -> Json<Vec<ShardStats>> {
    Json(state.index.stats().await)
}

#[derive(Deserialize)]
pub struct ShardAvailability {
    pub available: bool,
}

pub async fn set_shard_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ShardAvailability>,
) -> ApiResult<ShardStats> {
    let shard = state
        .index
        .shard(&id)
        .ok_or((StatusCode::NOT_FOUND, format!("Shard '{}' not found", id)))?;
    shard.set_available(req.available);
    tracing::info!("Shard {} marked {}", id, if req.available { "available" } else { "unavailable" });
    Ok(Json(shard.stats().await))
}

// =============================================================================
// Failures
// =============================================================================

#[derive(Deserialize)]
pub struct FailureParams {
    pub limit: Option<usize>,
}

pub async fn list_failures(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FailureParams>,
) -> Json<Vec<IndexingFailure>> {
    Json(state.failures.recent(params.limit.unwrap_or(100)).await)
}

// =============================================================================
// Auth
// =============================================================================

pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Json<crate::auth::ApiKey> {
    let key = state.auth_layer.create_key(req).await;
    Json(key)
}

pub async fn list_api_keys(State(state): State<Arc<AppState>>) -> Json<Vec<crate::auth::ApiKey>> {
    let keys = state.auth_layer.list_keys().await;
    Json(keys)
}

pub async fn revoke_api_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .auth_layer
        .revoke_key(&id)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, e))?;
    Ok(StatusCode::NO_CONTENT)
}
