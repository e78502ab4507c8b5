//! API handlers for the HTTP REST API

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::balance::BalanceAggregator;
use crate::db::SnapshotStore;
use crate::error::Error;
use crate::models::{
    split_pair_id, BalanceData, BalanceSnapshot, SnapshotKind, SnapshotPage, SwapEvent,
};
use crate::monitor::BalanceMonitor;

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 500;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Snapshot history
    pub store: Arc<dyn SnapshotStore>,
    /// Live balance reads
    pub aggregator: BalanceAggregator,
    /// Swap capture; `None` when no monitor runs in this process
    pub monitor: Option<Arc<BalanceMonitor>>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` or `unavailable`
    pub status: String,
    /// Crate version
    pub version: String,
}

/// Health check endpoint, `503` when the snapshot store cannot be reached
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!(error = %e, "Snapshot store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

fn error_response(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn parse_kind(kind: Option<&str>) -> Result<Option<SnapshotKind>, (StatusCode, String)> {
    kind.map(str::parse::<SnapshotKind>).transpose().map_err(error_response)
}

/// Live balance query parameters
#[derive(Debug, Default, Deserialize)]
pub struct BalancesQuery {
    /// Include channel balances
    #[serde(default)]
    pub lightning: bool,
}

/// Aggregate balances from every source right now
pub async fn get_balances(
    State(state): State<AppState>,
    Query(query): Query<BalancesQuery>,
) -> Json<BalanceData> {
    Json(state.aggregator.get_balances(None, query.lightning).await)
}

/// Snapshot listing parameters
#[derive(Debug, Default, Deserialize)]
pub struct ListSnapshotsQuery {
    /// Page size, capped at 500
    pub limit: Option<u32>,
    /// Rows to skip
    pub offset: Option<u64>,
    /// `periodic` or `swap`
    pub kind: Option<String>,
}

/// List snapshots, newest first
pub async fn list_snapshots(
    State(state): State<AppState>,
    Query(query): Query<ListSnapshotsQuery>,
) -> ApiResult<SnapshotPage> {
    let kind = parse_kind(query.kind.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

    let page = state
        .store
        .get_snapshots(limit, query.offset.unwrap_or(0), kind)
        .await
        .map_err(error_response)?;

    Ok(Json(page))
}

/// Kind filter parameter
#[derive(Debug, Default, Deserialize)]
pub struct KindQuery {
    /// `periodic` or `swap`
    pub kind: Option<String>,
}

/// Get the newest snapshot
pub async fn get_latest_snapshot(
    State(state): State<AppState>,
    Query(query): Query<KindQuery>,
) -> ApiResult<BalanceSnapshot> {
    let kind = parse_kind(query.kind.as_deref())?;

    let snapshot = state
        .store
        .get_latest(kind)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(Error::not_found("snapshot", "latest")))?;

    Ok(Json(snapshot))
}

/// Time range parameters, RFC 3339 timestamps
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// Inclusive start
    pub from: DateTime<Utc>,
    /// Inclusive end
    pub to: DateTime<Utc>,
    /// `periodic` or `swap`
    pub kind: Option<String>,
}

/// Get snapshots taken within a time range, oldest first
pub async fn get_snapshot_range(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Vec<BalanceSnapshot>> {
    let kind = parse_kind(query.kind.as_deref())?;

    if query.from > query.to {
        return Err(error_response(Error::validation(
            "range start must not be after its end",
        )));
    }

    let snapshots = state
        .store
        .get_by_time_range(query.from, query.to, kind)
        .await
        .map_err(error_response)?;

    Ok(Json(snapshots))
}

/// Get the most recent snapshot taken for a swap
pub async fn get_swap_snapshot(
    State(state): State<AppState>,
    Path(swap_id): Path<String>,
) -> ApiResult<BalanceSnapshot> {
    let snapshot = state
        .store
        .get_by_swap_id(&swap_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(Error::not_found("swap snapshot", &swap_id)))?;

    Ok(Json(snapshot))
}

/// Queue a completed swap for balance capture.
///
/// Answers `202` once queued. The capture itself happens in the monitor loop.
pub async fn report_swap(
    State(state): State<AppState>,
    Json(event): Json<SwapEvent>,
) -> Result<StatusCode, (StatusCode, String)> {
    split_pair_id(&event.pair).map_err(error_response)?;

    let Some(monitor) = state.monitor.as_ref() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "swap capture is not running".to_string(),
        ));
    };

    if monitor.notify_swap(event) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "swap snapshot queue is full".to_string(),
        ))
    }
}
