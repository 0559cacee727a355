//! # Routes

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use shared_types::TxSignature;
use sp_05_chunk_tracker::{ChunkViewTracker, ContentId, SettlementStats, ViewerKey};
use sp_06_settlement::SettlementReconciler;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::domain::{
    ApiError, HealthResponse, HttpConfig, PairQuery, SettleRequest, SettleResponse,
    SettlementPreview, TrackChunkRequest,
};
use crate::ports::SyncStatus;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<ChunkViewTracker>,
    pub reconciler: Arc<SettlementReconciler>,
    /// Absent when the gateway runs without ingestion (tests, tooling).
    pub status: Option<Arc<dyn SyncStatus>>,
}

pub fn build_router(state: AppState, config: &HttpConfig) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout()));

    Router::new()
        .route("/track-chunk", post(track_chunk))
        .route("/unsettled-count", get(unsettled_count))
        .route("/settlement-preview", get(settlement_preview))
        .route("/settle", post(settle))
        .route("/health", get(health))
        .layer(middleware)
        .with_state(state)
}

fn pair(content: &str, viewer: Option<&str>) -> (ContentId, ViewerKey) {
    (ContentId::new(content), ViewerKey::from_optional(viewer))
}

async fn track_chunk(
    State(state): State<AppState>,
    Json(request): Json<TrackChunkRequest>,
) -> Result<Json<SettlementStats>, ApiError> {
    if request.content.trim().is_empty() {
        return Err(ApiError::MissingField("content"));
    }
    if request.chunk.trim().is_empty() {
        return Err(ApiError::MissingField("chunk"));
    }
    let (content, viewer) = pair(&request.content, request.viewer.as_deref());
    let stats = state
        .tracker
        .record_view(&content, &request.chunk, &request.proof, &viewer)
        .await;
    Ok(Json(stats))
}

async fn unsettled_count(
    State(state): State<AppState>,
    Query(query): Query<PairQuery>,
) -> Json<usize> {
    let (content, viewer) = pair(&query.content, query.viewer.as_deref());
    Json(state.tracker.unsettled_count(&content, &viewer))
}

async fn settlement_preview(
    State(state): State<AppState>,
    Query(query): Query<PairQuery>,
) -> Json<SettlementPreview> {
    let (content, viewer) = pair(&query.content, query.viewer.as_deref());
    let stats = state.tracker.settlement_stats(&content, &viewer);
    let fees = state.reconciler.fee_policy();
    let split = fees.split(stats.estimated_value);
    Json(SettlementPreview {
        content: content.to_string(),
        viewer: viewer.to_string(),
        unsettled_chunks: stats.unsettled,
        price_per_chunk: state.tracker.price_per_chunk(&content),
        total_cost: split.total,
        platform_fee: split.platform_fee,
        creator_amount: split.creator_amount,
        platform_fee_bps: fees.platform_fee_bps(),
    })
}

async fn settle(
    State(state): State<AppState>,
    Json(request): Json<SettleRequest>,
) -> Json<SettleResponse> {
    if request.content.trim().is_empty() {
        return Json(SettleResponse::failed(ApiError::MissingField("content")));
    }
    let signature = match request
        .signature
        .as_deref()
        .map(str::parse::<TxSignature>)
        .transpose()
    {
        Ok(signature) => signature,
        Err(e) => return Json(SettleResponse::failed(e)),
    };

    let (content, viewer) = pair(&request.content, request.viewer.as_deref());
    match state
        .reconciler
        .settle_for_viewer(&content, &viewer, signature)
        .await
    {
        Ok(outcome) => {
            info!(
                content = %content,
                viewer = %viewer,
                chunk_count = outcome.chunk_count,
                "[sp-07] settle request completed"
            );
            Json(outcome.into())
        }
        Err(e) => {
            warn!(content = %content, viewer = %viewer, "[sp-07] settle request failed: {}", e);
            Json(SettleResponse::failed(e))
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (ingestion_running, watermark) = state
        .status
        .as_ref()
        .map_or((false, 0), |s| (s.is_running(), s.watermark()));
    Json(HealthResponse {
        status: "ok",
        ingestion_running,
        watermark,
    })
}
