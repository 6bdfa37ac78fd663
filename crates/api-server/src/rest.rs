//! REST handlers for auction execution, frequency-cap inspection, and
//! operational probes.

use adserve_auction::AuctionEngine;
use adserve_core::error::AdServeError;
use adserve_core::types::{AuctionResult, EventType};
use adserve_frequency::{CapSubject, FrequencyCapTracker};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuctionEngine>,
    pub tracker: Arc<FrequencyCapTracker>,
    pub node_id: String,
    pub start_time: Instant,
}

/// POST /v1/auctions/:request_id/run — execute (or replay) one auction.
///
/// Business outcomes are 200 with an empty-winner body; only
/// infrastructure failures map to error statuses.
pub async fn run_auction(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<AuctionResult>, (StatusCode, Json<ErrorResponse>)> {
    match state.engine.run_auction(request_id) {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            let (status, code) = match &e {
                AdServeError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                AdServeError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
                AdServeError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            };
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                error!(error = %e, request_id = %request_id, "Auction failed");
            } else {
                warn!(error = %e, request_id = %request_id, "Auction rejected");
            }
            metrics::counter!("api.errors", "code" => code).increment(1);
            Err((
                status,
                Json(ErrorResponse {
                    error: code.to_string(),
                    message: e.to_string(),
                }),
            ))
        }
    }
}

#[derive(Deserialize)]
pub struct FrequencyCheckParams {
    pub user_id: String,
    pub ad_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub event_type: EventType,
}

/// GET /v1/frequency/check — read-only cap inspection. Makes no
/// reservation.
pub async fn check_frequency(
    State(state): State<AppState>,
    Query(params): Query<FrequencyCheckParams>,
) -> Result<Json<FrequencyCheckResponse>, (StatusCode, Json<ErrorResponse>)> {
    if params.user_id.is_empty() {
        return Err(bad_request("'user_id' must not be empty"));
    }
    let Some(subject) = CapSubject::from_ids(params.ad_id, params.campaign_id) else {
        return Err(bad_request("one of 'ad_id' or 'campaign_id' is required"));
    };

    let status = state
        .tracker
        .check(&params.user_id, subject, params.event_type, &[]);

    Ok(Json(FrequencyCheckResponse {
        allowed: status.allowed,
        reason: status.reason,
        current_count: status.current_count,
        limit: status.limit,
        time_remaining_secs: status.time_remaining.num_seconds().max(0),
    }))
}

#[derive(Deserialize)]
pub struct RecordEventRequest {
    pub user_id: String,
    pub ad_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub event_type: EventType,
    /// When false, the event is counted even past the cap (batch
    /// backfill of externally observed events).
    #[serde(default = "default_enforce")]
    pub enforce: bool,
}

fn default_enforce() -> bool {
    true
}

/// POST /v1/frequency/record — count one externally observed event
/// (click, conversion). Enforced recording reserves atomically and
/// answers 409 once the cap is reached.
pub async fn record_frequency_event(
    State(state): State<AppState>,
    Json(body): Json<RecordEventRequest>,
) -> Result<Json<FrequencyCheckResponse>, (StatusCode, Json<ErrorResponse>)> {
    if body.user_id.is_empty() {
        return Err(bad_request("'user_id' must not be empty"));
    }
    let Some(subject) = CapSubject::from_ids(body.ad_id, body.campaign_id) else {
        return Err(bad_request("one of 'ad_id' or 'campaign_id' is required"));
    };

    if !body.enforce {
        let count = state
            .tracker
            .record_event(&body.user_id, subject, body.event_type, &[]);
        let status = state
            .tracker
            .check(&body.user_id, subject, body.event_type, &[]);
        return Ok(Json(FrequencyCheckResponse {
            allowed: true,
            reason: "recorded".to_string(),
            current_count: count,
            limit: status.limit,
            time_remaining_secs: status.time_remaining.num_seconds().max(0),
        }));
    }

    let status = state
        .tracker
        .try_reserve(&body.user_id, subject, body.event_type, &[]);
    if !status.allowed {
        let error = AdServeError::CapExceeded(format!(
            "{} count {} of {} for user {}",
            body.event_type.as_str(),
            status.current_count,
            status.limit,
            body.user_id
        ));
        warn!(error = %error, "Frequency event rejected");
        metrics::counter!("api.errors", "code" => "cap_exceeded").increment(1);
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "cap_exceeded".to_string(),
                message: error.to_string(),
            }),
        ));
    }

    Ok(Json(FrequencyCheckResponse {
        allowed: true,
        reason: status.reason,
        current_count: status.current_count,
        limit: status.limit,
        time_remaining_secs: status.time_remaining.num_seconds().max(0),
    }))
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    metrics::counter!("api.validation_errors").increment(1);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "invalid_input".to_string(),
            message: message.to_string(),
        }),
    )
}

/// GET /health — health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — readiness probe for Kubernetes.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct FrequencyCheckResponse {
    pub allowed: bool,
    pub reason: String,
    pub current_count: u32,
    pub limit: u32,
    pub time_remaining_secs: i64,
}
