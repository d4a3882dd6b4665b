//! Campaign API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use megaphone_core::{
    load_csv, snapshot, CampaignSnapshot, CampaignStatus, CancelHandle, NewCampaign, SendRecord,
    StoreError,
};

use crate::state::AppState;

/// Maximum allowed limit for campaign queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for campaign queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignBody {
    /// Optional client-supplied campaign id (UUID generated when omitted)
    pub id: Option<String>,
    /// Provider template identifier (Twilio content SID)
    pub template_id: String,
    /// Human-readable template name
    pub template_name: String,
    /// CSV roster: headered with a `phone` column, or legacy `phone,name`
    pub roster_csv: String,
}

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsParams {
    /// Maximum number of campaigns to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for campaign operations
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: String,
    pub template_id: String,
    pub template_name: String,
    pub status: CampaignStatus,
    pub sent: u32,
    pub failed: u32,
    pub pending: u32,
    pub cancelled: u32,
    pub total: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CampaignSnapshot> for CampaignResponse {
    fn from(snap: CampaignSnapshot) -> Self {
        Self {
            id: snap.id,
            template_id: snap.template_id,
            template_name: snap.template_name,
            status: snap.status,
            sent: snap.sent,
            failed: snap.failed,
            pending: snap.pending,
            cancelled: snap.cancelled,
            total: snap.total,
            created_at: snap.created_at.to_rfc3339(),
            updated_at: snap.updated_at.to_rfc3339(),
        }
    }
}

/// Response for listing campaigns
#[derive(Debug, Serialize)]
pub struct ListCampaignsResponse {
    pub campaigns: Vec<CampaignResponse>,
    pub limit: i64,
    pub offset: i64,
}

/// A failed recipient in the errors listing
#[derive(Debug, Serialize)]
pub struct ErrorRecordResponse {
    pub phone: String,
    pub error: Option<String>,
    pub attempts: u32,
    pub last_attempt_at: Option<String>,
}

impl From<SendRecord> for ErrorRecordResponse {
    fn from(record: SendRecord) -> Self {
        Self {
            phone: record.phone,
            error: record.error,
            attempts: record.attempts,
            last_attempt_at: record.last_attempt_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Response for the errors listing
#[derive(Debug, Serialize)]
pub struct ListErrorsResponse {
    pub campaign_id: String,
    pub errors: Vec<ErrorRecordResponse>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct CampaignErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<CampaignErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(CampaignErrorResponse {
            error: message.into(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(id) => api_error(
            StatusCode::NOT_FOUND,
            format!("Campaign not found: {}", id),
        ),
        StoreError::DuplicateCampaign(id) => api_error(
            StatusCode::CONFLICT,
            format!("Campaign already exists: {}", id),
        ),
        e => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a campaign and start dispatching it in the background
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCampaignBody>,
) -> Result<(StatusCode, Json<CampaignResponse>), ApiError> {
    let roster = load_csv(&body.roster_csv)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid roster: {}", e)))?;

    let mut request = NewCampaign::new(&body.template_id, &body.template_name);
    if let Some(id) = body.id {
        request = request.with_id(id);
    }

    let campaign = state
        .store()
        .create_campaign(request, &roster)
        .map_err(store_error)?;

    info!(
        campaign_id = %campaign.id,
        total = campaign.total,
        template = %campaign.template_name,
        "campaign created"
    );

    // Dispatch in the background; the response only acknowledges intake
    let handle = state.begin_run(&campaign.id).await.ok_or_else(|| {
        api_error(
            StatusCode::CONFLICT,
            format!("Dispatch already in progress for campaign {}", campaign.id),
        )
    })?;
    spawn_dispatch(&state, &campaign.id, handle);

    let snap = snapshot(state.store(), &campaign.id)
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::INTERNAL_SERVER_ERROR, "campaign vanished"))?;

    Ok((StatusCode::ACCEPTED, Json(CampaignResponse::from(snap))))
}

/// Start or resume dispatching an existing campaign
///
/// Picks up where an interrupted run left off: only Pending records are
/// dispatched, so nothing already settled is resent. Refused for
/// terminal campaigns and for campaigns with a run already in flight.
pub async fn dispatch_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CampaignResponse>), ApiError> {
    let campaign = state
        .store()
        .campaign(&id)
        .map_err(store_error)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Campaign not found: {}", id),
            )
        })?;

    if !campaign.status.is_runnable() {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!(
                "Cannot dispatch campaign {}: current status is {}",
                id, campaign.status
            ),
        ));
    }

    let handle = state.begin_run(&id).await.ok_or_else(|| {
        api_error(
            StatusCode::CONFLICT,
            format!("Dispatch already in progress for campaign {}", id),
        )
    })?;
    info!(campaign_id = %id, status = %campaign.status, "dispatch requested");
    spawn_dispatch(&state, &id, handle);

    let snap = snapshot(state.store(), &id)
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::INTERNAL_SERVER_ERROR, "campaign vanished"))?;

    Ok((StatusCode::ACCEPTED, Json(CampaignResponse::from(snap))))
}

/// Run the dispatcher for a campaign in a background task.
fn spawn_dispatch(state: &Arc<AppState>, campaign_id: &str, handle: CancelHandle) {
    let dispatcher = state.dispatcher();
    let app = Arc::clone(state);
    let run_id = campaign_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = dispatcher.run(&run_id, handle).await {
            error!(campaign_id = %run_id, "dispatch run failed: {}", e);
        }
        app.end_run(&run_id).await;
    });
}

/// Get a campaign with its recomputed aggregate counts
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CampaignResponse>, ApiError> {
    match snapshot(state.store(), &id).map_err(store_error)? {
        Some(snap) => Ok(Json(CampaignResponse::from(snap))),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Campaign not found: {}", id),
        )),
    }
}

/// List campaigns, newest first
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListCampaignsParams>,
) -> Result<Json<ListCampaignsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let campaigns = state
        .store()
        .list_campaigns(limit, offset)
        .map_err(store_error)?;

    let mut responses = Vec::with_capacity(campaigns.len());
    for campaign in campaigns {
        if let Some(snap) = snapshot(state.store(), &campaign.id).map_err(store_error)? {
            responses.push(CampaignResponse::from(snap));
        }
    }

    Ok(Json(ListCampaignsResponse {
        campaigns: responses,
        limit,
        offset,
    }))
}

/// List the failed recipients of a campaign
pub async fn get_errors(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ListErrorsResponse>, ApiError> {
    if state.store().campaign(&id).map_err(store_error)?.is_none() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Campaign not found: {}", id),
        ));
    }

    let failed = state.store().failed_records(&id).map_err(store_error)?;

    Ok(Json(ListErrorsResponse {
        campaign_id: id,
        errors: failed.into_iter().map(ErrorRecordResponse::from).collect(),
    }))
}

/// Cancel a campaign
///
/// An in-flight run is cancelled cooperatively: sends already started
/// finish and get recorded, everything else is settled as Cancelled by
/// the dispatcher's sweep. A campaign with no active run is swept here
/// directly.
pub async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CampaignResponse>), ApiError> {
    let campaign = state
        .store()
        .campaign(&id)
        .map_err(store_error)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Campaign not found: {}", id),
            )
        })?;

    if campaign.status.is_terminal() {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!(
                "Cannot cancel campaign {}: current status is {}",
                id, campaign.status
            ),
        ));
    }

    if state.cancel_run(&id).await {
        info!(campaign_id = %id, "cancellation requested for in-flight run");
        let snap = snapshot(state.store(), &id)
            .map_err(store_error)?
            .ok_or_else(|| api_error(StatusCode::INTERNAL_SERVER_ERROR, "campaign vanished"))?;
        return Ok((StatusCode::ACCEPTED, Json(CampaignResponse::from(snap))));
    }

    // No run in flight: settle the remaining records here
    let pending = state.store().pending_records(&id).map_err(store_error)?;
    for record in pending {
        state
            .store()
            .mark_cancelled(&id, &record.phone)
            .map_err(store_error)?;
    }
    state
        .store()
        .set_campaign_status(&id, CampaignStatus::Cancelled)
        .map_err(store_error)?;
    info!(campaign_id = %id, "campaign cancelled");

    let snap = snapshot(state.store(), &id)
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::INTERNAL_SERVER_ERROR, "campaign vanished"))?;

    Ok((StatusCode::OK, Json(CampaignResponse::from(snap))))
}
