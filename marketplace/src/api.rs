//! HTTP surface for the session lifecycle.
//!
//! Thin imperative shell over [`MarketplaceStore`]: handlers parse the
//! request, build a typed store call, and map the result to JSON. Identity
//! arrives as an `x-user-id` header, placed there by the edge proxy after
//! authentication; these handlers only resolve it to a participant role via
//! the owning commitment.

use crate::error::{ErrorKind, MarketplaceError};
use crate::lifecycle::actions::ParticipationDecision;
use crate::lifecycle::store::MarketplaceStore;
use crate::scheduling::SlotTemplate;
use crate::types::{CommitmentId, DisputeDecision, LearningCommitment, Session, UserId};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Build the API router.
pub fn router(store: MarketplaceStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/commitments/:commitment_id/sessions",
            get(list_sessions).post(create_session),
        )
        .route(
            "/api/v1/commitments/:commitment_id/sessions/recurring",
            post(schedule_recurring),
        )
        .route("/api/v1/commitments/:commitment_id", get(get_commitment))
        .route("/api/v1/sessions/:session_id", get(get_session))
        .route(
            "/api/v1/sessions/:session_id/confirmation",
            post(confirm_participation),
        )
        .route("/api/v1/sessions/:session_id/check-in", post(check_in))
        .route("/api/v1/sessions/:session_id/rejection", post(reject_attendance))
        .route(
            "/api/v1/sessions/:session_id/cancellation",
            post(cancel_session),
        )
        .route(
            "/api/v1/sessions/:session_id/dispute/resolution",
            post(resolve_dispute),
        )
        .with_state(store)
}

// ============================================================================
// Identity
// ============================================================================

/// Caller identity taken from the `x-user-id` header.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(|id| Self(UserId::from_uuid(id)))
            .ok_or_else(|| ApiError(MarketplaceError::MissingIdentity))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Wrapper mapping domain errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub MarketplaceError);

impl From<MarketplaceError> for ApiError {
    fn from(error: MarketplaceError) -> Self {
        Self(error)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match self.0.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ErrorKind::BadRequest => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        };
        let body = ErrorBody {
            code,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    location: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScheduleRecurringRequest {
    slots: Vec<SlotTemplate>,
    location: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfirmationRequest {
    decision: ParticipationDecision,
}

#[derive(Debug, Deserialize)]
struct RejectionRequest {
    reason: String,
    #[serde(default)]
    evidence_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CancellationRequest {
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ResolutionRequest {
    decision: DisputeDecision,
    admin_notes: String,
}

// ============================================================================
// Handlers
// ============================================================================

#[allow(clippy::unused_async)]
async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn create_session(
    State(store): State<MarketplaceStore>,
    Path(commitment_id): Path<Uuid>,
    caller: CallerId,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = store
        .create_session(
            CommitmentId::from_uuid(commitment_id),
            caller.0,
            request.start_time,
            request.end_time,
            request.location,
            request.notes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn schedule_recurring(
    State(store): State<MarketplaceStore>,
    Path(commitment_id): Path<Uuid>,
    caller: CallerId,
    Json(request): Json<ScheduleRecurringRequest>,
) -> Result<(StatusCode, Json<Vec<Session>>), ApiError> {
    let sessions = store
        .schedule_recurring(
            CommitmentId::from_uuid(commitment_id),
            caller.0,
            request.slots,
            request.location,
            request.notes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(sessions)))
}

async fn list_sessions(
    State(store): State<MarketplaceStore>,
    Path(commitment_id): Path<Uuid>,
    _caller: CallerId,
) -> Result<Json<Vec<Session>>, ApiError> {
    let sessions = store
        .sessions_for_commitment(CommitmentId::from_uuid(commitment_id))
        .await?;
    Ok(Json(sessions))
}

async fn get_commitment(
    State(store): State<MarketplaceStore>,
    Path(commitment_id): Path<Uuid>,
    _caller: CallerId,
) -> Result<Json<LearningCommitment>, ApiError> {
    let commitment = store
        .commitment(CommitmentId::from_uuid(commitment_id))
        .await?;
    Ok(Json(commitment))
}

async fn get_session(
    State(store): State<MarketplaceStore>,
    Path(session_id): Path<Uuid>,
    _caller: CallerId,
) -> Result<Json<Session>, ApiError> {
    let session = store
        .session(crate::types::SessionId::from_uuid(session_id))
        .await?;
    Ok(Json(session))
}

async fn confirm_participation(
    State(store): State<MarketplaceStore>,
    Path(session_id): Path<Uuid>,
    caller: CallerId,
    Json(request): Json<ConfirmationRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = store
        .confirm_participation(
            crate::types::SessionId::from_uuid(session_id),
            caller.0,
            request.decision,
        )
        .await?;
    Ok(Json(session))
}

async fn check_in(
    State(store): State<MarketplaceStore>,
    Path(session_id): Path<Uuid>,
    caller: CallerId,
) -> Result<Json<Session>, ApiError> {
    let session = store
        .check_in(crate::types::SessionId::from_uuid(session_id), caller.0)
        .await?;
    Ok(Json(session))
}

async fn reject_attendance(
    State(store): State<MarketplaceStore>,
    Path(session_id): Path<Uuid>,
    caller: CallerId,
    Json(request): Json<RejectionRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = store
        .reject_attendance(
            crate::types::SessionId::from_uuid(session_id),
            caller.0,
            request.reason,
            request.evidence_urls,
        )
        .await?;
    Ok(Json(session))
}

async fn cancel_session(
    State(store): State<MarketplaceStore>,
    Path(session_id): Path<Uuid>,
    caller: CallerId,
    Json(request): Json<CancellationRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = store
        .cancel_session(
            crate::types::SessionId::from_uuid(session_id),
            caller.0,
            request.reason,
        )
        .await?;
    Ok(Json(session))
}

async fn resolve_dispute(
    State(store): State<MarketplaceStore>,
    Path(session_id): Path<Uuid>,
    caller: CallerId,
    Json(request): Json<ResolutionRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = store
        .resolve_dispute(
            crate::types::SessionId::from_uuid(session_id),
            caller.0,
            request.decision,
            request.admin_notes,
        )
        .await?;
    Ok(Json(session))
}
