use axum::{
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wagerhall_execution::{ActionError, LedgerError, MatchSnapshot, SettlementError};
use wagerhall_types::{
    ActionRequest, LedgerEntry, MatchId, StateConflict, UserId, ValidationError,
};

use crate::metrics::ServerMetricsSnapshot;
use crate::registry::{CreateMatch, JoinRequest, RegistryError};
use crate::Server;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    server: ServerMetricsSnapshot,
    ws_connections: usize,
}

#[derive(Deserialize)]
pub(super) struct LeaveRequest {
    user_id: UserId,
}

#[derive(Serialize)]
struct LeaveResponse<'a> {
    refunded: u64,
    #[serde(rename = "match")]
    snapshot: &'a MatchSnapshot,
}

#[derive(Deserialize)]
pub(super) struct WithdrawRequest {
    withdrawal_id: u64,
    amount: u64,
}

#[derive(Serialize)]
struct LedgerResponse {
    user_id: UserId,
    balance: i64,
    entries: Vec<LedgerEntry>,
}

/// Maps registry failures onto status codes; the body carries the stable
/// reason code.
pub(super) struct ApiError(RegistryError);

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            RegistryError::Action(ActionError::Invalid(_)) => StatusCode::BAD_REQUEST,
            RegistryError::Action(ActionError::Conflict(StateConflict::MatchNotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            RegistryError::Action(ActionError::Conflict(_)) => StatusCode::CONFLICT,
            RegistryError::Ledger(err) | RegistryError::Settlement(SettlementError::Ledger(err)) => {
                match err {
                    LedgerError::InsufficientBalance { .. } | LedgerError::AmountOutOfRange => {
                        StatusCode::BAD_REQUEST
                    }
                    LedgerError::ConflictingEntry { .. } => StatusCode::CONFLICT,
                    LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    LedgerError::OrphanedEntry { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
            RegistryError::Settlement(SettlementError::NotCompleted(_))
            | RegistryError::Settlement(SettlementError::ReconciliationRequired { .. }) => {
                StatusCode::CONFLICT
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), err = %self.0, "request failed");
        } else {
            tracing::debug!(code = self.0.code(), err = %self.0, "request rejected");
        }
        let body = ErrorBody {
            error: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn snapshot_response(status: StatusCode, snapshot: &MatchSnapshot) -> Response {
    (status, Json(snapshot)).into_response()
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn metrics(AxumState(server): AxumState<Arc<Server>>) -> Response {
    Json(MetricsResponse {
        server: server.metrics().snapshot(),
        ws_connections: server.connections().active(),
    })
    .into_response()
}

pub(super) async fn create_match(
    AxumState(server): AxumState<Arc<Server>>,
    Json(request): Json<CreateMatch>,
) -> ApiResult {
    let snapshot = server.registry().create_match(request).await?;
    Ok(snapshot_response(StatusCode::CREATED, &snapshot))
}

pub(super) async fn list_matches(AxumState(server): AxumState<Arc<Server>>) -> Response {
    let snapshots = server.registry().list().await;
    let body: Vec<&MatchSnapshot> = snapshots.iter().map(Arc::as_ref).collect();
    Json(body).into_response()
}

pub(super) async fn get_match(
    AxumState(server): AxumState<Arc<Server>>,
    Path(id): Path<MatchId>,
) -> ApiResult {
    let snapshot = server.registry().snapshot(id).await?;
    Ok(snapshot_response(StatusCode::OK, &snapshot))
}

pub(super) async fn join_match(
    AxumState(server): AxumState<Arc<Server>>,
    Path(id): Path<MatchId>,
    Json(request): Json<JoinRequest>,
) -> ApiResult {
    let snapshot = server.registry().join(id, request).await?;
    Ok(snapshot_response(StatusCode::OK, &snapshot))
}

pub(super) async fn leave_match(
    AxumState(server): AxumState<Arc<Server>>,
    Path(id): Path<MatchId>,
    Json(request): Json<LeaveRequest>,
) -> ApiResult {
    let (refund, snapshot) = server.registry().leave(id, &request.user_id).await?;
    Ok(Json(LeaveResponse {
        refunded: refund.amount,
        snapshot: &snapshot,
    })
    .into_response())
}

pub(super) async fn submit_action(
    AxumState(server): AxumState<Arc<Server>>,
    Path(id): Path<MatchId>,
    Json(request): Json<ActionRequest>,
) -> ApiResult {
    let snapshot = server.registry().submit(id, request).await?;
    Ok(snapshot_response(StatusCode::OK, &snapshot))
}

pub(super) async fn get_result(
    AxumState(server): AxumState<Arc<Server>>,
    Path(id): Path<MatchId>,
) -> ApiResult {
    let result = server.registry().result(id).await?;
    Ok(Json(result).into_response())
}

fn user_from_path(raw: String) -> Result<UserId, ApiError> {
    let user = UserId::new(raw);
    if !user.is_valid() {
        return Err(RegistryError::from(ValidationError::InvalidUserId).into());
    }
    Ok(user)
}

pub(super) async fn get_ledger(
    AxumState(server): AxumState<Arc<Server>>,
    Path(user): Path<String>,
) -> ApiResult {
    let user = user_from_path(user)?;
    let registry = server.registry();
    let entries = registry.ledger_entries(&user).await?;
    let balance = entries.iter().map(|entry| entry.amount).sum();
    Ok(Json(LedgerResponse {
        user_id: user,
        balance,
        entries,
    })
    .into_response())
}

pub(super) async fn withdraw(
    AxumState(server): AxumState<Arc<Server>>,
    Path(user): Path<String>,
    Json(request): Json<WithdrawRequest>,
) -> ApiResult {
    let user = user_from_path(user)?;
    let entry = server
        .registry()
        .withdraw(user, request.withdrawal_id, request.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}
