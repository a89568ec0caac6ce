use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::commission::{CommissionPostingEngine, PostCommissionResult};
use crate::ledger::LedgerError;
use crate::report::{AccountTransactions, ReportService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CommissionPostingEngine>,
    pub reports: Arc<ReportService>,
}

/// Create the API router
pub fn create_router(engine: Arc<CommissionPostingEngine>, reports: Arc<ReportService>) -> Router {
    let state = AppState { engine, reports };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/ledger/commissions/post", post(post_commission))
        .route(
            "/api/ledger/commissions/:payment_split_id/attachment",
            post(attach_receipt),
        )
        .route(
            "/api/ledger/accounts/:account_id/transactions",
            get(get_account_transactions),
        )
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Post one payment split to the external ledger. Safe to retry: a split
/// that already has a live entry comes back with `already_exists = true`.
async fn post_commission(
    State(state): State<AppState>,
    Json(request): Json<PostCommissionRequest>,
) -> Result<Json<PostCommissionResult>, ApiError> {
    let result = state
        .engine
        .post(&request.payment_split_id, request.paid_date)
        .await?;
    Ok(Json(result))
}

/// Upload a receipt against the document already posted for a split. The
/// raw request body is the file; its type comes from the Content-Type
/// header.
async fn attach_receipt(
    State(state): State<AppState>,
    Path(payment_split_id): Path<String>,
    Query(params): Query<AttachmentQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AttachmentResponse>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream");
    let attachment_id = state
        .engine
        .attach_receipt(&payment_split_id, &params.file_name, content_type, &body)
        .await?;
    Ok(Json(AttachmentResponse { attachment_id }))
}

/// Normalized account activity for a date range
async fn get_account_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(params): Query<TransactionsQuery>,
) -> Result<Json<AccountTransactions>, ApiError> {
    if params.end_date < params.start_date {
        return Err(ApiError(LedgerError::InvalidInput(
            "end_date precedes start_date".into(),
        )));
    }
    let activity = state
        .reports
        .get_account_transactions(&account_id, params.start_date, params.end_date)
        .await?;
    Ok(Json(activity))
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct PostCommissionRequest {
    payment_split_id: String,
    paid_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct AttachmentQuery {
    file_name: String,
}

#[derive(Serialize)]
struct AttachmentResponse {
    attachment_id: String,
}

#[derive(Deserialize)]
struct TransactionsQuery {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

// ===== Error Handling =====

/// Wrapper turning the ledger error taxonomy into HTTP responses.
/// Reauthorization and policy problems get their own statuses so the UI
/// can route the human to the right fix.
#[derive(Debug)]
struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::PolicyMissing { .. } => StatusCode::CONFLICT,
            LedgerError::ReauthorizationRequired { .. } => StatusCode::UNAUTHORIZED,
            LedgerError::RemoteApi { .. } | LedgerError::ReactivationFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            LedgerError::Transport(_) | LedgerError::Storage(_) | LedgerError::Other(_) => {
                tracing::error!("Internal error: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_for(err: LedgerError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(LedgerError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(LedgerError::InvalidInput("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(LedgerError::PolicyMissing {
                broker: "Dana".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(LedgerError::ReauthorizationRequired {
                realm_id: "r".into()
            }),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(LedgerError::RemoteApi {
                status: 400,
                body: "bad".into()
            }),
            StatusCode::BAD_GATEWAY
        );
    }
}
