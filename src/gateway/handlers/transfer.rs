//! Transfer handlers: synchronous execution, queued publish, history

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
};

use super::super::state::AppState;
use super::super::types::{
    ApiResult, TransferBody, TransferCreatedData, TransferQueuedData, ok, with_status,
};
use crate::channel::TransferMessage;
use crate::core_types::AccountId;
use crate::transfer::TransferRequest;

/// Execute a transfer
///
/// Runs the transfer to completion before responding.
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = TransferMessage,
    responses(
        (status = 201, description = "Transfer completed", body = TransferCreatedData, content_type = "application/json"),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Source account not found"),
        (status = 422, description = "Insufficient funds"),
        (status = 500, description = "Balance or audit store failure")
    ),
    tag = "Transfer"
)]
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    TransferBody(req): TransferBody,
) -> ApiResult<TransferCreatedData> {
    let ctx = state.request_context();
    let receipt = state
        .engine
        .process_transfer(&ctx, req.into_request())
        .await?;

    with_status(
        StatusCode::CREATED,
        TransferCreatedData {
            status: "success".to_string(),
            transaction_id: receipt.transaction_id,
            audit: receipt.audit,
        },
    )
}

/// Queue a transfer
///
/// Publishes the request to the ingestion channel and returns immediately.
/// The outcome is only visible in the logs and, on success, in history.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/async",
    request_body = TransferMessage,
    responses(
        (status = 202, description = "Transfer queued", body = TransferQueuedData, content_type = "application/json"),
        (status = 408, description = "Request cancelled before publish"),
        (status = 503, description = "Channel closed or unavailable")
    ),
    tag = "Transfer"
)]
pub async fn queue_transaction(
    State(state): State<Arc<AppState>>,
    TransferBody(req): TransferBody,
) -> ApiResult<TransferQueuedData> {
    let ctx = state.request_context();
    let transaction_id = state.publisher.publish(&ctx, req.into_request()).await?;

    with_status(
        StatusCode::ACCEPTED,
        TransferQueuedData {
            status: "queued".to_string(),
            transaction_id,
        },
    )
}

/// Transfer history of an account, newest first
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{account_id}",
    params(("account_id" = String, Path, description = "Account identifier")),
    responses(
        (status = 200, description = "Transfers touching the account", body = Vec<TransferRequest>, content_type = "application/json"),
        (status = 404, description = "No transfers recorded for the account")
    ),
    tag = "Transfer"
)]
pub async fn get_transaction_history(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> ApiResult<Vec<TransferRequest>> {
    let ctx = state.request_context();
    let history = state
        .engine
        .get_history(&ctx, &AccountId::new(account_id))
        .await?;
    ok(history)
}
