use std::sync::Arc;

use axum::extract::{Path, State};

use super::super::state::AppState;
use super::super::types::{AccountData, ApiError, ApiResult, ok};
use crate::account::LedgerError;
use crate::core_types::AccountId;

/// Account balance lookup
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account_id}",
    params(("account_id" = String, Path, description = "Account identifier")),
    responses(
        (status = 200, description = "Account found", body = AccountData, content_type = "application/json"),
        (status = 404, description = "Account not found")
    ),
    tag = "Account"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> ApiResult<AccountData> {
    let id = AccountId::new(account_id);
    let ctx = state.request_context();

    match ctx.run(state.ledger().get(&id)).await? {
        Ok(account) => ok(account.into()),
        Err(e @ LedgerError::NotFound(_)) => ApiError::not_found(e.to_string()).into_err(),
        Err(e) => {
            tracing::error!(account = %id, error = %e, "Account lookup failed");
            ApiError::internal(e.to_string()).into_err()
        }
    }
}
