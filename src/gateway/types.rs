//! API response envelope, error mapping and DTOs
//!
//! - `ApiResponse<T>`: unified response wrapper `{code, msg, data}`
//! - `ApiError`: handler error, rendered as an `ApiResponse` with an HTTP status
//! - `error_codes`: numeric codes carried in `code`

use axum::{
    Json,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::channel::{ChannelError, TransferMessage};
use crate::context::Interrupted;
use crate::core_types::{AccountId, Amount, TransactionId};
use crate::transfer::{AuditState, ErrorKind, TransferError};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_FUNDS: i32 = 1002;

    // Resource errors (4xxx)
    pub const ACCOUNT_NOT_FOUND: i32 = 4001;
    pub const NO_HISTORY: i32 = 4002;
    pub const REQUEST_TIMEOUT: i32 = 4081;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const AUDIT_FAILURE: i32 = 5002;
}

// ============================================================================
// Handler Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error_codes::ACCOUNT_NOT_FOUND, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            msg,
        )
    }

    pub fn into_err<T>(self) -> Result<T, ApiError> {
        Err(self)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match (&e, e.kind()) {
            (TransferError::NoHistory(_), _) => error_codes::NO_HISTORY,
            (_, ErrorKind::Validation) => error_codes::INVALID_PARAMETER,
            (_, ErrorKind::NotFound) => error_codes::ACCOUNT_NOT_FOUND,
            (_, ErrorKind::InsufficientFunds) => error_codes::INSUFFICIENT_FUNDS,
            (_, ErrorKind::Audit) => error_codes::AUDIT_FAILURE,
            (_, ErrorKind::Cancelled) => error_codes::REQUEST_TIMEOUT,
            (_, ErrorKind::Persistence) => error_codes::INTERNAL_ERROR,
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<ChannelError> for ApiError {
    fn from(e: ChannelError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
        let code = match e {
            ChannelError::Serialization(_) => error_codes::INVALID_PARAMETER,
            ChannelError::Cancelled(_) => error_codes::REQUEST_TIMEOUT,
            ChannelError::Closed | ChannelError::Transport(_) => error_codes::SERVICE_UNAVAILABLE,
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<Interrupted> for ApiError {
    fn from(e: Interrupted) -> Self {
        Self::new(StatusCode::REQUEST_TIMEOUT, error_codes::REQUEST_TIMEOUT, e.to_string())
    }
}

/// 200 with the success envelope
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// Success envelope with a specific status (201, 202)
pub fn with_status<T>(status: StatusCode, data: T) -> ApiResult<T> {
    Ok((status, Json(ApiResponse::success(data))))
}

// ============================================================================
// Request Extractors
// ============================================================================

/// JSON transfer body.
///
/// A body that is not JSON or does not fit [`TransferMessage`] (missing
/// field, wrong type) is rejected with 400 in the standard envelope.
#[derive(Debug)]
pub struct TransferBody(pub TransferMessage);

impl<S> FromRequest<S> for TransferBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(message) = Json::<TransferMessage>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;
        Ok(TransferBody(message))
    }
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Synchronous transfer result
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferCreatedData {
    #[schema(example = "success")]
    pub status: String,
    pub transaction_id: TransactionId,
    pub audit: AuditState,
}

/// Queued transfer acknowledgement
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferQueuedData {
    #[schema(example = "queued")]
    pub status: String,
    pub transaction_id: TransactionId,
}

/// Account balance lookup
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    pub id: AccountId,
    pub owner_name: String,
    pub balance: Amount,
    pub currency: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::account::Account> for AccountData {
    fn from(a: crate::account::Account) -> Self {
        Self {
            id: a.id,
            owner_name: a.owner_name,
            balance: a.balance,
            currency: a.currency,
            created_at: a.created_at,
        }
    }
}
