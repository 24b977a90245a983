//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::channel::TransferMessage;
use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{AccountData, TransferCreatedData, TransferQueuedData};
use crate::transfer::{AuditState, TransferRequest, TransferStatus};

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Transfer Ledger API",
        version = "1.0.0",
        description = "Account-to-account transfers with an append-only audit log.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::create_transaction,
        crate::gateway::handlers::queue_transaction,
        crate::gateway::handlers::get_transaction_history,
        crate::gateway::handlers::get_account,
        crate::gateway::handlers::health_check,
    ),
    components(
        schemas(
            TransferMessage,
            TransferRequest,
            TransferStatus,
            AuditState,
            TransferCreatedData,
            TransferQueuedData,
            AccountData,
            HealthResponse,
        )
    ),
    tags(
        (name = "Transfer", description = "Transfer execution and history"),
        (name = "Account", description = "Balance queries"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;
