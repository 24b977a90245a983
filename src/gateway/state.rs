use std::sync::Arc;
use std::time::Duration;

use crate::account::AccountLedger;
use crate::audit::AuditLog;
use crate::channel::Publisher;
use crate::context::CallContext;
use crate::transfer::TransferEngine;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    /// Transfer engine (synchronous path)
    pub engine: Arc<TransferEngine>,
    /// Ingestion channel producer (asynchronous path)
    pub publisher: Publisher,
    /// Deadline applied to every request's store calls
    pub request_timeout: Duration,
    /// Backend label reported by the health check
    pub backend: &'static str,
}

impl AppState {
    pub fn new(engine: Arc<TransferEngine>, publisher: Publisher) -> Self {
        Self {
            engine,
            publisher,
            request_timeout: Duration::from_secs(10),
            backend: "memory",
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = backend;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn AccountLedger> {
        self.engine.ledger()
    }

    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        self.engine.audit()
    }

    /// Fresh context for one request
    pub fn request_context(&self) -> CallContext {
        CallContext::with_timeout(self.request_timeout)
    }
}
