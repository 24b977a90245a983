//! Transfer Ledger service entry point
//!
//! ```text
//! ┌──────────┐  sync   ┌──────────────┐    ┌───────────────┐
//! │ Gateway  │────────▶│TransferEngine│───▶│ AccountLedger │
//! │ (axum)   │         │              │───▶│ AuditLog      │
//! └────┬─────┘         └──────▲───────┘    └───────────────┘
//!      │ async                │
//!      ▼                      │
//! ┌──────────┐         ┌──────┴───────┐
//! │Publisher │────────▶│  Consumers   │
//! └──────────┘  queue  └──────────────┘
//! ```
//!
//! Flags: `--env <name>` (config/<name>.yaml), `--port <n>`, `--memory`
//! (in-process stores), `--seed` (open demo accounts on startup).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use transfer_ledger::account::{Account, AccountLedger, InMemoryAccountLedger, LedgerError, PgAccountLedger, TransferOutbox};
use transfer_ledger::audit::{AuditLog, InMemoryAuditLog, PgAuditLog};
use transfer_ledger::channel::{IngestionChannel, MemoryQueue, PgQueue, QueueBackend};
use transfer_ledger::config::{AppConfig, ChannelConfig};
use transfer_ledger::core_types::Amount;
use transfer_ledger::db::Database;
use transfer_ledger::gateway::{self, AppState};
use transfer_ledger::transfer::{OutboxProjector, SettlementMode, TransferEngine};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn use_memory_mode() -> bool {
    std::env::args().any(|a| a == "--memory")
}

fn use_seed() -> bool {
    std::env::args().any(|a| a == "--seed")
}

fn demo_accounts() -> Vec<Account> {
    vec![
        Account::new("acc_alice", "Alice", Amount::from_minor(10_000), "USD"),
        Account::new("acc_bob", "Bob", Amount::from_minor(5_000), "USD"),
        Account::new("acc_carol", "Carol", Amount::from_minor(100), "USD"),
    ]
}

/// Storage wiring for one process
struct Stores {
    ledger: Arc<dyn AccountLedger>,
    outbox: Arc<dyn TransferOutbox>,
    audit: Arc<dyn AuditLog>,
    queue: Arc<dyn QueueBackend>,
    backend: &'static str,
}

impl Stores {
    fn memory() -> Self {
        let ledger = Arc::new(InMemoryAccountLedger::new());
        Self {
            ledger: ledger.clone(),
            outbox: ledger,
            audit: Arc::new(InMemoryAuditLog::new()),
            queue: Arc::new(MemoryQueue::new()),
            backend: "memory",
        }
    }

    async fn postgres(url: &str, channel: &ChannelConfig) -> anyhow::Result<Self> {
        let db = Database::connect(url)
            .await
            .context("connect to PostgreSQL")?;
        db.migrate().await.context("apply migrations")?;

        let pool = db.pool().clone();
        let ledger = Arc::new(PgAccountLedger::new(pool.clone()));
        Ok(Self {
            ledger: ledger.clone(),
            outbox: ledger,
            audit: Arc::new(PgAuditLog::new(pool.clone())),
            queue: Arc::new(
                PgQueue::new(pool, channel.queue_name.as_str())
                    .with_visibility_timeout(channel.visibility_timeout()),
            ),
            backend: "postgres",
        })
    }

    async fn seed(&self, accounts: Vec<Account>) -> anyhow::Result<()> {
        for account in accounts {
            match self.ledger.open(&account).await {
                Ok(()) => tracing::info!(account = %account.id, balance = %account.balance, "Seeded account"),
                Err(LedgerError::AlreadyExists(_)) => {}
                Err(e) => return Err(e).context("seed demo accounts"),
            }
        }
        Ok(())
    }
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
    }
    tracing::info!("Shutdown signal received");
    tx.send_replace(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }
    let _log_guard = transfer_ledger::logging::init_logging(&config);

    tracing::info!("Starting Transfer Ledger in {} mode", env);

    let stores = match (&config.postgres_url, use_memory_mode()) {
        (Some(url), false) => Stores::postgres(url, &config.channel).await?,
        _ => {
            tracing::warn!("No PostgreSQL configured (or --memory given), using in-memory stores");
            Stores::memory()
        }
    };

    if use_seed() || stores.backend == "memory" {
        stores.seed(demo_accounts()).await?;
    }

    let engine = Arc::new(match config.engine.settlement {
        SettlementMode::Sequential => TransferEngine::new(stores.ledger.clone(), stores.audit.clone()),
        SettlementMode::Outbox => TransferEngine::with_outbox(
            stores.ledger.clone(),
            stores.audit.clone(),
            stores.outbox.clone(),
        )
        .with_outbox_lease(config.projector.lease()),
    });
    tracing::info!(settlement = ?engine.settlement(), backend = stores.backend, "Transfer engine ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let projector_handle = (engine.settlement() == SettlementMode::Outbox).then(|| {
        let projector = OutboxProjector::new(
            stores.outbox.clone(),
            stores.audit.clone(),
            (&config.projector).into(),
        );
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { projector.run(rx).await })
    });

    let channel = IngestionChannel::new(stores.queue.clone());
    let subscriptions: Vec<_> = (0..config.channel.subscriptions.max(1))
        .map(|_| channel.subscribe(engine.clone(), config.channel.subscription()))
        .collect();
    tracing::info!(
        count = subscriptions.len(),
        queue = %config.channel.queue_name,
        "Ingestion consumers started"
    );

    let state = AppState::new(engine.clone(), channel.publisher())
        .with_backend(stores.backend)
        .with_request_timeout(Duration::from_millis(config.gateway.request_timeout_ms));
    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .context("invalid gateway listen address")?;

    tokio::spawn(shutdown_signal(shutdown_tx));

    let mut server_shutdown = shutdown_rx.clone();
    gateway::run_server(addr, state, async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    })
    .await
    .context("gateway server")?;

    // Drain: stop intake, let consumers finish their current message.
    channel.close();
    for sub in &subscriptions {
        sub.shutdown();
    }
    for sub in subscriptions {
        let stats = sub.join().await;
        tracing::info!(?stats, "Consumer stopped");
    }
    if let Some(handle) = projector_handle
        && let Err(e) = handle.await
    {
        tracing::error!(error = %e, "Outbox projector task failed");
    }

    tracing::info!("Transfer Ledger stopped");
    Ok(())
}
