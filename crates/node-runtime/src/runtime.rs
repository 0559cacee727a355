//! # Node Runtime
//!
//! Constructs every subsystem once and shares them by `Arc`.
//!
//! ```text
//! LedgerReader ──► IngestionService ──► InstructionHandlers ──► MirrorStore
//!                                             │
//!                                             ▼
//!                  HTTP gateway ──► SettlementReconciler ◄──► ChunkViewTracker
//!                                             │
//!                                             ▼
//!                                         Event bus ──► event log
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use parking_lot::Mutex;
use shared_bus::{EventFilter, InMemoryEventBus};
use sp_01_ledger_reader::{JsonRpcLedger, LedgerReader};
use sp_03_mirror_store::SqliteMirrorStore;
use sp_04_ingestion::{IngestionService, InstructionHandlers};
use sp_05_chunk_tracker::ChunkViewTracker;
use sp_06_settlement::SettlementReconciler;
use sp_07_api_gateway::{build_router, serve, AppState, SyncStatus};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::tasks::{log_events, sweep_tracker};

pub struct NodeRuntime {
    config: SyncConfig,
    bus: Arc<InMemoryEventBus>,
    store: Arc<SqliteMirrorStore>,
    tracker: Arc<ChunkViewTracker>,
    ingestion: Arc<IngestionService>,
    router: Router,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NodeRuntime {
    /// Wire the subsystems against the configured JSON-RPC endpoint.
    pub fn build(config: SyncConfig) -> Result<Self> {
        let ledger = JsonRpcLedger::new(config.rpc_endpoint())
            .context("failed to create ledger client")?;
        Self::with_ledger(config, Arc::new(ledger))
    }

    /// Wire the subsystems against any ledger reader.
    pub fn with_ledger(config: SyncConfig, ledger: Arc<dyn LedgerReader>) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let program_id = config.program_id()?;

        let store = Arc::new(if config.uses_in_memory_store() {
            SqliteMirrorStore::in_memory().context("failed to create in-memory store")?
        } else {
            if let Some(parent) = config.storage.database_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create data directory {}", parent.display())
                    })?;
                }
            }
            SqliteMirrorStore::open(&config.storage.database_path).with_context(|| {
                format!(
                    "failed to open mirror store at {}",
                    config.storage.database_path.display()
                )
            })?
        });

        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = Arc::new(ChunkViewTracker::new(
            config.tracker.clone(),
            store.clone(),
            bus.clone(),
        ));
        let reconciler = Arc::new(SettlementReconciler::new(
            &config.settlement,
            store.clone(),
            store.clone(),
            ledger.clone(),
            bus.clone(),
            tracker.clone(),
        ));
        let handlers = InstructionHandlers::new(
            store.clone(),
            store.clone(),
            ledger.clone(),
            bus.clone(),
            reconciler.clone(),
        );
        let ingestion = Arc::new(
            IngestionService::new(
                program_id,
                config.ingestion.clone(),
                ledger,
                store.clone(),
                bus.clone(),
                handlers,
            )
            .context("failed to create ingestion service")?,
        );

        let router = build_router(
            AppState {
                tracker: tracker.clone(),
                reconciler,
                status: Some(ingestion.clone() as Arc<dyn SyncStatus>),
            },
            &config.http,
        );
        let (shutdown_tx, _) = watch::channel(false);

        info!(program = %program_id, "[runtime] subsystems wired");
        Ok(Self {
            config,
            bus,
            store,
            tracker,
            ingestion,
            router,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start background tasks, ingestion and the HTTP server.
    ///
    /// Returns the address the HTTP server is bound to.
    pub async fn start(&self) -> Result<SocketAddr> {
        let addr = self
            .config
            .http
            .socket_addr()
            .context("invalid HTTP bind address")?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let bound = listener.local_addr().context("listener has no address")?;

        let events = self.bus.subscribe(EventFilter::all());
        let mut tasks = vec![
            tokio::spawn(log_events(events, self.shutdown_tx.subscribe())),
            tokio::spawn(sweep_tracker(
                self.tracker.clone(),
                self.shutdown_tx.subscribe(),
            )),
        ];

        let router = self.router.clone();
        let shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = serve(listener, router, shutdown).await {
                error!("[runtime] HTTP server failed: {}", e);
            }
        }));
        self.tasks.lock().extend(tasks);

        self.ingestion
            .start()
            .await
            .context("failed to start ingestion")?;

        info!("===========================================");
        info!("  SolPlay ledger sync v{}", env!("CARGO_PKG_VERSION"));
        info!("  HTTP: {}", bound);
        info!("  Program: {}", self.config.ledger.program_id);
        info!("===========================================");
        Ok(bound)
    }

    /// Stop ingestion, signal every task and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("[runtime] initiating graceful shutdown");
        self.ingestion.stop().await;

        if self.shutdown_tx.send(true).is_err() {
            warn!("[runtime] no task was listening for shutdown");
        }
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("[runtime] task ended abnormally: {}", e);
            }
        }
        info!("[runtime] shutdown complete");
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.bus)
    }

    pub fn store(&self) -> Arc<SqliteMirrorStore> {
        Arc::clone(&self.store)
    }

    pub fn tracker(&self) -> Arc<ChunkViewTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn ingestion(&self) -> Arc<IngestionService> {
        Arc::clone(&self.ingestion)
    }

    /// The HTTP router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
