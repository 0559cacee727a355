//! End-to-end ingestion against the in-memory ledger and an in-memory mirror.

use std::sync::Arc;
use std::time::Duration;

use shared_bus::{ErrorKind, EventFilter, InMemoryEventBus, SyncEvent};
use shared_types::{Address, LedgerTransaction, RawInstruction, TxSignature};
use sp_01_ledger_reader::{InMemoryLedger, PlatformAccount, VideoAccount, ViewerSessionAccount};
use sp_02_instruction_decoder::decode;
use sp_03_mirror_store::{ContentDirectory, MirrorStore, SqliteMirrorStore};
use sp_04_ingestion::{
    HandleOutcome, IngestionConfig, IngestionService, InstructionHandlers, ProcessOutcome,
    TxContext,
};
use sp_05_chunk_tracker::{ChunkViewTracker, TrackerConfig};
use sp_06_settlement::{SettlementConfig, SettlementReconciler};

const PROGRAM: Address = Address::new([42; 32]);
const SESSION: Address = Address::new([1; 32]);
const VIEWER: Address = Address::new([2; 32]);
const VIDEO: Address = Address::new([3; 32]);
const PLATFORM: Address = Address::new([4; 32]);
const CREATOR: Address = Address::new([5; 32]);
const FILLER: Address = Address::new([9; 32]);

struct Harness {
    ledger: Arc<InMemoryLedger>,
    store: Arc<SqliteMirrorStore>,
    bus: Arc<InMemoryEventBus>,
    reconciler: Arc<SettlementReconciler>,
}

impl Harness {
    fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(SqliteMirrorStore::in_memory().unwrap());
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = Arc::new(ChunkViewTracker::new(
            TrackerConfig::default(),
            store.clone(),
            bus.clone(),
        ));
        let reconciler = Arc::new(SettlementReconciler::new(
            &SettlementConfig::default(),
            store.clone(),
            store.clone(),
            ledger.clone(),
            bus.clone(),
            tracker,
        ));

        store.upsert_content("vid-1", "creator-1", 1_000).unwrap();
        ledger.set_account(VIDEO, &video_account(1_000, true));
        ledger.set_account(SESSION, &session_account(100, 0));

        Self {
            ledger,
            store,
            bus,
            reconciler,
        }
    }

    fn handlers(&self) -> InstructionHandlers {
        InstructionHandlers::new(
            self.store.clone(),
            self.store.clone(),
            self.ledger.clone(),
            self.bus.clone(),
            self.reconciler.clone(),
        )
    }

    fn service(&self, config: IngestionConfig) -> IngestionService {
        IngestionService::new(
            PROGRAM,
            config,
            self.ledger.clone(),
            self.store.clone(),
            self.bus.clone(),
            self.handlers(),
        )
        .unwrap()
    }

    fn polling_service(&self) -> IngestionService {
        self.service(IngestionConfig {
            subscription_enabled: false,
            ..IngestionConfig::default()
        })
    }
}

fn video_account(price: u64, is_active: bool) -> VideoAccount {
    VideoAccount {
        creator: CREATOR,
        video_id: "vid-1".into(),
        ipfs_hash: "QmHash".into(),
        total_chunks: 500,
        price_per_chunk: price,
        title: "Test".into(),
        description: String::new(),
        is_active,
        total_sessions: 0,
        total_chunks_served: 0,
        created_at: 1_000,
        bump: 254,
    }
}

fn session_account(max: u32, consumed: u32) -> ViewerSessionAccount {
    ViewerSessionAccount {
        viewer: VIEWER,
        video: VIDEO,
        max_approved_chunks: max,
        chunks_consumed: consumed,
        total_spent: u64::from(consumed) * 1_000,
        approved_price_per_chunk: 1_000,
        last_paid_chunk_index: consumed.checked_sub(1),
        session_start: 1_000,
        last_activity: 1_000 + i64::from(consumed),
        bump: 253,
    }
}

fn instruction(opcode: u8, arg: Option<u32>, accounts: Vec<Address>) -> RawInstruction {
    let mut data = vec![opcode];
    if let Some(arg) = arg {
        data.extend_from_slice(&arg.to_le_bytes());
    }
    RawInstruction {
        program_id: PROGRAM,
        data,
        accounts,
    }
}

fn approve(max: u32) -> RawInstruction {
    instruction(
        3,
        Some(max),
        vec![SESSION, VIDEO, FILLER, PLATFORM, FILLER, FILLER, FILLER, VIEWER],
    )
}

fn settle(count: u32) -> RawInstruction {
    instruction(
        4,
        Some(count),
        vec![SESSION, VIDEO, FILLER, PLATFORM, FILLER, FILLER, FILLER, VIEWER],
    )
}

fn pay_for_chunk(index: u32) -> RawInstruction {
    instruction(
        5,
        Some(index),
        vec![SESSION, VIDEO, FILLER, PLATFORM, FILLER, FILLER, FILLER, VIEWER],
    )
}

fn revoke() -> RawInstruction {
    instruction(6, None, vec![SESSION, VIDEO, PLATFORM, FILLER, VIEWER])
}

fn create_video() -> RawInstruction {
    instruction(1, None, vec![VIDEO, FILLER, PLATFORM, CREATOR])
}

fn update_video() -> RawInstruction {
    instruction(2, None, vec![VIDEO, PLATFORM, CREATOR])
}

fn tx(sig: &str, slot: u64, instructions: Vec<RawInstruction>) -> LedgerTransaction {
    LedgerTransaction {
        signature: TxSignature::new(sig),
        slot,
        block_time: Some(1_700_000_000 + slot as i64),
        failed: false,
        instructions,
    }
}

#[tokio::test]
async fn test_approve_then_settle() {
    let h = Harness::new();
    let service = h.polling_service();
    let mut events = h.bus.subscribe(EventFilter::all());

    h.ledger.insert_transaction_silently(tx("approve-1", 10, vec![approve(100)]));
    let report = service.poll_once().await.unwrap();
    assert_eq!(report.handled, 1);

    let session = h.store.find_session(&SESSION).unwrap().unwrap();
    assert_eq!(session.max_approved_chunks, 100);
    assert_eq!(session.chunks_consumed, 0);
    assert!(session.is_active);

    h.ledger.set_account(SESSION, &session_account(100, 40));
    h.ledger.insert_transaction_silently(tx("settle-1", 11, vec![settle(40)]));
    service.poll_once().await.unwrap();

    let settlements = h.store.settlements_for_session(&SESSION).unwrap();
    assert_eq!(settlements.len(), 1);
    assert_eq!(settlements[0].chunk_count, 40);
    assert_eq!(settlements[0].chunks_remaining, 60);
    assert_eq!(settlements[0].slot, Some(11));
    assert_eq!(service.watermark(), 11);
    assert_eq!(h.store.load_watermark().unwrap(), Some(11));

    let names: Vec<_> = events.drain().iter().map(SyncEvent::name).collect();
    assert_eq!(names, vec!["sessionCreated", "settlementRecorded"]);
}

#[tokio::test]
async fn test_second_poll_changes_nothing() {
    let h = Harness::new();
    let service = h.polling_service();
    h.ledger.insert_transaction_silently(tx("approve-1", 10, vec![approve(100)]));
    service.poll_once().await.unwrap();

    let mut events = h.bus.subscribe(EventFilter::all());
    let report = service.poll_once().await.unwrap();
    assert_eq!(report.handled, 0);
    assert_eq!(
        service
            .process_signature(&TxSignature::new("approve-1"), 10)
            .await,
        ProcessOutcome::Skipped
    );
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn test_replayed_instruction_is_absorbed() {
    let h = Harness::new();
    let handlers = h.handlers();
    let signature = TxSignature::new("approve-1");
    let decoded = decode(&approve(100), &PROGRAM, Some(1_700_000_000)).unwrap();
    let ctx = TxContext {
        signature: &signature,
        slot: 10,
    };

    assert_eq!(
        handlers.handle(&decoded, ctx).await.unwrap(),
        HandleOutcome::Applied
    );
    assert_eq!(
        handlers.handle(&decoded, ctx).await.unwrap(),
        HandleOutcome::Unchanged
    );

    // The ledger extends the approval; the replayed instruction now refreshes it.
    h.ledger.set_account(SESSION, &session_account(150, 0));
    let mut events = h.bus.subscribe(EventFilter::names(vec!["sessionCreated"]));
    assert_eq!(
        handlers.handle(&decoded, ctx).await.unwrap(),
        HandleOutcome::Applied
    );
    assert_eq!(
        h.store.find_session(&SESSION).unwrap().unwrap().max_approved_chunks,
        150
    );
    assert!(matches!(
        events.drain().as_slice(),
        [SyncEvent::SessionCreated {
            is_reapproval: true,
            ..
        }]
    ));
}

#[tokio::test]
async fn test_repeated_chunk_payment_is_one_row() {
    let h = Harness::new();
    let service = h.polling_service();
    h.ledger.insert_transaction_silently(tx("approve-1", 10, vec![approve(100)]));
    service.poll_once().await.unwrap();

    h.ledger.set_account(SESSION, &session_account(100, 1));
    h.ledger.insert_transaction_silently(tx("pay-1", 11, vec![pay_for_chunk(0)]));
    h.ledger.insert_transaction_silently(tx("pay-1b", 12, vec![pay_for_chunk(0)]));
    service.poll_once().await.unwrap();

    let payments = h.store.chunk_payments_for_session(&SESSION).unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].chunk_index, 0);
    assert_eq!(payments[0].amount_paid, 1_000);
    assert_eq!(service.watermark(), 12);
}

#[tokio::test]
async fn test_transient_failure_is_retried_next_cycle() {
    let h = Harness::new();
    let service = h.polling_service();
    h.ledger.insert_transaction_silently(tx("approve-1", 10, vec![approve(100)]));
    service.poll_once().await.unwrap();

    let mut errors = h.bus.subscribe(EventFilter::names(vec!["error"]));
    h.ledger.set_account(SESSION, &session_account(100, 40));
    h.ledger.insert_transaction_silently(tx("settle-1", 11, vec![settle(40)]));
    h.ledger.fail_next_fetches(&TxSignature::new("settle-1"), 1);

    let report = service.poll_once().await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(service.watermark(), 10);
    assert_eq!(service.pending_retries(), 1);
    assert!(h.store.settlements_for_session(&SESSION).unwrap().is_empty());
    assert!(matches!(
        errors.drain().as_slice(),
        [SyncEvent::Error {
            kind: ErrorKind::LedgerUnavailable,
            ..
        }]
    ));

    let report = service.poll_once().await.unwrap();
    assert_eq!(report.handled, 1);
    assert_eq!(service.watermark(), 11);
    assert_eq!(service.pending_retries(), 0);
    assert_eq!(h.store.settlements_for_session(&SESSION).unwrap().len(), 1);

    service.poll_once().await.unwrap();
    assert_eq!(h.store.settlements_for_session(&SESSION).unwrap().len(), 1);
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let h = Harness::new();
    let service = h.service(IngestionConfig {
        subscription_enabled: false,
        max_retry_attempts: 2,
        ..IngestionConfig::default()
    });
    let mut errors = h.bus.subscribe(EventFilter::names(vec!["error"]));
    h.ledger.insert_transaction_silently(tx("approve-1", 10, vec![approve(100)]));
    h.ledger.fail_next_fetches(&TxSignature::new("approve-1"), 10);

    service.poll_once().await.unwrap();
    service.poll_once().await.unwrap();
    assert_eq!(service.pending_retries(), 0);

    let kinds: Vec<_> = errors
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::Error { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![ErrorKind::LedgerUnavailable, ErrorKind::RetryExhausted]
    );
}

#[tokio::test]
async fn test_unknown_content_is_reported_and_skipped() {
    let h = Harness::new();
    let service = h.polling_service();
    let mut errors = h.bus.subscribe(EventFilter::names(vec!["error"]));
    let mut other = video_account(1_000, true);
    other.video_id = "not-in-catalogue".into();
    h.ledger.set_account(VIDEO, &other);

    h.ledger.insert_transaction_silently(tx("approve-1", 10, vec![approve(100)]));
    service.poll_once().await.unwrap();

    assert!(h.store.find_session(&SESSION).unwrap().is_none());
    assert_eq!(service.watermark(), 10);
    assert!(matches!(
        errors.drain().as_slice(),
        [SyncEvent::Error {
            kind: ErrorKind::MirrorNotFound,
            ..
        }]
    ));
}

#[tokio::test]
async fn test_video_lifecycle_updates_catalogue() {
    let h = Harness::new();
    let service = h.polling_service();
    let mut events = h.bus.subscribe(EventFilter::all());

    h.ledger.set_account(VIDEO, &video_account(1_500, true));
    h.ledger.insert_transaction_silently(tx("create-1", 5, vec![create_video()]));
    service.poll_once().await.unwrap();

    let content = h.store.find_content_by_external_id("vid-1").unwrap().unwrap();
    assert_eq!(content.ledger_address, Some(VIDEO));
    assert_eq!(content.price_per_chunk, 1_500);

    h.ledger.set_account(VIDEO, &video_account(2_000, false));
    h.ledger.insert_transaction_silently(tx("update-1", 6, vec![update_video()]));
    service.poll_once().await.unwrap();

    let content = h.store.find_content_by_external_id("vid-1").unwrap().unwrap();
    assert_eq!(content.price_per_chunk, 2_000);
    assert!(!content.is_active);

    let names: Vec<_> = events.drain().iter().map(SyncEvent::name).collect();
    assert_eq!(names, vec!["videoCreated", "videoUpdated"]);
}

#[tokio::test]
async fn test_revoke_deactivates_session() {
    let h = Harness::new();
    let service = h.polling_service();
    h.ledger.insert_transaction_silently(tx("approve-1", 10, vec![approve(100)]));
    service.poll_once().await.unwrap();

    let mut events = h.bus.subscribe(EventFilter::names(vec!["delegationRevoked"]));
    h.ledger.insert_transaction_silently(tx("revoke-1", 11, vec![revoke()]));
    service.poll_once().await.unwrap();

    assert!(!h.store.find_session(&SESSION).unwrap().unwrap().is_active);
    assert!(matches!(
        events.drain().as_slice(),
        [SyncEvent::DelegationRevoked { session, viewer, .. }]
            if *session == SESSION && *viewer == VIEWER
    ));
}

#[tokio::test]
async fn test_initialize_is_observed_only() {
    let h = Harness::new();
    let service = h.polling_service();
    h.ledger.set_account(
        PLATFORM,
        &PlatformAccount {
            authority: CREATOR,
            token_mint: FILLER,
            platform_fee_basis_points: 500,
            min_price_per_chunk: 100,
            total_videos: 0,
            total_sessions: 0,
            total_revenue: 0,
            bump: 255,
        },
    );
    h.ledger.insert_transaction_silently(tx(
        "init-1",
        1,
        vec![instruction(0, None, vec![PLATFORM, FILLER, CREATOR, FILLER])],
    ));

    let report = service.poll_once().await.unwrap();
    assert_eq!(report.handled, 1);
    assert_eq!(service.watermark(), 1);
}

#[tokio::test]
async fn test_failed_and_foreign_transactions_are_ignored() {
    let h = Harness::new();
    let service = h.polling_service();

    let mut failed = tx("approve-failed", 10, vec![approve(100)]);
    failed.failed = true;
    h.ledger.insert_transaction_silently(failed);

    let mut foreign = approve(100);
    foreign.program_id = FILLER;
    foreign.accounts.push(PROGRAM);
    h.ledger.insert_transaction_silently(tx("foreign-1", 11, vec![foreign]));

    service.poll_once().await.unwrap();
    assert!(h.store.find_session(&SESSION).unwrap().is_none());
    assert_eq!(service.watermark(), 11);
}

#[tokio::test]
async fn test_watermark_survives_restart() {
    let h = Harness::new();
    let service = h.polling_service();
    h.ledger.insert_transaction_silently(tx("approve-1", 10, vec![approve(100)]));
    service.poll_once().await.unwrap();
    drop(service);

    let restarted = h.polling_service();
    assert_eq!(restarted.watermark(), 10);
    assert_eq!(
        restarted
            .process_signature(&TxSignature::new("approve-1"), 10)
            .await,
        ProcessOutcome::Skipped
    );
}

#[tokio::test]
async fn test_live_feed_and_poll_share_the_pipeline() {
    let h = Harness::new();
    let service = h.service(IngestionConfig {
        poll_interval_secs: 1,
        resubscribe_backoff_secs: 1,
        ..IngestionConfig::default()
    });
    let mut sessions = h.bus.subscribe(EventFilter::names(vec!["sessionCreated"]));
    let mut lifecycle = h.bus.subscribe(EventFilter::names(vec!["started", "stopped"]));

    service.start().await.unwrap();
    assert!(service.is_running());
    assert!(service.start().await.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.ledger.push_transaction(tx("approve-1", 10, vec![approve(100)]));
    // Either path may deliver it; duplicates are absorbed.
    h.ledger.replay_notice(&TxSignature::new("approve-1"));

    let event = tokio::time::timeout(Duration::from_secs(5), sessions.recv())
        .await
        .expect("session event")
        .expect("bus open");
    assert!(matches!(event, SyncEvent::SessionCreated { .. }));

    service.stop().await;
    assert!(!service.is_running());
    assert!(sessions.drain().is_empty());

    let names: Vec<_> = lifecycle.drain().iter().map(SyncEvent::name).collect();
    assert_eq!(names, vec!["started", "stopped"]);
    assert!(h.store.find_session(&SESSION).unwrap().is_some());
}
