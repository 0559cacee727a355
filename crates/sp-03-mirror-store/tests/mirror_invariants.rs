//! Mirror invariants under arbitrary observation orders.

use proptest::prelude::*;
use shared_types::{Address, TxSignature};
use sp_03_mirror_store::{
    ContentDirectory, MirrorStore, SessionProgress, SessionRecord, SettlementRecord,
    SqliteMirrorStore,
};

const MAX_APPROVED: u32 = 100;
const PRICE: u64 = 1_000;

fn session_address() -> Address {
    Address::new([1; 32])
}

fn open_with_session() -> SqliteMirrorStore {
    let store = SqliteMirrorStore::in_memory().unwrap();
    let content = store.upsert_content("vid", "creator", PRICE).unwrap();
    store
        .insert_session(&SessionRecord {
            session: session_address(),
            content_id: content.local_id,
            viewer: Address::new([2; 32]),
            max_approved_chunks: MAX_APPROVED,
            chunks_consumed: 0,
            total_spent: 0,
            approved_price_per_chunk: PRICE,
            last_paid_chunk_index: None,
            session_start: 0,
            last_activity: 0,
            is_active: true,
        })
        .unwrap();
    store
}

fn settlement(content_id: i64, sig: String, chunk_count: u32, consumed: u32) -> SettlementRecord {
    SettlementRecord {
        session: session_address(),
        content_id,
        viewer: Address::new([2; 32]),
        creator: "creator".into(),
        chunk_count,
        total_payment: u64::from(chunk_count) * PRICE,
        platform_fee: 0,
        creator_amount: 0,
        signature: TxSignature::new(sig),
        block_time: None,
        slot: None,
        chunks_consumed_after: consumed,
        chunks_remaining: MAX_APPROVED - consumed,
        settled_at: 0,
    }
}

proptest! {
    #[test]
    fn consumed_is_non_decreasing_and_bounded(
        snapshots in proptest::collection::vec(0u32..=MAX_APPROVED, 1..20)
    ) {
        let store = open_with_session();
        let content_id = store.find_session(&session_address()).unwrap().unwrap().content_id;
        let mut previous = 0;

        for (i, consumed) in snapshots.into_iter().enumerate() {
            let progress = SessionProgress {
                max_approved_chunks: MAX_APPROVED,
                chunks_consumed: consumed,
                total_spent: u64::from(consumed) * PRICE,
                last_paid_chunk_index: None,
                last_activity: i as i64,
            };
            let chunk_count = consumed.saturating_sub(previous);
            store
                .record_settlement(
                    &settlement(content_id, format!("sig-{i}"), chunk_count, consumed),
                    &progress,
                )
                .unwrap();

            let mirrored = store.find_session(&session_address()).unwrap().unwrap();
            prop_assert!(mirrored.chunks_consumed >= previous);
            prop_assert!(mirrored.chunks_consumed <= mirrored.max_approved_chunks);
            previous = mirrored.chunks_consumed;
        }

        // Every recorded chunk is billed exactly once.
        let billed: u32 = store
            .settlements_for_session(&session_address())
            .unwrap()
            .iter()
            .map(|row| row.chunk_count)
            .sum();
        prop_assert_eq!(billed, previous);
    }
}

#[test]
fn test_file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");

    {
        let store = SqliteMirrorStore::open(&path).unwrap();
        store.upsert_content("vid", "creator", PRICE).unwrap();
        store.save_watermark(1_234).unwrap();
    }

    let store = SqliteMirrorStore::open(&path).unwrap();
    assert_eq!(store.load_watermark().unwrap(), Some(1_234));
    assert!(store.find_content_by_external_id("vid").unwrap().is_some());
}
