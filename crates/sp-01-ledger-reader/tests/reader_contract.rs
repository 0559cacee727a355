//! Behaviour every `LedgerReader` consumer relies on, driven through the
//! trait object the ingestion pipeline holds.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{Address, TxSignature};
use sp_01_ledger_reader::{
    fetch_account, InMemoryLedger, JsonRpcLedger, LedgerError, LedgerReader, RpcEndpointConfig,
    VideoAccount, ViewerSessionAccount,
};

fn session() -> ViewerSessionAccount {
    ViewerSessionAccount {
        viewer: Address::new([2u8; 32]),
        video: Address::new([3u8; 32]),
        max_approved_chunks: 100,
        chunks_consumed: 40,
        total_spent: 40_000,
        approved_price_per_chunk: 1_000,
        last_paid_chunk_index: None,
        session_start: 1_700_000_000,
        last_activity: 1_700_000_600,
        bump: 254,
    }
}

#[tokio::test]
async fn test_session_account_through_trait_object() {
    let memory = Arc::new(InMemoryLedger::new());
    let address = Address::new([1u8; 32]);
    memory.set_account(address, &session());
    let reader: Arc<dyn LedgerReader> = memory;

    let fetched = fetch_account::<ViewerSessionAccount>(reader.as_ref(), &address)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.chunks_remaining(), 60);
    assert_eq!(fetched.last_paid_chunk_index, None);
}

#[tokio::test]
async fn test_wrong_account_type_is_permanent() {
    let memory = Arc::new(InMemoryLedger::new());
    let address = Address::new([1u8; 32]);
    memory.set_account(address, &session());
    let reader: Arc<dyn LedgerReader> = memory;

    let err = fetch_account::<VideoAccount>(reader.as_ref(), &address)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AccountDecode { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transient() {
    let ledger = JsonRpcLedger::new(RpcEndpointConfig {
        rpc_url: "http://127.0.0.1:1".to_string(),
        ws_url: None,
        commitment: "confirmed".to_string(),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap();

    let err = ledger
        .get_transaction(&TxSignature::new("unreachable"))
        .await
        .unwrap_err();
    assert!(err.is_transient(), "unexpected error: {err}");
}
