//! In-memory ledger for tests and local runs.
//!
//! Transactions are pushed by the test; each push is also broadcast on the
//! live feed. Fault injection covers the failure paths the ingestion pipeline
//! must survive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use shared_types::{Address, LedgerTransaction, SignatureInfo, SignatureNotice, TxSignature};
use tokio::sync::broadcast;

use crate::domain::{LedgerError, ProgramAccount};
use crate::ports::{LedgerReader, SignatureFeed};

const FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<TxSignature, LedgerTransaction>,
    /// Push order, oldest first.
    order: Vec<TxSignature>,
    accounts: HashMap<Address, Vec<u8>>,
    /// Remaining forced failures per signature.
    failing: HashMap<TxSignature, u32>,
}

/// Ledger reader over in-process state.
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    feed: broadcast::Sender<SignatureNotice>,
    unavailable: AtomicBool,
    subscription_supported: AtomicBool,
    fetches: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            state: RwLock::new(LedgerState::default()),
            feed,
            unavailable: AtomicBool::new(false),
            subscription_supported: AtomicBool::new(true),
            fetches: AtomicU64::new(0),
        }
    }

    /// Record a transaction and announce it on the live feed.
    pub fn push_transaction(&self, tx: LedgerTransaction) {
        let notice = SignatureNotice {
            signature: tx.signature.clone(),
            slot: tx.slot,
        };
        {
            let mut state = self.state.write();
            if !state.transactions.contains_key(&tx.signature) {
                state.order.push(tx.signature.clone());
            }
            state.transactions.insert(tx.signature.clone(), tx);
        }
        // No subscribers is fine.
        let _ = self.feed.send(notice);
    }

    /// Record a transaction without announcing it (poll-only discovery).
    pub fn insert_transaction_silently(&self, tx: LedgerTransaction) {
        let mut state = self.state.write();
        if !state.transactions.contains_key(&tx.signature) {
            state.order.push(tx.signature.clone());
        }
        state.transactions.insert(tx.signature.clone(), tx);
    }

    /// Re-announce an already known signature, simulating duplicate delivery.
    pub fn replay_notice(&self, signature: &TxSignature) {
        let slot = self
            .state
            .read()
            .transactions
            .get(signature)
            .map(|tx| tx.slot);
        if let Some(slot) = slot {
            let _ = self.feed.send(SignatureNotice {
                signature: signature.clone(),
                slot,
            });
        }
    }

    /// Store a typed account at `address`.
    pub fn set_account<T: ProgramAccount>(&self, address: Address, account: &T) {
        self.set_raw_account(address, account.encode());
    }

    /// Store raw account bytes at `address`.
    pub fn set_raw_account(&self, address: Address, data: Vec<u8>) {
        self.state.write().accounts.insert(address, data);
    }

    /// Delete the account at `address`.
    pub fn remove_account(&self, address: &Address) {
        self.state.write().accounts.remove(address);
    }

    /// Make the next `times` fetches of `signature` fail as unavailable.
    pub fn fail_next_fetches(&self, signature: &TxSignature, times: u32) {
        self.state.write().failing.insert(signature.clone(), times);
    }

    /// Make every call fail as unavailable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Toggle live feed support.
    pub fn set_subscription_supported(&self, supported: bool) {
        self.subscription_supported
            .store(supported, Ordering::SeqCst);
    }

    /// Number of `get_transaction` calls served so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("in-memory ledger offline".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn get_transaction(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut state = self.state.write();
        if let Some(remaining) = state.failing.get_mut(signature) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LedgerError::Unavailable(format!(
                    "injected failure for {signature}"
                )));
            }
        }
        Ok(state.transactions.get(signature).cloned())
    }

    async fn get_account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, LedgerError> {
        self.check_available()?;
        Ok(self.state.read().accounts.get(address).cloned())
    }

    async fn list_recent_signatures(
        &self,
        program: &Address,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, LedgerError> {
        self.check_available()?;
        let state = self.state.read();
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|sig| state.transactions.get(sig))
            .filter(|tx| {
                tx.instructions
                    .iter()
                    .any(|ix| ix.program_id == *program || ix.accounts.contains(program))
            })
            .take(limit)
            .map(|tx| SignatureInfo {
                signature: tx.signature.clone(),
                slot: tx.slot,
                failed: tx.failed,
            })
            .collect())
    }

    async fn subscribe(&self, _program: &Address) -> Result<SignatureFeed, LedgerError> {
        self.check_available()?;
        if !self.subscription_supported.load(Ordering::SeqCst) {
            return Err(LedgerError::SubscriptionUnsupported(
                "in-memory feed disabled".into(),
            ));
        }
        let receiver = self.feed.subscribe();
        let feed = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(notice) => return Some((notice, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(feed.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ViewerSessionAccount;
    use crate::ports::fetch_account;
    use shared_types::RawInstruction;

    fn program() -> Address {
        Address::new([42; 32])
    }

    fn tx(sig: &str, slot: u64) -> LedgerTransaction {
        LedgerTransaction {
            signature: TxSignature::new(sig),
            slot,
            block_time: None,
            failed: false,
            instructions: vec![RawInstruction {
                program_id: program(),
                data: vec![7],
                accounts: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn test_recent_signatures_newest_first_with_limit() {
        let ledger = InMemoryLedger::new();
        ledger.push_transaction(tx("a", 1));
        ledger.push_transaction(tx("b", 2));
        ledger.push_transaction(tx("c", 3));

        let listed = ledger.list_recent_signatures(&program(), 2).await.unwrap();
        let sigs: Vec<_> = listed.iter().map(|s| s.signature.as_str()).collect();
        assert_eq!(sigs, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_injected_failures_then_success() {
        let ledger = InMemoryLedger::new();
        ledger.push_transaction(tx("a", 1));
        ledger.fail_next_fetches(&TxSignature::new("a"), 1);

        let sig = TxSignature::new("a");
        assert!(ledger.get_transaction(&sig).await.is_err());
        assert!(ledger.get_transaction(&sig).await.unwrap().is_some());
        assert_eq!(ledger.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_feed_delivers_pushed_signatures() {
        let ledger = InMemoryLedger::new();
        let mut feed = ledger.subscribe(&program()).await.unwrap();
        ledger.push_transaction(tx("a", 5));

        let notice = feed.next().await.unwrap();
        assert_eq!(notice.signature.as_str(), "a");
        assert_eq!(notice.slot, 5);
    }

    #[tokio::test]
    async fn test_fetch_account_decodes_and_reports_missing() {
        let ledger = InMemoryLedger::new();
        let address = Address::new([3; 32]);
        assert!(fetch_account::<ViewerSessionAccount>(&ledger, &address)
            .await
            .unwrap()
            .is_none());

        ledger.set_raw_account(address, vec![0; 4]);
        let err = fetch_account::<ViewerSessionAccount>(&ledger, &address)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountDecode { .. }));
    }

    #[tokio::test]
    async fn test_unavailable_and_unsupported() {
        let ledger = InMemoryLedger::new();
        ledger.set_subscription_supported(false);
        assert!(matches!(
            ledger.subscribe(&program()).await,
            Err(LedgerError::SubscriptionUnsupported(_))
        ));

        ledger.set_unavailable(true);
        let err = ledger
            .list_recent_signatures(&program(), 10)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
