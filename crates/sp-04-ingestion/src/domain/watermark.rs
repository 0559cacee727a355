//! # Watermark
//!
//! Highest slot fully handled, plus the signatures that failed below or above
//! it and still have retry budget. A signature at or below the watermark is
//! only processed again while it sits in the retry queue.

use std::collections::HashMap;

use shared_types::{Slot, TxSignature};

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again next cycle.
    Retry { attempt: u32 },
    /// Budget spent; the signature was dropped from the queue.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryEntry {
    slot: Slot,
    attempts: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Watermark {
    slot: Slot,
    retries: HashMap<TxSignature, RetryEntry>,
}

impl Watermark {
    pub fn new(slot: Slot) -> Self {
        Self {
            slot,
            retries: HashMap::new(),
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn should_process(&self, signature: &TxSignature, slot: Slot) -> bool {
        slot > self.slot || self.retries.contains_key(signature)
    }

    /// Move forward to `slot`. Never moves backwards.
    pub fn advance(&mut self, slot: Slot) -> bool {
        if slot > self.slot {
            self.slot = slot;
            true
        } else {
            false
        }
    }

    pub fn record_failure(
        &mut self,
        signature: &TxSignature,
        slot: Slot,
        max_attempts: u32,
    ) -> RetryDecision {
        let entry = self
            .retries
            .entry(signature.clone())
            .or_insert(RetryEntry { slot, attempts: 0 });
        entry.attempts += 1;
        let attempts = entry.attempts;
        if attempts >= max_attempts {
            self.retries.remove(signature);
            RetryDecision::Exhausted { attempts }
        } else {
            RetryDecision::Retry { attempt: attempts }
        }
    }

    pub fn clear_retry(&mut self, signature: &TxSignature) {
        self.retries.remove(signature);
    }

    /// Queued signatures with their slots.
    pub fn pending_retries(&self) -> Vec<(TxSignature, Slot)> {
        self.retries
            .iter()
            .map(|(sig, entry)| (sig.clone(), entry.slot))
            .collect()
    }

    pub fn retry_count(&self) -> usize {
        self.retries.len()
    }

    /// Slot that is safe to persist: a restart must not skip a queued retry.
    pub fn durable_slot(&self) -> Slot {
        self.retries
            .values()
            .map(|entry| entry.slot.saturating_sub(1))
            .min()
            .map_or(self.slot, |floor| floor.min(self.slot))
    }
}
