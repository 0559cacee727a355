//! # Driven Ports

use shared_types::Slot;
use sp_04_ingestion::IngestionService;

/// Ingestion state reported by `/health`.
pub trait SyncStatus: Send + Sync {
    fn is_running(&self) -> bool;
    fn watermark(&self) -> Slot;
}

impl SyncStatus for IngestionService {
    fn is_running(&self) -> bool {
        IngestionService::is_running(self)
    }

    fn watermark(&self) -> Slot {
        IngestionService::watermark(self)
    }
}
