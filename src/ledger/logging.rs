use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;
use uuid::Uuid;

use super::{HitReceipt, HitRecorder, HitRequest, LedgerError, RoundRecord, RoundStore};

/// Ledger that only logs. Used when no external ledger is configured.
#[derive(Debug, Default)]
pub struct LoggingLedger {
    hits: AtomicU64,
    rounds: AtomicU64,
}

impl LoggingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits_recorded(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn rounds_saved(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }
}

impl HitRecorder for LoggingLedger {
    async fn record_hit(&self, request: HitRequest) -> Result<HitReceipt, LedgerError> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        let tx = format!("0x{}", Uuid::new_v4().simple());
        info!(
            "Hit {} pts for {} (tx {})",
            request.points, request.participant_address, tx
        );
        Ok(HitReceipt {
            success: true,
            transaction_hash: Some(tx),
            error: None,
        })
    }
}

impl RoundStore for LoggingLedger {
    async fn save_round(&self, record: RoundRecord) -> Result<String, LedgerError> {
        self.rounds.fetch_add(1, Ordering::Relaxed);
        let session_id = Uuid::new_v4().to_string();
        info!(
            "Round saved for {}: {} pts, {} hits, {}s ({})",
            record.host_address,
            record.score,
            record.hits,
            record.duration_seconds,
            record.mode.as_str()
        );
        Ok(session_id)
    }
}
