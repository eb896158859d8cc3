use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    HitRecorder, HitRequest, LedgerError, Notification, NotificationKind, RoundRecord, RoundStore,
};

enum LedgerJob {
    RecordHit(HitRequest),
    SaveRound(RoundRecord),
}

/// Fire-and-forget handle to a ledger worker.
///
/// Submitting never waits on the collaborator. Each job runs in its own task
/// so a slow call does not delay later ones; outcomes that need the player's
/// attention come back through `drain_notifications`.
pub struct LedgerClient {
    jobs: mpsc::UnboundedSender<LedgerJob>,
    notifications: Receiver<Notification>,
}

impl LedgerClient {
    /// Start a worker on the current tokio runtime
    pub fn spawn<L>(ledger: Arc<L>) -> (Self, JoinHandle<()>)
    where
        L: HitRecorder + RoundStore,
    {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (note_tx, note_rx) = unbounded();
        let handle = tokio::spawn(run_worker(ledger, job_rx, note_tx));
        (
            Self {
                jobs: job_tx,
                notifications: note_rx,
            },
            handle,
        )
    }

    pub fn record_hit(&self, request: HitRequest) -> Result<(), LedgerError> {
        self.jobs
            .send(LedgerJob::RecordHit(request))
            .map_err(|_| LedgerError::ChannelClosed)
    }

    pub fn save_round(&self, record: RoundRecord) -> Result<(), LedgerError> {
        self.jobs
            .send(LedgerJob::SaveRound(record))
            .map_err(|_| LedgerError::ChannelClosed)
    }

    /// Notifications produced since the last call
    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.notifications.try_iter().collect()
    }
}

async fn run_worker<L>(
    ledger: Arc<L>,
    mut jobs: mpsc::UnboundedReceiver<LedgerJob>,
    notify: Sender<Notification>,
) where
    L: HitRecorder + RoundStore,
{
    while let Some(job) = jobs.recv().await {
        let ledger = ledger.clone();
        let notify = notify.clone();
        tokio::spawn(async move {
            let note = match job {
                LedgerJob::RecordHit(request) => record_hit(ledger.as_ref(), request).await,
                LedgerJob::SaveRound(record) => save_round(ledger.as_ref(), record).await,
            };
            if let Some(note) = note {
                // The client may already be gone
                let _ = notify.send(note);
            }
        });
    }
    debug!("Ledger worker stopped");
}

async fn record_hit<L: HitRecorder>(ledger: &L, request: HitRequest) -> Option<Notification> {
    let points = request.points;
    match ledger.record_hit(request).await {
        Ok(receipt) if receipt.success => {
            debug!("Hit recorded ({} pts): {:?}", points, receipt.transaction_hash);
            None
        }
        Ok(receipt) => {
            let reason = receipt.error.unwrap_or_else(|| "rejected".to_string());
            warn!("Hit not recorded: {}", reason);
            Some(Notification::new(
                NotificationKind::HitNotRecorded,
                format!("Hit not recorded: {}", reason),
            ))
        }
        Err(e) => {
            warn!("Hit not recorded: {}", e);
            Some(Notification::new(
                NotificationKind::HitNotRecorded,
                format!("Hit not recorded: {}", e),
            ))
        }
    }
}

async fn save_round<L: RoundStore>(ledger: &L, record: RoundRecord) -> Option<Notification> {
    match ledger.save_round(record).await {
        Ok(session_id) => {
            debug!("Round saved as {}", session_id);
            Some(Notification::new(
                NotificationKind::RoundSaved,
                format!("Round saved ({})", session_id),
            ))
        }
        Err(e) => {
            warn!("Round not saved: {}", e);
            Some(Notification::new(
                NotificationKind::RoundNotSaved,
                format!("Round not saved: {}", e),
            ))
        }
    }
}
