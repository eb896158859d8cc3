//! External hit ledger and round store
//!
//! Hits and round results are forwarded to external collaborators without
//! ever blocking the frame loop. Failures come back as `Notification`s the
//! client shows and forgets; they never roll back local state.
//!
//! - `HitRecorder` / `RoundStore` - collaborator interfaces
//! - `LedgerClient` - fire-and-forget handle over a tokio worker
//! - `LoggingLedger` - tracing-only implementation (default)
//! - `HttpLedger` - JSON over HTTP (`http_ledger` feature)

pub mod client;
#[cfg(feature = "http_ledger")]
pub mod http;
pub mod logging;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::lobby::player::{HitRecord, ParticipantId};
use crate::lobby::session::GameMode;

pub use client::LedgerClient;
#[cfg(feature = "http_ledger")]
pub use http::HttpLedger;
pub use logging::LoggingLedger;

/// One scored hit to record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRequest {
    pub participant_address: String,
    pub points: u32,
}

/// Recorder response
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HitReceipt {
    pub success: bool,
    pub transaction_hash: Option<String>,
    pub error: Option<String>,
}

/// Room details attached to a saved round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMetadata {
    pub round_number: u32,
    pub host_id: Option<ParticipantId>,
    pub participants: Vec<ParticipantId>,
}

/// One participant's round, saved once at round over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub mode: GameMode,
    pub host_address: String,
    pub score: u32,
    pub hits: u32,
    pub hit_history: Vec<HitRecord>,
    pub duration_seconds: u32,
    pub room_metadata: Option<RoomMetadata>,
}

/// Ledger errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("no wallet address")]
    MissingIdentity,
    #[error("ledger worker is not running")]
    ChannelClosed,
}

/// Records single hits
pub trait HitRecorder: Send + Sync + 'static {
    fn record_hit(
        &self,
        request: HitRequest,
    ) -> impl Future<Output = Result<HitReceipt, LedgerError>> + Send;
}

/// Persists round results. Returns the stored session id.
pub trait RoundStore: Send + Sync + 'static {
    fn save_round(
        &self,
        record: RoundRecord,
    ) -> impl Future<Output = Result<String, LedgerError>> + Send;
}

/// Supplies the wallet-style address used as the ledger key
pub trait IdentityProvider: Send + Sync {
    fn address(&self) -> Option<String>;
}

/// Fixed (or absent) address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticIdentity {
    address: Option<String>,
}

impl StaticIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
        }
    }

    /// No wallet: ledger calls are skipped
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl IdentityProvider for StaticIdentity {
    fn address(&self) -> Option<String> {
        self.address.clone()
    }
}

/// Kind of transient message shown to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    HitNotRecorded,
    RoundSaved,
    RoundNotSaved,
}

/// Dismissable message produced by the ledger worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self.kind, NotificationKind::RoundSaved)
    }
}
