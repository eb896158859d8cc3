use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::state::Species;

/// Per-room unique participant id supplied by the replication layer
pub type ParticipantId = Uuid;

/// One scored hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRecord {
    pub species: Species,
    pub points: u32,
    /// Milliseconds on the client's session timeline
    pub timestamp_ms: u64,
}

/// Accumulated round score for one participant.
///
/// Only the owning participant appends to it; everyone else reads the
/// replicated copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantScore {
    pub total_score: u32,
    pub total_hits: u32,
    pub history: Vec<HitRecord>,
}

impl ParticipantScore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hit and update the totals
    pub fn record(&mut self, species: Species, points: u32, timestamp_ms: u64) {
        self.total_score += points;
        self.total_hits += 1;
        self.history.push(HitRecord {
            species,
            points,
            timestamp_ms,
        });
    }

    /// Clear per-round counters
    pub fn reset(&mut self) {
        self.total_score = 0;
        self.total_hits = 0;
        self.history.clear();
    }

    /// Hits of a given species this round
    pub fn hits_of(&self, species: Species) -> usize {
        self.history.iter().filter(|h| h.species == species).count()
    }
}
