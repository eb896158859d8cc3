use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{json, Value};

use crate::lobby::player::{ParticipantId, ParticipantScore};
use crate::lobby::replication::{
    read_participant, read_shared, write_local, write_shared, Replica, END_SESSION_CALL,
    SCORE_KEY, SESSION_KEY,
};
use crate::lobby::session::{
    Admission, GameMode, NextRound, SessionError, SessionEvent, SessionEvents, SessionPhase,
    SessionState,
};

/// A participant's view of a replicated room.
///
/// Holds the last session state read from the replication layer. Every
/// mutation is read-modify-write of the whole `SessionState` value; the host
/// is the only writer of clock fields.
pub struct Room {
    replica: Arc<dyn Replica>,
    state: SessionState,
    rng: StdRng,
}

impl Room {
    /// Join a room, creating its session state if nobody has yet.
    /// The creator becomes the first host.
    pub fn join(replica: Arc<dyn Replica>, mode: GameMode, seed: u64) -> Self {
        let local = replica.local_id();
        let state = match read_shared::<SessionState>(replica.as_ref(), SESSION_KEY) {
            Some(state) => state,
            None => {
                let state = SessionState::new(mode, Some(local));
                write_shared(replica.as_ref(), SESSION_KEY, &state);
                tracing::info!("Created {} room, host {}", mode.as_str(), local);
                state
            }
        };

        Self {
            replica,
            state,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn local_id(&self) -> ParticipantId {
        self.replica.local_id()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_host(&self) -> bool {
        self.state.is_host(self.local_id())
    }

    pub fn admission(&self) -> Admission {
        self.state.admission(self.local_id())
    }

    pub fn roster(&self) -> Vec<ParticipantId> {
        self.replica.roster()
    }

    /// Re-read the shared session state
    fn pull(&mut self) {
        if let Some(state) = read_shared::<SessionState>(self.replica.as_ref(), SESSION_KEY) {
            // A broadcast end is sticky even if a stale write lands afterwards
            let ended = self.state.ended;
            self.state = state;
            self.state.ended |= ended;
        }
    }

    fn push(&self) {
        write_shared(self.replica.as_ref(), SESSION_KEY, &self.state);
    }

    /// Pull the latest state and apply roster driven changes.
    ///
    /// Re-elects a host when the current one has left, then (as host) applies
    /// the participant-count transitions.
    pub fn sync(&mut self) -> SessionEvents {
        self.pull();
        let roster = self.roster();
        let before = self.state.clone();
        let mut events = SessionEvents::new();

        if let Some(host_id) = self.elect_host(&roster) {
            events.push(SessionEvent::HostChanged { host_id });
        }
        if self.is_host() {
            events.extend(self.state.observe_roster(&roster));
        }

        if self.state != before {
            self.push();
        }
        events
    }

    /// Pick a new host uniformly from admitted live participants if the
    /// current host is missing. Last writer wins if two participants elect
    /// at the same time.
    fn elect_host(&mut self, roster: &[ParticipantId]) -> Option<ParticipantId> {
        if self.state.ended {
            return None;
        }
        if self.state.host_id.is_some_and(|host| roster.contains(&host)) {
            return None;
        }
        let candidates: Vec<ParticipantId> = roster
            .iter()
            .copied()
            .filter(|id| self.state.admission(*id) == Admission::Admitted)
            .collect();
        let host = *candidates.choose(&mut self.rng)?;
        tracing::info!("Host {:?} gone, elected {}", self.state.host_id, host);
        self.state.host_id = Some(host);
        Some(host)
    }

    /// One session second. Only the host advances the shared clock fields.
    pub fn tick_second(&mut self) -> SessionEvents {
        self.pull();
        let mut events = SessionEvents::new();
        if !self.is_host() || self.state.ended {
            return events;
        }

        let roster = self.roster();
        let before = self.state.clone();
        let event = match self.state.phase {
            SessionPhase::Countdown => self.state.tick_countdown(),
            SessionPhase::Active => self.state.tick_round(&roster),
            SessionPhase::WaitingForPlayers => self.state.tick_waiting(),
            SessionPhase::Lobby | SessionPhase::Over => None,
        };
        if self.state != before {
            self.push();
        }

        if let Some(event) = event {
            if let SessionEvent::SessionEnded { forced } = event {
                self.replica.broadcast(END_SESSION_CALL, json!({ "forced": forced }));
            }
            events.push(event);
        }
        events
    }

    /// Host starts the countdown from the lobby
    pub fn start_round(&mut self) -> Result<SessionEvents, SessionError> {
        self.pull();
        let roster = self.roster();
        let events = self.state.begin_countdown(self.local_id(), &roster)?;
        self.push();
        Ok(events)
    }

    /// Host moves to the next round, snapshotting everyone's score
    pub fn next_round(&mut self, next: NextRound) -> Result<SessionEvents, SessionError> {
        self.pull();
        let roster = self.roster();
        let scores = self.scoreboard();
        let events = self.state.advance_round(
            self.local_id(),
            &roster,
            scores.iter().map(|(id, score)| (*id, score)),
            next,
        )?;
        self.push();
        Ok(events)
    }

    /// Host ends the session for everyone
    pub fn end_session(&mut self) -> Result<SessionEvent, SessionError> {
        self.pull();
        let event = self.state.end_session(self.local_id())?;
        self.push();
        self.replica.broadcast(END_SESSION_CALL, json!({ "forced": false }));
        Ok(event)
    }

    /// Apply received broadcast calls. Returns the end event if one arrived.
    pub fn poll_calls(&mut self) -> Option<SessionEvent> {
        let mut ended = None;
        for call in self.replica.drain_calls() {
            match call.name.as_str() {
                END_SESSION_CALL => {
                    if self.state.mark_ended() {
                        tracing::info!("Session ended by {}", call.from);
                        let forced = call.payload.get("forced").and_then(Value::as_bool);
                        ended = Some(SessionEvent::SessionEnded {
                            forced: forced.unwrap_or(false),
                        });
                    }
                }
                other => tracing::debug!("Ignoring unknown call {}", other),
            }
        }
        ended
    }

    /// Publish the local participant's round score
    pub fn publish_score(&self, score: &ParticipantScore) {
        write_local(self.replica.as_ref(), SCORE_KEY, score);
    }

    /// Read-only merge of every counted participant's score.
    ///
    /// In a locked room this is the allow-list (departed players keep their
    /// points); otherwise the live roster.
    pub fn scoreboard(&self) -> Vec<(ParticipantId, ParticipantScore)> {
        let ids: Vec<ParticipantId> = if self.state.locked {
            self.state.allowed_participants.iter().copied().collect()
        } else {
            self.roster()
        };
        ids.into_iter()
            .map(|id| {
                let score: ParticipantScore =
                    read_participant(self.replica.as_ref(), id, SCORE_KEY).unwrap_or_default();
                (id, score)
            })
            .collect()
    }
}
