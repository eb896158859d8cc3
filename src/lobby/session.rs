//! Session State Machine
//!
//! Replicated room state: phase, host, lock/allow-list, round numbering and
//! the shared clock fields. Every transition is a method on `SessionState`
//! so it can be applied by whichever process holds the arbiter role and then
//! written back to the replication layer as a whole value.
//!
//! Phases:
//! - `Lobby -> Countdown` on host action (locks the room on first start)
//! - `Countdown -> Active` after 3 one-second ticks
//! - `Active -> WaitingForPlayers` when admitted participants drop below 2
//! - `WaitingForPlayers -> Active` when they come back before the timer runs out
//! - `WaitingForPlayers -> Over` + `ended` when the 30s timer runs out
//! - `Active -> Over` when the round clock reaches 0
//! - `Over -> Lobby | Countdown` on host action (next round)
//! - anything -> `ended` on host "end session" (terminal)

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::session::{COUNTDOWN_FROM, MIN_PARTICIPANTS, ROUND_SECONDS, WAITING_TIMEOUT};
use crate::game::match_result::{determine_result, RoundResult};
use crate::lobby::player::{ParticipantId, ParticipantScore};

/// Solo or synchronized multiplayer room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    Solo,
    Multiplayer,
}

impl GameMode {
    /// Admitted participants required to start and to keep a round running
    pub fn min_participants(&self) -> usize {
        match self {
            GameMode::Solo => 1,
            GameMode::Multiplayer => MIN_PARTICIPANTS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Solo => "solo",
            GameMode::Multiplayer => "multiplayer",
        }
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Lobby,
    Countdown,
    Active,
    WaitingForPlayers,
    Over,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Lobby => "lobby",
            SessionPhase::Countdown => "countdown",
            SessionPhase::Active => "active",
            SessionPhase::WaitingForPlayers => "waiting_for_players",
            SessionPhase::Over => "over",
        };
        f.write_str(name)
    }
}

/// What the host chooses after a round is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRound {
    Lobby,
    Countdown,
}

/// Whether a participant may play in this room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Room is locked and the participant is not on the allow-list
    Locked,
}

/// Observable result of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RoomLocked { allowed: usize },
    CountdownStarted { round_number: u32 },
    CountdownTick { value: u8 },
    RoundStarted { round_number: u32 },
    Paused { reason: String },
    Resumed,
    RoundOver { round_number: u32 },
    NextRound { round_number: u32, phase: SessionPhase },
    HostChanged { host_id: ParticipantId },
    SessionEnded { forced: bool },
}

pub type SessionEvents = SmallVec<[SessionEvent; 2]>;

/// Session errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("only the host can do that")]
    NotHost,
    #[error("not enough participants: {present}/{required}")]
    NotEnoughParticipants { required: usize, present: usize },
    #[error("not allowed in phase {actual}")]
    WrongPhase { actual: SessionPhase },
    #[error("session has ended")]
    Ended,
    #[error("room is locked")]
    Excluded,
}

/// Replicated session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub mode: GameMode,
    pub phase: SessionPhase,
    pub host_id: Option<ParticipantId>,
    /// Starts at 1
    pub round_number: u32,
    /// 0..=60
    pub seconds_remaining: u32,
    /// 0..=3
    pub countdown_value: u8,
    pub locked: bool,
    /// Captured once, at the first lock
    pub allowed_participants: BTreeSet<ParticipantId>,
    /// Terminal: once true the session is unusable
    pub ended: bool,
    /// 0..=30, counts down only while `WaitingForPlayers`
    pub waiting_timer: u32,
    /// Human-readable reason shown while waiting (also set, timerless, at game over)
    pub waiting_reason: Option<String>,
    /// Final standings keyed by round number
    pub results: BTreeMap<u32, RoundResult>,
}

impl SessionState {
    pub fn new(mode: GameMode, host_id: Option<ParticipantId>) -> Self {
        Self {
            mode,
            phase: SessionPhase::Lobby,
            host_id,
            round_number: 1,
            seconds_remaining: ROUND_SECONDS,
            countdown_value: COUNTDOWN_FROM,
            locked: false,
            allowed_participants: BTreeSet::new(),
            ended: false,
            waiting_timer: WAITING_TIMEOUT,
            waiting_reason: None,
            results: BTreeMap::new(),
        }
    }

    pub fn is_host(&self, id: ParticipantId) -> bool {
        self.host_id == Some(id)
    }

    /// Whether the simulation may run
    pub fn is_simulating(&self) -> bool {
        self.phase == SessionPhase::Active && !self.ended
    }

    pub fn admission(&self, id: ParticipantId) -> Admission {
        if self.locked && !self.allowed_participants.contains(&id) {
            Admission::Locked
        } else {
            Admission::Admitted
        }
    }

    /// Live participants that count towards the room
    pub fn admitted_count(&self, roster: &[ParticipantId]) -> usize {
        roster
            .iter()
            .filter(|id| self.admission(**id) == Admission::Admitted)
            .count()
    }

    fn require_host(&self, actor: ParticipantId) -> Result<(), SessionError> {
        if self.ended {
            return Err(SessionError::Ended);
        }
        if !self.is_host(actor) {
            return Err(SessionError::NotHost);
        }
        Ok(())
    }

    fn require_participants(&self, roster: &[ParticipantId]) -> Result<(), SessionError> {
        let required = self.mode.min_participants();
        let present = self.admitted_count(roster);
        if present < required {
            return Err(SessionError::NotEnoughParticipants { required, present });
        }
        Ok(())
    }

    fn enter_countdown(&mut self, events: &mut SessionEvents) {
        self.phase = SessionPhase::Countdown;
        self.countdown_value = COUNTDOWN_FROM;
        self.seconds_remaining = ROUND_SECONDS;
        events.push(SessionEvent::CountdownStarted {
            round_number: self.round_number,
        });
    }

    /// Host starts the round from the lobby.
    ///
    /// The first start of a multiplayer room captures the live roster as the
    /// allow-list. Later starts keep the existing list.
    pub fn begin_countdown(
        &mut self,
        actor: ParticipantId,
        roster: &[ParticipantId],
    ) -> Result<SessionEvents, SessionError> {
        self.require_host(actor)?;
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::WrongPhase { actual: self.phase });
        }
        self.require_participants(roster)?;

        let mut events = SessionEvents::new();
        if self.mode == GameMode::Multiplayer && !self.locked {
            self.allowed_participants = roster.iter().copied().collect();
            self.locked = true;
            events.push(SessionEvent::RoomLocked {
                allowed: self.allowed_participants.len(),
            });
        }
        self.enter_countdown(&mut events);
        Ok(events)
    }

    /// One countdown second: 3 -> 2 -> 1 -> 0, and `Active` on reaching 0
    pub fn tick_countdown(&mut self) -> Option<SessionEvent> {
        if self.ended || self.phase != SessionPhase::Countdown {
            return None;
        }
        self.countdown_value = self.countdown_value.saturating_sub(1);
        if self.countdown_value == 0 {
            self.phase = SessionPhase::Active;
            self.seconds_remaining = ROUND_SECONDS;
            Some(SessionEvent::RoundStarted {
                round_number: self.round_number,
            })
        } else {
            Some(SessionEvent::CountdownTick {
                value: self.countdown_value,
            })
        }
    }

    /// One round second. Ends the round at 0; paused outside `Active`.
    pub fn tick_round(&mut self, roster: &[ParticipantId]) -> Option<SessionEvent> {
        if self.ended || self.phase != SessionPhase::Active {
            return None;
        }
        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        if self.seconds_remaining > 0 {
            return None;
        }
        self.phase = SessionPhase::Over;
        self.update_game_over_notice(roster);
        Some(SessionEvent::RoundOver {
            round_number: self.round_number,
        })
    }

    /// One waiting second. Force-ends the whole session when the timer runs out.
    pub fn tick_waiting(&mut self) -> Option<SessionEvent> {
        if self.ended || self.phase != SessionPhase::WaitingForPlayers {
            return None;
        }
        self.waiting_timer = self.waiting_timer.saturating_sub(1);
        if self.waiting_timer > 0 {
            return None;
        }
        self.phase = SessionPhase::Over;
        self.ended = true;
        Some(SessionEvent::SessionEnded { forced: true })
    }

    /// Apply the participant-count driven transitions for a roster view
    pub fn observe_roster(&mut self, roster: &[ParticipantId]) -> SessionEvents {
        let mut events = SessionEvents::new();
        if self.ended || self.mode == GameMode::Solo {
            return events;
        }

        let present = self.admitted_count(roster);
        let required = self.mode.min_participants();
        match self.phase {
            SessionPhase::Active if present < required => {
                let reason = waiting_reason(present, required);
                self.phase = SessionPhase::WaitingForPlayers;
                self.waiting_timer = WAITING_TIMEOUT;
                self.waiting_reason = Some(reason.clone());
                events.push(SessionEvent::Paused { reason });
            }
            SessionPhase::WaitingForPlayers if present >= required => {
                self.phase = SessionPhase::Active;
                self.waiting_timer = WAITING_TIMEOUT;
                self.waiting_reason = None;
                events.push(SessionEvent::Resumed);
            }
            SessionPhase::Over => self.update_game_over_notice(roster),
            _ => {}
        }
        events
    }

    /// Timerless waiting notice shown at game over when the room is short
    fn update_game_over_notice(&mut self, roster: &[ParticipantId]) {
        if self.mode == GameMode::Solo {
            self.waiting_reason = None;
            return;
        }
        let present = self.admitted_count(roster);
        let required = self.mode.min_participants();
        self.waiting_reason = (present < required).then(|| waiting_reason(present, required));
    }

    /// Host moves an `Over` room to the next round.
    ///
    /// Snapshots the round's totals into `results`, bumps the round number and
    /// resets the per-round clock fields. The lock and allow-list are kept.
    pub fn advance_round<'a>(
        &mut self,
        actor: ParticipantId,
        roster: &[ParticipantId],
        scores: impl IntoIterator<Item = (ParticipantId, &'a ParticipantScore)>,
        next: NextRound,
    ) -> Result<SessionEvents, SessionError> {
        self.require_host(actor)?;
        if self.phase != SessionPhase::Over {
            return Err(SessionError::WrongPhase { actual: self.phase });
        }
        if next == NextRound::Countdown {
            self.require_participants(roster)?;
        }

        let result = determine_result(self.round_number, scores);
        self.results.insert(self.round_number, result);
        self.round_number += 1;
        self.seconds_remaining = ROUND_SECONDS;
        self.countdown_value = COUNTDOWN_FROM;
        self.waiting_timer = WAITING_TIMEOUT;
        self.waiting_reason = None;

        let mut events = SessionEvents::new();
        match next {
            NextRound::Lobby => self.phase = SessionPhase::Lobby,
            NextRound::Countdown => self.enter_countdown(&mut events),
        }
        events.insert(
            0,
            SessionEvent::NextRound {
                round_number: self.round_number,
                phase: self.phase,
            },
        );
        Ok(events)
    }

    /// Host ends the session for everyone
    pub fn end_session(&mut self, actor: ParticipantId) -> Result<SessionEvent, SessionError> {
        self.require_host(actor)?;
        self.ended = true;
        Ok(SessionEvent::SessionEnded { forced: false })
    }

    /// Apply a received end-of-session broadcast. Returns true if this changed anything.
    pub fn mark_ended(&mut self) -> bool {
        let changed = !self.ended;
        self.ended = true;
        changed
    }
}

fn waiting_reason(present: usize, required: usize) -> String {
    format!("Waiting for players: {}/{} connected", present, required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Species;
    use uuid::Uuid;

    fn ids(n: usize) -> Vec<ParticipantId> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    fn active_room(roster: &[ParticipantId]) -> SessionState {
        let mut state = SessionState::new(GameMode::Multiplayer, Some(roster[0]));
        state.begin_countdown(roster[0], roster).unwrap();
        for _ in 0..3 {
            state.tick_countdown();
        }
        assert_eq!(state.phase, SessionPhase::Active);
        state
    }

    #[test]
    fn test_new_session() {
        let host = Uuid::new_v4();
        let state = SessionState::new(GameMode::Multiplayer, Some(host));
        assert_eq!(state.phase, SessionPhase::Lobby);
        assert_eq!(state.round_number, 1);
        assert_eq!(state.seconds_remaining, 60);
        assert!(!state.locked);
        assert!(!state.ended);
        assert!(state.is_host(host));
    }

    #[test]
    fn test_begin_countdown_requires_host() {
        let roster = ids(2);
        let mut state = SessionState::new(GameMode::Multiplayer, Some(roster[0]));
        assert_eq!(state.begin_countdown(roster[1], &roster), Err(SessionError::NotHost));
    }

    #[test]
    fn test_begin_countdown_requires_two_participants() {
        let roster = ids(1);
        let mut state = SessionState::new(GameMode::Multiplayer, Some(roster[0]));
        assert_eq!(
            state.begin_countdown(roster[0], &roster),
            Err(SessionError::NotEnoughParticipants { required: 2, present: 1 })
        );
        assert_eq!(state.phase, SessionPhase::Lobby);
        assert!(!state.locked);
    }

    #[test]
    fn test_solo_starts_alone_and_never_locks() {
        let roster = ids(1);
        let mut state = SessionState::new(GameMode::Solo, Some(roster[0]));
        state.begin_countdown(roster[0], &roster).unwrap();
        assert_eq!(state.phase, SessionPhase::Countdown);
        assert!(!state.locked);

        for _ in 0..3 {
            state.tick_countdown();
        }
        assert!(state.observe_roster(&[]).is_empty());
        assert_eq!(state.phase, SessionPhase::Active);
    }

    #[test]
    fn test_countdown_to_active() {
        let roster = ids(2);
        let mut state = SessionState::new(GameMode::Multiplayer, Some(roster[0]));
        let events = state.begin_countdown(roster[0], &roster).unwrap();
        assert_eq!(events[0], SessionEvent::RoomLocked { allowed: 2 });
        assert_eq!(state.countdown_value, 3);

        assert_eq!(state.tick_countdown(), Some(SessionEvent::CountdownTick { value: 2 }));
        assert_eq!(state.tick_countdown(), Some(SessionEvent::CountdownTick { value: 1 }));
        assert_eq!(state.tick_countdown(), Some(SessionEvent::RoundStarted { round_number: 1 }));
        assert_eq!(state.phase, SessionPhase::Active);
        assert_eq!(state.countdown_value, 0);
        assert_eq!(state.seconds_remaining, 60);
        assert_eq!(state.tick_countdown(), None);
    }

    #[test]
    fn test_round_over_after_sixty_seconds() {
        let roster = ids(2);
        let mut state = active_room(&roster);
        for _ in 0..59 {
            assert_eq!(state.tick_round(&roster), None);
        }
        assert_eq!(state.seconds_remaining, 1);
        assert_eq!(state.tick_round(&roster), Some(SessionEvent::RoundOver { round_number: 1 }));
        assert_eq!(state.phase, SessionPhase::Over);
        assert!(state.waiting_reason.is_none());
    }

    #[test]
    fn test_waiting_and_resume_resets_timer() {
        let roster = ids(2);
        let mut state = active_room(&roster);

        let events = state.observe_roster(&roster[..1]);
        assert!(matches!(events[0], SessionEvent::Paused { .. }));
        assert_eq!(state.phase, SessionPhase::WaitingForPlayers);
        assert_eq!(state.waiting_timer, 30);
        assert!(state.waiting_reason.is_some());

        for _ in 0..18 {
            assert_eq!(state.tick_waiting(), None);
        }
        assert_eq!(state.waiting_timer, 12);

        let events = state.observe_roster(&roster);
        assert_eq!(events[0], SessionEvent::Resumed);
        assert_eq!(state.phase, SessionPhase::Active);
        assert_eq!(state.waiting_timer, 30);
        assert!(state.waiting_reason.is_none());
    }

    #[test]
    fn test_round_clock_paused_while_waiting() {
        let roster = ids(2);
        let mut state = active_room(&roster);
        state.tick_round(&roster);
        state.observe_roster(&roster[..1]);

        for _ in 0..5 {
            assert_eq!(state.tick_round(&roster[..1]), None);
        }
        assert_eq!(state.seconds_remaining, 59);
    }

    #[test]
    fn test_waiting_timeout_force_ends() {
        let roster = ids(2);
        let mut state = active_room(&roster);
        state.observe_roster(&roster[..1]);

        for _ in 0..29 {
            assert_eq!(state.tick_waiting(), None);
        }
        assert_eq!(state.tick_waiting(), Some(SessionEvent::SessionEnded { forced: true }));
        assert!(state.ended);
        assert_eq!(state.phase, SessionPhase::Over);
        assert_eq!(state.tick_waiting(), None);
    }

    #[test]
    fn test_game_over_short_room_shows_timerless_notice() {
        let roster = ids(2);
        let mut state = active_room(&roster);
        state.seconds_remaining = 1;
        state.tick_round(&roster[..1]);

        assert_eq!(state.phase, SessionPhase::Over);
        assert!(state.waiting_reason.is_some());
        assert!(!state.ended);
        // No timer runs at game over
        assert_eq!(state.tick_waiting(), None);
        assert!(!state.ended);

        state.observe_roster(&roster);
        assert!(state.waiting_reason.is_none());
    }

    #[test]
    fn test_locked_room_excludes_late_joiner() {
        let roster = ids(2);
        let late = Uuid::new_v4();
        let mut state = SessionState::new(GameMode::Multiplayer, Some(roster[0]));
        state.begin_countdown(roster[0], &roster).unwrap();

        assert!(state.locked);
        assert_eq!(state.admission(roster[1]), Admission::Admitted);
        assert_eq!(state.admission(late), Admission::Locked);

        let mut with_late = roster.clone();
        with_late.push(late);
        assert_eq!(state.admitted_count(&with_late), 2);
    }

    #[test]
    fn test_excluded_participant_does_not_keep_room_alive() {
        let roster = ids(2);
        let late = Uuid::new_v4();
        let mut state = active_room(&roster);

        state.observe_roster(&[roster[0], late]);
        assert_eq!(state.phase, SessionPhase::WaitingForPlayers);
    }

    #[test]
    fn test_next_round_keeps_lock_and_snapshots_results() {
        let roster = ids(2);
        let mut state = active_room(&roster);
        let allowed = state.allowed_participants.clone();
        state.seconds_remaining = 1;
        state.tick_round(&roster);

        let mut a = ParticipantScore::new();
        a.record(Species::Legendary, 100, 5);
        let b = ParticipantScore::new();
        let events = state
            .advance_round(roster[0], &roster, [(roster[0], &a), (roster[1], &b)], NextRound::Countdown)
            .unwrap();

        assert_eq!(events[0], SessionEvent::NextRound { round_number: 2, phase: SessionPhase::Countdown });
        assert_eq!(state.round_number, 2);
        assert_eq!(state.phase, SessionPhase::Countdown);
        assert!(state.locked);
        assert_eq!(state.allowed_participants, allowed);
        assert_eq!(state.results[&1].winner_id, Some(roster[0]));
        assert_eq!(state.seconds_remaining, 60);
        assert_eq!(state.countdown_value, 3);
    }

    #[test]
    fn test_relock_is_idempotent() {
        let roster = ids(2);
        let newcomer = Uuid::new_v4();
        let mut state = active_room(&roster);
        state.seconds_remaining = 1;
        state.tick_round(&roster);
        state
            .advance_round(roster[0], &roster, std::iter::empty(), NextRound::Lobby)
            .unwrap();
        assert_eq!(state.phase, SessionPhase::Lobby);

        let mut bigger = roster.clone();
        bigger.push(newcomer);
        let events = state.begin_countdown(roster[0], &bigger).unwrap();
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::RoomLocked { .. })));
        assert_eq!(state.allowed_participants.len(), 2);
        assert_eq!(state.admission(newcomer), Admission::Locked);
    }

    #[test]
    fn test_next_round_requires_over_and_host() {
        let roster = ids(2);
        let mut state = active_room(&roster);
        assert_eq!(
            state.advance_round(roster[0], &roster, std::iter::empty(), NextRound::Lobby),
            Err(SessionError::WrongPhase { actual: SessionPhase::Active })
        );
        state.seconds_remaining = 1;
        state.tick_round(&roster);
        assert_eq!(
            state.advance_round(roster[1], &roster, std::iter::empty(), NextRound::Lobby),
            Err(SessionError::NotHost)
        );
    }

    #[test]
    fn test_end_session_is_terminal() {
        let roster = ids(2);
        let mut state = active_room(&roster);
        assert_eq!(state.end_session(roster[1]), Err(SessionError::NotHost));
        assert_eq!(state.end_session(roster[0]), Ok(SessionEvent::SessionEnded { forced: false }));

        assert!(state.ended);
        assert!(!state.is_simulating());
        assert_eq!(state.tick_round(&roster), None);
        assert_eq!(state.end_session(roster[0]), Err(SessionError::Ended));
        assert!(!state.mark_ended());
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let roster = ids(2);
        let state = active_room(&roster);
        let value = serde_json::to_value(&state).unwrap();
        let back: SessionState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }
}
