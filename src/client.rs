//! Participant client
//!
//! Glues one participant's private simulation (`GameLoop`) to the replicated
//! room (`Room`) on a single logical thread. The caller drives it with
//! `frame(now_ms)` once per display frame; the 1 Hz session clock and the
//! variable-delay spawn cadence run as named timers polled from that call.
//!
//! Timers are (re)armed only when the observed `(phase, round, ended)` gate
//! changes, so repeated observations of the same state never stack timers.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::game::clock::{RoundClock, Scheduler, TimerName};
use crate::game::constants::session::{ROUND_SECONDS, SECOND_MS};
use crate::game::game_loop::{BirdSnapshot, GameLoop, GameLoopEvent};
use crate::game::input_buffer::{InputBuffer, InputSender, PointerEvent};
use crate::game::state::Arena;
use crate::game::systems::hit::HitOutcome;
use crate::ledger::{
    HitRequest, IdentityProvider, LedgerClient, Notification, RoomMetadata, RoundRecord,
    StaticIdentity,
};
use crate::lobby::player::{ParticipantId, ParticipantScore};
use crate::lobby::replication::Replica;
use crate::lobby::room::Room;
use crate::lobby::session::{
    Admission, GameMode, NextRound, SessionError, SessionEvent, SessionEvents, SessionPhase,
    SessionState,
};
use crate::metrics::Metrics;
use crate::util::vec2::Vec2;

/// What a client shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// Following the session lifecycle
    Joined,
    /// Room was locked without us; terminal
    Excluded,
    /// Session ended; terminal
    Ended,
    /// We left; terminal
    Left,
}

/// Everything that happened during a frame, for presentation
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Session(SessionEvent),
    Game(GameLoopEvent),
    Notification(Notification),
    Excluded,
    /// This round's result was handed to the round store
    RoundSubmitted { round_number: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gate {
    phase: SessionPhase,
    round_number: u32,
    ended: bool,
}

impl Gate {
    fn of(state: &SessionState) -> Self {
        Self {
            phase: state.phase,
            round_number: state.round_number,
            ended: state.ended,
        }
    }
}

/// Construction options for a client
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub mode: GameMode,
    pub arena: Arena,
    pub seed: u64,
}

pub struct Client {
    room: Room,
    game: GameLoop,
    scheduler: Scheduler,
    input: InputBuffer,
    ledger: Option<LedgerClient>,
    identity: Box<dyn IdentityProvider>,
    metrics: Option<Arc<Metrics>>,
    score: ParticipantScore,
    cursor: Option<Vec2>,
    gate: Option<Gate>,
    /// Save latch: round whose result was already submitted
    saved_round: Option<u32>,
    status: ClientStatus,
}

impl Client {
    pub fn new(replica: Arc<dyn Replica>, options: ClientOptions) -> Self {
        let room = Room::join(replica, options.mode, options.seed);
        info!("Client {} joined ({})", room.local_id(), options.mode.as_str());
        Self {
            room,
            game: GameLoop::new(options.arena, options.seed),
            scheduler: Scheduler::new(),
            input: InputBuffer::default(),
            ledger: None,
            identity: Box::new(StaticIdentity::anonymous()),
            metrics: None,
            score: ParticipantScore::new(),
            cursor: None,
            gate: None,
            saved_round: None,
            status: ClientStatus::Joined,
        }
    }

    pub fn with_ledger(mut self, ledger: LedgerClient) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_identity(mut self, identity: impl IdentityProvider + 'static) -> Self {
        self.identity = Box::new(identity);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn local_id(&self) -> ParticipantId {
        self.room.local_id()
    }

    pub fn is_host(&self) -> bool {
        self.room.is_host()
    }

    pub fn state(&self) -> &SessionState {
        self.room.state()
    }

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    pub fn score(&self) -> &ParticipantScore {
        &self.score
    }

    /// Last pointer position (display only)
    pub fn cursor(&self) -> Option<Vec2> {
        self.cursor
    }

    pub fn arena(&self) -> &Arena {
        self.game.arena()
    }

    pub fn snapshot(&self) -> Vec<BirdSnapshot> {
        self.game.snapshot()
    }

    pub fn scoreboard(&self) -> Vec<(ParticipantId, ParticipantScore)> {
        self.room.scoreboard()
    }

    /// Handle for pointer/gesture input sources
    pub fn input(&self) -> InputSender {
        self.input.sender()
    }

    pub fn is_timer_armed(&self, name: TimerName) -> bool {
        self.scheduler.is_armed(name)
    }

    pub fn resize(&mut self, arena: Arena) {
        self.game.resize(arena);
    }

    pub fn start_round(&mut self) -> Result<SessionEvents, SessionError> {
        self.require_joined()?;
        self.room.start_round()
    }

    pub fn next_round(&mut self, next: NextRound) -> Result<SessionEvents, SessionError> {
        self.require_joined()?;
        self.room.next_round(next)
    }

    pub fn end_session(&mut self) -> Result<SessionEvent, SessionError> {
        self.require_joined()?;
        self.room.end_session()
    }

    fn require_joined(&self) -> Result<(), SessionError> {
        match self.status {
            ClientStatus::Joined => Ok(()),
            ClientStatus::Excluded => Err(SessionError::Excluded),
            ClientStatus::Ended | ClientStatus::Left => Err(SessionError::Ended),
        }
    }

    /// Stop participating. Cancels every timer and despawns the arena.
    pub fn leave(&mut self) {
        if self.status == ClientStatus::Left {
            return;
        }
        self.teardown();
        self.status = ClientStatus::Left;
        info!("Client {} left", self.local_id());
    }

    fn teardown(&mut self) {
        self.scheduler.cancel_all();
        let despawned = self.game.clear();
        if despawned > 0 {
            debug!("Despawned {} birds", despawned);
        }
    }

    /// Run one display frame at `now_ms` on the client's timeline
    pub fn frame(&mut self, now_ms: u64) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        if matches!(self.status, ClientStatus::Ended | ClientStatus::Left) {
            return events;
        }

        if let Some(event) = self.room.poll_calls() {
            events.push(ClientEvent::Session(event));
        }
        events.extend(self.room.sync().into_iter().map(ClientEvent::Session));

        if !self.room.state().ended && self.room.admission() == Admission::Locked {
            if self.status != ClientStatus::Excluded {
                warn!("Room is locked, {} cannot play", self.local_id());
                self.teardown();
                self.status = ClientStatus::Excluded;
                events.push(ClientEvent::Excluded);
            }
            return events;
        }

        self.reconcile(now_ms, &mut events);

        for timer in self.scheduler.poll(now_ms) {
            match timer {
                TimerName::SessionSecond => {
                    events.extend(self.room.tick_second().into_iter().map(ClientEvent::Session));
                }
                TimerName::Spawn => self.spawn_tick(now_ms),
            }
        }
        self.reconcile(now_ms, &mut events);

        let mut presses = Vec::new();
        for event in self.input.drain() {
            match event {
                PointerEvent::Move(at) => self.cursor = Some(at),
                PointerEvent::Press(at) => {
                    self.cursor = Some(at);
                    presses.push(at);
                }
            }
        }

        if self.status == ClientStatus::Joined && self.room.state().is_simulating() {
            let started = Instant::now();
            let game_events = self.game.frame(now_ms, &presses);
            let mut scored = false;
            for event in &game_events {
                if let GameLoopEvent::BirdHit(outcome) = event {
                    self.on_hit(outcome, now_ms);
                    scored = true;
                }
            }
            if scored {
                self.room.publish_score(&self.score);
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_frame_time(started.elapsed());
                record_game_events(metrics, &game_events);
            }
            events.extend(game_events.into_iter().map(ClientEvent::Game));
        }

        if let Some(ledger) = &self.ledger {
            for note in ledger.drain_notifications() {
                if let Some(metrics) = &self.metrics {
                    metrics.record_notification(note.is_error());
                }
                events.push(ClientEvent::Notification(note));
            }
        }

        self.update_gauges();
        events
    }

    /// Arm or cancel timers for a newly observed gate
    fn reconcile(&mut self, now_ms: u64, events: &mut Vec<ClientEvent>) {
        let gate = Gate::of(self.room.state());
        if self.gate == Some(gate) {
            return;
        }
        let previous = self.gate.replace(gate);
        debug!("Client {} gate {:?} -> {:?}", self.local_id(), previous, gate);

        if gate.ended {
            self.teardown();
            self.status = ClientStatus::Ended;
            if let Some(metrics) = &self.metrics {
                metrics.sessions_ended.fetch_add(1, Ordering::Relaxed);
            }
            info!("Session over for {}", self.local_id());
            return;
        }

        if previous.is_some_and(|p| p.round_number != gate.round_number) {
            self.score.reset();
            self.room.publish_score(&self.score);
            self.game.clear();
        }

        match gate.phase {
            SessionPhase::Countdown | SessionPhase::WaitingForPlayers => {
                self.scheduler
                    .ensure_repeating(TimerName::SessionSecond, now_ms, SECOND_MS);
                self.scheduler.cancel(TimerName::Spawn);
                self.game.cancel_pending();
            }
            SessionPhase::Active => {
                self.scheduler
                    .ensure_repeating(TimerName::SessionSecond, now_ms, SECOND_MS);
                if !self.scheduler.is_armed(TimerName::Spawn) {
                    self.scheduler.schedule_once(TimerName::Spawn, now_ms, 0);
                }
            }
            SessionPhase::Lobby => self.teardown(),
            SessionPhase::Over => {
                self.teardown();
                if let Some(round_number) = self.submit_round() {
                    events.push(ClientEvent::RoundSubmitted { round_number });
                }
            }
        }
    }

    fn spawn_tick(&mut self, now_ms: u64) {
        if !self.room.state().is_simulating() {
            return;
        }
        let clock = RoundClock::from_remaining(self.room.state().seconds_remaining);
        let delay_ms = self.game.spawn_tick(now_ms, &clock);
        self.scheduler.schedule_once(TimerName::Spawn, now_ms, delay_ms);
    }

    fn on_hit(&mut self, outcome: &HitOutcome, now_ms: u64) {
        self.score.record(outcome.species, outcome.points, now_ms);
        if let Some(metrics) = &self.metrics {
            metrics.record_hit(outcome.species, outcome.points);
        }

        let (Some(ledger), Some(address)) = (&self.ledger, self.identity.address()) else {
            return;
        };
        let request = HitRequest {
            participant_address: address,
            points: outcome.points,
        };
        if let Err(e) = ledger.record_hit(request) {
            warn!("Hit not submitted: {}", e);
        }
    }

    /// Submit this round's result once. Returns the round if it was submitted.
    fn submit_round(&mut self) -> Option<u32> {
        let state = self.room.state();
        let round_number = state.round_number;
        if self.saved_round == Some(round_number) {
            return None;
        }
        self.saved_round = Some(round_number);

        let ledger = self.ledger.as_ref()?;
        let Some(address) = self.identity.address() else {
            debug!("No wallet address, round {} not saved", round_number);
            return None;
        };

        let record = RoundRecord {
            mode: state.mode,
            host_address: address,
            score: self.score.total_score,
            hits: self.score.total_hits,
            hit_history: self.score.history.clone(),
            duration_seconds: ROUND_SECONDS - state.seconds_remaining,
            room_metadata: (state.mode == GameMode::Multiplayer).then(|| RoomMetadata {
                round_number,
                host_id: state.host_id,
                participants: state.allowed_participants.iter().copied().collect(),
            }),
        };
        match ledger.save_round(record) {
            Ok(()) => Some(round_number),
            Err(e) => {
                warn!("Round {} not submitted: {}", round_number, e);
                None
            }
        }
    }

    fn update_gauges(&self) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        if !self.is_host() {
            return;
        }
        let state = self.room.state();
        metrics.set_phase(state.phase);
        metrics.round_number.store(state.round_number as u64, Ordering::Relaxed);
        metrics.seconds_remaining.store(state.seconds_remaining as u64, Ordering::Relaxed);
        metrics.participants.store(self.room.roster().len() as u64, Ordering::Relaxed);
        metrics.active_birds.store(self.game.active_count() as u64, Ordering::Relaxed);
        metrics.pool_capacity.store(self.game.pool().capacity() as u64, Ordering::Relaxed);
        metrics.pending_spawns.store(self.game.pending_count() as u64, Ordering::Relaxed);
    }
}

fn record_game_events(metrics: &Metrics, events: &[GameLoopEvent]) {
    for event in events {
        let counter = match event {
            GameLoopEvent::BirdSpawned { .. } => &metrics.birds_spawned,
            GameLoopEvent::BirdEscaped { .. } => &metrics.birds_escaped,
            GameLoopEvent::BirdLanded { .. } => &metrics.birds_landed,
            GameLoopEvent::BirdHit(_) => continue,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LoggingLedger;
    use crate::lobby::replication::InMemoryHub;
    use std::time::Duration;

    const STEP_MS: u64 = 100;

    fn options(mode: GameMode, seed: u64) -> ClientOptions {
        ClientOptions {
            mode,
            arena: Arena::new(1280.0, 720.0),
            seed,
        }
    }

    fn join(hub: &InMemoryHub, mode: GameMode, seed: u64) -> Client {
        Client::new(Arc::new(hub.join()), options(mode, seed))
    }

    /// Advance every client from `*now` for `duration_ms`
    fn run(clients: &mut [&mut Client], now: &mut u64, duration_ms: u64) {
        let end = *now + duration_ms;
        while *now < end {
            *now += STEP_MS;
            for client in clients.iter_mut() {
                client.frame(*now);
            }
        }
    }

    fn run_until_active(clients: &mut [&mut Client], now: &mut u64) {
        run(clients, now, 3 * SECOND_MS + STEP_MS);
        for client in clients.iter() {
            assert_eq!(client.state().phase, SessionPhase::Active);
        }
    }

    #[test]
    fn test_round_lifecycle_across_two_clients() {
        let hub = InMemoryHub::new();
        let mut a = join(&hub, GameMode::Multiplayer, 1);
        let mut b = join(&hub, GameMode::Multiplayer, 2);
        let mut now = 0;
        run(&mut [&mut a, &mut b], &mut now, STEP_MS);

        assert!(b.start_round().is_err());
        a.start_round().unwrap();
        run_until_active(&mut [&mut a, &mut b], &mut now);

        assert!(a.is_timer_armed(TimerName::Spawn));
        assert!(b.is_timer_armed(TimerName::Spawn));
        run(&mut [&mut a, &mut b], &mut now, 5 * SECOND_MS);
        assert!(!a.snapshot().is_empty());
        assert!(!b.snapshot().is_empty());

        run(&mut [&mut a, &mut b], &mut now, 60 * SECOND_MS);
        for client in [&a, &b] {
            assert_eq!(client.state().phase, SessionPhase::Over);
            assert!(!client.is_timer_armed(TimerName::Spawn));
            assert!(!client.is_timer_armed(TimerName::SessionSecond));
            assert!(client.snapshot().is_empty());
        }
    }

    #[test]
    fn test_press_scores_and_publishes() {
        let hub = InMemoryHub::new();
        let mut solo = join(&hub, GameMode::Solo, 5);
        let mut now = 0;
        solo.start_round().unwrap();
        run_until_active(&mut [&mut solo], &mut now);

        while solo.snapshot().is_empty() {
            run(&mut [&mut solo], &mut now, STEP_MS);
        }
        let target = solo.snapshot()[0];
        solo.input()
            .press(target.position.x, target.position.y)
            .unwrap();

        now += STEP_MS;
        let events = solo.frame(now);
        assert!(events.iter().any(|e| matches!(
            e,
            ClientEvent::Game(GameLoopEvent::BirdHit(hit)) if hit.bird_id == target.id
        )));
        assert!(solo.score().total_score >= target.species.points());
        assert_eq!(solo.cursor(), Some(target.position));

        let board = solo.scoreboard();
        assert_eq!(board[0].1, *solo.score());
    }

    #[test]
    fn test_presses_ignored_outside_active() {
        let hub = InMemoryHub::new();
        let mut solo = join(&hub, GameMode::Solo, 5);
        solo.input().press(10.0, 10.0).unwrap();
        let events = solo.frame(STEP_MS);
        assert!(events.is_empty());
        assert_eq!(solo.score().total_hits, 0);
    }

    #[test]
    fn test_waiting_resumes_with_fresh_timer() {
        let hub = InMemoryHub::new();
        let mut a = join(&hub, GameMode::Multiplayer, 1);
        let mut b = join(&hub, GameMode::Multiplayer, 2);
        let mut now = 0;
        a.start_round().unwrap();
        run_until_active(&mut [&mut a, &mut b], &mut now);

        let b_id = b.local_id();
        b.leave();
        hub.leave(b_id);
        run(&mut [&mut a], &mut now, STEP_MS);
        assert_eq!(a.state().phase, SessionPhase::WaitingForPlayers);
        assert_eq!(a.state().waiting_timer, 30);
        assert!(!a.is_timer_armed(TimerName::Spawn));

        let frozen = a.state().seconds_remaining;
        run(&mut [&mut a], &mut now, 18 * SECOND_MS);
        assert_eq!(a.state().waiting_timer, 12);
        assert_eq!(a.state().seconds_remaining, frozen);

        hub.join_as(b_id);
        run(&mut [&mut a], &mut now, STEP_MS);
        assert_eq!(a.state().phase, SessionPhase::Active);
        assert_eq!(a.state().waiting_timer, 30);
        assert!(a.is_timer_armed(TimerName::Spawn));
    }

    #[test]
    fn test_waiting_timeout_ends_session_for_everyone() {
        let hub = InMemoryHub::new();
        let mut a = join(&hub, GameMode::Multiplayer, 1);
        let mut b = join(&hub, GameMode::Multiplayer, 2);
        let mut now = 0;
        a.start_round().unwrap();
        run_until_active(&mut [&mut a, &mut b], &mut now);

        // Joins after the lock: excluded, but still connected
        let mut late = join(&hub, GameMode::Multiplayer, 3);
        let events = late.frame(now);
        assert!(events.contains(&ClientEvent::Excluded));
        assert_eq!(late.status(), ClientStatus::Excluded);
        assert!(late.start_round().is_err());

        hub.leave(b.local_id());
        run(&mut [&mut a, &mut late], &mut now, 31 * SECOND_MS);

        assert!(a.state().ended);
        assert_eq!(a.status(), ClientStatus::Ended);
        assert_eq!(late.status(), ClientStatus::Ended);
        assert!(!a.is_timer_armed(TimerName::SessionSecond));
        assert!(a.end_session().is_err());
    }

    #[test]
    fn test_host_leaving_hands_over_clock() {
        let hub = InMemoryHub::new();
        let mut a = join(&hub, GameMode::Multiplayer, 1);
        let mut b = join(&hub, GameMode::Multiplayer, 2);
        let mut c = join(&hub, GameMode::Multiplayer, 3);
        let mut now = 0;
        a.start_round().unwrap();
        run_until_active(&mut [&mut a, &mut b, &mut c], &mut now);

        a.leave();
        hub.leave(a.local_id());
        run(&mut [&mut b, &mut c], &mut now, STEP_MS);
        assert!(b.is_host() ^ c.is_host());

        let before = b.state().seconds_remaining;
        run(&mut [&mut b, &mut c], &mut now, 2 * SECOND_MS);
        assert!(b.state().seconds_remaining < before);
        assert_eq!(b.state().phase, SessionPhase::Active);
    }

    #[test]
    fn test_next_round_resets_score() {
        let hub = InMemoryHub::new();
        let mut solo = join(&hub, GameMode::Solo, 9);
        let mut now = 0;
        solo.start_round().unwrap();
        run(&mut [&mut solo], &mut now, 64 * SECOND_MS);
        assert_eq!(solo.state().phase, SessionPhase::Over);

        solo.score.record(crate::game::state::Species::Bee, 10, now);
        solo.next_round(NextRound::Countdown).unwrap();
        run(&mut [&mut solo], &mut now, STEP_MS);
        assert_eq!(solo.state().round_number, 2);
        assert_eq!(solo.state().phase, SessionPhase::Countdown);
        assert_eq!(solo.score().total_score, 0);
        assert!(solo.state().results.contains_key(&1));
    }

    #[tokio::test]
    async fn test_round_saved_once() {
        let ledger = Arc::new(LoggingLedger::new());
        let (ledger_client, _handle) = LedgerClient::spawn(ledger.clone());
        let hub = InMemoryHub::new();
        let mut solo = join(&hub, GameMode::Solo, 4)
            .with_ledger(ledger_client)
            .with_identity(StaticIdentity::new("0xfeed"))
            .with_metrics(Arc::new(Metrics::new()));

        let mut now = 0;
        solo.start_round().unwrap();
        let mut submitted = 0;
        while now < 70 * SECOND_MS {
            now += STEP_MS;
            submitted += solo
                .frame(now)
                .iter()
                .filter(|e| matches!(e, ClientEvent::RoundSubmitted { .. }))
                .count();
        }
        assert_eq!(submitted, 1);

        for _ in 0..100 {
            if ledger.rounds_saved() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ledger.rounds_saved(), 1);
    }

    #[test]
    fn test_anonymous_client_skips_ledger() {
        let hub = InMemoryHub::new();
        let mut solo = join(&hub, GameMode::Solo, 4);
        let mut now = 0;
        solo.start_round().unwrap();
        let mut events = Vec::new();
        while now < 65 * SECOND_MS {
            now += STEP_MS;
            events.extend(solo.frame(now));
        }
        assert_eq!(solo.state().phase, SessionPhase::Over);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ClientEvent::RoundSubmitted { .. })));
    }
}
