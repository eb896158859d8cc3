//! Round clock and cooperative timer scheduler
//!
//! All timelines run on one thread. The caller feeds a monotonic millisecond
//! timestamp; timers fire when polled at or after their due time. Timers are
//! named so they can be cancelled as a group when a round is torn down.

use smallvec::SmallVec;

use crate::game::constants::{session, spawn};

/// Named timers owned by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerName {
    /// 1 Hz session clock (countdown, round seconds, waiting timer)
    SessionSecond,
    /// Variable-delay spawn attempt
    Spawn,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    name: TimerName,
    due_ms: u64,
    /// Some(period) for repeating timers
    period_ms: Option<u64>,
}

/// Cancelable named timers on a caller-supplied millisecond timeline
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: SmallVec<[Timer; 4]>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer, replacing any timer with the same name
    pub fn schedule_once(&mut self, name: TimerName, now_ms: u64, delay_ms: u64) {
        self.cancel(name);
        self.timers.push(Timer {
            name,
            due_ms: now_ms + delay_ms,
            period_ms: None,
        });
    }

    /// Arm a repeating timer, replacing any timer with the same name
    pub fn schedule_repeating(&mut self, name: TimerName, now_ms: u64, period_ms: u64) {
        self.cancel(name);
        self.timers.push(Timer {
            name,
            due_ms: now_ms + period_ms,
            period_ms: Some(period_ms.max(1)),
        });
    }

    /// Arm a repeating timer only if it is not already armed
    pub fn ensure_repeating(&mut self, name: TimerName, now_ms: u64, period_ms: u64) {
        if !self.is_armed(name) {
            self.schedule_repeating(name, now_ms, period_ms);
        }
    }

    /// Cancel a timer. Returns true if it was armed.
    pub fn cancel(&mut self, name: TimerName) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.name != name);
        before != self.timers.len()
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_armed(&self, name: TimerName) -> bool {
        self.timers.iter().any(|t| t.name == name)
    }

    /// Time until a timer fires, if armed
    pub fn remaining_ms(&self, name: TimerName, now_ms: u64) -> Option<u64> {
        self.timers
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.due_ms.saturating_sub(now_ms))
    }

    /// Fire every due timer.
    ///
    /// A repeating timer that fell several periods behind fires once per missed
    /// period so the session clock does not drift. One-shot timers are disarmed
    /// when they fire.
    pub fn poll(&mut self, now_ms: u64) -> SmallVec<[TimerName; 4]> {
        let mut fired = SmallVec::new();
        self.timers.retain(|timer| {
            if timer.due_ms > now_ms {
                return true;
            }
            match timer.period_ms {
                Some(period) => {
                    while timer.due_ms <= now_ms {
                        fired.push(timer.name);
                        timer.due_ms += period;
                    }
                    true
                }
                None => {
                    fired.push(timer.name);
                    false
                }
            }
        });
        fired
    }
}

/// Authoritative round countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundClock {
    pub seconds_remaining: u32,
    pub round_seconds: u32,
}

impl Default for RoundClock {
    fn default() -> Self {
        Self::new(session::ROUND_SECONDS)
    }
}

impl RoundClock {
    pub fn new(round_seconds: u32) -> Self {
        Self {
            seconds_remaining: round_seconds,
            round_seconds,
        }
    }

    pub fn from_remaining(seconds_remaining: u32) -> Self {
        Self {
            seconds_remaining: seconds_remaining.min(session::ROUND_SECONDS),
            round_seconds: session::ROUND_SECONDS,
        }
    }

    /// Elapsed fraction of the round, 0.0 at the start and 1.0 when time is up
    pub fn progress(&self) -> f32 {
        if self.round_seconds == 0 {
            return 1.0;
        }
        1.0 - self.seconds_remaining as f32 / self.round_seconds as f32
    }

    /// Delay before the next spawn attempt: `250ms + 600ms x remaining/60`
    pub fn spawn_delay_ms(&self) -> u64 {
        spawn_delay_ms(self.seconds_remaining)
    }

    /// Count down one second. Returns true when the round just ran out.
    pub fn tick(&mut self) -> bool {
        if self.seconds_remaining == 0 {
            return false;
        }
        self.seconds_remaining -= 1;
        self.seconds_remaining == 0
    }

    pub fn is_expired(&self) -> bool {
        self.seconds_remaining == 0
    }
}

/// Spawn cadence for a given round clock reading
pub fn spawn_delay_ms(seconds_remaining: u32) -> u64 {
    let remaining = seconds_remaining.min(session::ROUND_SECONDS) as u64;
    spawn::CADENCE_BASE_MS + spawn::CADENCE_RANGE_MS * remaining / session::ROUND_SECONDS as u64
}
