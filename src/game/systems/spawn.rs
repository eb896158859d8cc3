//! Spawn Director
//!
//! Decides when, where and what enters the arena. Each attempt is either a
//! single bird from a random edge or, with probability 0.15, a flock of 3-5
//! birds staggered by 100-150ms from one edge. The director only produces
//! orders; the game loop materialises them into the pool at their due time.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

use crate::game::constants::spawn::*;
use crate::game::state::{Arena, Species};
use crate::util::vec2::Vec2;

/// Screen edge a bird enters from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Left, Edge::Right, Edge::Top, Edge::Bottom];

    /// Whether the perpendicular (randomised) coordinate is y
    fn is_horizontal_entry(&self) -> bool {
        matches!(self, Edge::Left | Edge::Right)
    }
}

/// A bird to be created `delay_ms` after the attempt that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnOrder {
    pub delay_ms: u64,
    pub species: Species,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Orders produced by one attempt (a flock is at most 5)
pub type SpawnBatch = SmallVec<[SpawnOrder; FLOCK_MAX]>;

pub struct SpawnDirector {
    rng: StdRng,
}

impl SpawnDirector {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Base speed for a point in the round: 1.5 at the start, 3.0 at the end
    pub fn base_speed(round_progress: f32) -> f32 {
        BASE_SPEED + SPEED_RAMP * round_progress.clamp(0.0, 1.0)
    }

    /// One spawn attempt
    pub fn try_spawn_tick(&mut self, round_progress: f32, arena: &Arena) -> SpawnBatch {
        let roll: f32 = self.rng.gen();
        let batch = if roll < FLOCK_PROBABILITY {
            self.spawn_flock(round_progress, arena)
        } else {
            let edge = self.random_edge();
            let mut batch = SpawnBatch::new();
            let entry = self.random_perpendicular(edge, arena);
            let exit = self.random_perpendicular(edge, arena);
            batch.push(self.order(edge, entry, exit, 0, round_progress, arena));
            batch
        };

        tracing::trace!("Spawn attempt produced {} bird(s)", batch.len());
        batch
    }

    fn spawn_flock(&mut self, round_progress: f32, arena: &Arena) -> SpawnBatch {
        let edge = self.random_edge();
        let count = self.rng.gen_range(FLOCK_MIN..=FLOCK_MAX);
        let entry_anchor = self.random_perpendicular(edge, arena);
        let exit_anchor = self.random_perpendicular(edge, arena);

        let mut batch = SpawnBatch::new();
        let mut delay_ms = 0;
        for i in 0..count {
            if i > 0 {
                delay_ms += self.rng.gen_range(FLOCK_STAGGER_MIN_MS..=FLOCK_STAGGER_MAX_MS);
            }
            let offset = self.rng.gen_range(-FLOCK_JITTER..=FLOCK_JITTER);
            batch.push(self.order(
                edge,
                entry_anchor + offset,
                exit_anchor + offset,
                delay_ms,
                round_progress,
                arena,
            ));
        }

        tracing::debug!("Flock of {} from {:?}", count, edge);
        batch
    }

    /// Build one order: entry outside `edge`, target past the mirror edge
    fn order(
        &mut self,
        edge: Edge,
        entry_coord: f32,
        exit_coord: f32,
        delay_ms: u64,
        round_progress: f32,
        arena: &Arena,
    ) -> SpawnOrder {
        let (position, target) = entry_and_target(edge, entry_coord, exit_coord, arena);
        let speed = Self::base_speed(round_progress) + self.rng.gen_range(0.0..SPEED_JITTER);
        let velocity = position.direction_to(target) * speed;
        let species = Species::from_roll(self.rng.gen());

        SpawnOrder {
            delay_ms,
            species,
            position,
            velocity,
        }
    }

    fn random_edge(&mut self) -> Edge {
        Edge::ALL[self.rng.gen_range(0..Edge::ALL.len())]
    }

    fn random_perpendicular(&mut self, edge: Edge, arena: &Arena) -> f32 {
        let extent = if edge.is_horizontal_entry() {
            arena.height
        } else {
            arena.width
        };
        self.rng.gen_range(0.0..extent.max(1.0))
    }
}

/// Entry point just outside `edge` and target point just outside the opposite edge
pub fn entry_and_target(edge: Edge, entry_coord: f32, exit_coord: f32, arena: &Arena) -> (Vec2, Vec2) {
    let d = arena.spawn_distance();
    match edge {
        Edge::Left => (
            Vec2::new(-d, entry_coord),
            Vec2::new(arena.width + d, exit_coord),
        ),
        Edge::Right => (
            Vec2::new(arena.width + d, entry_coord),
            Vec2::new(-d, exit_coord),
        ),
        Edge::Top => (
            Vec2::new(entry_coord, -d),
            Vec2::new(exit_coord, arena.height + d),
        ),
        Edge::Bottom => (
            Vec2::new(entry_coord, arena.height + d),
            Vec2::new(exit_coord, -d),
        ),
    }
}
