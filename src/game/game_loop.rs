//! Per-client simulation loop
//!
//! Owns the entity pool, spatial grid and spawn director for one client and
//! runs one display frame at a time: due spawns are materialised, press
//! events are hit-tested, then every bird is moved. Nothing here is shared
//! with other participants.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::game::clock::RoundClock;
use crate::game::constants::pool::INITIAL_CAPACITY;
use crate::game::pool::EntityPool;
use crate::game::spatial::SpatialGrid;
use crate::game::state::{Arena, BirdPhase, EntityId, Facing, SlotIndex, Species};
use crate::game::systems::hit::{resolve_hit, HitOutcome, HitOutcomes};
use crate::game::systems::motion;
use crate::game::systems::spawn::{SpawnDirector, SpawnOrder};
use crate::util::vec2::Vec2;

/// Events produced by a frame, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum GameLoopEvent {
    BirdSpawned {
        bird_id: EntityId,
        species: Species,
        position: Vec2,
    },
    /// Scored hit; `position` anchors the floating score
    BirdHit(HitOutcome),
    BirdEscaped { bird_id: EntityId },
    BirdLanded { bird_id: EntityId },
}

/// Render view of one bird
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BirdSnapshot {
    pub id: EntityId,
    pub species: Species,
    pub position: Vec2,
    pub phase: BirdPhase,
    pub facing: Facing,
    pub animation_frame: u8,
}

#[derive(Debug, Clone, Copy)]
struct PendingSpawn {
    due_ms: u64,
    order: SpawnOrder,
}

pub struct GameLoop {
    arena: Arena,
    pool: EntityPool,
    grid: SpatialGrid,
    director: SpawnDirector,
    motion_rng: StdRng,
    pending: Vec<PendingSpawn>,
    scratch: Vec<SlotIndex>,
    frame_count: u64,
}

impl GameLoop {
    pub fn new(arena: Arena, seed: u64) -> Self {
        Self {
            arena,
            pool: EntityPool::with_capacity(INITIAL_CAPACITY),
            grid: SpatialGrid::new(arena.cell_size()),
            director: SpawnDirector::new(seed),
            motion_rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
            pending: Vec::new(),
            scratch: Vec::with_capacity(INITIAL_CAPACITY),
            frame_count: 0,
        }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn pool(&self) -> &EntityPool {
        &self.pool
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Flock members waiting for their stagger delay
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Apply a new arena size. Every live bird is re-bucketed under the new
    /// cell size.
    pub fn resize(&mut self, arena: Arena) {
        self.arena = arena;
        let cell_size = arena.cell_size();
        if cell_size == self.grid.cell_size() {
            return;
        }

        self.grid.set_cell_size(cell_size);
        self.grid.clear();
        self.pool.collect_active(&mut self.scratch);
        for &slot in &self.scratch {
            if let Some(bird) = self.pool.get_mut(slot) {
                bird.cell_key = None;
                self.grid.insert(bird);
            }
        }
        tracing::debug!(
            "Arena resized to {}x{}, re-bucketed {} birds",
            arena.width,
            arena.height,
            self.scratch.len()
        );
    }

    /// Run one spawn attempt and queue its orders. Returns the delay until
    /// the next attempt.
    pub fn spawn_tick(&mut self, now_ms: u64, clock: &RoundClock) -> u64 {
        let batch = self.director.try_spawn_tick(clock.progress(), &self.arena);
        self.pending.extend(batch.into_iter().map(|order| PendingSpawn {
            due_ms: now_ms + order.delay_ms,
            order,
        }));
        clock.spawn_delay_ms()
    }

    /// Drop queued flock members without touching live birds
    pub fn cancel_pending(&mut self) {
        self.pending.clear();
    }

    fn materialize_due(&mut self, now_ms: u64, events: &mut Vec<GameLoopEvent>) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due_ms > now_ms {
                i += 1;
                continue;
            }
            let order = self.pending.swap_remove(i).order;
            let slot = self.pool.acquire(order.species, order.position, order.velocity);
            if let Some(bird) = self.pool.get_mut(slot) {
                self.grid.insert(bird);
                tracing::debug!("Spawned {} #{}", order.species.name(), bird.id);
                events.push(GameLoopEvent::BirdSpawned {
                    bird_id: bird.id,
                    species: order.species,
                    position: order.position,
                });
            }
        }
    }

    /// Hit-test one press at arena coordinates
    pub fn handle_press(&mut self, at: Vec2) -> HitOutcomes {
        resolve_hit(&mut self.pool, &self.grid, at, self.arena.hit_radius())
    }

    /// Run one display frame
    pub fn frame(&mut self, now_ms: u64, presses: &[Vec2]) -> Vec<GameLoopEvent> {
        let mut events = Vec::new();
        self.materialize_due(now_ms, &mut events);

        for &press in presses {
            events.extend(self.handle_press(press).into_iter().map(GameLoopEvent::BirdHit));
        }

        let report = motion::advance(
            &mut self.pool,
            &mut self.grid,
            &self.arena,
            &mut self.motion_rng,
            &mut self.scratch,
        );
        events.extend(
            report
                .escaped
                .into_iter()
                .map(|bird_id| GameLoopEvent::BirdEscaped { bird_id }),
        );
        events.extend(
            report
                .landed
                .into_iter()
                .map(|bird_id| GameLoopEvent::BirdLanded { bird_id }),
        );

        self.frame_count += 1;
        events
    }

    /// Despawn everything (round teardown). Returns how many birds were live.
    pub fn clear(&mut self) -> usize {
        self.pending.clear();
        self.pool.collect_active(&mut self.scratch);
        for &slot in &self.scratch {
            if let Some(bird) = self.pool.get_mut(slot) {
                self.grid.remove(bird);
            }
            self.pool.release(slot);
        }
        self.grid.clear();
        self.scratch.len()
    }

    pub fn snapshot(&self) -> Vec<BirdSnapshot> {
        self.pool
            .iter_active()
            .map(|bird| BirdSnapshot {
                id: bird.id,
                species: bird.species,
                position: bird.position,
                phase: bird.phase,
                facing: bird.facing,
                animation_frame: bird.animation_frame,
            })
            .collect()
    }
}
