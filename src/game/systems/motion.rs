//! Motion Model
//!
//! Advances every active bird by one frame. Flying birds follow their species
//! motion profile and are culled 150px outside the arena; falling birds
//! accelerate under constant gravity and are culled 100px below the floor.
//! Every surviving bird is re-bucketed in the grid, and every culled bird is
//! removed from the grid before its slot goes back to the pool.

use rand::Rng;

use crate::game::constants::motion::*;
use crate::game::pool::EntityPool;
use crate::game::spatial::SpatialGrid;
use crate::game::state::{Arena, Bird, BirdPhase, EntityId, Facing, MotionProfile, SlotIndex};

/// Outcome of one motion step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotionReport {
    /// Birds still active after the step
    pub moved: usize,
    /// Ids of birds that left the arena while flying (escaped)
    pub escaped: Vec<EntityId>,
    /// Ids of hit birds that finished falling
    pub landed: Vec<EntityId>,
}

impl MotionReport {
    pub fn removed(&self) -> usize {
        self.escaped.len() + self.landed.len()
    }
}

/// Step every active bird. `scratch` is a reusable slot buffer.
pub fn advance<R: Rng>(
    pool: &mut EntityPool,
    grid: &mut SpatialGrid,
    arena: &Arena,
    rng: &mut R,
    scratch: &mut Vec<SlotIndex>,
) -> MotionReport {
    let mut report = MotionReport::default();
    pool.collect_active(scratch);

    for &slot in scratch.iter() {
        let Some(bird) = pool.get_mut(slot) else {
            continue;
        };

        let remove = match bird.phase {
            BirdPhase::Flying => {
                step_flying(bird, rng);
                arena.is_beyond(bird.position, EXIT_MARGIN)
            }
            BirdPhase::Falling => {
                step_falling(bird);
                bird.position.y > arena.height + FALL_MARGIN
            }
        };

        if remove {
            let id = bird.id;
            let phase = bird.phase;
            grid.remove(bird);
            pool.release(slot);
            match phase {
                BirdPhase::Flying => report.escaped.push(id),
                BirdPhase::Falling => report.landed.push(id),
            }
        } else {
            advance_animation(bird);
            grid.update_if_moved(bird);
            report.moved += 1;
        }
    }

    report
}

/// Flying-phase update for one bird
pub fn step_flying<R: Rng>(bird: &mut Bird, rng: &mut R) {
    let velocity = bird.velocity;
    match bird.species.profile() {
        MotionProfile::Linear => {
            bird.position += velocity;
        }
        MotionProfile::Wave => {
            bird.position.x += velocity.x;
            bird.position.y = wave_y(bird.spawn_y, bird.position.x, velocity.x, velocity.y)
                .unwrap_or(bird.position.y + velocity.y);
        }
        MotionProfile::Jitter => {
            bird.position.x += velocity.x + rng.gen_range(-JITTER..=JITTER);
            bird.position.y += velocity.y;
        }
    }
    bird.facing = Facing::from_vx(velocity.x);
}

/// Wave trajectory height: `spawnY + vy*(x/vx) + sin(0.03x)*1.2*20`.
///
/// Returns None when |vx| is too small to divide by; the caller then moves the
/// bird linearly for that tick.
pub fn wave_y(spawn_y: f32, x: f32, vx: f32, vy: f32) -> Option<f32> {
    if vx.abs() < WAVE_MIN_VX {
        return None;
    }
    Some(spawn_y + vy * (x / vx) + (x * WAVE_FREQUENCY).sin() * WAVE_AMPLITUDE * WAVE_SCALE)
}

/// Falling-phase update: unbounded gravity accumulation
pub fn step_falling(bird: &mut Bird) {
    bird.velocity.y += GRAVITY;
    bird.position.y += bird.velocity.y;
}

fn advance_animation(bird: &mut Bird) {
    bird.animation_tick += 1;
    if bird.animation_tick >= TICKS_PER_FRAME {
        bird.animation_tick = 0;
        bird.animation_frame = (bird.animation_frame + 1) % ANIMATION_FRAMES;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Species;
    use crate::util::vec2::Vec2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct World {
        pool: EntityPool,
        grid: SpatialGrid,
        arena: Arena,
        rng: StdRng,
        scratch: Vec<SlotIndex>,
    }

    impl World {
        fn new() -> Self {
            Self {
                pool: EntityPool::new(),
                grid: SpatialGrid::new(80.0),
                arena: Arena::new(1280.0, 720.0),
                rng: StdRng::seed_from_u64(1),
                scratch: Vec::new(),
            }
        }

        fn spawn(&mut self, species: Species, position: Vec2, velocity: Vec2) -> SlotIndex {
            let slot = self.pool.acquire(species, position, velocity);
            self.grid.insert(self.pool.get_mut(slot).unwrap());
            slot
        }

        fn step(&mut self) -> MotionReport {
            advance(&mut self.pool, &mut self.grid, &self.arena, &mut self.rng, &mut self.scratch)
        }
    }

    #[test]
    fn test_linear_motion() {
        let mut world = World::new();
        let slot = world.spawn(Species::Bluebird, Vec2::new(100.0, 100.0), Vec2::new(2.0, 1.0));
        world.step();

        assert_eq!(world.pool.get(slot).unwrap().position, Vec2::new(102.0, 101.0));
    }

    #[test]
    fn test_wave_motion_formula() {
        let mut world = World::new();
        let slot = world.spawn(Species::Butterfly, Vec2::new(100.0, 300.0), Vec2::new(2.0, 0.5));
        world.step();

        let bird = world.pool.get(slot).unwrap();
        let x = 102.0_f32;
        let expected = 300.0 + 0.5 * (x / 2.0) + (x * 0.03).sin() * 1.2 * 20.0;
        assert_eq!(bird.position.x, x);
        assert!((bird.position.y - expected).abs() < 1e-3);
    }

    #[test]
    fn test_wave_motion_guards_zero_vx() {
        let mut world = World::new();
        let slot = world.spawn(Species::Butterfly, Vec2::new(400.0, 100.0), Vec2::new(0.0, 2.0));
        world.step();

        let bird = world.pool.get(slot).unwrap();
        assert_eq!(bird.position, Vec2::new(400.0, 102.0));
        assert!(bird.position.y.is_finite());
        assert!(wave_y(0.0, 10.0, 0.0, 1.0).is_none());
    }

    #[test]
    fn test_jitter_motion_bounded() {
        let mut world = World::new();
        let slot = world.spawn(Species::Bee, Vec2::new(500.0, 300.0), Vec2::new(2.0, 0.0));
        for _ in 0..100 {
            let before = world.pool.get(slot).unwrap().position;
            world.step();
            let after = world.pool.get(slot).unwrap().position;
            let dx = after.x - before.x;
            assert!(dx >= 2.0 - JITTER - 1e-4 && dx <= 2.0 + JITTER + 1e-4);
            assert_eq!(after.y, before.y);
        }
    }

    #[test]
    fn test_falling_gravity_unbounded() {
        let mut world = World::new();
        world.arena = Arena::new(1280.0, 1_000_000.0);
        let slot = world.spawn(Species::Bee, Vec2::new(500.0, 0.0), Vec2::new(0.0, 2.0));
        world.pool.get_mut(slot).unwrap().phase = BirdPhase::Falling;

        world.step();
        let bird = world.pool.get(slot).unwrap();
        assert!((bird.velocity.y - 2.1).abs() < 1e-5);
        assert!((bird.position.y - 2.1).abs() < 1e-5);

        for _ in 0..1000 {
            world.step();
        }
        let bird = world.pool.get(slot).unwrap();
        assert!(bird.velocity.y > 100.0, "no terminal velocity cap");
        assert_eq!(bird.phase, BirdPhase::Falling);
    }

    #[test]
    fn test_flying_bird_removed_past_exit_margin() {
        let mut world = World::new();
        let slot = world.spawn(Species::Bluebird, Vec2::new(1280.0 + 149.0, 100.0), Vec2::new(2.0, 0.0));
        let id = world.pool.get(slot).unwrap().id;

        let report = world.step();
        assert_eq!(report.escaped, vec![id]);
        assert!(!world.pool.is_active(slot));
        assert_eq!(world.grid.stats().total_entries, 0);
    }

    #[test]
    fn test_falling_bird_removed_below_floor() {
        let mut world = World::new();
        let slot = world.spawn(Species::Bee, Vec2::new(500.0, 819.0), Vec2::new(0.0, 2.0));
        world.pool.get_mut(slot).unwrap().phase = BirdPhase::Falling;

        let report = world.step();
        assert_eq!(report.landed.len(), 1);
        assert_eq!(report.removed(), 1);
        assert_eq!(world.pool.active_count(), 0);
        assert_eq!(world.grid.stats().total_entries, 0);
    }

    #[test]
    fn test_flying_cell_key_tracks_position() {
        let mut world = World::new();
        let slot = world.spawn(Species::Bluebird, Vec2::new(-100.0, 300.0), Vec2::new(3.5, 0.2));
        for _ in 0..200 {
            world.step();
            if let Some(bird) = world.pool.get(slot) {
                assert_eq!(bird.cell_key, Some(world.grid.position_to_cell(bird.position)));
            }
        }
        assert_eq!(world.grid.stats().total_entries, world.pool.active_count());
    }

    #[test]
    fn test_falling_never_returns_to_flying() {
        let mut world = World::new();
        let slot = world.spawn(Species::Butterfly, Vec2::new(300.0, 100.0), Vec2::new(0.0, 2.0));
        world.pool.get_mut(slot).unwrap().phase = BirdPhase::Falling;
        while let Some(bird) = world.pool.get(slot) {
            assert_eq!(bird.phase, BirdPhase::Falling);
            world.step();
        }
    }

    #[test]
    fn test_animation_cycles() {
        let mut world = World::new();
        let slot = world.spawn(Species::Bluebird, Vec2::new(0.0, 300.0), Vec2::new(0.1, 0.0));
        for _ in 0..(TICKS_PER_FRAME as usize * ANIMATION_FRAMES as usize) {
            world.step();
        }
        assert_eq!(world.pool.get(slot).unwrap().animation_frame, 0);
        world.step();
        assert_eq!(world.pool.get(slot).unwrap().animation_tick, 1);
    }
}
