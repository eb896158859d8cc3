//! Hit Resolver
//!
//! Turns a pointer/gesture event into zero or more hits. Candidates come from
//! the 3x3 grid neighborhood; a candidate is hit when its squared distance is
//! strictly less than the squared hit radius. Every overlapping bird is hit
//! independently. Hit birds switch to the falling phase and stay in the grid
//! (filtered out of later queries) until the motion model culls them.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::hit::{FALL_START_VX, FALL_START_VY};
use crate::game::pool::EntityPool;
use crate::game::spatial::SpatialGrid;
use crate::game::state::{BirdPhase, EntityId, SlotIndex, Species};
use crate::util::vec2::Vec2;

/// One bird hit by one input event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitOutcome {
    pub bird_id: EntityId,
    pub species: Species,
    pub points: u32,
    /// Where the bird was hit (anchor for floating score feedback)
    pub position: Vec2,
}

pub type HitOutcomes = SmallVec<[HitOutcome; 4]>;

/// Resolve one input event at arena coordinates
pub fn resolve_hit(
    pool: &mut EntityPool,
    grid: &SpatialGrid,
    input: Vec2,
    hit_radius: f32,
) -> HitOutcomes {
    let radius_sq = hit_radius * hit_radius;

    let candidates: SmallVec<[SlotIndex; 16]> = grid
        .query_neighbors(pool, input, hit_radius)
        .filter(|&slot| {
            pool.get(slot)
                .is_some_and(|bird| bird.position.distance_sq_to(input) < radius_sq)
        })
        .collect();

    let mut outcomes = HitOutcomes::new();
    for slot in candidates {
        let Some(bird) = pool.get_mut(slot) else {
            continue;
        };
        // Phase is re-checked so a bird can never be scored twice
        if bird.phase != BirdPhase::Flying {
            continue;
        }
        bird.phase = BirdPhase::Falling;
        bird.velocity = Vec2::new(FALL_START_VX, FALL_START_VY);

        outcomes.push(HitOutcome {
            bird_id: bird.id,
            species: bird.species,
            points: bird.points(),
            position: bird.position,
        });
    }

    if !outcomes.is_empty() {
        tracing::debug!(
            "Input at ({:.1}, {:.1}) hit {} bird(s)",
            input.x,
            input.y,
            outcomes.len()
        );
    }
    outcomes
}
