//! Simulation state definitions
//!
//! Birds, the static species table and the arena geometry.

use serde::{Deserialize, Serialize};

use crate::game::constants::{arena, hit, spawn};
use crate::game::spatial::CellKey;
use crate::util::vec2::Vec2;

/// Unique bird identifier (unique while the bird is active, never reused)
pub type EntityId = u64;

/// Index of a record inside the entity pool
pub type SlotIndex = u32;

/// Motion profile applied while a bird is flying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionProfile {
    /// Straight line along the spawn velocity
    Linear,
    /// Sinusoidal vertical offset around the spawn anchor
    Wave,
    /// Small random horizontal jitter on top of the velocity
    Jitter,
}

/// Bird species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    Bee,
    Butterfly,
    Bluebird,
    Legendary,
}

/// Immutable per-species definition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeciesDef {
    pub species: Species,
    pub name: &'static str,
    pub points: u32,
    pub weight: f32,
    pub profile: MotionProfile,
}

/// Static species table, ordered by draw threshold
pub const SPECIES_TABLE: [SpeciesDef; 4] = [
    SpeciesDef {
        species: Species::Bee,
        name: "bee",
        points: 10,
        weight: 0.60,
        profile: MotionProfile::Jitter,
    },
    SpeciesDef {
        species: Species::Butterfly,
        name: "butterfly",
        points: 25,
        weight: 0.25,
        profile: MotionProfile::Wave,
    },
    SpeciesDef {
        species: Species::Bluebird,
        name: "bluebird",
        points: 50,
        weight: 0.10,
        profile: MotionProfile::Linear,
    },
    SpeciesDef {
        species: Species::Legendary,
        name: "legendary",
        points: 100,
        weight: 0.05,
        profile: MotionProfile::Linear,
    },
];

impl Species {
    pub const ALL: [Species; 4] = [
        Species::Bee,
        Species::Butterfly,
        Species::Bluebird,
        Species::Legendary,
    ];

    pub fn def(&self) -> &'static SpeciesDef {
        match self {
            Species::Bee => &SPECIES_TABLE[0],
            Species::Butterfly => &SPECIES_TABLE[1],
            Species::Bluebird => &SPECIES_TABLE[2],
            Species::Legendary => &SPECIES_TABLE[3],
        }
    }

    pub fn points(&self) -> u32 {
        self.def().points
    }

    pub fn profile(&self) -> MotionProfile {
        self.def().profile
    }

    pub fn name(&self) -> &'static str {
        self.def().name
    }

    /// Map a uniform roll in [0, 1] to a species using the fixed cumulative thresholds.
    ///
    /// The thresholds are constants, not sums of the table weights, so that the
    /// boundaries are exact. Anything at or above the bluebird threshold (including
    /// out-of-range rolls) is legendary, which keeps the mapping exhaustive.
    pub fn from_roll(roll: f32) -> Species {
        if roll < spawn::THRESHOLD_BEE {
            Species::Bee
        } else if roll < spawn::THRESHOLD_BUTTERFLY {
            Species::Butterfly
        } else if roll < spawn::THRESHOLD_BLUEBIRD {
            Species::Bluebird
        } else {
            Species::Legendary
        }
    }
}

/// Lifecycle phase of a bird. `Flying -> Falling` is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BirdPhase {
    Flying,
    Falling,
}

/// Horizontal facing, derived from the sign of vx
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    Left,
    Right,
}

impl Facing {
    pub fn from_vx(vx: f32) -> Self {
        if vx < 0.0 {
            Facing::Left
        } else {
            Facing::Right
        }
    }
}

/// Pooled bird record
///
/// Owned exclusively by the entity pool. `cell_key` is a lookup hint into the
/// spatial grid, not ownership.
#[derive(Debug, Clone)]
pub struct Bird {
    // === HOT FIELDS (touched every frame) ===
    pub position: Vec2,
    pub velocity: Vec2,
    pub phase: BirdPhase,
    pub cell_key: Option<CellKey>,
    pub species: Species,
    /// Vertical anchor for wave motion
    pub spawn_y: f32,

    // === WARM FIELDS ===
    pub facing: Facing,
    pub animation_frame: u8,
    pub animation_tick: u8,

    // === COLD FIELDS ===
    pub id: EntityId,
    pub slot: SlotIndex,
}

impl Bird {
    /// Create a vacant record for a slot; it is initialised by `reset` on acquire
    pub fn vacant(slot: SlotIndex) -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            phase: BirdPhase::Flying,
            cell_key: None,
            species: Species::Bee,
            spawn_y: 0.0,
            facing: Facing::Right,
            animation_frame: 0,
            animation_tick: 0,
            id: 0,
            slot,
        }
    }

    /// Reinitialise a recycled record as a fresh flying bird
    pub fn reset(&mut self, id: EntityId, species: Species, position: Vec2, velocity: Vec2) {
        self.position = position;
        self.velocity = velocity;
        self.phase = BirdPhase::Flying;
        self.cell_key = None;
        self.species = species;
        self.spawn_y = position.y;
        self.facing = Facing::from_vx(velocity.x);
        self.animation_frame = 0;
        self.animation_tick = 0;
        self.id = id;
    }

    #[inline]
    pub fn is_flying(&self) -> bool {
        self.phase == BirdPhase::Flying
    }

    pub fn points(&self) -> u32 {
        self.species.points()
    }
}

/// The bounded play area in responsive logical coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(arena::DEFAULT_WIDTH, arena::DEFAULT_HEIGHT)
    }
}

impl Arena {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn min_dimension(&self) -> f32 {
        self.width.min(self.height)
    }

    /// Responsive scale relative to the reference layout
    pub fn scale(&self) -> f32 {
        (self.min_dimension() / arena::REFERENCE_MIN_DIMENSION)
            .clamp(arena::MIN_SCALE, arena::MAX_SCALE)
    }

    /// Hit-test radius for the current scale
    pub fn hit_radius(&self) -> f32 {
        hit::BASE_RADIUS * self.scale()
    }

    /// Grid cell size for the current hit radius
    pub fn cell_size(&self) -> f32 {
        hit::CELL_SIZE_FACTOR * self.hit_radius()
    }

    /// Distance outside the arena where birds enter
    pub fn spawn_distance(&self) -> f32 {
        (spawn::BASE_DISTANCE * self.scale())
            .min(spawn::MAX_DISTANCE_FRACTION * self.min_dimension())
    }

    /// Whether a position lies further than `margin` outside the arena on any side
    pub fn is_beyond(&self, position: Vec2, margin: f32) -> bool {
        position.x < -margin
            || position.x > self.width + margin
            || position.y < -margin
            || position.y > self.height + margin
    }
}
