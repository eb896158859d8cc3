/// Arena sizing and responsive scaling
pub mod arena {
    /// Default arena width in logical pixels
    pub const DEFAULT_WIDTH: f32 = 1280.0;
    /// Default arena height in logical pixels
    pub const DEFAULT_HEIGHT: f32 = 720.0;
    /// Smaller arena dimension at which scale == 1.0
    pub const REFERENCE_MIN_DIMENSION: f32 = 720.0;
    /// Responsive scale lower bound
    pub const MIN_SCALE: f32 = 0.5;
    /// Responsive scale upper bound
    pub const MAX_SCALE: f32 = 1.5;
}

/// Hit testing constants
pub mod hit {
    /// Hit radius at scale 1.0
    pub const BASE_RADIUS: f32 = 40.0;
    /// Grid cell size as a multiple of hit radius (3x3 neighborhood covers any hit circle)
    pub const CELL_SIZE_FACTOR: f32 = 2.0;
    /// Velocity given to a bird the moment it is hit
    pub const FALL_START_VX: f32 = 0.0;
    pub const FALL_START_VY: f32 = 2.0;
}

/// Spawn Director constants
pub mod spawn {
    /// Probability that a spawn attempt produces a flock instead of a single bird
    pub const FLOCK_PROBABILITY: f32 = 0.15;
    /// Flock size range (inclusive)
    pub const FLOCK_MIN: usize = 3;
    pub const FLOCK_MAX: usize = 5;
    /// Delay between consecutive flock members in milliseconds (inclusive range)
    pub const FLOCK_STAGGER_MIN_MS: u64 = 100;
    pub const FLOCK_STAGGER_MAX_MS: u64 = 150;
    /// Perpendicular jitter around the shared flock anchor
    pub const FLOCK_JITTER: f32 = 75.0;

    /// Base distance outside the arena where birds enter (scaled)
    pub const BASE_DISTANCE: f32 = 60.0;
    /// Spawn distance never exceeds this fraction of the smaller arena dimension
    pub const MAX_DISTANCE_FRACTION: f32 = 0.2;

    /// Speed at round start (roundProgress = 0)
    pub const BASE_SPEED: f32 = 1.5;
    /// Speed added linearly over the round (baseSpeed = 3.0 at roundProgress = 1)
    pub const SPEED_RAMP: f32 = 1.5;
    /// Upper bound of the uniform random speed bonus
    pub const SPEED_JITTER: f32 = 1.0;

    /// Minimum delay between spawn attempts
    pub const CADENCE_BASE_MS: u64 = 250;
    /// Additional delay at a full round clock, shrinking to zero as time runs out
    pub const CADENCE_RANGE_MS: u64 = 600;

    /// Cumulative species thresholds: Bee, Butterfly, Bluebird, Legendary
    pub const THRESHOLD_BEE: f32 = 0.60;
    pub const THRESHOLD_BUTTERFLY: f32 = 0.85;
    pub const THRESHOLD_BLUEBIRD: f32 = 0.95;
    pub const THRESHOLD_LEGENDARY: f32 = 1.00;
}

/// Motion Model constants (per-tick units)
pub mod motion {
    /// Spatial frequency of the wave trajectory
    pub const WAVE_FREQUENCY: f32 = 0.03;
    /// Wave amplitude factor
    pub const WAVE_AMPLITUDE: f32 = 1.2;
    /// Wave amplitude scale in pixels
    pub const WAVE_SCALE: f32 = 20.0;
    /// |vx| below this skips the wave division and moves linearly
    pub const WAVE_MIN_VX: f32 = 1e-3;
    /// Horizontal jitter bound per tick
    pub const JITTER: f32 = 1.5;
    /// Gravity added to vy every tick while falling (no terminal velocity)
    pub const GRAVITY: f32 = 0.1;
    /// Flying birds beyond this margin outside the arena are removed
    pub const EXIT_MARGIN: f32 = 150.0;
    /// Falling birds below arena height + this margin are removed
    pub const FALL_MARGIN: f32 = 100.0;
    /// Number of cosmetic animation frames
    pub const ANIMATION_FRAMES: u8 = 4;
    /// Ticks per animation frame
    pub const TICKS_PER_FRAME: u8 = 6;
}

/// Session State Machine constants
pub mod session {
    /// Round length in seconds
    pub const ROUND_SECONDS: u32 = 60;
    /// Countdown starting value
    pub const COUNTDOWN_FROM: u8 = 3;
    /// Seconds the room waits for participants before force-ending
    pub const WAITING_TIMEOUT: u32 = 30;
    /// Minimum connected participants in multiplayer
    pub const MIN_PARTICIPANTS: usize = 2;
    /// Session clock period
    pub const SECOND_MS: u64 = 1000;
}

/// Entity pool constants
pub mod pool {
    /// Slots reserved up front; the pool still grows on demand
    pub const INITIAL_CAPACITY: usize = 64;
}
