//! Spatial hash grid for hit testing
//!
//! Divides the arena into cells of `2 x hitRadius` and stores pool slot indices
//! in each cell. A hit query only scans the 3x3 block around the input point.
//! The grid never owns birds: it holds slot indices, and each bird keeps its
//! current cell key as a back-reference.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::game::constants::hit::BASE_RADIUS;
use crate::game::pool::EntityPool;
use crate::game::state::{Bird, SlotIndex};
use crate::util::vec2::Vec2;

/// Default cell size (2x the hit radius at scale 1.0)
pub const DEFAULT_CELL_SIZE: f32 = 2.0 * BASE_RADIUS;

/// Initial capacity for grid cells (number of expected non-empty cells)
const GRID_INITIAL_CAPACITY: usize = 128;

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Birds per bucket before spilling to the heap
type Bucket = SmallVec<[SlotIndex; 8]>;

const NEIGHBOR_OFFSETS: [(i32, i32); 9] = [
    (-1, -1), (0, -1), (1, -1),
    (-1,  0), (0,  0), (1,  0),
    (-1,  1), (0,  1), (1,  1),
];

/// Uniform grid mapping cell -> pool slots
pub struct SpatialGrid {
    /// Cell size in arena units
    cell_size: f32,
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    /// Non-empty buckets only; empty buckets are deleted
    cells: HashMap<CellKey, Bucket, FxBuildHasher>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity_and_hasher(GRID_INITIAL_CAPACITY, FxBuildHasher),
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Change the cell size after a hit radius change.
    ///
    /// Existing buckets are not re-bucketed; each bird moves to its new-size
    /// cell the next time `update_if_moved` sees it.
    pub fn set_cell_size(&mut self, cell_size: f32) {
        if cell_size > 0.0 && cell_size != self.cell_size {
            tracing::debug!("Grid cell size {} -> {}", self.cell_size, cell_size);
            self.cell_size = cell_size;
            self.inv_cell_size = 1.0 / cell_size;
        }
    }

    /// Convert arena position to cell key
    #[inline]
    pub fn position_to_cell(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    /// Insert a bird and record its cell key on the bird
    pub fn insert(&mut self, bird: &mut Bird) {
        if bird.cell_key.is_some() {
            // Already indexed; treat as a move so it never sits in two buckets
            self.update_if_moved(bird);
            return;
        }
        let key = self.position_to_cell(bird.position);
        self.cells.entry(key).or_default().push(bird.slot);
        bird.cell_key = Some(key);
    }

    /// Re-bucket a bird if its cell changed. Returns true if it moved cells.
    pub fn update_if_moved(&mut self, bird: &mut Bird) -> bool {
        let new_key = self.position_to_cell(bird.position);
        match bird.cell_key {
            Some(old_key) if old_key == new_key => false,
            Some(old_key) => {
                self.remove_from_bucket(old_key, bird.slot);
                self.cells.entry(new_key).or_default().push(bird.slot);
                bird.cell_key = Some(new_key);
                true
            }
            None => {
                self.cells.entry(new_key).or_default().push(bird.slot);
                bird.cell_key = Some(new_key);
                true
            }
        }
    }

    /// Remove a bird from its bucket and clear its back-reference.
    /// Returns true if the bird was indexed.
    pub fn remove(&mut self, bird: &mut Bird) -> bool {
        match bird.cell_key.take() {
            Some(key) => self.remove_from_bucket(key, bird.slot),
            None => false,
        }
    }

    fn remove_from_bucket(&mut self, key: CellKey, slot: SlotIndex) -> bool {
        let Some(bucket) = self.cells.get_mut(&key) else {
            return false;
        };
        let Some(idx) = bucket.iter().position(|&s| s == slot) else {
            return false;
        };
        bucket.swap_remove(idx);
        if bucket.is_empty() {
            self.cells.remove(&key);
        }
        true
    }

    /// All slots in the 3x3 block of cells around a position, regardless of phase
    pub fn query_cells(&self, position: Vec2) -> impl Iterator<Item = SlotIndex> + '_ {
        let (cx, cy) = self.position_to_cell(position);

        NEIGHBOR_OFFSETS.iter().flat_map(move |&(dx, dy)| {
            self.cells
                .get(&(cx + dx, cy + dy))
                .into_iter()
                .flat_map(|bucket| bucket.iter().copied())
        })
    }

    /// Flying birds in the 3x3 block of cells around a position.
    ///
    /// The radius is not used to narrow the scan: the cell size already
    /// guarantees that any hit circle fits in the neighborhood.
    pub fn query_neighbors<'a>(
        &'a self,
        pool: &'a EntityPool,
        position: Vec2,
        _radius: f32,
    ) -> impl Iterator<Item = SlotIndex> + 'a {
        self.query_cells(position)
            .filter(move |&slot| pool.get(slot).is_some_and(Bird::is_flying))
    }

    /// Remove every bucket (used when a round is torn down)
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Get statistics about the grid
    pub fn stats(&self) -> SpatialGridStats {
        SpatialGridStats {
            non_empty_cells: self.cells.len(),
            total_entries: self.cells.values().map(|c| c.len()).sum(),
            max_per_cell: self.cells.values().map(|c| c.len()).max().unwrap_or(0),
        }
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

/// Statistics about the spatial grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialGridStats {
    pub non_empty_cells: usize,
    pub total_entries: usize,
    pub max_per_cell: usize,
}
