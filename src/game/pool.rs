//! Entity pool for bird records
//!
//! Dense storage indexed by slot. A slot is either active or on the free list,
//! never both. The pool grows on demand and never shrinks, so steady-state play
//! recycles records instead of allocating.

use bitvec::vec::BitVec;

use crate::game::constants::pool::INITIAL_CAPACITY;
use crate::game::state::{Bird, EntityId, SlotIndex, Species};
use crate::util::vec2::Vec2;

pub struct EntityPool {
    slots: Vec<Bird>,
    /// Bit per slot: set while the slot is active
    active: BitVec,
    /// Released slots, reused LIFO
    free: Vec<SlotIndex>,
    next_id: EntityId,
}

impl EntityPool {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            active: BitVec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            next_id: 1,
        }
    }

    /// Take a recycled (or new) record, initialised as a flying bird with a fresh id
    pub fn acquire(&mut self, species: Species, position: Vec2, velocity: Vec2) -> SlotIndex {
        let id = self.next_id;
        self.next_id += 1;

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.slots.len() as SlotIndex;
                self.slots.push(Bird::vacant(slot));
                self.active.push(false);
                slot
            }
        };

        self.slots[slot as usize].reset(id, species, position, velocity);
        self.active.set(slot as usize, true);
        slot
    }

    /// Return a record to the free list.
    ///
    /// The bird must already be removed from the spatial grid. Releasing an
    /// indexed or inactive slot is refused and logged; returns whether the slot
    /// was released.
    pub fn release(&mut self, slot: SlotIndex) -> bool {
        let idx = slot as usize;
        if !self.is_active(slot) {
            tracing::error!("Release of inactive pool slot {}", slot);
            debug_assert!(false, "release of inactive pool slot {}", slot);
            return false;
        }
        if let Some(key) = self.slots[idx].cell_key {
            tracing::error!(
                "Release of bird {} still indexed in cell {:?}",
                self.slots[idx].id,
                key
            );
            debug_assert!(false, "release of indexed bird");
            return false;
        }
        self.active.set(idx, false);
        self.free.push(slot);
        true
    }

    #[inline]
    pub fn is_active(&self, slot: SlotIndex) -> bool {
        self.active.get(slot as usize).is_some_and(|bit| *bit)
    }

    /// Active bird in a slot
    #[inline]
    pub fn get(&self, slot: SlotIndex) -> Option<&Bird> {
        if self.is_active(slot) {
            self.slots.get(slot as usize)
        } else {
            None
        }
    }

    /// Mutable active bird in a slot
    #[inline]
    pub fn get_mut(&mut self, slot: SlotIndex) -> Option<&mut Bird> {
        if self.is_active(slot) {
            self.slots.get_mut(slot as usize)
        } else {
            None
        }
    }

    /// Copy active slot indices into a caller-owned buffer (reused across frames)
    pub fn collect_active(&self, out: &mut Vec<SlotIndex>) {
        out.clear();
        out.extend(self.active.iter_ones().map(|idx| idx as SlotIndex));
    }

    /// Iterate over active birds
    pub fn iter_active(&self) -> impl Iterator<Item = &Bird> {
        self.active.iter_ones().map(move |idx| &self.slots[idx])
    }

    /// Find an active bird by id
    pub fn find_by_id(&self, id: EntityId) -> Option<&Bird> {
        self.iter_active().find(|bird| bird.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.active.count_ones()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Total records ever allocated
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl Default for EntityPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::spatial::SpatialGrid;
    use crate::game::state::BirdPhase;

    #[test]
    fn test_acquire_initialises_flying_bird() {
        let mut pool = EntityPool::new();
        let slot = pool.acquire(Species::Bluebird, Vec2::new(1.0, 2.0), Vec2::new(3.0, 0.0));
        let bird = pool.get(slot).unwrap();

        assert_eq!(bird.phase, BirdPhase::Flying);
        assert_eq!(bird.species, Species::Bluebird);
        assert_eq!(bird.slot, slot);
        assert!(bird.cell_key.is_none());
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn test_ids_are_unique_across_recycling() {
        let mut pool = EntityPool::new();
        let a = pool.acquire(Species::Bee, Vec2::ZERO, Vec2::new(1.0, 0.0));
        let first_id = pool.get(a).unwrap().id;
        assert!(pool.release(a));

        let b = pool.acquire(Species::Bee, Vec2::ZERO, Vec2::new(1.0, 0.0));
        assert_eq!(a, b, "released slot should be recycled");
        assert_ne!(pool.get(b).unwrap().id, first_id);
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn test_slot_is_active_or_free_never_both() {
        let mut pool = EntityPool::new();
        let slots: Vec<_> = (0..5)
            .map(|i| pool.acquire(Species::Bee, Vec2::new(i as f32, 0.0), Vec2::new(1.0, 0.0)))
            .collect();
        pool.release(slots[1]);
        pool.release(slots[3]);

        assert_eq!(pool.active_count() + pool.free_count(), pool.capacity());
        assert!(pool.get(slots[1]).is_none());
        assert!(pool.get(slots[0]).is_some());
    }

    #[test]
    fn test_release_after_grid_removal() {
        let mut pool = EntityPool::new();
        let mut grid = SpatialGrid::new(80.0);
        let slot = pool.acquire(Species::Bee, Vec2::new(10.0, 10.0), Vec2::new(1.0, 0.0));
        grid.insert(pool.get_mut(slot).unwrap());

        // Removal before release is the caller's job
        grid.remove(pool.get_mut(slot).unwrap());
        assert!(pool.release(slot));
        assert!(!pool.is_active(slot));
    }

    #[test]
    fn test_acquire_release_acquire_has_no_stale_cell_key() {
        let mut pool = EntityPool::new();
        let mut grid = SpatialGrid::new(80.0);

        let slot = pool.acquire(Species::Bee, Vec2::new(500.0, 500.0), Vec2::new(1.0, 0.0));
        grid.insert(pool.get_mut(slot).unwrap());
        grid.remove(pool.get_mut(slot).unwrap());
        pool.release(slot);

        let again = pool.acquire(Species::Butterfly, Vec2::new(10.0, 10.0), Vec2::new(1.0, 0.0));
        assert_eq!(again, slot);
        assert!(pool.get(again).unwrap().cell_key.is_none());
        assert_eq!(grid.stats().total_entries, 0);

        grid.insert(pool.get_mut(again).unwrap());
        assert_eq!(pool.get(again).unwrap().cell_key, Some((0, 0)));
        assert_eq!(grid.stats().total_entries, 1);
    }

    #[test]
    fn test_collect_active_reuses_buffer() {
        let mut pool = EntityPool::new();
        for _ in 0..4 {
            pool.acquire(Species::Bee, Vec2::ZERO, Vec2::new(1.0, 0.0));
        }
        pool.release(2);

        let mut buffer = vec![99, 98];
        pool.collect_active(&mut buffer);
        assert_eq!(buffer, vec![0, 1, 3]);
    }

    #[test]
    fn test_pool_grows_without_limit() {
        let mut pool = EntityPool::with_capacity(2);
        for _ in 0..100 {
            pool.acquire(Species::Bee, Vec2::ZERO, Vec2::new(1.0, 0.0));
        }
        assert_eq!(pool.active_count(), 100);
        assert_eq!(pool.capacity(), 100);
    }
}
