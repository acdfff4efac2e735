//! Fixed-capacity slot allocator for frame graph records.
//!
//! A [`ResourcePool`] pre-allocates every slot up front and hands out
//! generation-checked [`Handle`]s. Slots are reused after release, but a handle
//! obtained before the release no longer resolves.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use thiserror::Error;

/// Pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool exhausted: all {capacity} slots are in use")]
    Exhausted { capacity: usize },
}

/// Typed index into a [`ResourcePool`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index, stable for the handle's lifetime
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    used: bool,
    value: T,
}

/// Fixed-capacity pool with a free list.
pub struct ResourcePool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    name: &'static str,
}

impl<T: Default> ResourcePool<T> {
    /// Pre-allocate `capacity` slots.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                used: false,
                value: T::default(),
            })
            .collect();
        // Popped from the back, so index 0 is handed out first.
        let free = (0..capacity as u32).rev().collect();
        Self { slots, free, name }
    }

    /// Take a free slot, reset to its default value.
    pub fn obtain(&mut self) -> Result<Handle<T>, PoolError> {
        let Some(index) = self.free.pop() else {
            log::error!(
                "{} pool exhausted ({} slots); increase the pool capacity",
                self.name,
                self.slots.len()
            );
            return Err(PoolError::Exhausted {
                capacity: self.slots.len(),
            });
        };
        let slot = &mut self.slots[index as usize];
        slot.used = true;
        slot.value = T::default();
        Ok(Handle::new(index, slot.generation))
    }

    /// Obtain a slot and move `value` into it.
    pub fn insert(&mut self, value: T) -> Result<Handle<T>, PoolError> {
        let handle = self.obtain()?;
        self.slots[handle.index()].value = value;
        Ok(handle)
    }

    /// Return a slot to the free list. Releasing a free or stale handle is a no-op.
    pub fn release(&mut self, handle: Handle<T>) {
        match self.slots.get_mut(handle.index()) {
            Some(slot) if slot.used && slot.generation == handle.generation => {
                slot.used = false;
                slot.generation = slot.generation.wrapping_add(1);
                slot.value = T::default();
                self.free.push(handle.index);
            }
            Some(_) => log::warn!(
                "{} pool: releasing {:?} which is not in use",
                self.name,
                handle
            ),
            None => log::warn!("{} pool: releasing out-of-range {:?}", self.name, handle),
        }
    }

    pub fn access(&self, handle: Handle<T>) -> Option<&T> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.used && slot.generation == handle.generation)
            .map(|slot| &slot.value)
    }

    pub fn access_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.used && slot.generation == handle.generation)
            .map(|slot| &mut slot.value)
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of slots in use
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Handles of all slots in use, in index order
    pub fn handles(&self) -> Vec<Handle<T>> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.used)
            .map(|(index, slot)| Handle::new(index as u32, slot.generation))
            .collect()
    }

    /// Release everything, warning about slots still in use.
    pub fn shutdown(&mut self) {
        let outstanding = self.len();
        if outstanding > 0 {
            log::warn!(
                "{} pool shut down with {} outstanding allocations",
                self.name,
                outstanding
            );
        }
        for handle in self.handles() {
            self.release(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obtain_in_index_order() {
        let mut pool = ResourcePool::<u32>::new("test", 3);
        let a = pool.obtain().unwrap();
        let b = pool.obtain().unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_exhaustion() {
        let mut pool = ResourcePool::<u32>::new("test", 1);
        pool.obtain().unwrap();
        assert_eq!(pool.obtain(), Err(PoolError::Exhausted { capacity: 1 }));
    }

    #[test]
    fn test_release_then_obtain_reuses_slot() {
        let mut pool = ResourcePool::<u32>::new("test", 2);
        let first = pool.insert(7).unwrap();
        pool.release(first);
        let second = pool.obtain().unwrap();

        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert_eq!(pool.access(second), Some(&0));
        assert!(pool.access(first).is_none());

        *pool.access_mut(second).unwrap() = 9;
        assert_eq!(pool.access(second), Some(&9));
    }

    #[test]
    fn test_double_release_is_noop() {
        let mut pool = ResourcePool::<u32>::new("test", 2);
        let handle = pool.obtain().unwrap();
        pool.release(handle);
        pool.release(handle);
        assert_eq!(pool.len(), 0);

        // The free list must not contain the slot twice.
        pool.obtain().unwrap();
        pool.obtain().unwrap();
        assert!(pool.obtain().is_err());
    }

    #[test]
    fn test_shutdown_releases_all() {
        let mut pool = ResourcePool::<u32>::new("test", 4);
        pool.obtain().unwrap();
        pool.obtain().unwrap();
        pool.shutdown();
        assert!(pool.is_empty());
    }
}
