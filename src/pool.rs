//! Reference-counted frame buffer pool.
//!
//! Buffers are allocated once and reused, so the capture path does not touch
//! the allocator after warm-up. An entry is handed out with a *hold count*:
//! the number of consumers that will each call [`PoolEntry::release`] once.
//! When the count drops to zero the entry becomes available again.
//!
//! # Example
//!
//! ```
//! use rgbd_recorder::{FramePool, PoolConfig};
//!
//! let mut pool = FramePool::<u16>::new("depth", 512 * 424, PoolConfig::new(2));
//!
//! // Two writers will read this buffer.
//! let entry = pool.acquire(2);
//! entry.copy_from(&vec![0u16; 512 * 424]);
//! let second = entry.clone();
//!
//! entry.release();
//! assert!(!second.is_free());
//! second.release();
//! assert_eq!(pool.free_count(), 2);
//! ```
//!
//! # Exclusion
//!
//! Finding a free entry and claiming it is a check-then-act sequence, so
//! [`FramePool::acquire`] takes `&mut self`: only one thread can be inside it.
//! Releases are plain atomic decrements and may happen from any thread.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::PoolConfig;

struct Slot<T> {
    buffer: RwLock<Box<[T]>>,
    reference_count: AtomicI32,
    /// Hold count granted by the most recent acquisition.
    granted: AtomicI32,
}

impl<T: Copy + Default> Slot<T> {
    fn new(size_per_array: usize, hold_count: i32) -> Self {
        Self {
            buffer: RwLock::new(vec![T::default(); size_per_array].into_boxed_slice()),
            reference_count: AtomicI32::new(hold_count),
            granted: AtomicI32::new(hold_count),
        }
    }
}

/// Handle to one pooled buffer.
///
/// Cloning a handle does not change the reference count; it is how the
/// producer hands the same entry to several consumers. Each consumer must call
/// [`release`](Self::release) exactly once. A handle dropped without release
/// strands the buffer: the pool never reuses it.
pub struct PoolEntry<T> {
    slot: Arc<Slot<T>>,
    index: usize,
}

impl<T> Clone for PoolEntry<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            index: self.index,
        }
    }
}

impl<T> std::fmt::Debug for PoolEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEntry")
            .field("index", &self.index)
            .field("reference_count", &self.reference_count())
            .finish()
    }
}

impl<T> PoolEntry<T> {
    /// Position of this entry in its pool (insertion order).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Outstanding holds. Zero or less means the entry is free.
    pub fn reference_count(&self) -> i32 {
        self.slot.reference_count.load(Ordering::Acquire)
    }

    /// Hold count granted when this entry was last acquired.
    pub fn last_hold_count(&self) -> i32 {
        self.slot.granted.load(Ordering::Relaxed)
    }

    pub fn is_free(&self) -> bool {
        self.reference_count() <= 0
    }

    /// Give up one hold on the entry.
    pub fn release(self) {
        let previous = self.slot.reference_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "pool entry {} released more often than held", self.index);
    }

    /// Shared access to the buffer contents.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[T]>> {
        // Buffers hold plain samples, a panicked holder cannot leave them inconsistent.
        self.slot
            .buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the buffer contents.
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[T]>> {
        self.slot
            .buffer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Copy> PoolEntry<T> {
    /// Copy `src` into the buffer. `src` must be exactly the pool's array size.
    pub fn copy_from(&self, src: &[T]) {
        self.write().copy_from_slice(src);
    }
}

/// Grow-on-demand pool of fixed-size buffers of `T`.
pub struct FramePool<T> {
    name: &'static str,
    entries: Vec<Arc<Slot<T>>>,
    size_per_array: usize,
    grow_step: usize,
}

impl<T: Copy + Default> FramePool<T> {
    /// Create a pool of `config.pre_alloc_count` free buffers of `size_per_array` samples.
    pub fn new(name: &'static str, size_per_array: usize, config: PoolConfig) -> Self {
        let mut pool = Self {
            name,
            entries: Vec::with_capacity(config.pre_alloc_count),
            size_per_array,
            grow_step: config.grow_step.max(1),
        };
        for _ in 0..config.pre_alloc_count {
            pool.push_slot(0);
        }
        pool
    }

    fn push_slot(&mut self, hold_count: i32) -> PoolEntry<T> {
        let slot = Arc::new(Slot::new(self.size_per_array, hold_count));
        let index = self.entries.len();
        self.entries.push(Arc::clone(&slot));
        PoolEntry { slot, index }
    }

    /// Hand out a free buffer held by `hold_count` consumers.
    ///
    /// Never fails: when every entry is held the pool grows by `grow_step`,
    /// the first new entry goes to the caller and the rest become spares.
    pub fn acquire(&mut self, hold_count: usize) -> PoolEntry<T> {
        debug_assert!(hold_count > 0, "acquire with zero hold count");
        let hold = i32::try_from(hold_count).unwrap_or(i32::MAX);

        for (index, slot) in self.entries.iter().enumerate() {
            if slot.reference_count.load(Ordering::Acquire) <= 0 {
                slot.reference_count.store(hold, Ordering::Release);
                slot.granted.store(hold, Ordering::Relaxed);
                return PoolEntry {
                    slot: Arc::clone(slot),
                    index,
                };
            }
        }

        tracing::warn!(
            "Out of {} buffers, growing pool to {} entries",
            self.name,
            self.entries.len() + self.grow_step
        );
        let entry = self.push_slot(hold);
        for _ in 1..self.grow_step {
            self.push_slot(0);
        }
        entry
    }

    /// Total number of entries, held or free.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries currently available for acquisition.
    pub fn free_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|s| s.reference_count.load(Ordering::Acquire) <= 0)
            .count()
    }

    /// Entries with at least one outstanding hold.
    pub fn held_count(&self) -> usize {
        self.len() - self.free_count()
    }

    /// Samples per buffer.
    pub fn size_per_array(&self) -> usize {
        self.size_per_array
    }

    pub fn grow_step(&self) -> usize {
        self.grow_step
    }

    /// Handle to the entry at `index`, for inspection. Does not acquire it.
    pub fn entry(&self, index: usize) -> Option<PoolEntry<T>> {
        self.entries.get(index).map(|slot| PoolEntry {
            slot: Arc::clone(slot),
            index,
        })
    }

    /// Drop the pool's references to every buffer.
    ///
    /// Buffers still queued at a writer stay alive until that writer releases
    /// and drops its handle.
    pub fn teardown(self) {
        let held = self.held_count();
        if held > 0 {
            tracing::debug!(
                "Tearing down {} pool with {} of {} entries still held",
                self.name,
                held,
                self.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_acquire_prefers_preallocated_then_grows() {
        let mut pool = FramePool::<u8>::new("test", 4, PoolConfig::new(2).grow_step(10));

        let a = pool.acquire(1);
        let b = pool.acquire(1);
        let c = pool.acquire(1);

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(c.index(), 2);
        assert_eq!(pool.len(), 12);
        // 9 spares from the growth step; 0, 1 and 2 are held.
        assert_eq!(pool.free_count(), 9);
        assert_eq!(c.read().len(), 4);

        a.release();
        b.release();
        assert_eq!(pool.free_count(), 11);
        c.release();
        assert_eq!(pool.held_count(), 0);
    }

    #[test]
    fn test_growth_when_all_held() {
        let mut pool = FramePool::<u16>::new("test", 8, PoolConfig::new(3).grow_step(5));
        let held: Vec<_> = (0..3).map(|_| pool.acquire(1)).collect();
        assert_eq!(pool.free_count(), 0);

        let extra = pool.acquire(2);
        assert_eq!(pool.len(), 3 + 5);
        assert!(extra.index() >= 3, "grown entry must be a new one");
        assert_eq!(extra.reference_count(), 2);
        assert_eq!(pool.free_count(), 4);

        for entry in held {
            entry.release();
        }
    }

    #[test]
    fn test_free_entry_reused_before_growth() {
        let mut pool = FramePool::<u8>::new("test", 4, PoolConfig::new(3));
        let a = pool.acquire(1);
        let b = pool.acquire(1);
        let c = pool.acquire(1);
        b.release();

        let d = pool.acquire(1);
        assert_eq!(d.index(), 1);
        assert_eq!(pool.len(), 3);

        a.release();
        c.release();
        d.release();
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn test_first_fit_in_insertion_order() {
        let mut pool = FramePool::<u8>::new("test", 1, PoolConfig::new(4));
        let held: Vec<_> = (0..4).map(|_| pool.acquire(1)).collect();
        let mut held = held.into_iter();
        let e0 = held.next().unwrap();
        let e1 = held.next().unwrap();
        let e2 = held.next().unwrap();
        let e3 = held.next().unwrap();

        // Free 3 first, then 1: the scan still returns the lower index.
        e3.release();
        e1.release();
        assert_eq!(pool.acquire(1).index(), 1);
        assert_eq!(pool.acquire(1).index(), 3);

        e0.release();
        e2.release();
    }

    #[test]
    fn test_shared_entry_needs_every_release() {
        let mut pool = FramePool::<u8>::new("test", 4, PoolConfig::new(1));
        let entry = pool.acquire(2);
        let other = entry.clone();
        assert_eq!(entry.last_hold_count(), 2);

        entry.release();
        assert_eq!(other.reference_count(), 1);
        assert_eq!(pool.free_count(), 0);

        // Still held once: a new acquisition must not get it.
        let next = pool.acquire(1);
        assert_ne!(next.index(), 0);

        other.release();
        assert_eq!(pool.entry(0).unwrap().reference_count(), 0);
        next.release();
    }

    #[test]
    fn test_missing_release_strands_buffer() {
        let mut pool = FramePool::<u8>::new("test", 4, PoolConfig::new(1).grow_step(2));
        let forgotten = pool.acquire(1);
        drop(forgotten);

        assert_eq!(pool.free_count(), 0);
        let next = pool.acquire(1);
        assert_eq!(next.index(), 1);
        assert_eq!(pool.len(), 3);
        assert!(!pool.entry(0).unwrap().is_free());
        next.release();
    }

    #[test]
    fn test_copy_from_and_read() {
        let mut pool = FramePool::<u16>::new("test", 3, PoolConfig::new(1));
        let entry = pool.acquire(1);
        entry.copy_from(&[1, 2, 3]);
        assert_eq!(&**entry.read(), &[1, 2, 3]);
        entry.release();

        // Reused buffers keep their old contents until the next copy-in.
        let again = pool.acquire(1);
        assert_eq!(again.index(), 0);
        again.copy_from(&[7, 8, 9]);
        assert_eq!(&**again.read(), &[7, 8, 9]);
        again.release();
    }

    #[test]
    fn test_release_from_other_threads() {
        let mut pool = FramePool::<u8>::new("test", 16, PoolConfig::new(2));
        let entry = pool.acquire(4);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let e = entry.clone();
                std::thread::spawn(move || {
                    assert_eq!(e.read().len(), 16);
                    e.release();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(entry.is_free());
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_random_acquire_release_never_over_holds() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut pool = FramePool::<u8>::new("test", 2, PoolConfig::new(3).grow_step(4));
        let mut outstanding: Vec<PoolEntry<u8>> = Vec::new();

        for _ in 0..2000 {
            if outstanding.is_empty() || rng.random_bool(0.55) {
                let holds = rng.random_range(1..=3);
                let entry = pool.acquire(holds);
                for _ in 1..holds {
                    outstanding.push(entry.clone());
                }
                outstanding.push(entry);
            } else {
                let i = rng.random_range(0..outstanding.len());
                outstanding.swap_remove(i).release();
            }

            assert!(pool.held_count() <= outstanding.len());
            for i in 0..pool.len() {
                assert!(pool.entry(i).unwrap().reference_count() >= 0);
            }
        }

        for entry in outstanding.drain(..) {
            entry.release();
        }
        assert_eq!(pool.free_count(), pool.len());
    }

    #[test]
    fn test_teardown_keeps_inflight_entries_valid() {
        let mut pool = FramePool::<u8>::new("test", 4, PoolConfig::new(1));
        let entry = pool.acquire(1);
        entry.copy_from(&[1, 2, 3, 4]);
        pool.teardown();

        assert_eq!(&**entry.read(), &[1, 2, 3, 4]);
        entry.release();
    }
}
