//! Fixed-capacity slot heap.
//!
//! A table of `N` slot indices plus a free-list, all guarded by one mutex.
//! The heap bounds and tracks occupancy; the values travel inside the lent
//! [`HeapItem`]s. A condition variable wakes threads draining the heap when
//! occupancy reaches zero.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{FrameError, DEFAULT_DRAIN_TIMEOUT_S};
use tracing::{debug, error};

/// Bound used by [`SmallHeap::wait_until_empty`]
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_S);

static NEXT_HEAP_ID: AtomicU64 = AtomicU64::new(1);

/// A slot lent out by a [`SmallHeap`].
///
/// Dereferences to the slot value. The item remembers which heap and slot it
/// came from so `deallocate` can reject items returned to the wrong heap.
pub struct HeapItem<T> {
    heap_id: u64,
    index: Option<usize>,
    value: T,
}

impl<T> HeapItem<T> {
    /// Slot index, `None` once the item was returned
    #[inline]
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Whether the item still occupies its slot
    #[inline]
    pub fn is_live(&self) -> bool {
        self.index.is_some()
    }
}

impl<T> Deref for HeapItem<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for HeapItem<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for HeapItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapItem")
            .field("heap_id", &self.heap_id)
            .field("index", &self.index)
            .field("value", &self.value)
            .finish()
    }
}

struct HeapState<const N: usize> {
    is_free: [bool; N],
    free_list: Vec<usize>,
    size: usize,
    keep_allocating: bool,
}

/// Fixed-capacity pooled allocator.
///
/// - `allocate` never blocks and never grows the heap
/// - `deallocate` validates ownership before resetting the slot
/// - `stop_allocation` + `wait_until_empty` drive orderly teardown
pub struct SmallHeap<T, const N: usize> {
    id: u64,
    name: &'static str,
    state: Mutex<HeapState<N>>,
    drained: Condvar,
    occupancy: metrics::Gauge,
    _values: PhantomData<fn() -> T>,
}

impl<T, const N: usize> fmt::Debug for SmallHeap<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SmallHeap")
            .field("name", &self.name)
            .field("size", &state.size)
            .field("capacity", &N)
            .field("keep_allocating", &state.keep_allocating)
            .finish()
    }
}

impl<T: Default, const N: usize> Default for SmallHeap<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default, const N: usize> SmallHeap<T, N> {
    /// Create a heap with every slot free
    pub fn new() -> Self {
        Self::with_name("frames")
    }

    /// Create a named heap (the name labels its metrics)
    pub fn with_name(name: &'static str) -> Self {
        Self {
            id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            name,
            state: Mutex::new(HeapState {
                is_free: [true; N],
                // Reversed so slot 0 is handed out first
                free_list: (0..N).rev().collect(),
                size: 0,
                keep_allocating: true,
            }),
            drained: Condvar::new(),
            occupancy: metrics::gauge!("frame_pool_occupancy", "heap" => name),
            _values: PhantomData,
        }
    }

    /// Take a free slot.
    ///
    /// Returns `None` when allocation was stopped or every slot is in use.
    /// Callers that need eventual success must retry on their own.
    pub fn allocate(&self) -> Option<HeapItem<T>> {
        let mut state = self.lock();
        if !state.keep_allocating {
            return None;
        }
        let index = state.free_list.pop()?;
        state.is_free[index] = false;
        state.size += 1;
        self.occupancy.set(state.size as f64);

        Some(HeapItem {
            heap_id: self.id,
            index: Some(index),
            value: T::default(),
        })
    }

    /// Return a slot to the heap.
    ///
    /// The item's value is reset to `T::default()` and the item becomes
    /// dead; the previous value is dropped after the lock is released.
    ///
    /// # Errors
    /// `InvalidArgument` when the item belongs to another heap, was already
    /// returned, or names a slot that is already free.
    pub fn deallocate(&self, item: &mut HeapItem<T>) -> Result<(), FrameError> {
        if item.heap_id != self.id {
            error!(heap = self.name, "item returned to the wrong heap");
            return Err(FrameError::invalid_argument(format!(
                "item does not belong to heap '{}'",
                self.name
            )));
        }
        let index = match item.index {
            Some(index) if index < N => index,
            Some(index) => {
                error!(heap = self.name, index, "slot index out of range");
                return Err(FrameError::invalid_argument(format!(
                    "slot {index} is outside heap '{}'",
                    self.name
                )));
            }
            None => {
                error!(heap = self.name, "item was already returned");
                return Err(FrameError::invalid_argument("item was already returned"));
            }
        };

        let stale = {
            let mut state = self.lock();
            if state.is_free[index] {
                error!(heap = self.name, index, "double free of heap slot");
                return Err(FrameError::invalid_argument(format!(
                    "slot {index} of heap '{}' is already free",
                    self.name
                )));
            }
            item.index = None;
            state.is_free[index] = true;
            state.free_list.push(index);
            state.size -= 1;
            self.occupancy.set(state.size as f64);
            if state.size == 0 {
                self.drained.notify_all();
            }
            std::mem::take(&mut item.value)
        };
        drop(stale);
        Ok(())
    }
}

impl<T, const N: usize> SmallHeap<T, N> {
    /// Permanently refuse further allocations
    pub fn stop_allocation(&self) {
        let mut state = self.lock();
        if state.keep_allocating {
            debug!(heap = self.name, in_use = state.size, "allocation stopped");
        }
        state.keep_allocating = false;
    }

    pub fn is_allocation_stopped(&self) -> bool {
        !self.lock().keep_allocating
    }

    /// Block until every slot was returned.
    ///
    /// # Errors
    /// `Timeout` after [`DEFAULT_DRAIN_TIMEOUT`]; this only trips when a
    /// consumer holds frames forever.
    pub fn wait_until_empty(&self) -> Result<(), FrameError> {
        self.wait_until_empty_for(DEFAULT_DRAIN_TIMEOUT)
    }

    /// Block until every slot was returned or `timeout` elapses
    pub fn wait_until_empty_for(&self, timeout: Duration) -> Result<(), FrameError> {
        let started = Instant::now();
        let guard = self.lock();
        let (state, result) = self
            .drained
            .wait_timeout_while(guard, timeout, |state| state.size > 0)
            .unwrap_or_else(PoisonError::into_inner);

        if result.timed_out() && state.size > 0 {
            error!(
                heap = self.name,
                in_use = state.size,
                "timed out waiting for heap to drain"
            );
            return Err(FrameError::timeout(started.elapsed()));
        }
        Ok(())
    }

    /// Number of slots in use
    pub fn size(&self) -> usize {
        self.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, HeapState<N>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_capacity_two_scenario() {
        let heap: SmallHeap<u32, 2> = SmallHeap::new();

        let mut a = heap.allocate().expect("first slot");
        let b = heap.allocate().expect("second slot");
        assert!(heap.allocate().is_none());
        assert_eq!(heap.size(), 2);

        heap.deallocate(&mut a).unwrap();
        assert_eq!(heap.size(), 1);

        // The freed slot is reused
        let c = heap.allocate().expect("slot after deallocate");
        assert_eq!(c.index(), Some(0));
        assert_eq!(b.index(), Some(1));
    }

    #[test]
    fn test_deallocate_resets_value() {
        let heap: SmallHeap<Vec<u8>, 1> = SmallHeap::new();
        let mut item = heap.allocate().unwrap();
        item.extend_from_slice(&[1, 2, 3]);

        heap.deallocate(&mut item).unwrap();
        assert!(item.is_empty());
        assert!(!item.is_live());

        let again = heap.allocate().unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_wrong_heap_rejected() {
        let heap_a: SmallHeap<u8, 2> = SmallHeap::new();
        let heap_b: SmallHeap<u8, 2> = SmallHeap::new();

        let mut item = heap_a.allocate().unwrap();
        let err = heap_b.deallocate(&mut item).unwrap_err();
        assert_eq!(err.kind(), contracts::ErrorKind::InvalidArgument);
        assert_eq!(heap_a.size(), 1);
        assert_eq!(heap_b.size(), 0);
    }

    #[test]
    fn test_double_deallocate_rejected() {
        let heap: SmallHeap<u8, 2> = SmallHeap::new();
        let mut item = heap.allocate().unwrap();

        heap.deallocate(&mut item).unwrap();
        assert!(heap.deallocate(&mut item).is_err());
        assert_eq!(heap.size(), 0);
    }

    #[test]
    fn test_stop_allocation() {
        let heap: SmallHeap<u8, 4> = SmallHeap::new();
        let mut item = heap.allocate().unwrap();

        heap.stop_allocation();
        assert!(heap.is_allocation_stopped());
        assert!(heap.allocate().is_none());

        // Returning still works after stop
        heap.deallocate(&mut item).unwrap();
        assert!(heap.is_empty());
    }

    #[test]
    fn test_wait_until_empty_wakes_on_last_return() {
        let heap: Arc<SmallHeap<u8, 4>> = Arc::new(SmallHeap::new());
        let mut items: Vec<_> = (0..3).map(|_| heap.allocate().unwrap()).collect();

        let returner = {
            let heap = heap.clone();
            thread::spawn(move || {
                for item in items.iter_mut() {
                    thread::sleep(Duration::from_millis(5));
                    heap.deallocate(item).unwrap();
                }
            })
        };

        heap.wait_until_empty_for(Duration::from_secs(5)).unwrap();
        assert!(heap.is_empty());
        returner.join().unwrap();
    }

    #[test]
    fn test_wait_until_empty_times_out() {
        let heap: SmallHeap<u8, 1> = SmallHeap::new();
        let _held = heap.allocate().unwrap();

        let err = heap
            .wait_until_empty_for(Duration::from_millis(20))
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let heap: Arc<SmallHeap<u8, 64>> = Arc::new(SmallHeap::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let heap = heap.clone();
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(item) = heap.allocate() {
                        got.push(item);
                    }
                    got
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for item in handle.join().unwrap() {
                assert!(seen.insert(item.index().unwrap()), "slot handed out twice");
                total += 1;
            }
        }
        assert_eq!(total, 64);
        assert_eq!(heap.size(), 64);
    }
}
