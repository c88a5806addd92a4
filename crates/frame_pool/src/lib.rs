//! # Frame Pool
//!
//! Fixed-capacity pooled allocator for frame objects.
//!
//! Slots are recycled instead of freed, and allocation fails fast when the
//! pool is exhausted. Teardown stops allocation and then blocks until every
//! outstanding slot is returned.

mod heap;

pub use heap::{HeapItem, SmallHeap, DEFAULT_DRAIN_TIMEOUT};
