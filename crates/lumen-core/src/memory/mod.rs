// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The page-allocator contract and engine-wide pool statistics.
//!
//! This module defines a set of global atomic counters for page-pool
//! tracking. It forms a "contract" where the registered [`PagePool`]
//! implementation is responsible for incrementing these counters, and any
//! part of the engine can read them in a thread-safe manner to monitor how
//! command recording consumes pooled memory.

mod pool;

pub use pool::PagePool;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

// --- Global Pool Counters ---

/// Total bytes currently held by live blocks handed out by the pool.
pub static CURRENT_POOLED_BYTES: AtomicUsize = AtomicUsize::new(0);

/// Peak number of bytes ever held simultaneously by live blocks.
pub static PEAK_POOLED_BYTES: AtomicU64 = AtomicU64::new(0);

/// Total number of block allocations served.
pub static TOTAL_BLOCK_ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// Total number of blocks returned to the pool.
pub static TOTAL_BLOCK_RELEASES: AtomicU64 = AtomicU64::new(0);

/// Allocations served from the pool's free list.
pub static POOL_HITS: AtomicU64 = AtomicU64::new(0);

/// Allocations that had to fall through to the system allocator.
pub static POOL_MISSES: AtomicU64 = AtomicU64::new(0);

// --- Data Structures for Reporting ---

/// A snapshot of the page-pool counters, including derived metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PagePoolStats {
    /// Bytes currently held by live blocks.
    pub current_pooled_bytes: usize,
    /// Maximum bytes ever held simultaneously.
    pub peak_pooled_bytes: u64,
    /// Total block allocations served.
    pub total_block_allocations: u64,
    /// Total blocks returned.
    pub total_block_releases: u64,
    /// Net number of blocks currently outstanding.
    pub outstanding_blocks: i64,
    /// Allocations served from the free list.
    pub pool_hits: u64,
    /// Allocations that went to the system allocator.
    pub pool_misses: u64,
    /// Fraction of allocations served from the free list.
    pub hit_rate: f64,
}

impl PagePoolStats {
    /// Populates the derived metrics from the raw counter values.
    pub fn calculate_derived_metrics(&mut self) {
        self.outstanding_blocks =
            self.total_block_allocations as i64 - self.total_block_releases as i64;
        if self.total_block_allocations > 0 {
            self.hit_rate = self.pool_hits as f64 / self.total_block_allocations as f64;
        }
    }
}

// --- Public API for Reading Stats ---

/// Takes a snapshot of all pool counters and returns them in a structured
/// format.
///
/// All counters are read with `Ordering::Relaxed`; the snapshot is
/// internally consistent enough for monitoring, not for accounting.
pub fn page_pool_stats() -> PagePoolStats {
    let mut stats = PagePoolStats {
        current_pooled_bytes: CURRENT_POOLED_BYTES.load(Ordering::Relaxed),
        peak_pooled_bytes: PEAK_POOLED_BYTES.load(Ordering::Relaxed),
        total_block_allocations: TOTAL_BLOCK_ALLOCATIONS.load(Ordering::Relaxed),
        total_block_releases: TOTAL_BLOCK_RELEASES.load(Ordering::Relaxed),
        pool_hits: POOL_HITS.load(Ordering::Relaxed),
        pool_misses: POOL_MISSES.load(Ordering::Relaxed),
        ..Default::default()
    };
    stats.calculate_derived_metrics();
    stats
}

/// Bytes currently held by live pool blocks.
///
/// Lightweight alternative to [`page_pool_stats`] when only the current
/// usage is needed.
pub fn current_pooled_bytes() -> usize {
    CURRENT_POOLED_BYTES.load(Ordering::Relaxed)
}

#[cfg(test)]
pub(crate) mod testing {
    //! A minimal, self-contained pool for unit tests of the command core.
    //!
    //! Serves every request straight from the system allocator so core tests
    //! do not depend on a concrete pool implementation. An optional capacity
    //! makes exhaustion testable.

    use super::PagePool;
    use std::alloc::{alloc, dealloc, Layout};
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct SystemPagePool {
        live: AtomicUsize,
        max_blocks: usize,
    }

    impl SystemPagePool {
        pub(crate) fn new() -> Self {
            Self::with_max_blocks(usize::MAX)
        }

        pub(crate) fn with_max_blocks(max_blocks: usize) -> Self {
            Self {
                live: AtomicUsize::new(0),
                max_blocks,
            }
        }

        pub(crate) fn live_blocks(&self) -> usize {
            self.live.load(Ordering::Relaxed)
        }

        fn layout(size: usize) -> Layout {
            Layout::from_size_align(size, 16).expect("test block layout")
        }
    }

    impl PagePool for SystemPagePool {
        fn create_block(&self, size: usize) -> Option<NonNull<u8>> {
            if self.live.load(Ordering::Relaxed) >= self.max_blocks {
                return None;
            }
            // SAFETY: the layout has non-zero size for every page request.
            let ptr = unsafe { alloc(Self::layout(size)) };
            let block = NonNull::new(ptr)?;
            self.live.fetch_add(1, Ordering::Relaxed);
            Some(block)
        }

        unsafe fn destroy_block(&self, block: NonNull<u8>, size: usize) {
            self.live.fetch_sub(1, Ordering::Relaxed);
            // SAFETY: per the trait contract, `block` came from create_block
            // with the same `size`, i.e. from `alloc` with the same layout.
            unsafe { dealloc(block.as_ptr(), Self::layout(size)) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_metrics_from_raw_counters() {
        let mut stats = PagePoolStats {
            total_block_allocations: 8,
            total_block_releases: 3,
            pool_hits: 6,
            pool_misses: 2,
            ..Default::default()
        };
        stats.calculate_derived_metrics();
        assert_eq!(stats.outstanding_blocks, 5);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn derived_metrics_tolerate_zero_activity() {
        let mut stats = PagePoolStats::default();
        stats.calculate_derived_metrics();
        assert_eq!(stats.outstanding_blocks, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_pool_tracks_live_blocks() {
        use super::testing::SystemPagePool;

        let pool = SystemPagePool::with_max_blocks(2);
        let a = pool.create_block(256).expect("first block");
        let b = pool.create_block(256).expect("second block");
        assert_eq!(pool.live_blocks(), 2);
        assert!(pool.create_block(256).is_none(), "pool is exhausted");

        // SAFETY: both blocks came from this pool with matching sizes.
        unsafe {
            pool.destroy_block(a, 256);
            pool.destroy_block(b, 256);
        }
        assert_eq!(pool.live_blocks(), 0);
    }
}
