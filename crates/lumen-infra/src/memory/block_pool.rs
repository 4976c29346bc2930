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

//! A pooled allocator serving one fixed block size class.
//!
//! Freed blocks are retained on a free list and reused LIFO, so a steady
//! frame workload stops touching the system allocator after warm-up. The
//! pool increments the global counters in [`lumen_core::memory`] so
//! monitoring code can observe page traffic engine-wide.

use std::alloc::{alloc, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use lumen_core::memory::{
    PagePool, CURRENT_POOLED_BYTES, PEAK_POOLED_BYTES, POOL_HITS, POOL_MISSES,
    TOTAL_BLOCK_ALLOCATIONS, TOTAL_BLOCK_RELEASES,
};

/// Blocks must sit on the command slot grid of the consumer.
const BLOCK_ALIGN: usize = 16;

/// A configuration problem detected when constructing a
/// [`PooledBlockAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPoolConfigError {
    /// The block size was zero.
    ZeroBlockSize,
    /// The block size was not a multiple of the 16-byte block alignment.
    UnalignedBlockSize {
        /// The rejected block size.
        block_size: usize,
    },
    /// The pool capacity was zero blocks.
    ZeroCapacity,
}

impl fmt::Display for BlockPoolConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPoolConfigError::ZeroBlockSize => {
                write!(f, "Block pool configured with a zero block size.")
            }
            BlockPoolConfigError::UnalignedBlockSize { block_size } => {
                write!(
                    f,
                    "Block size {block_size} is not a multiple of the {BLOCK_ALIGN}-byte block alignment."
                )
            }
            BlockPoolConfigError::ZeroCapacity => {
                write!(f, "Block pool configured with a capacity of zero blocks.")
            }
        }
    }
}

impl std::error::Error for BlockPoolConfigError {}

/// Blocks cached for reuse plus the count of blocks ever taken from the
/// system allocator.
struct PoolState {
    free: Vec<NonNull<u8>>,
    owned: usize,
}

// SAFETY: PoolState owns the raw block addresses it stores; access is
// serialized by the Mutex in PooledBlockAllocator.
unsafe impl Send for PoolState {}

/// Thread-safe, fixed-size-block pool backing command buffer pages.
///
/// The pool serves exactly one block size class. At most `max_blocks`
/// blocks are ever taken from the system allocator; once all of them are
/// outstanding, [`create_block`](PagePool::create_block) reports exhaustion
/// with `None` and the caller degrades. Returned blocks go back on the free
/// list and are only released to the system when the pool is dropped.
///
/// Acquisition and release are O(1) (a `Vec` push/pop under a mutex) and
/// never copy block contents.
pub struct PooledBlockAllocator {
    state: Mutex<PoolState>,
    block_size: usize,
    max_blocks: usize,
}

impl PooledBlockAllocator {
    /// Creates a pool serving `block_size`-byte blocks, at most
    /// `max_blocks` of them outstanding at once.
    pub fn new(block_size: usize, max_blocks: usize) -> Result<Self, BlockPoolConfigError> {
        if block_size == 0 {
            return Err(BlockPoolConfigError::ZeroBlockSize);
        }
        if block_size % BLOCK_ALIGN != 0 {
            return Err(BlockPoolConfigError::UnalignedBlockSize { block_size });
        }
        if max_blocks == 0 {
            return Err(BlockPoolConfigError::ZeroCapacity);
        }
        log::info!(
            "Block pool initialized: {max_blocks} blocks of {block_size} bytes ({} KiB budget).",
            block_size * max_blocks / 1024
        );
        Ok(Self {
            // Reserve up front so the critical section never reallocates.
            state: Mutex::new(PoolState {
                free: Vec::with_capacity(max_blocks),
                owned: 0,
            }),
            block_size,
            max_blocks,
        })
    }

    /// The single block size this pool serves.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Maximum number of blocks this pool will ever hand out concurrently.
    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    /// Number of blocks currently cached on the free list.
    pub fn cached_blocks(&self) -> usize {
        self.state.lock().unwrap().free.len()
    }

    /// Number of blocks currently outstanding to callers.
    pub fn live_blocks(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.owned - state.free.len()
    }

    fn layout(&self) -> Layout {
        // Validated in new(): non-zero and a multiple of BLOCK_ALIGN.
        Layout::from_size_align(self.block_size, BLOCK_ALIGN)
            .expect("block layout validated at construction")
    }
}

impl PagePool for PooledBlockAllocator {
    fn create_block(&self, size: usize) -> Option<NonNull<u8>> {
        if size != self.block_size {
            log::warn!(
                "Block pool serves {}-byte blocks but {size} bytes were requested.",
                self.block_size
            );
            return None;
        }

        let mut state = self.state.lock().unwrap();
        let block = match state.free.pop() {
            Some(block) => {
                POOL_HITS.fetch_add(1, Ordering::Relaxed);
                block
            }
            None => {
                if state.owned >= self.max_blocks {
                    log::trace!("Block pool exhausted ({} blocks outstanding).", state.owned);
                    return None;
                }
                // SAFETY: the layout has a non-zero, validated size.
                let raw = unsafe { alloc(self.layout()) };
                let Some(block) = NonNull::new(raw) else {
                    log::error!("System allocation of a {size}-byte block failed.");
                    return None;
                };
                state.owned += 1;
                POOL_MISSES.fetch_add(1, Ordering::Relaxed);
                block
            }
        };
        drop(state);

        TOTAL_BLOCK_ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        let current = CURRENT_POOLED_BYTES.fetch_add(size, Ordering::Relaxed) + size;
        PEAK_POOLED_BYTES.fetch_max(current as u64, Ordering::Relaxed);
        Some(block)
    }

    unsafe fn destroy_block(&self, block: NonNull<u8>, size: usize) {
        debug_assert_eq!(size, self.block_size, "block returned to the wrong pool");
        self.state.lock().unwrap().free.push(block);
        TOTAL_BLOCK_RELEASES.fetch_add(1, Ordering::Relaxed);
        CURRENT_POOLED_BYTES.fetch_sub(size, Ordering::Relaxed);
    }
}

impl Drop for PooledBlockAllocator {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.free.len() != state.owned {
            log::warn!(
                "Block pool dropped with {} block(s) still outstanding; they will leak.",
                state.owned - state.free.len()
            );
        }
        for block in state.free.drain(..) {
            // SAFETY: every cached block was obtained from `alloc` with this
            // pool's layout and is not referenced anywhere else.
            unsafe {
                dealloc(
                    block.as_ptr(),
                    Layout::from_size_align(self.block_size, BLOCK_ALIGN)
                        .expect("block layout validated at construction"),
                )
            };
        }
    }
}

impl fmt::Debug for PooledBlockAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBlockAllocator")
            .field("block_size", &self.block_size)
            .field("max_blocks", &self.max_blocks)
            .field("cached", &self.cached_blocks())
            .field("live", &self.live_blocks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const BLOCK: usize = 1024;

    #[test]
    fn configuration_is_validated() {
        assert_eq!(
            PooledBlockAllocator::new(0, 4).unwrap_err(),
            BlockPoolConfigError::ZeroBlockSize
        );
        assert_eq!(
            PooledBlockAllocator::new(100, 4).unwrap_err(),
            BlockPoolConfigError::UnalignedBlockSize { block_size: 100 }
        );
        assert_eq!(
            PooledBlockAllocator::new(BLOCK, 0).unwrap_err(),
            BlockPoolConfigError::ZeroCapacity
        );
        let error = PooledBlockAllocator::new(100, 4).unwrap_err();
        assert!(error.to_string().contains("100"));
    }

    #[test]
    fn blocks_are_recycled_lifo() {
        let pool = PooledBlockAllocator::new(BLOCK, 4).unwrap();
        let first = pool.create_block(BLOCK).unwrap();
        assert_eq!(pool.live_blocks(), 1);
        assert_eq!(pool.cached_blocks(), 0);

        // SAFETY: `first` came from this pool with a matching size.
        unsafe { pool.destroy_block(first, BLOCK) };
        assert_eq!(pool.live_blocks(), 0);
        assert_eq!(pool.cached_blocks(), 1);

        let second = pool.create_block(BLOCK).unwrap();
        assert_eq!(second, first, "the cached block is reused");
        // SAFETY: same provenance as above.
        unsafe { pool.destroy_block(second, BLOCK) };
    }

    #[test]
    fn exhaustion_reports_none_until_a_block_returns() {
        let pool = PooledBlockAllocator::new(BLOCK, 2).unwrap();
        let a = pool.create_block(BLOCK).unwrap();
        let b = pool.create_block(BLOCK).unwrap();
        assert!(pool.create_block(BLOCK).is_none(), "pool is exhausted");

        // SAFETY: `a` came from this pool with a matching size.
        unsafe { pool.destroy_block(a, BLOCK) };
        let again = pool.create_block(BLOCK).expect("a block came back");

        // SAFETY: both blocks are live and from this pool.
        unsafe {
            pool.destroy_block(again, BLOCK);
            pool.destroy_block(b, BLOCK);
        }
    }

    #[test]
    fn mismatched_sizes_are_refused() {
        let pool = PooledBlockAllocator::new(BLOCK, 2).unwrap();
        assert!(pool.create_block(BLOCK * 2).is_none());
        assert!(pool.create_block(16).is_none());
    }

    #[test]
    fn blocks_are_slot_aligned() {
        let pool = PooledBlockAllocator::new(BLOCK, 1).unwrap();
        let block = pool.create_block(BLOCK).unwrap();
        assert_eq!(block.as_ptr() as usize % BLOCK_ALIGN, 0);
        // SAFETY: `block` came from this pool with a matching size.
        unsafe { pool.destroy_block(block, BLOCK) };
    }

    #[test]
    fn concurrent_create_and_destroy() {
        let pool = Arc::new(PooledBlockAllocator::new(BLOCK, 64).unwrap());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let block = pool.create_block(BLOCK).expect("capacity suffices");
                    // SAFETY: `block` is ours until destroyed below.
                    unsafe {
                        block.as_ptr().write(0xA5);
                        pool.destroy_block(block, BLOCK);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }
        assert_eq!(pool.live_blocks(), 0);
        assert!(pool.cached_blocks() <= 4);
    }

    #[test]
    fn global_counters_observe_traffic() {
        use lumen_core::memory::page_pool_stats;

        let before = page_pool_stats();
        let pool = PooledBlockAllocator::new(BLOCK, 2).unwrap();
        let block = pool.create_block(BLOCK).unwrap();
        // SAFETY: `block` came from this pool with a matching size.
        unsafe { pool.destroy_block(block, BLOCK) };
        let block = pool.create_block(BLOCK).unwrap();
        // SAFETY: same provenance as above.
        unsafe { pool.destroy_block(block, BLOCK) };

        // Other tests run in parallel against the same globals, so only
        // check monotonic deltas.
        let after = page_pool_stats();
        assert!(after.total_block_allocations >= before.total_block_allocations + 2);
        assert!(after.total_block_releases >= before.total_block_releases + 2);
        assert!(after.pool_hits >= before.pool_hits + 1);
        assert!(after.pool_misses >= before.pool_misses + 1);
    }
}
