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

use std::ptr::NonNull;

/// Contract for the external pooled allocator that backs command pages.
///
/// The command core never allocates or frees page memory itself; it requests
/// fixed-size raw blocks through this trait and lays its own page structure
/// over them (linked-list header first, command storage after). Any pooled
/// allocator backend can implement this trait to be compatible with the
/// engine.
///
/// Implementations must be callable concurrently from many threads: buffers
/// across multiple windows allocate and free pages at the same time.
pub trait PagePool: Send + Sync {
    /// Requests one block of exactly `size` bytes, aligned to 16 bytes.
    ///
    /// Returns `None` when the pool is exhausted. Exhaustion is not fatal;
    /// callers check and degrade (a failed command allocation drops the
    /// command, it never aborts the frame).
    ///
    /// Expected O(1) cost, no data copying on growth.
    fn create_block(&self, size: usize) -> Option<NonNull<u8>>;

    /// Returns a block previously handed out by [`create_block`].
    ///
    /// [`create_block`]: PagePool::create_block
    ///
    /// # Safety
    ///
    /// - `block` must originate from `create_block(size)` on this same pool.
    /// - `size` must match the size the block was created with.
    /// - `block` must not have been destroyed already, and the caller must
    ///   not touch it afterwards.
    unsafe fn destroy_block(&self, block: NonNull<u8>, size: usize);
}
