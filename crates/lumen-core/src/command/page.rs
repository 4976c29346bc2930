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

//! Fixed-capacity command pages and their binding to the external pool.
//!
//! A page is one raw block from the [`PagePool`]: an intrusive linked-list
//! header at offset 0 and a fixed 64 KiB data region after it. The buffer
//! indexes into the data region with explicit offsets (arena + cursor); no
//! trailing-array tricks.

use std::ptr::NonNull;

use crate::memory::PagePool;

/// Data capacity of one page in bytes.
pub(crate) const PAGE_SIZE: usize = 64 * 1024;

/// Alignment of every command slot within a page.
pub(crate) const COMMAND_ALIGN: usize = 16;

/// Intrusive singly linked list node heading each pool block.
///
/// `used` counts the bytes consumed from the data region and never exceeds
/// [`PAGE_SIZE`]. All command writes within a page are 16-byte aligned and
/// tightly packed.
#[repr(C, align(16))]
pub(crate) struct Page {
    /// Owning pointer to the next page in this priority's chain.
    pub(crate) next: Option<NonNull<Page>>,
    /// Bytes consumed from the data region.
    pub(crate) used: u32,
}

// The data region must start on a command-slot boundary.
const _: () = assert!(std::mem::size_of::<Page>() % COMMAND_ALIGN == 0);
const _: () = assert!(PAGE_SIZE <= u32::MAX as usize);

impl Page {
    /// Offset of the data region from the start of the block.
    pub(crate) const DATA_OFFSET: usize = std::mem::size_of::<Page>();

    /// Total block size requested from the pool (header + data region).
    pub(crate) const ALLOCATION_SIZE: usize = Self::DATA_OFFSET + PAGE_SIZE;

    /// Pointer to the first byte of the page's data region.
    ///
    /// # Safety
    ///
    /// `page` must point to a live page obtained from [`new_page`], so that
    /// the full [`ALLOCATION_SIZE`](Self::ALLOCATION_SIZE) block is owned by
    /// it.
    pub(crate) unsafe fn data_ptr(page: NonNull<Page>) -> *mut u8 {
        // SAFETY: the block behind `page` spans DATA_OFFSET + PAGE_SIZE
        // bytes, so the offset stays inside the same allocation.
        unsafe { page.as_ptr().cast::<u8>().add(Self::DATA_OFFSET) }
    }
}

/// Requests one page from the pool and initializes its header.
///
/// Returns `None` when the pool is exhausted; the caller checks and degrades.
pub(crate) fn new_page(pool: &dyn PagePool) -> Option<NonNull<Page>> {
    let block = pool.create_block(Page::ALLOCATION_SIZE)?;
    let page = block.cast::<Page>();
    // SAFETY: the block is at least ALLOCATION_SIZE bytes and 16-byte
    // aligned per the PagePool contract, so a Page header fits at offset 0.
    unsafe {
        page.as_ptr().write(Page {
            next: None,
            used: 0,
        });
    }
    Some(page)
}

/// Walks a page chain and returns every page to the pool.
///
/// # Safety
///
/// Every page reachable from `head` must have come from [`new_page`] on the
/// same pool and must not be referenced again afterwards.
pub(crate) unsafe fn free_chain(pool: &dyn PagePool, head: Option<NonNull<Page>>) {
    let mut current = head;
    while let Some(page) = current {
        // SAFETY: `page` is live until destroy_block below; reading `next`
        // first keeps the walk valid after the block is returned.
        let next = unsafe { page.as_ref().next };
        // SAFETY: the block was created with ALLOCATION_SIZE on this pool.
        unsafe { pool.destroy_block(page.cast::<u8>(), Page::ALLOCATION_SIZE) };
        current = next;
    }
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}
