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

//! Paged, zero-copy command buffer with priority-ordered execution.

use std::cell::UnsafeCell;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::header::{CommandBufferStats, CommandHeader};
use super::page::{self, align_up, Page, COMMAND_ALIGN, PAGE_SIZE};
use super::storage::{Command, CommandStorage};
use super::types::CommandPriority;
use crate::memory::PagePool;

/// Per-priority page chains. Only ever touched by the party that currently
/// owns the buffer (see the `Sync` safety note on [`CommandBuffer`]).
struct PageChains {
    /// Head of each priority's linked list.
    heads: [Option<NonNull<Page>>; CommandPriority::COUNT],
    /// Append position of each priority's linked list.
    currents: [Option<NonNull<Page>>; CommandPriority::COUNT],
}

impl PageChains {
    const fn empty() -> Self {
        Self {
            heads: [None; CommandPriority::COUNT],
            currents: [None; CommandPriority::COUNT],
        }
    }
}

/// One recording/execution unit of the command system.
///
/// A producer records typed commands with [`record`](Self::record); each
/// command is constructed directly in its final page slot, so no
/// intermediate copy of the payload is ever made. When the batch is
/// complete the producer calls [`mark_ready`](Self::mark_ready) and the
/// render thread, once it observes [`is_ready`](Self::is_ready), replays
/// the batch with [`execute`](Self::execute) in priority order
/// High -> Normal -> Low.
///
/// Lifecycle: created empty -> commands recorded (pages allocated lazily)
/// -> `mark_ready` -> executed zero or more times by the consumer ->
/// [`reset`](Self::reset) returns every page to the allocator and makes the
/// buffer reusable. A reset is all-or-nothing.
///
/// # Thread contract
///
/// Exactly one thread may record into an acquired buffer at a time; this
/// single-writer discipline is a caller contract and is not enforced here.
/// The release store of `mark_ready` paired with the acquire load of
/// `is_ready` is the only synchronization between the recording and the
/// consuming thread: once a consumer observes readiness, every command
/// write that preceded it is visible.
pub struct CommandBuffer {
    chains: UnsafeCell<PageChains>,
    command_counts: [AtomicU32; CommandPriority::COUNT],
    page_counts: [AtomicU32; CommandPriority::COUNT],
    memory_used: AtomicU32,
    commands_recorded: AtomicU32,
    commands_executed: AtomicU32,
    total_bytes_used: AtomicU64,
    memory_allocations: AtomicU32,
    ready: AtomicBool,
    pool: Arc<dyn PagePool>,
}

// SAFETY: the page chains are raw pointers into pool blocks owned solely by
// this buffer, so sending the buffer to another thread moves that ownership
// with it.
unsafe impl Send for CommandBuffer {}

// SAFETY: all counters and the ready flag are atomics; the non-atomic page
// chains are only accessed by the single logical owner of the buffer at any
// point of its lifecycle (the recording thread before `mark_ready`, the
// consumer after observing `is_ready`, the releasing owner during `reset`),
// with the release/acquire pair ordering the handoff between them.
unsafe impl Sync for CommandBuffer {}

impl CommandBuffer {
    /// Data capacity of each memory page (64 KiB).
    ///
    /// This constant defines the allocation granularity of the buffer: every
    /// page stores many commands, and a new page is fetched from the pool
    /// only when the current one is full.
    pub const PAGE_SIZE: usize = PAGE_SIZE;

    /// Total block size requested from the [`PagePool`] for one page
    /// (page header + data capacity). Pool implementations serving a single
    /// size class should be configured with this block size.
    pub const PAGE_ALLOCATION_SIZE: usize = Page::ALLOCATION_SIZE;

    /// Creates an empty buffer drawing its pages from `pool`.
    pub fn new(pool: Arc<dyn PagePool>) -> Self {
        Self {
            chains: UnsafeCell::new(PageChains::empty()),
            command_counts: std::array::from_fn(|_| AtomicU32::new(0)),
            page_counts: std::array::from_fn(|_| AtomicU32::new(0)),
            memory_used: AtomicU32::new(0),
            commands_recorded: AtomicU32::new(0),
            commands_executed: AtomicU32::new(0),
            total_bytes_used: AtomicU64::new(0),
            memory_allocations: AtomicU32::new(0),
            ready: AtomicBool::new(false),
            pool,
        }
    }

    /// Records a command directly into buffer memory.
    ///
    /// The command is written in place into its page slot together with a
    /// fully-populated header; the payload is never copied through an
    /// intermediate buffer. If the page pool is exhausted the command is
    /// silently dropped; no error is signaled and nothing is logged.
    /// Callers that need a delivery guarantee compare
    /// [`command_count`](Self::command_count) deltas.
    pub fn record<C: Command>(&self, command: C) {
        let priority = C::PRIORITY;
        let Some(slot) = self.allocate_space(mem::size_of::<CommandStorage<C>>(), priority)
        else {
            return;
        };
        // SAFETY: `slot` is 16-byte aligned, spans at least
        // size_of::<CommandStorage<C>>() bytes inside a page owned by this
        // buffer, and is not published to the consumer until mark_ready.
        unsafe {
            slot.cast::<CommandStorage<C>>()
                .as_ptr()
                .write(CommandStorage::new(command));
        }
        self.command_counts[priority as usize].fetch_add(1, Ordering::Relaxed);
        self.commands_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Executes every recorded command, priorities High -> Normal -> Low.
    ///
    /// Within one priority, commands run in recording order. Execution
    /// never mutates page contents, so a ready buffer can be executed more
    /// than once. This path has no unwinding of its own; a header whose
    /// declared size overruns the page's used region (or is zero) stops the
    /// scan of that page, silently discarding the remaining bytes.
    pub fn execute(&self) {
        for priority in CommandPriority::ALL {
            self.execute_priority(priority);
        }
    }

    fn execute_priority(&self, priority: CommandPriority) {
        // SAFETY: we are the consuming side; per the thread contract the
        // producer stopped touching the chains before mark_ready, and the
        // acquire load that led here ordered its writes before our reads.
        let chains = unsafe { &*self.chains.get() };
        let mut current = chains.heads[priority as usize];
        while let Some(page) = current {
            // SAFETY: `page` is a live page owned by this buffer.
            let used = unsafe { page.as_ref().used } as usize;
            // SAFETY: same page, data region valid for `used` bytes.
            let data = unsafe { Page::data_ptr(page) } as *const u8;
            let mut offset = 0usize;
            while offset < used {
                // SAFETY: `offset` is 16-aligned and < used <= PAGE_SIZE, so
                // a full header fits (commands are never split across pages).
                let header = unsafe { &*data.add(offset).cast::<CommandHeader>() };
                let size = header.size as usize;
                if size == 0 || offset + size > used {
                    // Corrupted command stream: stop scanning this page.
                    break;
                }
                if let Some(execute) = header.execute {
                    // SAFETY: the header was written by record() together
                    // with a payload of the type `execute` expects.
                    unsafe { execute(header) };
                    self.commands_executed.fetch_add(1, Ordering::Relaxed);
                }
                offset = align_up(offset + size, COMMAND_ALIGN);
            }
            // SAFETY: `page` is still live; `next` is owned by this chain.
            current = unsafe { page.as_ref().next };
        }
    }

    /// Resets the buffer, returning every page to the pool.
    ///
    /// Clears all counters, the cumulative statistics and the ready flag.
    /// All-or-nothing; safe to call on an already-empty buffer. The caller
    /// must have exclusive logical ownership (no concurrent recording or
    /// execution).
    pub fn reset(&self) {
        self.free_pages();
        for index in 0..CommandPriority::COUNT {
            self.command_counts[index].store(0, Ordering::Relaxed);
        }
        self.commands_recorded.store(0, Ordering::Relaxed);
        self.commands_executed.store(0, Ordering::Relaxed);
        self.total_bytes_used.store(0, Ordering::Relaxed);
        self.memory_allocations.store(0, Ordering::Relaxed);
        // Release pairs with the acquire in is_ready so a consumer that
        // still observes `true` never sees freed chains.
        self.ready.store(false, Ordering::Release);
    }

    /// `true` if no commands are recorded at any priority.
    pub fn is_empty(&self) -> bool {
        self.command_counts
            .iter()
            .all(|count| count.load(Ordering::Relaxed) == 0)
    }

    /// Total number of recorded commands across all priorities.
    pub fn command_count(&self) -> u32 {
        self.command_counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    /// Number of recorded commands at one priority level.
    pub fn command_count_for(&self, priority: CommandPriority) -> u32 {
        self.command_counts[priority as usize].load(Ordering::Relaxed)
    }

    /// Total bytes of page memory consumed by recorded commands.
    pub fn memory_used(&self) -> u32 {
        self.memory_used.load(Ordering::Relaxed)
    }

    /// Number of pages currently allocated across all priorities.
    pub fn page_count(&self) -> u32 {
        self.page_counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    /// Snapshot of the buffer's cumulative performance counters.
    pub fn stats(&self) -> CommandBufferStats {
        CommandBufferStats {
            commands_recorded: self.commands_recorded.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            total_bytes_used: self.total_bytes_used.load(Ordering::Relaxed),
            page_count: self.page_count(),
            memory_allocations: self.memory_allocations.load(Ordering::Relaxed),
        }
    }

    /// Marks the buffer complete and publishes it to the consumer.
    ///
    /// Release ordering guarantees that every command recorded before this
    /// call is visible to a consumer that observes [`is_ready`](Self::is_ready)
    /// returning `true`.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// `true` once the producer has published a complete batch.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Bump-allocates `size` bytes (rounded up to the 16-byte slot grid)
    /// from the priority's current page, fetching and linking a new page
    /// when needed. `None` when the pool is exhausted or the command cannot
    /// fit a page at all.
    fn allocate_space(&self, size: usize, priority: CommandPriority) -> Option<NonNull<u8>> {
        let size = align_up(size, COMMAND_ALIGN);
        if size == 0 || size > PAGE_SIZE {
            return None;
        }
        let index = priority as usize;
        // SAFETY: recording side; the caller owns the buffer exclusively
        // between acquire and mark_ready per the thread contract.
        let chains = unsafe { &mut *self.chains.get() };

        let current = match chains.currents[index] {
            // SAFETY: pages linked into the chain stay live until reset.
            Some(page) if (unsafe { page.as_ref().used } as usize) + size <= PAGE_SIZE => page,
            _ => {
                let fresh = page::new_page(self.pool.as_ref())?;
                match chains.currents[index] {
                    // SAFETY: the old current page is live; linking the
                    // fresh page onto its tail keeps single ownership.
                    Some(tail) => unsafe { (*tail.as_ptr()).next = Some(fresh) },
                    None => chains.heads[index] = Some(fresh),
                }
                chains.currents[index] = Some(fresh);
                self.page_counts[index].fetch_add(1, Ordering::Relaxed);
                self.memory_allocations.fetch_add(1, Ordering::Relaxed);
                self.total_bytes_used
                    .fetch_add(Page::ALLOCATION_SIZE as u64, Ordering::Relaxed);
                fresh
            }
        };

        // SAFETY: `current` is live, `used + size <= PAGE_SIZE` was just
        // established, so the slot lies inside the page's data region.
        let slot = unsafe {
            let used = current.as_ref().used as usize;
            let ptr = Page::data_ptr(current).add(used);
            (*current.as_ptr()).used = (used + size) as u32;
            NonNull::new_unchecked(ptr)
        };
        self.memory_used.fetch_add(size as u32, Ordering::Relaxed);
        Some(slot)
    }

    /// Returns every page of every priority to the pool and clears the
    /// chain pointers, page counts and memory counter.
    fn free_pages(&self) {
        // SAFETY: exclusive logical ownership, same contract as reset().
        let chains = unsafe { &mut *self.chains.get() };
        for index in 0..CommandPriority::COUNT {
            // SAFETY: every page in the chain came from new_page on this
            // buffer's pool and is not referenced after this point.
            unsafe { page::free_chain(self.pool.as_ref(), chains.heads[index].take()) };
            chains.currents[index] = None;
            self.page_counts[index].store(0, Ordering::Relaxed);
        }
        self.memory_used.store(0, Ordering::Relaxed);
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.free_pages();
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("commands", &self.command_count())
            .field("pages", &self.page_count())
            .field("memory_used", &self.memory_used())
            .field("ready", &self.is_ready())
            .finish()
    }
}
