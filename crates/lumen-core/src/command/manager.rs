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

//! Per-window command buffer pools with O(1) acquire/release recycling.

use std::sync::{Arc, Mutex};

use super::buffer::CommandBuffer;
use crate::memory::PagePool;

/// Maximum number of windows a manager supports.
pub const MAX_WINDOWS: usize = 8;

/// Number of command buffers allocated per window.
pub const BUFFERS_PER_WINDOW: usize = 16;

/// Stack of free buffer indices for one window pool.
///
/// Invariant: every buffer index appears either exactly once on this stack
/// or is currently in use, never both and never neither. `top` ranges over
/// `[-1, BUFFERS_PER_WINDOW - 1]`.
struct FreeStack {
    indices: [u32; BUFFERS_PER_WINDOW],
    top: i32,
}

impl FreeStack {
    /// Starts full: every index is free.
    fn full() -> Self {
        Self {
            indices: std::array::from_fn(|index| index as u32),
            top: BUFFERS_PER_WINDOW as i32 - 1,
        }
    }

    fn pop(&mut self) -> Option<u32> {
        if self.top < 0 {
            return None;
        }
        let index = self.indices[self.top as usize];
        self.top -= 1;
        Some(index)
    }

    fn push(&mut self, index: u32) {
        if self.top + 1 < BUFFERS_PER_WINDOW as i32 {
            self.top += 1;
            self.indices[self.top as usize] = index;
        }
    }

    fn len(&self) -> u32 {
        (self.top + 1) as u32
    }

    fn contains(&self, index: u32) -> bool {
        self.indices[..self.len() as usize].contains(&index)
    }

    /// Bitmask of the indices currently in use (absent from the stack).
    fn in_use_mask(&self) -> u32 {
        let mut mask = (1u32 << BUFFERS_PER_WINDOW) - 1;
        for &index in &self.indices[..self.len() as usize] {
            mask &= !(1 << index);
        }
        mask
    }
}

/// Buffers and free-list bookkeeping for one window.
struct WindowBufferPool {
    buffers: Vec<CommandBuffer>,
    free: Mutex<FreeStack>,
}

impl WindowBufferPool {
    fn new(pool: &Arc<dyn PagePool>) -> Self {
        Self {
            buffers: (0..BUFFERS_PER_WINDOW)
                .map(|_| CommandBuffer::new(pool.clone()))
                .collect(),
            free: Mutex::new(FreeStack::full()),
        }
    }
}

/// Owns a fixed pool of reusable [`CommandBuffer`]s per window and drives
/// batch execution across windows.
///
/// Producers acquire a buffer for their window, record into it, mark it
/// ready and leave it to the render thread, which executes every ready
/// non-empty buffer of the window. Executed buffers stay in use: the
/// acquiring side must hand them back with
/// [`release_buffer`](Self::release_buffer) once the frame is done; the
/// manager never recycles a buffer on its own.
///
/// Acquire and release are O(1) stack operations under a per-window mutex;
/// execution itself takes no lock.
pub struct CommandBufferManager {
    window_count: u32,
    pools: Vec<WindowBufferPool>,
}

impl CommandBufferManager {
    /// Creates pools for `window_count` windows (clamped to
    /// [`MAX_WINDOWS`]), all drawing pages from the given allocator.
    pub fn new(window_count: u32, page_pool: Arc<dyn PagePool>) -> Self {
        let requested = window_count;
        let window_count = window_count.min(MAX_WINDOWS as u32);
        if window_count < requested {
            log::warn!(
                "Window count {requested} exceeds the supported maximum, clamping to {window_count}."
            );
        }
        let pools = (0..window_count)
            .map(|_| WindowBufferPool::new(&page_pool))
            .collect();
        log::info!(
            "Command buffer manager initialized: {window_count} window(s), {BUFFERS_PER_WINDOW} buffers each."
        );
        Self {
            window_count,
            pools,
        }
    }

    /// Acquires a free buffer of the window's pool.
    ///
    /// Returns `None` for an out-of-range window id or when the pool is
    /// exhausted; the caller backs off or drops this frame's work, the
    /// manager never blocks.
    pub fn acquire_buffer(&self, window_id: u32) -> Option<&CommandBuffer> {
        let pool = self.pools.get(window_id as usize)?;
        let index = pool.free.lock().unwrap().pop();
        match index {
            Some(index) => Some(&pool.buffers[index as usize]),
            None => {
                log::trace!("Buffer pool of window {window_id} is exhausted.");
                None
            }
        }
    }

    /// Returns an acquired buffer to its window's pool.
    ///
    /// The buffer is reset unconditionally, discarding any recorded but
    /// unexecuted commands. Invalid window ids and buffers that do not
    /// belong to the window's pool are a logged no-op.
    pub fn release_buffer(&self, buffer: &CommandBuffer, window_id: u32) {
        let Some(pool) = self.pools.get(window_id as usize) else {
            log::debug!("release_buffer: window id {window_id} is out of range.");
            return;
        };

        buffer.reset();

        let slot = pool
            .buffers
            .iter()
            .position(|candidate| std::ptr::eq(candidate, buffer));
        match slot {
            Some(index) => pool.free.lock().unwrap().push(index as u32),
            None => {
                log::debug!("release_buffer: buffer does not belong to window {window_id}.");
            }
        }
    }

    /// Executes every in-use, ready, non-empty buffer of one window.
    ///
    /// The in-use set is snapshotted under the pool mutex, then the lock is
    /// dropped before any command runs, so execution itself stays lock-free.
    /// Buffers are not released afterwards; see the type-level docs.
    pub fn execute_window_buffers(&self, window_id: u32) {
        let Some(pool) = self.pools.get(window_id as usize) else {
            return;
        };
        let in_use = pool.free.lock().unwrap().in_use_mask();
        for (index, buffer) in pool.buffers.iter().enumerate() {
            if in_use & (1 << index) == 0 {
                continue;
            }
            if buffer.is_ready() && !buffer.is_empty() {
                buffer.execute();
            }
        }
    }

    /// Executes the ready buffers of every window, in window index order.
    pub fn execute_all_windows(&self) {
        for window_id in 0..self.window_count {
            self.execute_window_buffers(window_id);
        }
    }

    /// Number of buffers currently available for acquisition.
    ///
    /// Returns 0 for an out-of-range window id.
    pub fn available_buffers(&self, window_id: u32) -> u32 {
        match self.pools.get(window_id as usize) {
            Some(pool) => pool.free.lock().unwrap().len(),
            None => 0,
        }
    }

    /// Total number of buffers allocated for a window (0 if out of range).
    pub fn total_buffers(&self, window_id: u32) -> u32 {
        match self.pools.get(window_id as usize) {
            Some(_) => BUFFERS_PER_WINDOW as u32,
            None => 0,
        }
    }

    /// Number of buffers currently in use (0 if out of range).
    pub fn active_buffers(&self, window_id: u32) -> u32 {
        match self.pools.get(window_id as usize) {
            Some(pool) => BUFFERS_PER_WINDOW as u32 - pool.free.lock().unwrap().len(),
            None => 0,
        }
    }

    /// Number of windows configured at construction.
    pub fn window_count(&self) -> u32 {
        self.window_count
    }
}
