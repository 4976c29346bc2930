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

//! End-to-end scenarios for the command subsystem running on the real
//! pooled block allocator.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lumen_core::command::{
    Command, CommandBuffer, CommandBufferManager, CommandPriority, CommandType,
};
use lumen_infra::PooledBlockAllocator;

/// Self-contained execution journal shared with the recorded commands.
#[derive(Debug, Default)]
struct ExecLog {
    entries: Mutex<Vec<(CommandPriority, u32)>>,
}

impl ExecLog {
    fn leak() -> &'static ExecLog {
        Box::leak(Box::new(ExecLog::default()))
    }

    fn push(&self, priority: CommandPriority, value: u32) {
        self.entries.lock().unwrap().push((priority, value));
    }

    fn snapshot(&self) -> Vec<(CommandPriority, u32)> {
        self.entries.lock().unwrap().clone()
    }
}

#[derive(Clone, Copy)]
struct ClearCmd {
    log: &'static ExecLog,
    value: u32,
}

impl Command for ClearCmd {
    const TYPE: CommandType = CommandType::ClearBuffers;
    const PRIORITY: CommandPriority = CommandPriority::High;

    fn execute(&self) {
        self.log.push(Self::PRIORITY, self.value);
    }
}

#[derive(Clone, Copy)]
struct DrawCmd {
    log: &'static ExecLog,
    value: u32,
}

impl Command for DrawCmd {
    const TYPE: CommandType = CommandType::DrawElements;

    fn execute(&self) {
        self.log.push(Self::PRIORITY, self.value);
    }
}

fn page_pool(max_blocks: usize) -> Arc<PooledBlockAllocator> {
    Arc::new(
        PooledBlockAllocator::new(CommandBuffer::PAGE_ALLOCATION_SIZE, max_blocks)
            .expect("valid pool configuration"),
    )
}

#[test]
fn single_window_frame_runs_high_before_normal() {
    let log = ExecLog::leak();
    let manager = CommandBufferManager::new(1, page_pool(16));

    let buffer = manager.acquire_buffer(0).expect("buffer available");
    buffer.record(DrawCmd { log, value: 1 });
    buffer.record(DrawCmd { log, value: 2 });
    buffer.record(ClearCmd { log, value: 0 });
    buffer.record(DrawCmd { log, value: 3 });
    buffer.mark_ready();

    manager.execute_window_buffers(0);

    let entries = log.snapshot();
    assert_eq!(entries.first(), Some(&(CommandPriority::High, 0)));
    assert_eq!(
        &entries[1..],
        &[
            (CommandPriority::Normal, 1),
            (CommandPriority::Normal, 2),
            (CommandPriority::Normal, 3),
        ]
    );
    assert_eq!(buffer.stats().commands_executed, 4);

    manager.release_buffer(buffer, 0);
    assert_eq!(manager.available_buffers(0), manager.total_buffers(0));
}

#[test]
fn buffer_pool_exhaustion_recovers_after_release() {
    let manager = CommandBufferManager::new(1, page_pool(32));
    let capacity = manager.total_buffers(0);

    let mut acquired = Vec::new();
    for _ in 0..capacity {
        acquired.push(manager.acquire_buffer(0).expect("pool not yet empty"));
    }
    assert!(manager.acquire_buffer(0).is_none());

    manager.release_buffer(acquired.pop().unwrap(), 0);
    assert!(manager.acquire_buffer(0).is_some());
}

#[test]
fn out_of_range_window_is_rejected_by_every_operation() {
    let manager = CommandBufferManager::new(1, page_pool(4));
    assert!(manager.acquire_buffer(3).is_none());
    assert_eq!(manager.available_buffers(3), 0);
    assert_eq!(manager.total_buffers(3), 0);
    assert_eq!(manager.active_buffers(3), 0);
    manager.execute_window_buffers(3);
    manager.execute_all_windows();
}

#[test]
fn page_pool_exhaustion_drops_commands_but_not_the_frame() {
    let log = ExecLog::leak();
    // A single page serves the whole manager; the second page request for
    // any buffer must fail.
    let manager = CommandBufferManager::new(1, page_pool(1));
    let buffer = manager.acquire_buffer(0).expect("buffer available");

    // One page of 64 KiB holds 2048 32-byte draw commands; record past that.
    for value in 0..3000 {
        buffer.record(DrawCmd { log, value });
    }
    assert_eq!(buffer.command_count(), 2048, "overflow commands are dropped");
    assert_eq!(buffer.page_count(), 1);

    buffer.mark_ready();
    manager.execute_window_buffers(0);
    assert_eq!(log.snapshot().len(), 2048);

    manager.release_buffer(buffer, 0);
}

#[test]
fn pages_return_to_the_allocator_on_release() {
    let pool = page_pool(8);
    let manager = CommandBufferManager::new(1, pool.clone());
    let log = ExecLog::leak();

    let buffer = manager.acquire_buffer(0).expect("buffer available");
    buffer.record(ClearCmd { log, value: 1 });
    buffer.record(DrawCmd { log, value: 2 });
    assert!(pool.live_blocks() > 0);

    manager.release_buffer(buffer, 0);
    assert_eq!(pool.live_blocks(), 0);
    assert!(pool.cached_blocks() > 0, "released pages are cached for reuse");
}

#[test]
fn cross_thread_handoff_relies_only_on_the_ready_flag() {
    let log = ExecLog::leak();
    let manager = Arc::new(CommandBufferManager::new(1, page_pool(16)));

    let producer = {
        let manager = manager.clone();
        thread::spawn(move || {
            let buffer = manager.acquire_buffer(0).expect("buffer available");
            buffer.record(ClearCmd { log, value: 0 });
            for value in 1..=3 {
                buffer.record(DrawCmd { log, value });
            }
            buffer.mark_ready();
        })
    };

    // Poll as a render thread would: execute whatever is ready, until the
    // published batch has been observed.
    let mut observed = Vec::new();
    for _ in 0..500 {
        manager.execute_window_buffers(0);
        observed = log.snapshot();
        if !observed.is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    producer.join().expect("producer thread panicked");

    assert_eq!(observed.len(), 4, "the batch is executed atomically");
    assert_eq!(observed[0], (CommandPriority::High, 0));
    assert_eq!(
        &observed[1..],
        &[
            (CommandPriority::Normal, 1),
            (CommandPriority::Normal, 2),
            (CommandPriority::Normal, 3),
        ]
    );
    // Executed buffers stay in use until the acquiring side releases them.
    assert_eq!(manager.active_buffers(0), 1);
}
