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

// Lumen Sandbox
// Two producer threads record frames for their own windows while the main
// thread plays the render thread: it executes ready batches, replies, and
// the producers recycle their buffers.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use lumen_core::command::{Command, CommandPriority, CommandType};
use lumen_core::memory::page_pool_stats;
use lumen_core::{CommandBuffer, CommandBufferManager};
use lumen_infra::PooledBlockAllocator;

const WINDOWS: u32 = 2;
const FRAMES_PER_WINDOW: u32 = 3;

/// Sent by a producer once a frame's buffer has been marked ready.
#[derive(Debug, Clone, Copy)]
struct FrameSubmitted {
    window_id: u32,
    frame: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SetViewportCmd {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Command for SetViewportCmd {
    const TYPE: CommandType = CommandType::SetViewport;
    const PRIORITY: CommandPriority = CommandPriority::High;

    fn execute(&self) {
        log::debug!(
            "viewport <- ({}, {}) {}x{}",
            self.x,
            self.y,
            self.width,
            self.height
        );
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SetClearColorCmd {
    rgba: [f32; 4],
}

impl Command for SetClearColorCmd {
    const TYPE: CommandType = CommandType::SetClearColor;
    const PRIORITY: CommandPriority = CommandPriority::High;

    fn execute(&self) {
        log::debug!("clear color <- {:?}", self.rgba);
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawElementsCmd {
    index_count: u32,
    base_vertex: i32,
}

impl Command for DrawElementsCmd {
    const TYPE: CommandType = CommandType::DrawElements;

    fn execute(&self) {
        log::debug!(
            "draw {} indices from base vertex {}",
            self.index_count,
            self.base_vertex
        );
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DebugTextCmd {
    line: u32,
}

impl Command for DebugTextCmd {
    const TYPE: CommandType = CommandType::DrawDebugText;
    const PRIORITY: CommandPriority = CommandPriority::Low;

    fn execute(&self) {
        log::debug!("debug overlay line {}", self.line);
    }
}

/// Records one frame's worth of commands, in a deliberately shuffled order;
/// the buffer sorts it out by priority at execution time.
fn record_frame(buffer: &CommandBuffer, window_id: u32, frame: u32) {
    buffer.record(DrawElementsCmd {
        index_count: 36 * (frame + 1),
        base_vertex: 0,
    });
    buffer.record(DebugTextCmd { line: frame });
    buffer.record(SetViewportCmd {
        x: 0,
        y: 0,
        width: 1280,
        height: 720,
    });
    buffer.record(SetClearColorCmd {
        rgba: [0.1, 0.2, 0.3, 1.0],
    });
    buffer.record(DrawElementsCmd {
        index_count: 12,
        base_vertex: 8,
    });
    log::info!(
        "window {window_id} frame {frame}: {} commands, {} bytes, {} page(s)",
        buffer.command_count(),
        buffer.memory_used(),
        buffer.page_count()
    );
}

fn run_producer(
    manager: Arc<CommandBufferManager>,
    window_id: u32,
    submitted: flume::Sender<FrameSubmitted>,
    executed: flume::Receiver<u32>,
) -> Result<()> {
    for frame in 0..FRAMES_PER_WINDOW {
        let buffer = loop {
            match manager.acquire_buffer(window_id) {
                Some(buffer) => break buffer,
                // Exhausted pool: back off and retry, never block inside
                // the manager.
                None => thread::yield_now(),
            }
        };

        record_frame(buffer, window_id, frame);
        buffer.mark_ready();
        submitted
            .send(FrameSubmitted { window_id, frame })
            .context("render thread hung up before the frame was submitted")?;

        // Wait until the render thread confirms execution, then hand the
        // buffer back to the pool.
        let confirmed = executed
            .recv()
            .context("render thread hung up before confirming execution")?;
        anyhow::ensure!(
            confirmed == frame,
            "window {window_id}: frame {confirmed} confirmed while {frame} was in flight"
        );
        manager.release_buffer(buffer, window_id);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let page_pool = Arc::new(
        PooledBlockAllocator::new(CommandBuffer::PAGE_ALLOCATION_SIZE, 64)
            .context("failed to configure the page pool")?,
    );
    let manager = Arc::new(CommandBufferManager::new(WINDOWS, page_pool.clone()));

    let (submitted_tx, submitted_rx) = flume::unbounded::<FrameSubmitted>();
    let mut producers = Vec::new();
    let mut executed_txs = Vec::new();

    for window_id in 0..WINDOWS {
        let (executed_tx, executed_rx) = flume::unbounded::<u32>();
        executed_txs.push(executed_tx);
        let manager = manager.clone();
        let submitted = submitted_tx.clone();
        producers.push(thread::spawn(move || {
            run_producer(manager, window_id, submitted, executed_rx)
        }));
    }
    drop(submitted_tx);

    // The render thread: execute each submitted frame and confirm it.
    for _ in 0..WINDOWS * FRAMES_PER_WINDOW {
        let event = submitted_rx
            .recv()
            .context("all producers exited early")?;
        manager.execute_window_buffers(event.window_id);
        log::info!(
            "executed window {} frame {} ({} buffer(s) active)",
            event.window_id,
            event.frame,
            manager.active_buffers(event.window_id)
        );
        executed_txs[event.window_id as usize]
            .send(event.frame)
            .context("producer exited before its frame was confirmed")?;
    }

    for producer in producers {
        producer
            .join()
            .expect("producer thread panicked")
            .context("producer failed")?;
    }

    let stats = page_pool_stats();
    log::info!(
        "page pool: {} allocation(s), {} release(s), hit rate {:.0}%, peak {} KiB",
        stats.total_block_allocations,
        stats.total_block_releases,
        stats.hit_rate * 100.0,
        stats.peak_pooled_bytes / 1024
    );
    log::info!(
        "pool blocks cached for reuse: {} of {}",
        page_pool.cached_blocks(),
        page_pool.max_blocks()
    );
    Ok(())
}
