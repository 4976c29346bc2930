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

//! The fixed command header that precedes every recorded payload.

use super::types::{CommandPriority, CommandType};

/// The function-pointer contract used for type-erased command execution.
///
/// The pointer passed in is the address of the [`CommandHeader`] itself; the
/// registered trampoline reinterprets it as the concrete storage type.
///
/// # Safety
///
/// The callee may only be invoked with a pointer to a header that was
/// written together with a payload of the matching concrete type.
pub type ExecuteFn = unsafe fn(*const CommandHeader);

/// 16-byte command header stored immediately before each payload.
///
/// `size` is the total footprint of the command (header plus payload),
/// always a non-zero multiple of 16; the header is always immediately
/// followed by exactly `size - 16` bytes of payload.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(16))]
pub struct CommandHeader {
    /// Total size of the command (header + payload) in bytes.
    pub size: u16,
    /// Type tag of the command.
    pub kind: CommandType,
    /// Execution priority of the command.
    pub priority: CommandPriority,
    _pad0: u8,
    _pad1: u16,
    /// Type-erased execution entry point, `None` for inert records.
    pub execute: Option<ExecuteFn>,
}

// The whole command stream layout depends on these two facts.
const _: () = assert!(std::mem::size_of::<CommandHeader>() == 16);
const _: () = assert!(std::mem::align_of::<CommandHeader>() == 16);

impl CommandHeader {
    /// Size of the header itself in bytes.
    pub const SIZE: usize = std::mem::size_of::<CommandHeader>();

    /// Creates a fully-populated header.
    pub fn new(
        size: u16,
        kind: CommandType,
        priority: CommandPriority,
        execute: Option<ExecuteFn>,
    ) -> Self {
        Self {
            size,
            kind,
            priority,
            _pad0: 0,
            _pad1: 0,
            execute,
        }
    }
}

/// Snapshot of a command buffer's cumulative performance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandBufferStats {
    /// Number of commands recorded since the last reset.
    pub commands_recorded: u32,
    /// Number of commands executed since the last reset.
    pub commands_executed: u32,
    /// Total bytes of page memory requested from the allocator.
    pub total_bytes_used: u64,
    /// Number of pages currently allocated.
    pub page_count: u32,
    /// Number of page allocations performed.
    pub memory_allocations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn header_layout_is_fixed() {
        assert_eq!(mem::size_of::<CommandHeader>(), 16);
        assert_eq!(mem::align_of::<CommandHeader>(), 16);
    }

    #[test]
    fn header_round_trips_fields() {
        let header = CommandHeader::new(
            48,
            CommandType::DrawElements,
            CommandPriority::Normal,
            None,
        );
        assert_eq!(header.size, 48);
        assert_eq!(header.kind, CommandType::DrawElements);
        assert_eq!(header.priority, CommandPriority::Normal);
        assert!(header.execute.is_none());
    }

    #[test]
    fn stats_default_to_zero() {
        let stats = CommandBufferStats::default();
        assert_eq!(stats.commands_recorded, 0);
        assert_eq!(stats.commands_executed, 0);
        assert_eq!(stats.total_bytes_used, 0);
        assert_eq!(stats.page_count, 0);
        assert_eq!(stats.memory_allocations, 0);
    }
}
