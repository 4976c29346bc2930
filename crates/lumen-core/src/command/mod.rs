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

//! The command recording and execution subsystem.
//!
//! - [`CommandBuffer`]: paged, zero-copy recording and priority-ordered
//!   execution of type-erased commands.
//! - [`CommandBufferManager`]: fixed per-window buffer pools with O(1)
//!   acquire/release recycling and batch execution across windows.
//! - [`Command`] / [`CommandStorage`]: the contract backend modules
//!   implement for their payload types, and the header/payload pairing the
//!   buffer stores.
//!
//! Backing page memory is delegated to an external pooled allocator through
//! [`crate::memory::PagePool`].

mod buffer;
mod header;
mod manager;
mod page;
mod storage;
mod types;

pub use buffer::CommandBuffer;
pub use header::{CommandBufferStats, CommandHeader, ExecuteFn};
pub use manager::{CommandBufferManager, BUFFERS_PER_WINDOW, MAX_WINDOWS};
pub use storage::{Command, CommandStorage};
pub use types::{CommandPriority, CommandType};
