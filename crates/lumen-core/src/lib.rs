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

//! # Lumen Core
//!
//! Foundational crate of the Lumen rendering engine: the command
//! recording/execution core and the interface contracts it consumes.
//!
//! The centerpiece is a paged, zero-copy command buffer system. A producer
//! thread records typed graphics commands into a [`command::CommandBuffer`]
//! without per-command heap allocation, hands the finished batch to the
//! render thread through an atomic readiness flag, and the render thread
//! executes it in priority order. [`command::CommandBufferManager`] recycles
//! a fixed pool of buffers per window. Backing page memory comes from an
//! external pooled allocator behind the [`memory::PagePool`] contract.

#![warn(missing_docs)]

pub mod command;
pub mod memory;

pub use command::{CommandBuffer, CommandBufferManager};
pub use memory::PagePool;
