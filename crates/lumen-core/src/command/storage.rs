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

//! Type-erased command storage.
//!
//! A [`CommandStorage`] pairs the fixed [`CommandHeader`] with an arbitrary
//! payload type and registers a per-type trampoline in the header. The
//! buffer later executes commands through that function pointer alone, a
//! single indirect call with no runtime type information.

use std::mem;

use super::header::{CommandHeader, ExecuteFn};
use super::types::{CommandPriority, CommandType};

/// Contract for a concrete command payload type.
///
/// This is the only requirement the command core imposes on backend-defined
/// payloads: a type tag, a priority, and a no-argument execution method that
/// calls into the downstream device layer.
///
/// Payloads are stored raw inside buffer pages and reclaimed as raw bytes;
/// their destructors never run. Types that need `Drop` are rejected at
/// compile time when recorded.
pub trait Command: Send + 'static {
    /// Type tag stored in the command header.
    const TYPE: CommandType;

    /// Execution priority; backends override this per command type.
    const PRIORITY: CommandPriority = CommandPriority::Normal;

    /// Executes the command against the downstream target.
    fn execute(&self);
}

/// Header/payload pairing for one concrete command type.
///
/// Constructed once, in place, inside a buffer page; never copied or moved
/// afterwards. The header's function pointer always resolves back to
/// [`trampoline::<C>`](Self::TRAMPOLINE), which reinterprets the erased
/// header pointer as this concrete storage and calls the payload.
#[derive(Debug)]
#[repr(C, align(16))]
pub struct CommandStorage<C: Command> {
    header: CommandHeader,
    data: C,
}

impl<C: Command> CommandStorage<C> {
    /// The trampoline registered in this storage's header.
    pub const TRAMPOLINE: ExecuteFn = trampoline::<C>;

    /// Builds the storage with a fully-populated header.
    pub fn new(data: C) -> Self {
        // The slot grid is 16-byte aligned and sizes travel in a u16 header
        // field; both limits hold for every payload a backend can define.
        const {
            assert!(
                mem::align_of::<C>() <= 16,
                "command payload alignment exceeds the 16-byte slot alignment"
            );
            assert!(
                mem::size_of::<CommandStorage<C>>() <= u16::MAX as usize,
                "command payload too large for the header size field"
            );
            assert!(
                !mem::needs_drop::<C>(),
                "command payloads are reclaimed as raw bytes and must not need Drop"
            );
        }
        Self {
            header: CommandHeader::new(
                mem::size_of::<Self>() as u16,
                C::TYPE,
                C::PRIORITY,
                Some(Self::TRAMPOLINE),
            ),
            data,
        }
    }

    /// The populated header of this storage.
    pub fn header(&self) -> &CommandHeader {
        &self.header
    }

    /// The stored payload.
    pub fn data(&self) -> &C {
        &self.data
    }
}

/// Re-types the erased header pointer and runs the payload.
///
/// # Safety
///
/// `header` must point to the header of a live `CommandStorage<C>` whose
/// payload really is a `C`. The buffer guarantees this by only storing the
/// pointer produced by [`CommandStorage::new`] for the same `C`.
unsafe fn trampoline<C: Command>(header: *const CommandHeader) {
    let storage = header.cast::<CommandStorage<C>>();
    // SAFETY: per the function contract, `header` is the first field of a
    // live CommandStorage<C>, so the cast recovers the original storage.
    unsafe { (*storage).data.execute() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static HITS: AtomicU32 = AtomicU32::new(0);

    #[derive(Debug, Clone, Copy)]
    struct SetScissorCmd {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    }

    impl Command for SetScissorCmd {
        const TYPE: CommandType = CommandType::SetScissor;
        const PRIORITY: CommandPriority = CommandPriority::High;

        fn execute(&self) {
            assert_eq!((self.x, self.y), (4, 8));
            assert_eq!((self.width, self.height), (640, 480));
            HITS.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn header_describes_the_storage() {
        let storage = CommandStorage::new(SetScissorCmd {
            x: 4,
            y: 8,
            width: 640,
            height: 480,
        });
        let header = storage.header();
        assert_eq!(header.size as usize, std::mem::size_of_val(&storage));
        assert_eq!(header.size % 16, 0);
        assert_eq!(header.kind, CommandType::SetScissor);
        assert_eq!(header.priority, CommandPriority::High);
        assert!(header.execute.is_some());
    }

    #[test]
    fn trampoline_reaches_the_payload() {
        let storage = CommandStorage::new(SetScissorCmd {
            x: 4,
            y: 8,
            width: 640,
            height: 480,
        });
        let before = HITS.load(Ordering::Relaxed);
        let header = storage.header() as *const CommandHeader;
        let execute = storage.header().execute.expect("trampoline registered");
        // SAFETY: `header` points into a live CommandStorage<SetScissorCmd>
        // and `execute` is the trampoline for exactly that type.
        unsafe { execute(header) };
        assert_eq!(HITS.load(Ordering::Relaxed), before + 1);
    }

    #[test]
    fn default_priority_is_normal() {
        #[derive(Debug, Clone, Copy)]
        struct FlushCmd;
        impl Command for FlushCmd {
            const TYPE: CommandType = CommandType::FlushCommands;
            fn execute(&self) {}
        }

        let storage = CommandStorage::new(FlushCmd);
        assert_eq!(storage.header().priority, CommandPriority::Normal);
        // A zero-sized payload still occupies one full header slot.
        assert_eq!(storage.header().size as usize, CommandHeader::SIZE);
        let _ = storage.data();
    }
}
