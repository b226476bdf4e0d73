use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Number of scratch cells the target machine provides.
pub const NUM_SLOTS: usize = 256;

/// A scratch storage cell as referenced by instructions.
///
/// Identity is the compilation-scoped `id`; ordering by `id` is creation
/// order. A reserved slot additionally pins the numeric cell it must land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScratchSlot {
    id: u32,
    requested: Option<u8>,
}

impl ScratchSlot {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn requested(&self) -> Option<u8> {
        self.requested
    }

    pub fn is_reserved(&self) -> bool {
        self.requested.is_some()
    }
}

impl std::fmt::Display for ScratchSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.requested {
            Some(n) => write!(f, "slot#{}@{}", self.id, n),
            None => write!(f, "slot#{}", self.id),
        }
    }
}

/// Hands out slot identities for one compilation.
#[derive(Debug, Default)]
pub struct SlotCounter {
    next: Cell<u32>,
}

impl SlotCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&self) -> ScratchSlot {
        self.issue(None)
    }

    pub fn reserved(&self, cell: u8) -> ScratchSlot {
        self.issue(Some(cell))
    }

    /// How many slots have been handed out so far.
    pub fn issued(&self) -> u32 {
        self.next.get()
    }

    fn issue(&self, requested: Option<u8>) -> ScratchSlot {
        let id = self.next.get();
        self.next.set(id + 1);
        ScratchSlot { id, requested }
    }
}
