pub mod block;
pub mod component;
pub mod graph;
pub mod op;
pub mod slot;

pub use block::{Block, BlockId, BlockKind};
pub use component::{Arg, Label, TealComponent, TealOp};
pub use graph::Cfg;
pub use op::{Mode, ModeMask, Op};
pub use slot::{NUM_SLOTS, ScratchSlot, SlotCounter};

use serde::{Deserialize, Serialize};

/// Identity of a subroutine, assigned in definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubroutineId(pub u32);

/// A unit of compilation: the implicit main routine or one subroutine.
/// `Main` sorts before every subroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Routine {
    Main,
    Subroutine(SubroutineId),
}

impl Routine {
    pub fn subroutine(self) -> Option<SubroutineId> {
        match self {
            Routine::Main => None,
            Routine::Subroutine(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Routine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Routine::Main => write!(f, "main"),
            Routine::Subroutine(id) => write!(f, "subroutine #{}", id.0),
        }
    }
}
