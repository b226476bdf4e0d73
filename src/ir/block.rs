use crate::ir::TealOp;

/// Stable index of a block inside its routine's [`Cfg`](crate::ir::Cfg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Successor shape of a block. Edges are `None` while the graph is under
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Simple {
        next: Option<BlockId>,
    },
    /// Picks a successor from the value the block's own ops leave on the stack.
    Conditional {
        on_true: Option<BlockId>,
        on_false: Option<BlockId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub ops: Vec<TealOp>,
    pub kind: BlockKind,
    pub incoming: Vec<BlockId>,
}

impl Block {
    pub fn simple(ops: Vec<TealOp>) -> Self {
        Self {
            ops,
            kind: BlockKind::Simple { next: None },
            incoming: Vec::new(),
        }
    }

    pub fn conditional(ops: Vec<TealOp>) -> Self {
        Self {
            ops,
            kind: BlockKind::Conditional {
                on_true: None,
                on_false: None,
            },
            incoming: Vec::new(),
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, BlockKind::Conditional { .. })
    }

    /// Last op leaves the routine.
    pub fn exits(&self) -> bool {
        self.ops.last().is_some_and(|op| op.op.is_exit())
    }

    pub fn is_terminal(&self) -> bool {
        if self.exits() {
            return true;
        }
        match self.kind {
            BlockKind::Simple { next } => next.is_none(),
            BlockKind::Conditional { on_true, on_false } => on_true.is_none() && on_false.is_none(),
        }
    }

    /// Edges control can actually take. Recorded edges out of an exiting
    /// block are ignored.
    pub fn successors(&self) -> Vec<BlockId> {
        if self.exits() {
            return Vec::new();
        }
        match self.kind {
            BlockKind::Simple { next } => next.into_iter().collect(),
            BlockKind::Conditional { on_true, on_false } => {
                on_true.into_iter().chain(on_false).collect()
            }
        }
    }
}
