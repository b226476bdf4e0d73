use crate::ir::{Op, ScratchSlot, SubroutineId};

/// Immediate operand of an instruction.
///
/// `Slot`, `SlotIndex`, `Label` and `Subroutine` are placeholders that the
/// assembler resolves; they never reach the output text as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arg {
    Uint(u64),
    Bytes(Vec<u8>),
    Str(String),
    /// Field or other named immediate, e.g. `Sender` in `txn Sender`.
    Name(String),
    /// Scratch cell read or written by `load`/`store`.
    Slot(ScratchSlot),
    /// Numeric id of a scratch cell pushed as an integer, for `loads`/`stores`.
    SlotIndex(ScratchSlot),
    Label(Label),
    Subroutine(SubroutineId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TealOp {
    pub op: Op,
    pub args: Vec<Arg>,
}

impl TealOp {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            args: Vec::new(),
        }
    }

    pub fn with_args(op: Op, args: Vec<Arg>) -> Self {
        Self { op, args }
    }

    pub fn int(value: u64) -> Self {
        Self::with_args(Op::Int, vec![Arg::Uint(value)])
    }

    pub fn immediate(op: Op, value: u64) -> Self {
        Self::with_args(op, vec![Arg::Uint(value)])
    }

    pub fn slot(op: Op, slot: ScratchSlot) -> Self {
        Self::with_args(op, vec![Arg::Slot(slot)])
    }

    pub fn branch(op: Op, label: Label) -> Self {
        Self::with_args(op, vec![Arg::Label(label)])
    }

    pub fn callsub(id: SubroutineId) -> Self {
        Self::with_args(Op::Callsub, vec![Arg::Subroutine(id)])
    }

    /// Slot accessed directly by this op (`load`/`store`).
    pub fn direct_slot(&self) -> Option<ScratchSlot> {
        self.args.iter().find_map(|arg| match arg {
            Arg::Slot(slot) => Some(*slot),
            _ => None,
        })
    }

    /// Every slot this op mentions, directly or as a dynamic index.
    pub fn slots(&self) -> impl Iterator<Item = ScratchSlot> + '_ {
        self.args.iter().filter_map(|arg| match arg {
            Arg::Slot(slot) | Arg::SlotIndex(slot) => Some(*slot),
            _ => None,
        })
    }

    pub fn label(&self) -> Option<&Label> {
        self.args.iter().find_map(|arg| match arg {
            Arg::Label(label) => Some(label),
            _ => None,
        })
    }

    pub fn subroutine(&self) -> Option<SubroutineId> {
        self.args.iter().find_map(|arg| match arg {
            Arg::Subroutine(id) => Some(*id),
            _ => None,
        })
    }

    /// Loads from `slot` through a `load` op.
    pub fn loads_from(&self, slot: ScratchSlot) -> bool {
        self.op == Op::Load && self.direct_slot() == Some(slot)
    }

    pub fn stores_to(&self, slot: ScratchSlot) -> bool {
        self.op == Op::Store && self.direct_slot() == Some(slot)
    }
}

/// Reference to an emission point inside one routine.
///
/// Flattening numbers labels per routine; the resolver later attaches a
/// routine prefix so labels stay unique once routines are concatenated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub index: u32,
    pub prefix: String,
}

impl Label {
    pub fn local(index: u32) -> Self {
        Self {
            index,
            prefix: String::new(),
        }
    }

    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            index: self.index,
            prefix: prefix.to_string(),
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}l{}", self.prefix, self.index)
    }
}

/// One element of a flattened routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TealComponent {
    Op(TealOp),
    Label(Label),
}

impl TealComponent {
    pub fn as_op(&self) -> Option<&TealOp> {
        match self {
            TealComponent::Op(op) => Some(op),
            TealComponent::Label(_) => None,
        }
    }
}

impl From<TealOp> for TealComponent {
    fn from(op: TealOp) -> Self {
        TealComponent::Op(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SlotCounter;

    #[test]
    fn test_label_display() {
        assert_eq!(Label::local(3).to_string(), "l3");
        assert_eq!(Label::local(3).with_prefix("main_").to_string(), "main_l3");
    }

    #[test]
    fn test_slot_accessors() {
        let counter = SlotCounter::new();
        let s = counter.fresh();
        let t = counter.fresh();

        let load = TealOp::slot(Op::Load, s);
        assert!(load.loads_from(s));
        assert!(!load.loads_from(t));
        assert!(!load.stores_to(s));

        let index = TealOp::with_args(Op::Int, vec![Arg::SlotIndex(t)]);
        assert_eq!(index.direct_slot(), None);
        assert_eq!(index.slots().collect::<Vec<_>>(), vec![t]);
    }
}
