use crate::compiler::compile_error::CompileError;
use crate::compiler::context::CompileContext;
use crate::ir::BlockId;

/// Static type of the value an expression leaves on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TealType {
    Uint64,
    Bytes,
    Anytype,
    /// Leaves nothing on the stack.
    None,
}

impl TealType {
    pub fn is_value(self) -> bool {
        self != TealType::None
    }
}

impl std::fmt::Display for TealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TealType::Uint64 => write!(f, "uint64"),
            TealType::Bytes => write!(f, "bytes"),
            TealType::Anytype => write!(f, "any"),
            TealType::None => write!(f, "none"),
        }
    }
}

/// Contract between an expression node and the backend.
///
/// `lower` appends the node's blocks to the context's graph and returns the
/// connected (entry, exit) pair. The exit block must be a simple block with
/// no successor yet so the caller can link whatever follows.
pub trait Expr: std::fmt::Debug {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Result<(BlockId, BlockId), CompileError>;

    fn type_of(&self) -> TealType;

    /// Human-readable node name for diagnostics.
    fn name(&self) -> String;

    /// First version this node can be compiled for.
    fn min_version(&self) -> u8 {
        2
    }

    /// Control never continues past this expression.
    fn terminates(&self) -> bool {
        false
    }
}

pub type ExprRef = Box<dyn Expr>;
