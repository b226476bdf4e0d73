use thiserror::Error;

use crate::ir::Mode;

/// Which side of the contract broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The expression tree or configuration asks for something impossible.
    Input,
    /// A compiler invariant was violated; indicates a bug here or in the
    /// lowering layer.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("compile error: unsupported version {version} (supported: {min}..={max})")]
    UnsupportedVersion { version: u8, min: u8, max: u8 },

    /// An op or node used below the version that introduced it
    #[error(
        "compile error: {what} requires version {required}, but the target is version {version} (in {routine})"
    )]
    VersionMismatch {
        what: String,
        required: u8,
        version: u8,
        routine: String,
    },

    /// An op used in a mode that forbids it
    #[error("compile error: {op} is not available in {mode} mode (in {routine})")]
    ModeMismatch {
        op: String,
        mode: Mode,
        routine: String,
    },

    #[error("compile error: too many scratch slots in use ({requested} needed, {available} available)")]
    SlotSpaceExhausted { requested: usize, available: usize },

    /// The expression tree cannot be compiled as written
    #[error("compile error: {message}{}", hint_suffix(.hint))]
    InvalidProgram {
        message: String,
        hint: Option<String>,
    },

    #[error("compile error: internal error: malformed control-flow graph: {0}")]
    MalformedGraph(String),

    #[error("compile error: internal error: scratch slot {id} has been assigned more than once")]
    ReservedSlotCollision { id: u8 },

    #[error("compile error: internal error: {routine} loads {slot} on a path with no prior store")]
    UninitializedRead { slot: String, routine: String },

    /// Internal compiler error (shouldn't happen in normal use)
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("\n  hint: {}", h),
        None => String::new(),
    }
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::UnsupportedVersion { .. }
            | CompileError::VersionMismatch { .. }
            | CompileError::ModeMismatch { .. }
            | CompileError::SlotSpaceExhausted { .. }
            | CompileError::InvalidProgram { .. } => ErrorKind::Input,
            CompileError::MalformedGraph(_)
            | CompileError::ReservedSlotCollision { .. }
            | CompileError::UninitializedRead { .. }
            | CompileError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }

    /// Create an error for an expression tree that cannot be compiled
    pub fn invalid(message: impl Into<String>) -> Self {
        CompileError::InvalidProgram {
            message: message.into(),
            hint: None,
        }
    }

    /// Create an invalid-program error with a hint for the caller
    pub fn invalid_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CompileError::InvalidProgram {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        CompileError::MalformedGraph(message.into())
    }

    /// Create an internal compiler error
    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal(message.into())
    }

    /// Error for a break/continue that has no enclosing loop
    pub fn outside_loop(construct: &str) -> Self {
        CompileError::invalid_with_hint(
            format!("{} used outside of a loop", construct),
            "break and continue may only appear inside a while loop body",
        )
    }
}
