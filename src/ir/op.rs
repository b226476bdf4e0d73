use serde::{Deserialize, Serialize};

// =============================================================================
// MODE - Which kind of program is being compiled
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Stateless logic signature.
    Signature,
    /// Stateful application call.
    Application,
}

impl Mode {
    fn bit(self) -> u8 {
        match self {
            Mode::Signature => 0b01,
            Mode::Application => 0b10,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Signature => write!(f, "Signature"),
            Mode::Application => write!(f, "Application"),
        }
    }
}

/// Set of modes an op may appear in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeMask(u8);

impl ModeMask {
    pub const SIGNATURE: ModeMask = ModeMask(0b01);
    pub const APPLICATION: ModeMask = ModeMask(0b10);
    pub const ALL: ModeMask = ModeMask(0b11);

    pub fn allows(self, mode: Mode) -> bool {
        self.0 & mode.bit() != 0
    }
}

// =============================================================================
// OP - Target VM instructions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Op {
    // literals
    Int,
    Byte,
    PushInt,
    PushBytes,
    Arg,

    // state reads
    Txn,
    Global,
    AppGlobalGet,

    // state writes
    AppGlobalPut,
    Log,

    // scratch space
    Load,
    Store,
    Loads,
    Stores,

    // stack ops
    Pop,
    Dup,
    Dup2,
    Dig,
    Swap,
    Select,
    Cover,
    Uncover,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitAnd,
    BitXor,
    BitNot,

    // comparison
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Neq,

    // logic
    And,
    Or,
    Not,

    // bytes
    Len,
    Itob,
    Btoi,
    Concat,

    // ==========================================================================
    // Control flow
    // ==========================================================================
    /// Pop a value, branch to the label if it is non-zero.
    Bnz,
    /// Pop a value, branch to the label if it is zero.
    Bz,
    /// Unconditional branch.
    B,
    Assert,
    Err,
    Return,
    Callsub,
    Retsub,
}

/// Static facts about an op: its mnemonic, the first version that has it
/// and the modes it is legal in.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub mnemonic: &'static str,
    pub min_version: u8,
    pub modes: ModeMask,
}

const fn info(mnemonic: &'static str, min_version: u8, modes: ModeMask) -> OpInfo {
    OpInfo {
        mnemonic,
        min_version,
        modes,
    }
}

impl Op {
    pub fn info(self) -> OpInfo {
        use Op::*;
        match self {
            Int => info("int", 1, ModeMask::ALL),
            Byte => info("byte", 1, ModeMask::ALL),
            PushInt => info("pushint", 3, ModeMask::ALL),
            PushBytes => info("pushbytes", 3, ModeMask::ALL),
            Arg => info("arg", 1, ModeMask::SIGNATURE),

            Txn => info("txn", 1, ModeMask::ALL),
            Global => info("global", 1, ModeMask::ALL),
            AppGlobalGet => info("app_global_get", 2, ModeMask::APPLICATION),
            AppGlobalPut => info("app_global_put", 2, ModeMask::APPLICATION),
            Log => info("log", 5, ModeMask::APPLICATION),

            Load => info("load", 1, ModeMask::ALL),
            Store => info("store", 1, ModeMask::ALL),
            Loads => info("loads", 5, ModeMask::ALL),
            Stores => info("stores", 5, ModeMask::ALL),

            Pop => info("pop", 1, ModeMask::ALL),
            Dup => info("dup", 1, ModeMask::ALL),
            Dup2 => info("dup2", 2, ModeMask::ALL),
            Dig => info("dig", 3, ModeMask::ALL),
            Swap => info("swap", 3, ModeMask::ALL),
            Select => info("select", 3, ModeMask::ALL),
            Cover => info("cover", 5, ModeMask::ALL),
            Uncover => info("uncover", 5, ModeMask::ALL),

            Add => info("+", 1, ModeMask::ALL),
            Sub => info("-", 1, ModeMask::ALL),
            Mul => info("*", 1, ModeMask::ALL),
            Div => info("/", 1, ModeMask::ALL),
            Mod => info("%", 1, ModeMask::ALL),
            BitOr => info("|", 1, ModeMask::ALL),
            BitAnd => info("&", 1, ModeMask::ALL),
            BitXor => info("^", 1, ModeMask::ALL),
            BitNot => info("~", 1, ModeMask::ALL),

            Lt => info("<", 1, ModeMask::ALL),
            Gt => info(">", 1, ModeMask::ALL),
            Le => info("<=", 1, ModeMask::ALL),
            Ge => info(">=", 1, ModeMask::ALL),
            Eq => info("==", 1, ModeMask::ALL),
            Neq => info("!=", 1, ModeMask::ALL),

            And => info("&&", 1, ModeMask::ALL),
            Or => info("||", 1, ModeMask::ALL),
            Not => info("!", 1, ModeMask::ALL),

            Len => info("len", 1, ModeMask::ALL),
            Itob => info("itob", 1, ModeMask::ALL),
            Btoi => info("btoi", 1, ModeMask::ALL),
            Concat => info("concat", 2, ModeMask::ALL),

            Bnz => info("bnz", 1, ModeMask::ALL),
            Bz => info("bz", 2, ModeMask::ALL),
            B => info("b", 2, ModeMask::ALL),
            Assert => info("assert", 3, ModeMask::ALL),
            Err => info("err", 1, ModeMask::ALL),
            Return => info("return", 2, ModeMask::ALL),
            Callsub => info("callsub", 4, ModeMask::ALL),
            Retsub => info("retsub", 4, ModeMask::ALL),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    pub fn min_version(self) -> u8 {
        self.info().min_version
    }

    /// Ends the program or the current subroutine unconditionally.
    pub fn is_exit(self) -> bool {
        matches!(self, Op::Err | Op::Return | Op::Retsub)
    }

    pub fn is_branch(self) -> bool {
        matches!(self, Op::B | Op::Bz | Op::Bnz)
    }

    /// Ops that can reach arbitrarily deep into the stack.
    pub fn reads_deep_stack(self) -> bool {
        matches!(self, Op::Dig | Op::Cover | Op::Uncover)
    }

    /// Ops whose execution is observable beyond the values they push.
    pub fn has_side_effects(self) -> bool {
        matches!(
            self,
            Op::Store
                | Op::Stores
                | Op::AppGlobalPut
                | Op::Log
                | Op::Assert
                | Op::Callsub
                | Op::Retsub
                | Op::Return
                | Op::Err
                | Op::B
                | Op::Bz
                | Op::Bnz
        )
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
