//! Reference interpreter for assembled programs.
//!
//! Runs an [`Assembly`] against a small execution environment so compiled
//! output can be checked by behavior rather than by text.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::trace;

use crate::compiler::assembly::{AsmArg, AsmLine, Assembly};
use crate::ir::{NUM_SLOTS, Op};

const MAX_BYTES_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum StackValue {
    Uint(u64),
    Bytes(Vec<u8>),
}

impl StackValue {
    fn type_name(&self) -> &'static str {
        match self {
            StackValue::Uint(_) => "uint64",
            StackValue::Bytes(_) => "bytes",
        }
    }
}

impl std::fmt::Display for StackValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackValue::Uint(n) => write!(f, "{}", n),
            StackValue::Bytes(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Something the program did that outlives its execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Log(Vec<u8>),
    GlobalPut { key: Vec<u8>, value: StackValue },
}

/// What the program can read from the outside world.
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub txn: BTreeMap<String, StackValue>,
    pub global: BTreeMap<String, StackValue>,
    pub args: Vec<Vec<u8>>,
    /// Application global state before the call.
    pub app_globals: BTreeMap<Vec<u8>, StackValue>,
}

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: usize,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: 1_000_000,
            max_stack_size: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub approved: bool,
    /// Values left below the result.
    pub stack: Vec<StackValue>,
    pub scratch: Vec<StackValue>,
    pub effects: Vec<Effect>,
    pub app_globals: BTreeMap<Vec<u8>, StackValue>,
    pub steps: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("runtime error: stack underflow in {op} at line {line}")]
    StackUnderflow { op: Op, line: usize },

    #[error("runtime error: {op} at line {line} expected {expected}, got {got}")]
    TypeMismatch {
        op: Op,
        line: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("runtime error: arithmetic overflow in {op} at line {line}")]
    Overflow { op: Op, line: usize },

    #[error("runtime error: division by zero at line {line}")]
    DivisionByZero { line: usize },

    #[error("runtime error: assertion failed at line {line}")]
    AssertionFailed { line: usize },

    #[error("runtime error: err executed at line {line}")]
    Failed { line: usize },

    #[error("runtime error: malformed immediate for {op} at line {line}")]
    BadImmediate { op: Op, line: usize },

    #[error("runtime error: unknown label '{0}'")]
    UnknownLabel(String),

    #[error("runtime error: unknown field '{0}'")]
    UnknownField(String),

    #[error("runtime error: no program argument {0}")]
    MissingArgument(u64),

    #[error("runtime error: scratch index {0} out of range")]
    ScratchIndex(u64),

    #[error("runtime error: byte string longer than {MAX_BYTES_LEN} at line {line}")]
    BytesTooLong { line: usize },

    #[error("runtime error: retsub with no active call at line {line}")]
    NoActiveCall { line: usize },

    #[error("runtime error: call depth limit exceeded ({0})")]
    CallDepthExceeded(usize),

    #[error("runtime error: execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("runtime error: stack size limit exceeded ({0})")]
    StackLimitExceeded(usize),

    #[error("runtime error: program ended with {0} value(s) on the stack instead of one uint64")]
    BadFinalStack(usize),
}

pub struct Vm<'a> {
    env: &'a Env,
    config: VmConfig,
    stack: Vec<StackValue>,
    scratch: Vec<StackValue>,
    frames: Vec<usize>,
    effects: Vec<Effect>,
    app_globals: BTreeMap<Vec<u8>, StackValue>,
    steps: usize,
}

/// Run `assembly` with default limits.
pub fn run(assembly: &Assembly, env: &Env) -> Result<Outcome, VmError> {
    Vm::new(env).run(assembly)
}

impl<'a> Vm<'a> {
    pub fn new(env: &'a Env) -> Self {
        Self::with_config(env, VmConfig::default())
    }

    pub fn with_config(env: &'a Env, config: VmConfig) -> Self {
        Self {
            env,
            config,
            stack: Vec::new(),
            scratch: vec![StackValue::Uint(0); NUM_SLOTS],
            frames: Vec::new(),
            effects: Vec::new(),
            app_globals: env.app_globals.clone(),
            steps: 0,
        }
    }

    fn finish(self, approved: bool) -> Outcome {
        Outcome {
            approved,
            stack: self.stack,
            scratch: self.scratch,
            effects: self.effects,
            app_globals: self.app_globals,
            steps: self.steps,
        }
    }

    pub fn run(mut self, assembly: &Assembly) -> Result<Outcome, VmError> {
        let labels: BTreeMap<&str, usize> = assembly
            .lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| line.label_name().map(|name| (name, i)))
            .collect();
        let jump = |name: &str| {
            labels
                .get(name)
                .copied()
                .ok_or_else(|| VmError::UnknownLabel(name.to_string()))
        };

        let mut pc = 0;
        while let Some(line) = assembly.lines.get(pc) {
            let AsmLine::Op { op, args } = line else {
                pc += 1;
                continue;
            };
            self.check_limits()?;
            let (op, at) = (*op, pc + 1);
            pc += 1;

            match op {
                // Literals
                Op::Int | Op::PushInt => {
                    let n = uint_arg(args, op, at)?;
                    self.push(StackValue::Uint(n))?;
                }
                Op::Byte | Op::PushBytes => {
                    let bytes = match args.first() {
                        Some(AsmArg::Bytes(bytes)) => bytes.clone(),
                        Some(AsmArg::Str(text)) => text.as_bytes().to_vec(),
                        _ => return Err(VmError::BadImmediate { op, line: at }),
                    };
                    self.push(StackValue::Bytes(bytes))?;
                }
                Op::Arg => {
                    let n = uint_arg(args, op, at)?;
                    let arg = usize::try_from(n)
                        .ok()
                        .and_then(|i| self.env.args.get(i))
                        .ok_or(VmError::MissingArgument(n))?;
                    self.push(StackValue::Bytes(arg.clone()))?;
                }

                // Environment
                Op::Txn | Op::Global => {
                    let field = name_arg(args, op, at)?;
                    let fields = if op == Op::Txn { &self.env.txn } else { &self.env.global };
                    let value = fields
                        .get(field)
                        .cloned()
                        .ok_or_else(|| VmError::UnknownField(field.to_string()))?;
                    self.push(value)?;
                }
                Op::AppGlobalGet => {
                    let key = self.pop_bytes(op, at)?;
                    let value = self.app_globals.get(&key).cloned().unwrap_or(StackValue::Uint(0));
                    self.push(value)?;
                }
                Op::AppGlobalPut => {
                    let value = self.pop(op, at)?;
                    let key = self.pop_bytes(op, at)?;
                    self.app_globals.insert(key.clone(), value.clone());
                    self.effects.push(Effect::GlobalPut { key, value });
                }
                Op::Log => {
                    let bytes = self.pop_bytes(op, at)?;
                    self.effects.push(Effect::Log(bytes));
                }

                // Scratch space
                Op::Load => {
                    let cell = scratch_index(uint_arg(args, op, at)?)?;
                    let value = self.scratch[cell].clone();
                    self.push(value)?;
                }
                Op::Store => {
                    let cell = scratch_index(uint_arg(args, op, at)?)?;
                    self.scratch[cell] = self.pop(op, at)?;
                }
                Op::Loads => {
                    let cell = scratch_index(self.pop_uint(op, at)?)?;
                    let value = self.scratch[cell].clone();
                    self.push(value)?;
                }
                Op::Stores => {
                    let value = self.pop(op, at)?;
                    let cell = scratch_index(self.pop_uint(op, at)?)?;
                    self.scratch[cell] = value;
                }

                // Stack operations
                Op::Pop => {
                    self.pop(op, at)?;
                }
                Op::Dup => {
                    let a = self.pop(op, at)?;
                    self.push(a.clone())?;
                    self.push(a)?;
                }
                Op::Dup2 => {
                    let b = self.pop(op, at)?;
                    let a = self.pop(op, at)?;
                    for value in [a.clone(), b.clone(), a, b] {
                        self.push(value)?;
                    }
                }
                Op::Dig => {
                    let depth = self.depth_arg(args, op, at)?;
                    let value = self.stack[self.stack.len() - 1 - depth].clone();
                    self.push(value)?;
                }
                Op::Swap => {
                    let b = self.pop(op, at)?;
                    let a = self.pop(op, at)?;
                    self.push(b)?;
                    self.push(a)?;
                }
                Op::Select => {
                    let c = self.pop_uint(op, at)?;
                    let b = self.pop(op, at)?;
                    let a = self.pop(op, at)?;
                    self.push(if c != 0 { b } else { a })?;
                }
                Op::Cover => {
                    let depth = self.depth_arg(args, op, at)?;
                    let top = self.pop(op, at)?;
                    let at_index = self.stack.len() - depth;
                    self.stack.insert(at_index, top);
                }
                Op::Uncover => {
                    let depth = self.depth_arg(args, op, at)?;
                    let index = self.stack.len() - 1 - depth;
                    let value = self.stack.remove(index);
                    self.push(value)?;
                }

                // Arithmetic and comparison
                Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::BitOr | Op::BitAnd
                | Op::BitXor | Op::Lt | Op::Gt | Op::Le | Op::Ge | Op::And | Op::Or => {
                    let b = self.pop_uint(op, at)?;
                    let a = self.pop_uint(op, at)?;
                    let result = arithmetic(op, a, b, at)?;
                    self.push(StackValue::Uint(result))?;
                }
                Op::Eq | Op::Neq => {
                    let b = self.pop(op, at)?;
                    let a = self.pop(op, at)?;
                    if std::mem::discriminant(&a) != std::mem::discriminant(&b) {
                        return Err(VmError::TypeMismatch {
                            op,
                            line: at,
                            expected: a.type_name(),
                            got: b.type_name(),
                        });
                    }
                    let equal = a == b;
                    self.push(StackValue::Uint(u64::from(equal == (op == Op::Eq))))?;
                }
                Op::Not => {
                    let a = self.pop_uint(op, at)?;
                    self.push(StackValue::Uint(u64::from(a == 0)))?;
                }
                Op::BitNot => {
                    let a = self.pop_uint(op, at)?;
                    self.push(StackValue::Uint(!a))?;
                }

                // Bytes
                Op::Len => {
                    let bytes = self.pop_bytes(op, at)?;
                    self.push(StackValue::Uint(bytes.len() as u64))?;
                }
                Op::Itob => {
                    let a = self.pop_uint(op, at)?;
                    self.push(StackValue::Bytes(a.to_be_bytes().to_vec()))?;
                }
                Op::Btoi => {
                    let bytes = self.pop_bytes(op, at)?;
                    if bytes.len() > 8 {
                        return Err(VmError::Overflow { op, line: at });
                    }
                    let n = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
                    self.push(StackValue::Uint(n))?;
                }
                Op::Concat => {
                    let mut b = self.pop_bytes(op, at)?;
                    let mut a = self.pop_bytes(op, at)?;
                    a.append(&mut b);
                    if a.len() > MAX_BYTES_LEN {
                        return Err(VmError::BytesTooLong { line: at });
                    }
                    self.push(StackValue::Bytes(a))?;
                }

                // Control flow
                Op::B => pc = jump(label_arg(args, op, at)?)?,
                Op::Bz | Op::Bnz => {
                    let cond = self.pop_uint(op, at)?;
                    if (cond == 0) == (op == Op::Bz) {
                        pc = jump(label_arg(args, op, at)?)?;
                    }
                }
                Op::Assert => {
                    if self.pop_uint(op, at)? == 0 {
                        return Err(VmError::AssertionFailed { line: at });
                    }
                }
                Op::Err => return Err(VmError::Failed { line: at }),
                Op::Return => {
                    let result = self.pop_uint(op, at)?;
                    trace!(target: "tealc::vm", steps = self.steps, result, "returned");
                    return Ok(self.finish(result != 0));
                }
                Op::Callsub => {
                    if self.frames.len() >= self.config.max_call_depth {
                        return Err(VmError::CallDepthExceeded(self.config.max_call_depth));
                    }
                    let target = jump(label_arg(args, op, at)?)?;
                    self.frames.push(pc);
                    pc = target;
                }
                Op::Retsub => {
                    pc = self.frames.pop().ok_or(VmError::NoActiveCall { line: at })?;
                }
            }
        }

        match self.stack.as_slice() {
            [StackValue::Uint(n)] => {
                let approved = *n != 0;
                self.stack.clear();
                Ok(self.finish(approved))
            }
            other => Err(VmError::BadFinalStack(other.len())),
        }
    }

    fn check_limits(&mut self) -> Result<(), VmError> {
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(VmError::StepLimitExceeded(self.config.max_steps));
        }
        if self.stack.len() > self.config.max_stack_size {
            return Err(VmError::StackLimitExceeded(self.config.max_stack_size));
        }
        Ok(())
    }

    fn push(&mut self, value: StackValue) -> Result<(), VmError> {
        if self.stack.len() >= self.config.max_stack_size {
            return Err(VmError::StackLimitExceeded(self.config.max_stack_size));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, op: Op, line: usize) -> Result<StackValue, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow { op, line })
    }

    fn pop_uint(&mut self, op: Op, line: usize) -> Result<u64, VmError> {
        match self.pop(op, line)? {
            StackValue::Uint(n) => Ok(n),
            other => Err(VmError::TypeMismatch {
                op,
                line,
                expected: "uint64",
                got: other.type_name(),
            }),
        }
    }

    fn pop_bytes(&mut self, op: Op, line: usize) -> Result<Vec<u8>, VmError> {
        match self.pop(op, line)? {
            StackValue::Bytes(bytes) => Ok(bytes),
            other => Err(VmError::TypeMismatch {
                op,
                line,
                expected: "bytes",
                got: other.type_name(),
            }),
        }
    }

    /// Immediate depth of `dig`/`cover`/`uncover`, checked against the stack.
    fn depth_arg(&self, args: &[AsmArg], op: Op, line: usize) -> Result<usize, VmError> {
        let depth = usize::try_from(uint_arg(args, op, line)?)
            .map_err(|_| VmError::BadImmediate { op, line })?;
        if depth >= self.stack.len() {
            return Err(VmError::StackUnderflow { op, line });
        }
        Ok(depth)
    }
}

fn uint_arg(args: &[AsmArg], op: Op, line: usize) -> Result<u64, VmError> {
    match args.first() {
        Some(AsmArg::Uint(n)) => Ok(*n),
        _ => Err(VmError::BadImmediate { op, line }),
    }
}

fn name_arg(args: &[AsmArg], op: Op, line: usize) -> Result<&str, VmError> {
    match args.first() {
        Some(AsmArg::Name(name)) => Ok(name),
        _ => Err(VmError::BadImmediate { op, line }),
    }
}

fn label_arg(args: &[AsmArg], op: Op, line: usize) -> Result<&str, VmError> {
    match args.first() {
        Some(AsmArg::Label(name)) => Ok(name),
        _ => Err(VmError::BadImmediate { op, line }),
    }
}

fn scratch_index(n: u64) -> Result<usize, VmError> {
    usize::try_from(n)
        .ok()
        .filter(|&i| i < NUM_SLOTS)
        .ok_or(VmError::ScratchIndex(n))
}

fn arithmetic(op: Op, a: u64, b: u64, line: usize) -> Result<u64, VmError> {
    let overflow = VmError::Overflow { op, line };
    Ok(match op {
        Op::Add => a.checked_add(b).ok_or(overflow)?,
        Op::Sub => a.checked_sub(b).ok_or(overflow)?,
        Op::Mul => a.checked_mul(b).ok_or(overflow)?,
        Op::Div => a.checked_div(b).ok_or(VmError::DivisionByZero { line })?,
        Op::Mod => a.checked_rem(b).ok_or(VmError::DivisionByZero { line })?,
        Op::BitOr => a | b,
        Op::BitAnd => a & b,
        Op::BitXor => a ^ b,
        Op::Lt => u64::from(a < b),
        Op::Gt => u64::from(a > b),
        Op::Le => u64::from(a <= b),
        Op::Ge => u64::from(a >= b),
        Op::And => u64::from(a != 0 && b != 0),
        Op::Or => u64::from(a != 0 || b != 0),
        _ => return Err(VmError::BadImmediate { op, line }),
    })
}
