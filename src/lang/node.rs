//! The expression nodes the backend is driven with.
//!
//! Each node lowers itself into blocks of the context's graph and reports
//! its type, version floor and whether it always ends the routine.

use crate::compiler::compile_error::CompileError;
use crate::compiler::context::CompileContext;
use crate::ir::{Arg as OpArg, BlockId, Op, ScratchSlot, TealOp};
use crate::lang::expr::{Expr, ExprRef, TealType};
use crate::lang::program::{ReturnKind, SubroutineHandle};

type Lowered = Result<(BlockId, BlockId), CompileError>;

// =============================================================================
// Literals and environment reads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Int(pub u64);

impl Expr for Int {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        Ok(ctx.single(TealOp::int(self.0)))
    }

    fn type_of(&self) -> TealType {
        TealType::Uint64
    }

    fn name(&self) -> String {
        format!("int {}", self.0)
    }
}

/// Byte string literal, emitted in hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl Expr for Bytes {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        Ok(ctx.single(TealOp::with_args(Op::Byte, vec![OpArg::Bytes(self.0.clone())])))
    }

    fn type_of(&self) -> TealType {
        TealType::Bytes
    }

    fn name(&self) -> String {
        "bytes".to_string()
    }
}

/// Byte string literal, emitted as a quoted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(pub String);

impl Expr for Text {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        Ok(ctx.single(TealOp::with_args(Op::Byte, vec![OpArg::Str(self.0.clone())])))
    }

    fn type_of(&self) -> TealType {
        TealType::Bytes
    }

    fn name(&self) -> String {
        format!("{:?}", self.0)
    }
}

/// Read a field of the current transaction (`txn <field>`) or of the
/// global environment (`global <field>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    op: Op,
    field: String,
    ty: TealType,
}

impl Expr for Field {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        Ok(ctx.single(TealOp::with_args(
            self.op,
            vec![OpArg::Name(self.field.clone())],
        )))
    }

    fn type_of(&self) -> TealType {
        self.ty
    }

    fn name(&self) -> String {
        format!("{} {}", self.op, self.field)
    }
}

/// Logic signature argument `arg <n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigArg(pub u8);

impl Expr for SigArg {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        Ok(ctx.single(TealOp::immediate(Op::Arg, self.0 as u64)))
    }

    fn type_of(&self) -> TealType {
        TealType::Bytes
    }

    fn name(&self) -> String {
        format!("arg {}", self.0)
    }
}

// =============================================================================
// Operators
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitAnd,
    BitXor,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Neq,
    And,
    Or,
    Concat,
}

impl BinaryKind {
    fn op(self) -> Op {
        match self {
            BinaryKind::Add => Op::Add,
            BinaryKind::Sub => Op::Sub,
            BinaryKind::Mul => Op::Mul,
            BinaryKind::Div => Op::Div,
            BinaryKind::Mod => Op::Mod,
            BinaryKind::BitOr => Op::BitOr,
            BinaryKind::BitAnd => Op::BitAnd,
            BinaryKind::BitXor => Op::BitXor,
            BinaryKind::Lt => Op::Lt,
            BinaryKind::Gt => Op::Gt,
            BinaryKind::Le => Op::Le,
            BinaryKind::Ge => Op::Ge,
            BinaryKind::Eq => Op::Eq,
            BinaryKind::Neq => Op::Neq,
            BinaryKind::And => Op::And,
            BinaryKind::Or => Op::Or,
            BinaryKind::Concat => Op::Concat,
        }
    }
}

#[derive(Debug)]
pub struct Binary {
    kind: BinaryKind,
    left: ExprRef,
    right: ExprRef,
}

impl Expr for Binary {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        ctx.from_op(
            TealOp::new(self.kind.op()),
            &[self.left.as_ref(), self.right.as_ref()],
        )
    }

    fn type_of(&self) -> TealType {
        match self.kind {
            BinaryKind::Concat => TealType::Bytes,
            _ => TealType::Uint64,
        }
    }

    fn name(&self) -> String {
        self.kind.op().mnemonic().to_string()
    }

    fn min_version(&self) -> u8 {
        self.kind.op().min_version().max(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryKind {
    Not,
    BitNot,
    Len,
    Itob,
    Btoi,
    Pop,
    Log,
    Assert,
}

impl UnaryKind {
    fn op(self) -> Op {
        match self {
            UnaryKind::Not => Op::Not,
            UnaryKind::BitNot => Op::BitNot,
            UnaryKind::Len => Op::Len,
            UnaryKind::Itob => Op::Itob,
            UnaryKind::Btoi => Op::Btoi,
            UnaryKind::Pop => Op::Pop,
            UnaryKind::Log => Op::Log,
            UnaryKind::Assert => Op::Assert,
        }
    }
}

#[derive(Debug)]
pub struct Unary {
    kind: UnaryKind,
    arg: ExprRef,
}

impl Expr for Unary {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        if !self.arg.type_of().is_value() {
            return Err(CompileError::invalid(format!(
                "{} needs a value, but its argument ({}) produces none",
                self.name(),
                self.arg.name()
            )));
        }
        ctx.from_op(TealOp::new(self.kind.op()), &[self.arg.as_ref()])
    }

    fn type_of(&self) -> TealType {
        match self.kind {
            UnaryKind::Itob => TealType::Bytes,
            UnaryKind::Pop | UnaryKind::Log | UnaryKind::Assert => TealType::None,
            _ => TealType::Uint64,
        }
    }

    fn name(&self) -> String {
        self.kind.op().mnemonic().to_string()
    }

    fn min_version(&self) -> u8 {
        self.kind.op().min_version().max(2)
    }
}

// =============================================================================
// Sequencing and control flow
// =============================================================================

#[derive(Debug)]
pub struct Seq(pub Vec<ExprRef>);

impl Expr for Seq {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        let Some((_, init)) = self.0.split_last() else {
            let empty = ctx.cfg.simple(Vec::new());
            return Ok((empty, empty));
        };

        for item in init {
            if item.type_of().is_value() {
                return Err(CompileError::invalid_with_hint(
                    format!("{} leaves a value in the middle of a sequence", item.name()),
                    "wrap the expression in pop(...) to discard its value",
                ));
            }
        }

        let mut start = None;
        let mut end: Option<BlockId> = None;
        for item in &self.0 {
            let (item_start, item_end) = ctx.lower(item.as_ref())?;
            if let Some(prev) = end {
                ctx.cfg.set_next(prev, item_start)?;
            }
            start.get_or_insert(item_start);
            end = Some(item_end);
        }

        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(CompileError::internal("empty sequence after split")),
        }
    }

    fn type_of(&self) -> TealType {
        self.0.last().map_or(TealType::None, |e| e.type_of())
    }

    fn name(&self) -> String {
        "seq".to_string()
    }

    fn min_version(&self) -> u8 {
        2
    }

    fn terminates(&self) -> bool {
        self.0.iter().any(|e| e.terminates())
    }
}

#[derive(Debug)]
pub struct If {
    cond: ExprRef,
    then: ExprRef,
    otherwise: Option<ExprRef>,
}

impl Expr for If {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        let then_ty = self.then.type_of();
        match &self.otherwise {
            None if then_ty.is_value() => {
                return Err(CompileError::invalid_with_hint(
                    "an if without else cannot produce a value",
                    "add an else branch or discard the value with pop(...)",
                ));
            }
            Some(otherwise)
                if then_ty.is_value() != otherwise.type_of().is_value()
                    && !self.then.terminates()
                    && !otherwise.terminates() =>
            {
                return Err(CompileError::invalid(format!(
                    "if branches disagree: then produces {}, else produces {}",
                    then_ty,
                    otherwise.type_of()
                )));
            }
            _ => {}
        }

        let (cond_start, cond_end) = ctx.lower(self.cond.as_ref())?;
        let branch = ctx.cfg.conditional(Vec::new());
        ctx.cfg.set_next(cond_end, branch)?;

        let (then_start, then_end) = ctx.lower(self.then.as_ref())?;
        let end = ctx.cfg.simple(Vec::new());
        ctx.cfg.set_next(then_end, end)?;

        match &self.otherwise {
            Some(otherwise) => {
                let (else_start, else_end) = ctx.lower(otherwise.as_ref())?;
                ctx.cfg.set_next(else_end, end)?;
                ctx.cfg.set_branches(branch, then_start, else_start)?;
            }
            None => ctx.cfg.set_branches(branch, then_start, end)?,
        }

        Ok((cond_start, end))
    }

    fn type_of(&self) -> TealType {
        match &self.otherwise {
            Some(otherwise) if self.then.terminates() => otherwise.type_of(),
            _ => self.then.type_of(),
        }
    }

    fn name(&self) -> String {
        "if".to_string()
    }

    fn terminates(&self) -> bool {
        self.cond.terminates()
            || self.then.terminates() && self.otherwise.as_ref().is_some_and(|e| e.terminates())
    }
}

#[derive(Debug)]
pub struct While {
    cond: ExprRef,
    body: ExprRef,
}

impl Expr for While {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        if self.body.type_of().is_value() {
            return Err(CompileError::invalid_with_hint(
                "a while body cannot produce a value",
                "discard the value with pop(...)",
            ));
        }

        let (cond_start, cond_end) = ctx.lower(self.cond.as_ref())?;
        let branch = ctx.cfg.conditional(Vec::new());
        ctx.cfg.set_next(cond_end, branch)?;

        ctx.enter_loop();
        let body = ctx.lower(self.body.as_ref());
        let (breaks, continues) = ctx.exit_loop()?;
        let (body_start, body_end) = body?;

        let end = ctx.cfg.simple(Vec::new());
        ctx.cfg.set_branches(branch, body_start, end)?;
        ctx.cfg.set_next(body_end, cond_start)?;

        for block in breaks {
            ctx.cfg.set_next(block, end)?;
        }
        for block in continues {
            ctx.cfg.set_next(block, cond_start)?;
        }

        Ok((cond_start, end))
    }

    fn type_of(&self) -> TealType {
        TealType::None
    }

    fn name(&self) -> String {
        "while".to_string()
    }
}

/// Leave the innermost loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Break;

impl Expr for Break {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        let block = ctx.cfg.simple(Vec::new());
        ctx.add_break(block)?;
        Ok((block, block))
    }

    fn type_of(&self) -> TealType {
        TealType::None
    }

    fn name(&self) -> String {
        "break".to_string()
    }
}

/// Jump back to the innermost loop's condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continue;

impl Expr for Continue {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        let block = ctx.cfg.simple(Vec::new());
        ctx.add_continue(block)?;
        Ok((block, block))
    }

    fn type_of(&self) -> TealType {
        TealType::None
    }

    fn name(&self) -> String {
        "continue".to_string()
    }
}

/// `return` from the main routine, `retsub` from a subroutine.
#[derive(Debug)]
pub struct Return(pub Option<ExprRef>);

impl Expr for Return {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        let returns = ctx.current_subroutine().map(|h| h.returns());
        match (returns, &self.0) {
            (None, Some(value)) => ctx.from_op(TealOp::new(Op::Return), &[value.as_ref()]),
            (None, None) => Err(CompileError::invalid_with_hint(
                "return from the main routine needs a value",
                "use approve() or reject()",
            )),
            (Some(ReturnKind::Value(_)), Some(value)) => {
                if !value.type_of().is_value() {
                    return Err(CompileError::invalid(format!(
                        "subroutine '{}' must return a value, but {} produces none",
                        ctx.routine_name(),
                        value.name()
                    )));
                }
                ctx.from_op(TealOp::new(Op::Retsub), &[value.as_ref()])
            }
            (Some(ReturnKind::None), None) => Ok(ctx.single(TealOp::new(Op::Retsub))),
            (Some(ReturnKind::Value(_)), None) => Err(CompileError::invalid(format!(
                "subroutine '{}' must return a value",
                ctx.routine_name()
            ))),
            (Some(ReturnKind::None), Some(_)) => Err(CompileError::invalid(format!(
                "subroutine '{}' does not return a value",
                ctx.routine_name()
            ))),
        }
    }

    fn type_of(&self) -> TealType {
        TealType::None
    }

    fn name(&self) -> String {
        "return".to_string()
    }

    fn terminates(&self) -> bool {
        true
    }
}

/// End the program with a constant verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exit(pub bool);

impl Expr for Exit {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        let block = ctx
            .cfg
            .simple(vec![TealOp::int(self.0 as u64), TealOp::new(Op::Return)]);
        Ok((block, block))
    }

    fn type_of(&self) -> TealType {
        TealType::None
    }

    fn name(&self) -> String {
        let name = if self.0 { "approve" } else { "reject" };
        name.to_string()
    }

    fn terminates(&self) -> bool {
        true
    }
}

/// Fail the program immediately (`err`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abort;

impl Expr for Abort {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        Ok(ctx.single(TealOp::new(Op::Err)))
    }

    fn type_of(&self) -> TealType {
        TealType::None
    }

    fn name(&self) -> String {
        "err".to_string()
    }

    fn terminates(&self) -> bool {
        true
    }
}

// =============================================================================
// Scratch space
// =============================================================================

#[derive(Debug)]
pub struct ScratchStore {
    slot: ScratchSlot,
    value: ExprRef,
}

impl ScratchStore {
    pub fn new(slot: ScratchSlot, value: ExprRef) -> Self {
        Self { slot, value }
    }
}

impl Expr for ScratchStore {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        if !self.value.type_of().is_value() {
            return Err(CompileError::invalid(format!(
                "cannot store {}: it produces no value",
                self.value.name()
            )));
        }
        ctx.from_op(TealOp::slot(Op::Store, self.slot), &[self.value.as_ref()])
    }

    fn type_of(&self) -> TealType {
        TealType::None
    }

    fn name(&self) -> String {
        format!("store {}", self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLoad {
    slot: ScratchSlot,
    ty: TealType,
}

impl ScratchLoad {
    pub fn new(slot: ScratchSlot, ty: TealType) -> Self {
        Self { slot, ty }
    }
}

impl Expr for ScratchLoad {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        Ok(ctx.single(TealOp::slot(Op::Load, self.slot)))
    }

    fn type_of(&self) -> TealType {
        self.ty
    }

    fn name(&self) -> String {
        format!("load {}", self.slot)
    }
}

/// Push the numeric id a slot ends up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchIndex {
    slot: ScratchSlot,
}

impl ScratchIndex {
    pub fn new(slot: ScratchSlot) -> Self {
        Self { slot }
    }
}

impl Expr for ScratchIndex {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        Ok(ctx.single(TealOp::with_args(
            Op::Int,
            vec![OpArg::SlotIndex(self.slot)],
        )))
    }

    fn type_of(&self) -> TealType {
        TealType::Uint64
    }

    fn name(&self) -> String {
        format!("index of {}", self.slot)
    }
}

/// `loads`: read the scratch cell whose id is on the stack.
#[derive(Debug)]
pub struct LoadIndirect {
    index: ExprRef,
}

impl Expr for LoadIndirect {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        ctx.from_op(TealOp::new(Op::Loads), &[self.index.as_ref()])
    }

    fn type_of(&self) -> TealType {
        TealType::Anytype
    }

    fn name(&self) -> String {
        "loads".to_string()
    }

    fn min_version(&self) -> u8 {
        Op::Loads.min_version()
    }
}

/// `stores`: write the scratch cell whose id is on the stack.
#[derive(Debug)]
pub struct StoreIndirect {
    index: ExprRef,
    value: ExprRef,
}

impl Expr for StoreIndirect {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        ctx.from_op(
            TealOp::new(Op::Stores),
            &[self.index.as_ref(), self.value.as_ref()],
        )
    }

    fn type_of(&self) -> TealType {
        TealType::None
    }

    fn name(&self) -> String {
        "stores".to_string()
    }

    fn min_version(&self) -> u8 {
        Op::Stores.min_version()
    }
}

// =============================================================================
// Application state
// =============================================================================

#[derive(Debug)]
pub struct AppGlobalGet {
    key: ExprRef,
}

impl Expr for AppGlobalGet {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        ctx.from_op(TealOp::new(Op::AppGlobalGet), &[self.key.as_ref()])
    }

    fn type_of(&self) -> TealType {
        TealType::Anytype
    }

    fn name(&self) -> String {
        "app_global_get".to_string()
    }
}

#[derive(Debug)]
pub struct AppGlobalPut {
    key: ExprRef,
    value: ExprRef,
}

impl Expr for AppGlobalPut {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        ctx.from_op(
            TealOp::new(Op::AppGlobalPut),
            &[self.key.as_ref(), self.value.as_ref()],
        )
    }

    fn type_of(&self) -> TealType {
        TealType::None
    }

    fn name(&self) -> String {
        "app_global_put".to_string()
    }
}

// =============================================================================
// Subroutine calls
// =============================================================================

#[derive(Debug)]
pub struct SubroutineCall {
    target: SubroutineHandle,
    args: Vec<ExprRef>,
}

impl Expr for SubroutineCall {
    fn lower(&self, ctx: &mut CompileContext<'_>) -> Lowered {
        // a handle issued by another program may share this id
        ctx.program().resolve(&self.target)?;
        if self.args.len() != self.target.arg_count() {
            return Err(CompileError::invalid(format!(
                "subroutine '{}' takes {} argument(s), but {} were given",
                self.target.name(),
                self.target.arg_count(),
                self.args.len()
            )));
        }
        if let Some(arg) = self.args.iter().find(|a| !a.type_of().is_value()) {
            return Err(CompileError::invalid(format!(
                "argument {} to subroutine '{}' produces no value",
                arg.name(),
                self.target.name()
            )));
        }

        ctx.reference(self.target.id());
        let args: Vec<&dyn Expr> = self.args.iter().map(|a| a.as_ref()).collect();
        ctx.from_op(TealOp::callsub(self.target.id()), &args)
    }

    fn type_of(&self) -> TealType {
        self.target.returns().teal_type()
    }

    fn name(&self) -> String {
        format!("call to '{}'", self.target.name())
    }

    fn min_version(&self) -> u8 {
        Op::Callsub.min_version()
    }
}

// =============================================================================
// Constructors
// =============================================================================

pub fn int(value: u64) -> ExprRef {
    Box::new(Int(value))
}

pub fn bytes(value: impl Into<Vec<u8>>) -> ExprRef {
    Box::new(Bytes(value.into()))
}

pub fn text(value: &str) -> ExprRef {
    Box::new(Text(value.to_string()))
}

pub fn txn(field: &str, ty: TealType) -> ExprRef {
    Box::new(Field {
        op: Op::Txn,
        field: field.to_string(),
        ty,
    })
}

pub fn global(field: &str, ty: TealType) -> ExprRef {
    Box::new(Field {
        op: Op::Global,
        field: field.to_string(),
        ty,
    })
}

pub fn sig_arg(index: u8) -> ExprRef {
    Box::new(SigArg(index))
}

pub fn binary(kind: BinaryKind, left: ExprRef, right: ExprRef) -> ExprRef {
    Box::new(Binary { kind, left, right })
}

pub fn add(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryKind::Add, left, right)
}

pub fn sub(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryKind::Sub, left, right)
}

pub fn mul(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryKind::Mul, left, right)
}

pub fn lt(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryKind::Lt, left, right)
}

pub fn gt(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryKind::Gt, left, right)
}

pub fn eq(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryKind::Eq, left, right)
}

pub fn unary(kind: UnaryKind, arg: ExprRef) -> ExprRef {
    Box::new(Unary { kind, arg })
}

pub fn not(arg: ExprRef) -> ExprRef {
    unary(UnaryKind::Not, arg)
}

pub fn pop(arg: ExprRef) -> ExprRef {
    unary(UnaryKind::Pop, arg)
}

pub fn log(arg: ExprRef) -> ExprRef {
    unary(UnaryKind::Log, arg)
}

pub fn assert(arg: ExprRef) -> ExprRef {
    unary(UnaryKind::Assert, arg)
}

pub fn seq(items: Vec<ExprRef>) -> ExprRef {
    Box::new(Seq(items))
}

pub fn if_then(cond: ExprRef, then: ExprRef) -> ExprRef {
    Box::new(If {
        cond,
        then,
        otherwise: None,
    })
}

pub fn if_else(cond: ExprRef, then: ExprRef, otherwise: ExprRef) -> ExprRef {
    Box::new(If {
        cond,
        then,
        otherwise: Some(otherwise),
    })
}

pub fn while_loop(cond: ExprRef, body: ExprRef) -> ExprRef {
    Box::new(While { cond, body })
}

pub fn brk() -> ExprRef {
    Box::new(Break)
}

pub fn cont() -> ExprRef {
    Box::new(Continue)
}

pub fn ret() -> ExprRef {
    Box::new(Return(None))
}

pub fn ret_value(value: ExprRef) -> ExprRef {
    Box::new(Return(Some(value)))
}

pub fn approve() -> ExprRef {
    Box::new(Exit(true))
}

pub fn reject() -> ExprRef {
    Box::new(Exit(false))
}

pub fn abort() -> ExprRef {
    Box::new(Abort)
}

pub fn load_indirect(index: ExprRef) -> ExprRef {
    Box::new(LoadIndirect { index })
}

pub fn store_indirect(index: ExprRef, value: ExprRef) -> ExprRef {
    Box::new(StoreIndirect { index, value })
}

pub fn app_global_get(key: ExprRef) -> ExprRef {
    Box::new(AppGlobalGet { key })
}

pub fn app_global_put(key: ExprRef, value: ExprRef) -> ExprRef {
    Box::new(AppGlobalPut { key, value })
}

pub fn call(target: &SubroutineHandle, args: Vec<ExprRef>) -> ExprRef {
    Box::new(SubroutineCall {
        target: target.clone(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileOptions;
    use crate::ir::BlockKind;
    use crate::lang::program::Program;

    fn lower_main(expr: &dyn Expr) -> Result<(crate::ir::Cfg, BlockId), CompileError> {
        let program = Program::new();
        let mut ctx = CompileContext::new(&program, &CompileOptions::default());
        let (entry, _) = ctx.lower(expr)?;
        Ok((ctx.finish_routine(), entry))
    }

    #[test]
    fn test_binary_lowers_args_then_op() {
        let expr = add(int(1), int(2));
        let (mut cfg, entry) = lower_main(expr.as_ref()).unwrap();
        cfg.compute_incoming(entry);
        cfg.normalize(entry);

        assert_eq!(
            cfg.block(entry).ops,
            vec![TealOp::int(1), TealOp::int(2), TealOp::new(Op::Add)]
        );
    }

    #[test]
    fn test_if_shape() {
        let expr = if_else(int(1), int(2), int(3));
        let (mut cfg, entry) = lower_main(expr.as_ref()).unwrap();
        cfg.compute_incoming(entry);
        cfg.normalize(entry);
        cfg.validate(entry).unwrap();

        let reachable = cfg.reachable(entry);
        assert_eq!(reachable.len(), 4);
        assert!(cfg.block(entry).is_conditional());
        let join = reachable[3];
        assert_eq!(cfg.block(join).incoming.len(), 2);
    }

    #[test]
    fn test_while_links_breaks_and_continues() {
        let expr = while_loop(
            int(1),
            seq(vec![if_then(int(0), brk()), if_then(int(1), cont()), pop(int(5))]),
        );
        let (mut cfg, entry) = lower_main(expr.as_ref()).unwrap();
        cfg.compute_incoming(entry);
        cfg.validate(entry).unwrap();

        assert!(cfg.block(entry).incoming.len() >= 2);
        let end = cfg
            .reachable(entry)
            .into_iter()
            .find(|&b| cfg.block(b).successors().is_empty())
            .unwrap();
        assert!(matches!(cfg.block(end).kind, BlockKind::Simple { next: None }));
        assert_eq!(cfg.block(end).incoming.len(), 2);
    }

    #[test]
    fn test_break_outside_loop() {
        let err = lower_main(brk().as_ref()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidProgram { .. }));
    }

    #[test]
    fn test_seq_rejects_dangling_values() {
        let expr = seq(vec![int(1), int(2)]);
        assert!(lower_main(expr.as_ref()).is_err());
    }

    #[test]
    fn test_if_without_else_cannot_produce_value() {
        let expr = if_then(int(1), int(2));
        assert!(lower_main(expr.as_ref()).is_err());
    }

    #[test]
    fn test_return_in_main_needs_value() {
        assert!(lower_main(ret().as_ref()).is_err());
        assert!(lower_main(ret_value(int(1)).as_ref()).is_ok());
    }

    #[test]
    fn test_terminates() {
        assert!(approve().terminates());
        assert!(seq(vec![pop(int(1)), reject()]).terminates());
        assert!(if_else(int(1), approve(), abort()).terminates());
        assert!(!if_else(int(1), approve(), pop(int(1))).terminates());
        assert!(!if_then(int(1), approve()).terminates());
    }

    #[test]
    fn test_version_floor_checked_on_lower() {
        let program = Program::new();
        let options = CompileOptions {
            version: 4,
            ..CompileOptions::default()
        };
        let mut ctx = CompileContext::new(&program, &options);
        let err = ctx.lower(log(text("hi")).as_ref()).unwrap_err();
        assert!(matches!(err, CompileError::VersionMismatch { required: 5, .. }));
    }
}
