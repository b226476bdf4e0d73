use std::cell::OnceCell;

use crate::compiler::compile_error::CompileError;
use crate::ir::{ScratchSlot, SlotCounter, SubroutineId};
use crate::lang::expr::{Expr, ExprRef, TealType};
use crate::lang::node::{ScratchIndex, ScratchLoad, ScratchStore};

/// `cover` takes the argument count as an 8-bit immediate.
pub const MAX_ARGS: usize = u8::MAX as usize;

/// What a subroutine leaves on the stack when it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    None,
    Value(TealType),
}

impl ReturnKind {
    pub fn returns_value(self) -> bool {
        matches!(self, ReturnKind::Value(_))
    }

    pub fn teal_type(self) -> TealType {
        match self {
            ReturnKind::None => TealType::None,
            ReturnKind::Value(ty) => ty,
        }
    }
}

/// Cheap reference to a declared subroutine, usable from call sites
/// (including inside the subroutine's own body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineHandle {
    id: SubroutineId,
    name: String,
    arg_count: usize,
    returns: ReturnKind,
}

impl SubroutineHandle {
    pub fn id(&self) -> SubroutineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    pub fn returns(&self) -> ReturnKind {
        self.returns
    }
}

/// A scratch cell wrapped for use in expression trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchVar {
    slot: ScratchSlot,
    ty: TealType,
}

impl ScratchVar {
    pub fn slot(&self) -> ScratchSlot {
        self.slot
    }

    pub fn store(&self, value: ExprRef) -> ExprRef {
        Box::new(ScratchStore::new(self.slot, value))
    }

    pub fn load(&self) -> ExprRef {
        Box::new(ScratchLoad::new(self.slot, self.ty))
    }

    /// Push the numeric id of the underlying cell, for indirect access.
    pub fn index(&self) -> ExprRef {
        Box::new(ScratchIndex::new(self.slot))
    }
}

/// What a subroutine body builder gets to work with.
pub struct BodyScope<'a> {
    program: &'a Program,
    handle: &'a SubroutineHandle,
    params: &'a [ScratchVar],
}

impl<'a> BodyScope<'a> {
    /// The subroutine being built, for recursive calls.
    pub fn this(&self) -> &SubroutineHandle {
        self.handle
    }

    pub fn params(&self) -> &[ScratchVar] {
        self.params
    }

    /// Load argument `i`.
    pub fn arg(&self, i: usize) -> Result<ExprRef, CompileError> {
        self.params.get(i).map(ScratchVar::load).ok_or_else(|| {
            CompileError::invalid(format!(
                "subroutine '{}' has {} argument(s), there is no argument {}",
                self.handle.name,
                self.params.len(),
                i
            ))
        })
    }

    pub fn scratch_var(&self, ty: TealType) -> ScratchVar {
        self.program.scratch_var(ty)
    }
}

type BodyFn = Box<dyn Fn(&BodyScope<'_>) -> ExprRef>;

pub struct SubroutineDefinition {
    handle: SubroutineHandle,
    params: Vec<ScratchVar>,
    builder: Option<BodyFn>,
    body: OnceCell<ExprRef>,
}

impl SubroutineDefinition {
    pub fn handle(&self) -> &SubroutineHandle {
        &self.handle
    }

    pub fn params(&self) -> &[ScratchVar] {
        &self.params
    }

    /// Build the body on first use and cache it.
    pub fn body(&self, program: &Program) -> Result<&dyn Expr, CompileError> {
        let builder = self.builder.as_ref().ok_or_else(|| {
            CompileError::invalid_with_hint(
                format!("subroutine '{}' is declared but has no body", self.handle.name),
                "call Program::implement before compiling",
            )
        })?;
        let body = self.body.get_or_init(|| {
            builder(&BodyScope {
                program,
                handle: &self.handle,
                params: &self.params,
            })
        });
        Ok(body.as_ref())
    }

    pub fn is_evaluated(&self) -> bool {
        self.body.get().is_some()
    }
}

impl std::fmt::Debug for SubroutineDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubroutineDefinition")
            .field("handle", &self.handle)
            .field("params", &self.params)
            .field("implemented", &self.builder.is_some())
            .field("body", &self.body.get())
            .finish()
    }
}

/// Everything one compilation needs besides the main expression: the slot
/// counter and the subroutine registry. Nothing here is process-global, so
/// two programs never share ids.
#[derive(Debug, Default)]
pub struct Program {
    slots: SlotCounter,
    subroutines: Vec<SubroutineDefinition>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &SlotCounter {
        &self.slots
    }

    pub fn scratch_var(&self, ty: TealType) -> ScratchVar {
        ScratchVar {
            slot: self.slots.fresh(),
            ty,
        }
    }

    /// A variable pinned to a specific scratch cell.
    pub fn reserved_var(&self, cell: u8, ty: TealType) -> ScratchVar {
        ScratchVar {
            slot: self.slots.reserved(cell),
            ty,
        }
    }

    pub fn declare(
        &mut self,
        name: &str,
        arg_count: usize,
        returns: ReturnKind,
    ) -> Result<SubroutineHandle, CompileError> {
        if arg_count > MAX_ARGS {
            return Err(CompileError::invalid_with_hint(
                format!(
                    "subroutine '{}' declares {} arguments, at most {} are supported",
                    name, arg_count, MAX_ARGS
                ),
                "pass the extra values through scratch variables",
            ));
        }
        let handle = SubroutineHandle {
            id: SubroutineId(self.subroutines.len() as u32),
            name: name.to_string(),
            arg_count,
            returns,
        };
        let params = (0..arg_count)
            .map(|_| self.scratch_var(TealType::Anytype))
            .collect();
        self.subroutines.push(SubroutineDefinition {
            handle: handle.clone(),
            params,
            builder: None,
            body: OnceCell::new(),
        });
        Ok(handle)
    }

    pub fn implement(
        &mut self,
        handle: &SubroutineHandle,
        body: impl Fn(&BodyScope<'_>) -> ExprRef + 'static,
    ) -> Result<(), CompileError> {
        let definition = self
            .subroutines
            .get_mut(handle.id.0 as usize)
            .filter(|def| def.handle == *handle)
            .ok_or_else(|| foreign(handle))?;
        if definition.builder.is_some() {
            return Err(CompileError::invalid(format!(
                "subroutine '{}' already has a body",
                handle.name
            )));
        }
        definition.builder = Some(Box::new(body));
        Ok(())
    }

    /// Declare and implement in one step. The builder can reach the new
    /// subroutine through [`BodyScope::this`].
    pub fn define(
        &mut self,
        name: &str,
        arg_count: usize,
        returns: ReturnKind,
        body: impl Fn(&BodyScope<'_>) -> ExprRef + 'static,
    ) -> Result<SubroutineHandle, CompileError> {
        let handle = self.declare(name, arg_count, returns)?;
        self.implement(&handle, body)?;
        Ok(handle)
    }

    pub fn subroutine(&self, id: SubroutineId) -> Result<&SubroutineDefinition, CompileError> {
        self.subroutines
            .get(id.0 as usize)
            .ok_or_else(|| CompileError::internal(format!("unknown subroutine #{}", id.0)))
    }

    /// The definition `handle` was issued for, if this program issued it.
    pub fn resolve(&self, handle: &SubroutineHandle) -> Result<&SubroutineDefinition, CompileError> {
        self.subroutines
            .get(handle.id.0 as usize)
            .filter(|def| def.handle == *handle)
            .ok_or_else(|| foreign(handle))
    }

    pub fn subroutines(&self) -> impl Iterator<Item = &SubroutineDefinition> {
        self.subroutines.iter()
    }
}

fn foreign(handle: &SubroutineHandle) -> CompileError {
    CompileError::invalid(format!(
        "subroutine '{}' does not belong to this program",
        handle.name
    ))
}
