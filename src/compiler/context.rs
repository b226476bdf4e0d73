use std::collections::BTreeSet;

use crate::compiler::CompileOptions;
use crate::compiler::compile_error::CompileError;
use crate::ir::{BlockId, Cfg, Mode, ScratchSlot, SubroutineId, TealOp};
use crate::lang::expr::Expr;
use crate::lang::program::{Program, SubroutineHandle};

/// State threaded through lowering of one compilation.
///
/// Holds the graph of the routine currently being lowered, which routine
/// that is, and the pending break/continue blocks of every enclosing loop.
pub struct CompileContext<'p> {
    program: &'p Program,
    pub version: u8,
    pub mode: Mode,
    pub cfg: Cfg,
    current: Option<SubroutineHandle>,
    breaks: Vec<Vec<BlockId>>,
    continues: Vec<Vec<BlockId>>,
    referenced: BTreeSet<SubroutineId>,
}

impl<'p> CompileContext<'p> {
    pub fn new(program: &'p Program, options: &CompileOptions) -> Self {
        Self {
            program,
            version: options.version,
            mode: options.mode,
            cfg: Cfg::new(),
            current: None,
            breaks: Vec::new(),
            continues: Vec::new(),
            referenced: BTreeSet::new(),
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    /// Start lowering a fresh routine; `None` is the main routine.
    pub fn begin_routine(&mut self, current: Option<SubroutineHandle>) {
        self.cfg = Cfg::new();
        self.current = current;
        self.breaks.clear();
        self.continues.clear();
    }

    /// Hand back the graph built for the current routine.
    pub fn finish_routine(&mut self) -> Cfg {
        self.current = None;
        std::mem::take(&mut self.cfg)
    }

    pub fn current_subroutine(&self) -> Option<&SubroutineHandle> {
        self.current.as_ref()
    }

    pub fn routine_name(&self) -> String {
        match &self.current {
            Some(handle) => handle.name().to_string(),
            None => "main".to_string(),
        }
    }

    /// Lower a child expression after checking its version requirement.
    pub fn lower(&mut self, expr: &dyn Expr) -> Result<(BlockId, BlockId), CompileError> {
        let required = expr.min_version();
        if required > self.version {
            return Err(CompileError::VersionMismatch {
                what: expr.name(),
                required,
                version: self.version,
                routine: self.routine_name(),
            });
        }
        expr.lower(self)
    }

    pub fn single(&mut self, op: TealOp) -> (BlockId, BlockId) {
        let block = self.cfg.simple(vec![op]);
        (block, block)
    }

    /// Lower `args` in order, each leaving its value on the stack, followed
    /// by a block holding `op`.
    pub fn from_op(
        &mut self,
        op: TealOp,
        args: &[&dyn Expr],
    ) -> Result<(BlockId, BlockId), CompileError> {
        let op_block = self.cfg.simple(vec![op]);
        let Some((first, rest)) = args.split_first() else {
            return Ok((op_block, op_block));
        };

        let (start, mut end) = self.lower(*first)?;
        for arg in rest {
            let (arg_start, arg_end) = self.lower(*arg)?;
            self.cfg.set_next(end, arg_start)?;
            end = arg_end;
        }
        self.cfg.set_next(end, op_block)?;

        Ok((start, op_block))
    }

    pub fn fresh_slot(&self) -> ScratchSlot {
        self.program.slots().fresh()
    }

    // =========================================================================
    // Loop exits
    // =========================================================================

    pub fn enter_loop(&mut self) {
        self.breaks.push(Vec::new());
        self.continues.push(Vec::new());
    }

    /// Pop the innermost loop, returning its (break, continue) blocks.
    pub fn exit_loop(&mut self) -> Result<(Vec<BlockId>, Vec<BlockId>), CompileError> {
        match (self.breaks.pop(), self.continues.pop()) {
            (Some(breaks), Some(continues)) => Ok((breaks, continues)),
            _ => Err(CompileError::internal("exit_loop called with no open loop")),
        }
    }

    pub fn add_break(&mut self, block: BlockId) -> Result<(), CompileError> {
        self.breaks
            .last_mut()
            .ok_or_else(|| CompileError::outside_loop("break"))?
            .push(block);
        Ok(())
    }

    pub fn add_continue(&mut self, block: BlockId) -> Result<(), CompileError> {
        self.continues
            .last_mut()
            .ok_or_else(|| CompileError::outside_loop("continue"))?
            .push(block);
        Ok(())
    }

    pub fn in_loop(&self) -> bool {
        !self.breaks.is_empty()
    }

    // =========================================================================
    // Subroutine discovery
    // =========================================================================

    pub fn reference(&mut self, id: SubroutineId) {
        self.referenced.insert(id);
    }

    pub fn referenced(&self) -> &BTreeSet<SubroutineId> {
        &self.referenced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_stacks() {
        let program = Program::new();
        let mut ctx = CompileContext::new(&program, &CompileOptions::default());
        let a = ctx.cfg.simple(vec![]);
        let b = ctx.cfg.simple(vec![]);

        assert!(ctx.add_break(a).is_err());
        assert!(ctx.add_continue(a).is_err());
        assert!(ctx.exit_loop().is_err());

        ctx.enter_loop();
        ctx.add_break(a).unwrap();
        ctx.enter_loop();
        ctx.add_continue(b).unwrap();

        assert_eq!(ctx.exit_loop().unwrap(), (vec![], vec![b]));
        assert_eq!(ctx.exit_loop().unwrap(), (vec![a], vec![]));
        assert!(!ctx.in_loop());
    }

    #[test]
    fn test_begin_routine_resets_graph() {
        let program = Program::new();
        let mut ctx = CompileContext::new(&program, &CompileOptions::default());
        ctx.cfg.simple(vec![]);
        ctx.enter_loop();

        ctx.begin_routine(None);
        assert!(ctx.cfg.is_empty());
        assert!(!ctx.in_loop());
        assert_eq!(ctx.routine_name(), "main");
    }
}
