use std::collections::VecDeque;

use tracing::trace;

use crate::compiler::compile_error::CompileError;
use crate::ir::{Block, BlockId, BlockKind, TealOp};

/// Arena of blocks for one routine. Edges are stored as [`BlockId`]s so the
/// mutually referencing successor/incoming structure needs no shared
/// ownership.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    blocks: Vec<Block>,
}

impl Cfg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn add(&mut self, block: Block) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(block);
        id
    }

    pub fn simple(&mut self, ops: Vec<TealOp>) -> BlockId {
        self.add(Block::simple(ops))
    }

    pub fn conditional(&mut self, ops: Vec<TealOp>) -> BlockId {
        self.add(Block::conditional(ops))
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    fn check(&self, id: BlockId) -> Result<(), CompileError> {
        if id.index() < self.blocks.len() {
            Ok(())
        } else {
            Err(CompileError::malformed(format!("{} is not in this graph", id)))
        }
    }

    /// Point a simple block at its successor.
    pub fn set_next(&mut self, from: BlockId, to: BlockId) -> Result<(), CompileError> {
        self.check(from)?;
        self.check(to)?;
        match &mut self.block_mut(from).kind {
            BlockKind::Simple { next } => {
                *next = Some(to);
                Ok(())
            }
            BlockKind::Conditional { .. } => Err(CompileError::malformed(format!(
                "cannot set a single successor on conditional block {}",
                from
            ))),
        }
    }

    pub fn set_branches(
        &mut self,
        from: BlockId,
        when_true: BlockId,
        when_false: BlockId,
    ) -> Result<(), CompileError> {
        self.check(from)?;
        self.check(when_true)?;
        self.check(when_false)?;
        match &mut self.block_mut(from).kind {
            BlockKind::Conditional { on_true, on_false } => {
                *on_true = Some(when_true);
                *on_false = Some(when_false);
                Ok(())
            }
            BlockKind::Simple { .. } => Err(CompileError::malformed(format!(
                "cannot set branch targets on simple block {}",
                from
            ))),
        }
    }

    /// Every block reachable from `entry`, in breadth-first order.
    pub fn reachable(&self, entry: BlockId) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::from([entry]);
        visited[entry.index()] = true;

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for succ in self.block(id).successors() {
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    queue.push_back(succ);
                }
            }
        }

        order
    }

    /// Rebuild every reachable block's incoming list from one walk over
    /// the edges.
    pub fn compute_incoming(&mut self, entry: BlockId) {
        for block in &mut self.blocks {
            block.incoming.clear();
        }
        for id in self.reachable(entry) {
            for succ in self.block(id).successors() {
                self.block_mut(succ).incoming.push(id);
            }
        }
    }

    /// Check successor arity and that recorded incoming lists match the
    /// edges actually present.
    pub fn validate(&self, entry: BlockId) -> Result<(), CompileError> {
        let reachable = self.reachable(entry);
        let mut expected: Vec<Vec<BlockId>> = vec![Vec::new(); self.blocks.len()];

        for &id in &reachable {
            let block = self.block(id);
            if !block.exits() {
                match block.kind {
                    BlockKind::Conditional { on_true, on_false }
                        if on_true.is_none() != on_false.is_none() =>
                    {
                        return Err(CompileError::malformed(format!(
                            "conditional block {} has only one branch target",
                            id
                        )));
                    }
                    _ => {}
                }
            }
            for succ in block.successors() {
                expected[succ.index()].push(id);
            }
        }

        for &id in &reachable {
            let mut recorded = self.block(id).incoming.clone();
            let mut actual = expected[id.index()].clone();
            recorded.sort();
            actual.sort();
            if recorded != actual {
                return Err(CompileError::malformed(format!(
                    "incoming edges of {} are recorded as {:?} but the graph has {:?}",
                    id, recorded, actual
                )));
            }
        }

        Ok(())
    }

    /// Merge runs of blocks joined by a single unconditional edge where the
    /// successor has no other predecessor. Requires up-to-date incoming lists
    /// and keeps them up to date.
    pub fn normalize(&mut self, entry: BlockId) -> usize {
        let mut merged = 0;

        loop {
            let candidate = self.reachable(entry).into_iter().find_map(|id| {
                let block = self.block(id);
                if block.exits() {
                    return None;
                }
                let BlockKind::Simple { next: Some(succ) } = block.kind else {
                    return None;
                };
                let single = self.block(succ).incoming.as_slice() == [id];
                (succ != id && succ != entry && single).then_some((id, succ))
            });

            let Some((pred, succ)) = candidate else {
                break;
            };

            let taken = std::mem::replace(self.block_mut(succ), Block::simple(Vec::new()));
            for next in taken.successors() {
                for incoming in &mut self.block_mut(next).incoming {
                    if *incoming == succ {
                        *incoming = pred;
                    }
                }
            }

            let block = self.block_mut(pred);
            block.ops.extend(taken.ops);
            block.kind = taken.kind;
            merged += 1;
            trace!(target: "tealc::graph", %pred, %succ, "merged blocks");
        }

        merged
    }
}
