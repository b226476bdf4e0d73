use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compiler::stack_check::{effect, net_pushes};
use crate::ir::{BlockId, Cfg, Op, ScratchSlot, TealOp};

/// Which optional passes run. Everything is off unless asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeOptions {
    /// Replace a repeated value computation with `dup`/`dup2`.
    pub dedupe_values: bool,
    /// Drop `store S; load S` pairs whose load is the slot's only read.
    pub elide_store_load: bool,
    /// Let subroutines that are never on the call stack together reuse
    /// local slot ids.
    pub share_local_slots: bool,
}

impl OptimizeOptions {
    pub fn all() -> Self {
        Self {
            dedupe_values: true,
            elide_store_load: true,
            share_local_slots: true,
        }
    }
}

// =============================================================================
// Duplicate-value elimination
// =============================================================================

/// Values a window leaves on an empty stack, if the window can be reused
/// as a whole: it never reaches below its own pushes, has no effect beyond
/// those pushes and cannot observe the stack below it.
fn window_value_count(window: &[TealOp]) -> Option<usize> {
    let plain = window.iter().all(|op| {
        effect(op).is_some() && !op.op.reads_deep_stack() && !op.op.has_side_effects()
    });
    if plain { net_pushes(window) } else { None }
}

fn dedupe_once(ops: &mut Vec<TealOp>, version: u8) -> bool {
    for end in (2..=ops.len()).rev() {
        for k in (1..=end / 2).rev() {
            let second = end - k..end;
            let first = end - 2 * k..end - k;
            if ops[first] != ops[second.clone()] {
                continue;
            }
            let replacement = match window_value_count(&ops[second.clone()]) {
                Some(1) => Op::Dup,
                Some(2) if version >= Op::Dup2.min_version() => Op::Dup2,
                _ => continue,
            };
            ops.splice(second, [TealOp::new(replacement)]);
            return true;
        }
    }
    false
}

/// Rewrite repeated adjacent value computations inside one block.
///
/// Every rewrite drops at least one op that can start from an empty stack
/// and puts in one that cannot, so the loop ends within `len + 1` rounds.
pub fn dedupe_block(ops: &mut Vec<TealOp>, version: u8) -> usize {
    let mut rewrites = 0;
    for _ in 0..=ops.len() {
        if !dedupe_once(ops, version) {
            break;
        }
        rewrites += 1;
    }
    rewrites
}

pub fn dedupe_cfg(cfg: &mut Cfg, entry: BlockId, version: u8) -> usize {
    let mut rewrites = 0;
    for id in cfg.reachable(entry) {
        rewrites += dedupe_block(&mut cfg.block_mut(id).ops, version);
    }
    if rewrites > 0 {
        debug!(target: "tealc::optimize", rewrites, "deduplicated values");
    }
    rewrites
}

// =============================================================================
// Store/load elision
// =============================================================================

fn load_count(cfg: &Cfg, blocks: &[BlockId], slot: ScratchSlot) -> usize {
    blocks
        .iter()
        .flat_map(|&id| cfg.block(id).ops.iter())
        .filter(|op| op.loads_from(slot))
        .count()
}

fn elide_once(cfg: &mut Cfg, entry: BlockId, skip: &BTreeSet<ScratchSlot>) -> bool {
    let blocks = cfg.reachable(entry);
    for &id in &blocks {
        let ops = &cfg.block(id).ops;
        let found = ops.windows(2).position(|pair| {
            pair[0].op == Op::Store
                && pair[0]
                    .direct_slot()
                    .is_some_and(|slot| !skip.contains(&slot) && pair[1].loads_from(slot))
        });
        let Some(at) = found else {
            continue;
        };
        let Some(slot) = ops[at].direct_slot() else {
            continue;
        };
        if load_count(cfg, &blocks, slot) != 1 {
            continue;
        }

        cfg.block_mut(id).ops.drain(at..at + 2);
        debug!(target: "tealc::optimize", %slot, block = %id, "elided store/load");
        return true;
    }
    false
}

/// Remove `store S; load S` pairs where that load is the only read of `S`
/// in the routine, until none are left. Slots in `skip` are never touched.
pub fn elide_store_load(cfg: &mut Cfg, entry: BlockId, skip: &BTreeSet<ScratchSlot>) -> usize {
    let mut removed = 0;
    while elide_once(cfg, entry, skip) {
        removed += 1;
    }
    removed
}
