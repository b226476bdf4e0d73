use std::collections::{BTreeSet, VecDeque};

use tracing::trace;

use crate::compiler::compile_error::CompileError;
use crate::ir::{BlockId, Cfg};

/// Edges that close a cycle: their target is still on the depth-first path
/// from the entry when the edge is walked.
fn back_edges(cfg: &Cfg, entry: BlockId) -> BTreeSet<(BlockId, BlockId)> {
    let mut found = BTreeSet::new();
    let mut visited = vec![false; cfg.len()];
    let mut on_path = vec![false; cfg.len()];
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    visited[entry.index()] = true;
    on_path[entry.index()] = true;

    while let Some((id, cursor)) = stack.pop() {
        let successors = cfg.block(id).successors();
        let Some(&succ) = successors.get(cursor) else {
            on_path[id.index()] = false;
            continue;
        };
        stack.push((id, cursor + 1));

        if on_path[succ.index()] {
            found.insert((id, succ));
        } else if !visited[succ.index()] {
            visited[succ.index()] = true;
            on_path[succ.index()] = true;
            stack.push((succ, 0));
        }
    }

    found
}

/// Order every reachable block for linear emission.
///
/// Kahn's algorithm over the recorded incoming lists, with loop back edges
/// left out. A block that becomes ready through its source's first edge
/// (`next`, or the true branch) is visited immediately after the source so
/// the flattener can fall through to it.
pub fn sort_blocks(cfg: &Cfg, entry: BlockId) -> Result<Vec<BlockId>, CompileError> {
    let reachable = cfg.reachable(entry);
    let back = back_edges(cfg, entry);

    let mut remaining = vec![0usize; cfg.len()];
    for &id in &reachable {
        remaining[id.index()] = cfg.block(id).incoming.len();
    }
    for &(_, target) in &back {
        let count = &mut remaining[target.index()];
        *count = count.checked_sub(1).ok_or_else(|| {
            CompileError::malformed(format!("{} is missing an incoming back edge", target))
        })?;
    }
    if remaining[entry.index()] != 0 {
        return Err(CompileError::malformed(format!(
            "entry block {} has predecessors outside of loops",
            entry
        )));
    }

    let mut order = Vec::with_capacity(reachable.len());
    let mut visited = vec![false; cfg.len()];
    let mut ready = VecDeque::from([entry]);

    while let Some(id) = ready.pop_front() {
        if visited[id.index()] {
            return Err(CompileError::malformed(format!("{} was scheduled twice", id)));
        }
        visited[id.index()] = true;
        order.push(id);

        for (i, succ) in cfg.block(id).successors().into_iter().enumerate() {
            if back.contains(&(id, succ)) {
                continue;
            }
            let count = &mut remaining[succ.index()];
            *count = count.checked_sub(1).ok_or_else(|| {
                CompileError::malformed(format!(
                    "edge {} -> {} is not recorded in the incoming list",
                    id, succ
                ))
            })?;
            if *count == 0 {
                if i == 0 {
                    ready.push_front(succ);
                } else {
                    ready.push_back(succ);
                }
            }
        }
    }

    if let Some(stuck) = reachable.iter().find(|id| !visited[id.index()]) {
        return Err(CompileError::malformed(format!(
            "{} still has {} unresolved predecessor(s) after sorting",
            stuck,
            remaining[stuck.index()]
        )));
    }

    trace!(target: "tealc::sort", blocks = order.len(), back_edges = back.len(), "sorted blocks");
    Ok(order)
}
