use std::collections::BTreeMap;

use tracing::trace;

use crate::compiler::compile_error::CompileError;
use crate::ir::{BlockId, BlockKind, Cfg, Label, Op, TealComponent, TealOp};

// =============================================================================
// Flattening
// =============================================================================

fn successor_position(
    positions: &[Option<usize>],
    from: BlockId,
    to: Option<BlockId>,
) -> Result<usize, CompileError> {
    to.and_then(|id| positions.get(id.index()).copied().flatten())
        .ok_or_else(|| {
            CompileError::malformed(format!("successor of {} is missing from the block order", from))
        })
}

/// Emit the sorted blocks as one instruction stream.
///
/// Labels are numbered by block position and only emitted for blocks some
/// branch actually targets.
pub fn flatten_blocks(cfg: &Cfg, order: &[BlockId]) -> Result<Vec<TealComponent>, CompileError> {
    let mut positions = vec![None; cfg.len()];
    for (i, id) in order.iter().enumerate() {
        positions[id.index()] = Some(i);
    }

    let mut references = vec![0usize; order.len()];
    let mut emitted: Vec<Vec<TealOp>> = Vec::with_capacity(order.len());

    for (i, &id) in order.iter().enumerate() {
        let block = cfg.block(id);
        let mut code = block.ops.clone();

        if !block.is_terminal() {
            match block.kind {
                BlockKind::Simple { next } => {
                    let next = successor_position(&positions, id, next)?;
                    if next != i + 1 {
                        references[next] += 1;
                        code.push(TealOp::branch(Op::B, Label::local(next as u32)));
                    }
                }
                BlockKind::Conditional { on_true, on_false } => {
                    let t = successor_position(&positions, id, on_true)?;
                    let f = successor_position(&positions, id, on_false)?;
                    if f == i + 1 {
                        references[t] += 1;
                        code.push(TealOp::branch(Op::Bnz, Label::local(t as u32)));
                    } else if t == i + 1 {
                        references[f] += 1;
                        code.push(TealOp::branch(Op::Bz, Label::local(f as u32)));
                    } else {
                        references[t] += 1;
                        code.push(TealOp::branch(Op::Bnz, Label::local(t as u32)));
                        references[f] += 1;
                        code.push(TealOp::branch(Op::B, Label::local(f as u32)));
                    }
                }
            }
        }

        emitted.push(code);
    }

    let mut out = Vec::new();
    for (i, code) in emitted.into_iter().enumerate() {
        if references[i] > 0 {
            out.push(TealComponent::Label(Label::local(i as u32)));
        }
        out.extend(code.into_iter().map(TealComponent::Op));
    }

    trace!(
        target: "tealc::flatten",
        blocks = order.len(),
        labels = references.iter().filter(|&&n| n > 0).count(),
        "flattened"
    );
    Ok(out)
}

// =============================================================================
// Recovering blocks from a flat stream
// =============================================================================

/// A straight-line run recovered from flattened code.
///
/// `ops` excludes the trailing branch instructions. `successors` is
/// `[next]` for a fall-through or jump, `[on_true, on_false]` for a
/// conditional exit and empty when the run leaves the routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearBlock {
    pub labels: Vec<Label>,
    pub ops: Vec<TealOp>,
    pub successors: Vec<usize>,
}

enum Exit {
    Fall,
    Jump(Label),
    IfTrue(Label),
    IfFalse(Label),
    Both(Label, Label),
    Leave,
}

/// Re-parse the label/branch structure of a flattened routine.
pub fn recover_blocks(code: &[TealComponent]) -> Result<Vec<LinearBlock>, CompileError> {
    let mut runs: Vec<(Vec<Label>, Vec<TealOp>, Exit)> = Vec::new();
    let mut labels = Vec::new();
    let mut ops = Vec::new();
    let mut open = false;

    let mut i = 0;
    while i < code.len() {
        match &code[i] {
            TealComponent::Label(label) => {
                if !ops.is_empty() {
                    runs.push((std::mem::take(&mut labels), std::mem::take(&mut ops), Exit::Fall));
                }
                labels.push(label.clone());
                open = true;
            }
            TealComponent::Op(op) => {
                open = true;
                let exit = match op.op {
                    Op::B => op.label().cloned().map(Exit::Jump),
                    Op::Bnz | Op::Bz => {
                        let first = op.label().cloned();
                        let jump = match code.get(i + 1) {
                            Some(TealComponent::Op(next)) if next.op == Op::B => next.label().cloned(),
                            _ => None,
                        };
                        match (first, jump) {
                            (Some(t), Some(f)) if op.op == Op::Bnz => {
                                i += 1;
                                Some(Exit::Both(t, f))
                            }
                            (Some(f), Some(t)) => {
                                i += 1;
                                Some(Exit::Both(t, f))
                            }
                            (Some(t), None) if op.op == Op::Bnz => Some(Exit::IfTrue(t)),
                            (Some(f), None) => Some(Exit::IfFalse(f)),
                            (None, _) => {
                                return Err(CompileError::malformed(format!(
                                    "{} without a target label",
                                    op.op
                                )));
                            }
                        }
                    }
                    other if other.is_exit() => {
                        ops.push(op.clone());
                        Some(Exit::Leave)
                    }
                    _ => {
                        ops.push(op.clone());
                        None
                    }
                };

                if op.op == Op::B && exit.is_none() {
                    return Err(CompileError::malformed("b without a target label"));
                }
                if let Some(exit) = exit {
                    runs.push((std::mem::take(&mut labels), std::mem::take(&mut ops), exit));
                    open = false;
                }
            }
        }
        i += 1;
    }
    if open {
        runs.push((labels, ops, Exit::Fall));
    }

    let mut targets = BTreeMap::new();
    for (i, (labels, _, _)) in runs.iter().enumerate() {
        for label in labels {
            targets.insert(label.clone(), i);
        }
    }
    let resolve = |label: &Label| {
        targets
            .get(label)
            .copied()
            .ok_or_else(|| CompileError::malformed(format!("branch to unknown label {}", label)))
    };

    let count = runs.len();
    let mut blocks = Vec::with_capacity(count);
    for (i, (labels, ops, exit)) in runs.into_iter().enumerate() {
        let fall = || (i + 1 < count).then_some(i + 1);
        let successors = match &exit {
            Exit::Fall => fall().into_iter().collect(),
            Exit::Jump(l) => vec![resolve(l)?],
            Exit::IfTrue(t) => {
                let f = fall().ok_or_else(|| CompileError::malformed("bnz at end of routine"))?;
                vec![resolve(t)?, f]
            }
            Exit::IfFalse(f) => {
                let t = fall().ok_or_else(|| CompileError::malformed("bz at end of routine"))?;
                vec![t, resolve(f)?]
            }
            Exit::Both(t, f) => vec![resolve(t)?, resolve(f)?],
            Exit::Leave => Vec::new(),
        };
        blocks.push(LinearBlock {
            labels,
            ops,
            successors,
        });
    }

    Ok(blocks)
}
