use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::compiler::callgraph::CallGraph;
use crate::compiler::compile_error::CompileError;
use crate::ir::{Op, Routine, ScratchSlot, TealComponent, TealOp};
use crate::lang::program::Program;

/// Move the value on top of the stack below the `depth` values under it.
fn sink(depth: usize, version: u8, what: &str) -> Result<Option<TealOp>, CompileError> {
    match depth {
        0 => Ok(None),
        _ if version >= Op::Cover.min_version() => {
            Ok(Some(TealOp::immediate(Op::Cover, depth as u64)))
        }
        1 => Ok(Some(TealOp::new(Op::Swap))),
        _ => Err(CompileError::invalid_with_hint(
            format!(
                "cannot keep local slots across a recursive call {} below version {}",
                what,
                Op::Cover.min_version()
            ),
            format!("target version {} or later", Op::Cover.min_version()),
        )),
    }
}

/// Code around one call that saves `slots` on the stack and puts them back.
fn spill_sequence(
    call: &TealOp,
    slots: &[ScratchSlot],
    arg_count: usize,
    returns_value: bool,
    version: u8,
) -> Result<Vec<TealOp>, CompileError> {
    let mut code = Vec::with_capacity(slots.len() * 3 + 2);

    for &slot in slots {
        code.push(TealOp::slot(Op::Load, slot));
        code.extend(sink(arg_count, version, "with more than one argument")?);
    }

    code.push(call.clone());

    if returns_value {
        code.extend(sink(
            slots.len(),
            version,
            "that returns a value while more than one slot is live",
        )?);
    }
    for &slot in slots.iter().rev() {
        code.push(TealOp::slot(Op::Store, slot));
    }

    Ok(code)
}

/// Save and restore a subroutine's local slots around every call that can
/// re-enter it. Returns the number of call sites rewritten.
pub fn spill_local_slots(
    routines: &mut BTreeMap<Routine, Vec<TealComponent>>,
    graph: &CallGraph,
    locals: &BTreeMap<Routine, BTreeSet<ScratchSlot>>,
    program: &Program,
    version: u8,
) -> Result<usize, CompileError> {
    let mut sites = 0;

    for (&routine, code) in routines.iter_mut() {
        let Some(slots) = locals.get(&routine).filter(|s| !s.is_empty()) else {
            continue;
        };
        let slots: Vec<ScratchSlot> = slots.iter().copied().collect();

        let mut rewritten = Vec::with_capacity(code.len());
        for component in code.drain(..) {
            let call = match component {
                TealComponent::Op(op)
                    if op.op == Op::Callsub
                        && op.subroutine().is_some_and(|id| graph.is_reentry(routine, id)) =>
                {
                    op
                }
                other => {
                    rewritten.push(other);
                    continue;
                }
            };
            let Some(callee) = call.subroutine() else {
                rewritten.push(call.into());
                continue;
            };

            let handle = program.subroutine(callee)?.handle();
            let sequence = spill_sequence(
                &call,
                &slots,
                handle.arg_count(),
                handle.returns().returns_value(),
                version,
            )?;
            rewritten.extend(sequence.into_iter().map(TealComponent::Op));
            sites += 1;
            debug!(
                target: "tealc::spill",
                %routine,
                callee = handle.name(),
                slots = slots.len(),
                "spilled around call"
            );
        }
        *code = rewritten;
    }

    Ok(sites)
}
