use crate::compiler::compile_error::CompileError;
use crate::ir::{Arg, Op, TealOp};

fn immediate(op: &TealOp) -> Option<usize> {
    match op.args.first() {
        Some(Arg::Uint(n)) => usize::try_from(*n).ok(),
        _ => None,
    }
}

/// Returns (pops, pushes) for an op, or None if effect is unknown/dynamic.
pub fn effect(op: &TealOp) -> Option<(usize, usize)> {
    use Op::*;
    Some(match op.op {
        Int | Byte | PushInt | PushBytes | Arg | Txn | Global => (0, 1),

        AppGlobalGet => (1, 1),
        AppGlobalPut => (2, 0),
        Log => (1, 0),

        Load => (0, 1),
        Store => (1, 0),
        Loads => (1, 1),
        Stores => (2, 0),

        Pop => (1, 0),
        Dup => (1, 2),
        Dup2 => (2, 4),
        Swap => (2, 2),
        Select => (3, 1),
        Dig => {
            let n = immediate(op)?;
            (n + 1, n + 2)
        }
        Cover | Uncover => {
            let n = immediate(op)?;
            (n + 1, n + 1)
        }

        Add | Sub | Mul | Div | Mod | BitOr | BitAnd | BitXor => (2, 1),
        Lt | Gt | Le | Ge | Eq | Neq | And | Or => (2, 1),
        Concat => (2, 1),
        BitNot | Not | Len | Itob | Btoi => (1, 1),

        Bnz | Bz => (1, 0),
        B => (0, 0),
        Assert => (1, 0),
        Err => (0, 0),
        Return => (1, 0),

        // Depends on the callee's signature
        Callsub | Retsub => return None,
    })
}

/// Check stack effects with a given initial stack height and return the
/// final height.
///
/// NOTE: This is a linear scan; it does not follow branches.
pub fn check_ops(ops: &[TealOp], initial_height: usize) -> Result<usize, CompileError> {
    let mut h = initial_height;

    for (ip, op) in ops.iter().enumerate() {
        let (pops, pushes) = effect(op).ok_or_else(|| {
            CompileError::internal(format!("stack effect of {} at {} is not static", op.op, ip))
        })?;
        h = h.checked_sub(pops).ok_or_else(|| {
            CompileError::internal(format!(
                "stack underflow at {}, op={}, needed {} items",
                ip, op.op, pops
            ))
        })?;
        h += pushes;
    }

    Ok(h)
}

/// Number of values `ops` leave behind when run on an empty stack, or None
/// if they would reach below it or contain an op with a dynamic effect.
pub fn net_pushes(ops: &[TealOp]) -> Option<usize> {
    check_ops(ops, 0).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SlotCounter;

    #[test]
    fn test_simple_ops() {
        let ops = vec![TealOp::int(1), TealOp::int(2), TealOp::new(Op::Add)];
        assert_eq!(check_ops(&ops, 0).unwrap(), 1);
    }

    #[test]
    fn test_underflow() {
        let ops = vec![TealOp::new(Op::Add)];
        let err = check_ops(&ops, 0).unwrap_err();
        assert!(err.to_string().contains("underflow"));
        assert_eq!(check_ops(&ops, 2).unwrap(), 1);
    }

    #[test]
    fn test_immediate_stack_ops() {
        let ops = vec![
            TealOp::int(1),
            TealOp::int(2),
            TealOp::int(3),
            TealOp::immediate(Op::Dig, 2),
            TealOp::immediate(Op::Cover, 3),
        ];
        assert_eq!(check_ops(&ops, 0).unwrap(), 4);

        let too_deep = vec![TealOp::int(1), TealOp::immediate(Op::Uncover, 1)];
        assert!(check_ops(&too_deep, 0).is_err());
    }

    #[test]
    fn test_scratch_ops() {
        let slot = SlotCounter::new().fresh();
        let ops = vec![
            TealOp::int(5),
            TealOp::slot(Op::Store, slot),
            TealOp::slot(Op::Load, slot),
        ];
        assert_eq!(net_pushes(&ops), Some(1));
    }

    #[test]
    fn test_call_has_no_static_effect() {
        let ops = vec![TealOp::int(1), TealOp::callsub(crate::ir::SubroutineId(0))];
        assert_eq!(net_pushes(&ops), None);
    }
}
