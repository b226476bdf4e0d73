use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{Op, Routine, SubroutineId, TealComponent};

/// Which subroutines each routine may call, read off `callsub` ops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraph {
    edges: BTreeMap<Routine, BTreeSet<SubroutineId>>,
}

impl CallGraph {
    pub fn build(routines: &BTreeMap<Routine, Vec<TealComponent>>) -> Self {
        let edges = routines
            .iter()
            .map(|(&routine, code)| {
                let callees = code
                    .iter()
                    .filter_map(TealComponent::as_op)
                    .filter(|op| op.op == Op::Callsub)
                    .filter_map(|op| op.subroutine())
                    .collect();
                (routine, callees)
            })
            .collect();
        Self { edges }
    }

    pub fn callees(&self, routine: Routine) -> impl Iterator<Item = SubroutineId> + '_ {
        self.edges.get(&routine).into_iter().flatten().copied()
    }

    /// Subroutines reachable from `from` through one or more calls.
    pub fn reachable_from(&self, from: Routine) -> BTreeSet<SubroutineId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<SubroutineId> = self.callees(from).collect();
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(self.callees(Routine::Subroutine(id)));
            }
        }
        seen
    }

    pub fn reaches(&self, from: SubroutineId, to: SubroutineId) -> bool {
        self.reachable_from(Routine::Subroutine(from)).contains(&to)
    }

    /// A call from `caller` to `callee` can re-enter `caller` before it
    /// returns.
    pub fn is_reentry(&self, caller: Routine, callee: SubroutineId) -> bool {
        match caller {
            Routine::Main => false,
            Routine::Subroutine(id) => callee == id || self.reaches(callee, id),
        }
    }

    /// The two subroutines can never be on the call stack at the same time.
    pub fn exclusive(&self, a: SubroutineId, b: SubroutineId) -> bool {
        a != b && !self.reaches(a, b) && !self.reaches(b, a)
    }
}
