use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::compiler::callgraph::CallGraph;
use crate::compiler::compile_error::CompileError;
use crate::compiler::flatten::recover_blocks;
use crate::ir::{Arg, NUM_SLOTS, Op, Routine, ScratchSlot, SubroutineId, TealComponent};

// =============================================================================
// Collection and classification
// =============================================================================

/// Which routines reference which slots.
#[derive(Debug, Clone, Default)]
pub struct SlotUsage {
    per_routine: BTreeMap<Routine, BTreeSet<ScratchSlot>>,
    dynamic: BTreeSet<ScratchSlot>,
}

impl SlotUsage {
    pub fn collect(routines: &BTreeMap<Routine, Vec<TealComponent>>) -> Self {
        let mut usage = SlotUsage::default();
        for (&routine, code) in routines {
            let slots = usage.per_routine.entry(routine).or_default();
            for op in code.iter().filter_map(TealComponent::as_op) {
                for arg in &op.args {
                    match arg {
                        Arg::Slot(slot) => {
                            slots.insert(*slot);
                        }
                        Arg::SlotIndex(slot) => {
                            slots.insert(*slot);
                            usage.dynamic.insert(*slot);
                        }
                        _ => {}
                    }
                }
            }
        }
        usage
    }

    pub fn slots_of(&self, routine: Routine) -> impl Iterator<Item = ScratchSlot> + '_ {
        self.per_routine.get(&routine).into_iter().flatten().copied()
    }

    pub fn all(&self) -> BTreeSet<ScratchSlot> {
        self.per_routine.values().flatten().copied().collect()
    }

    /// Slots whose numeric id is pushed as a value somewhere.
    pub fn dynamic(&self) -> &BTreeSet<ScratchSlot> {
        &self.dynamic
    }

    /// Slots referenced by more than one routine.
    pub fn global(&self) -> BTreeSet<ScratchSlot> {
        let mut seen = BTreeSet::new();
        let mut global = BTreeSet::new();
        for slots in self.per_routine.values() {
            for &slot in slots {
                if !seen.insert(slot) {
                    global.insert(slot);
                }
            }
        }
        global
    }

    /// Every routine's slots minus the global ones.
    pub fn local(&self) -> BTreeMap<Routine, BTreeSet<ScratchSlot>> {
        let global = self.global();
        self.per_routine
            .iter()
            .map(|(&routine, slots)| (routine, slots.difference(&global).copied().collect()))
            .collect()
    }

    /// Slots that must keep their store and load ops exactly as written.
    pub fn pinned(&self) -> BTreeSet<ScratchSlot> {
        let mut pinned = self.global();
        pinned.extend(self.dynamic.iter().copied());
        pinned.extend(self.all().into_iter().filter(ScratchSlot::is_reserved));
        pinned
    }
}

// =============================================================================
// Uninitialized reads
// =============================================================================

/// Fail if `code` can load one of `checked` before any store to it.
///
/// Forward must-analysis over the blocks recovered from the flat code: a
/// slot is initialized at a block's start only if every predecessor leaves
/// it initialized.
pub fn check_initialized(
    routine: &str,
    code: &[TealComponent],
    checked: &BTreeSet<ScratchSlot>,
) -> Result<(), CompileError> {
    if checked.is_empty() {
        return Ok(());
    }
    let blocks = recover_blocks(code)?;
    if blocks.is_empty() {
        return Ok(());
    }

    let mut predecessors = vec![Vec::new(); blocks.len()];
    for (i, block) in blocks.iter().enumerate() {
        for &succ in &block.successors {
            predecessors[succ].push(i);
        }
    }

    let stored: Vec<BTreeSet<ScratchSlot>> = blocks
        .iter()
        .map(|block| {
            block
                .ops
                .iter()
                .filter(|op| op.op == Op::Store)
                .filter_map(|op| op.direct_slot())
                .collect()
        })
        .collect();

    // entry starts empty, everything else starts at "all"
    let mut entry_sets: Vec<BTreeSet<ScratchSlot>> = vec![checked.clone(); blocks.len()];
    entry_sets[0].clear();

    let mut changed = true;
    while changed {
        changed = false;
        for i in 1..blocks.len() {
            let mut incoming = predecessors[i].iter().map(|&p| {
                let mut out = entry_sets[p].clone();
                out.extend(stored[p].iter().copied());
                out
            });
            let Some(first) = incoming.next() else {
                continue;
            };
            let meet = incoming.fold(first, |acc, set| acc.intersection(&set).copied().collect());
            let meet: BTreeSet<ScratchSlot> = meet.intersection(checked).copied().collect();
            if meet != entry_sets[i] {
                entry_sets[i] = meet;
                changed = true;
            }
        }
    }

    for (i, block) in blocks.iter().enumerate() {
        let mut ready = entry_sets[i].clone();
        for op in &block.ops {
            let Some(slot) = op.direct_slot() else {
                continue;
            };
            match op.op {
                Op::Store => {
                    ready.insert(slot);
                }
                Op::Load if checked.contains(&slot) && !ready.contains(&slot) => {
                    return Err(CompileError::UninitializedRead {
                        slot: slot.to_string(),
                        routine: routine.to_string(),
                    });
                }
                _ => {}
            }
        }
    }

    Ok(())
}

// =============================================================================
// Assignment
// =============================================================================

/// Final numeric cell of every slot in the program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotAssignment {
    ids: BTreeMap<ScratchSlot, u8>,
}

impl SlotAssignment {
    pub fn get(&self, slot: ScratchSlot) -> Option<u8> {
        self.ids.get(&slot).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Distinct cells in use.
    pub fn cells(&self) -> BTreeSet<u8> {
        self.ids.values().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScratchSlot, u8)> + '_ {
        self.ids.iter().map(|(&slot, &id)| (slot, id))
    }
}

/// Hands out cells upward from 0, skipping reserved ones.
struct CellCursor {
    taken: Vec<bool>,
    next: usize,
    demand: usize,
}

impl CellCursor {
    fn new(reserved: &BTreeSet<u8>) -> Self {
        let mut taken = vec![false; NUM_SLOTS];
        for &cell in reserved {
            taken[cell as usize] = true;
        }
        Self {
            taken,
            next: 0,
            demand: reserved.len(),
        }
    }

    fn take(&mut self) -> Option<u8> {
        self.demand += 1;
        while self.next < NUM_SLOTS && self.taken[self.next] {
            self.next += 1;
        }
        let cell = u8::try_from(self.next).ok()?;
        self.taken[self.next] = true;
        self.next += 1;
        Some(cell)
    }
}

/// Subroutines that may share local cells, with the subroutines every
/// member is exclusive with.
#[derive(Debug, Clone)]
struct Group {
    members: BTreeSet<SubroutineId>,
    size: usize,
    exclusive: BTreeSet<SubroutineId>,
}

/// Greedily merge the largest mutually exclusive groups until no pair can
/// be merged.
fn merge_groups(mut groups: Vec<Group>) -> Vec<Group> {
    loop {
        groups.sort_by(|a, b| b.size.cmp(&a.size).then(a.members.cmp(&b.members)));

        let pair = (0..groups.len()).find_map(|i| {
            (i + 1..groups.len())
                .find(|&j| groups[j].members.is_subset(&groups[i].exclusive))
                .map(|j| (i, j))
        });
        let Some((i, j)) = pair else {
            return groups;
        };

        let absorbed = groups.remove(j);
        let target = &mut groups[i];
        target.members.extend(absorbed.members);
        target.size = target.size.max(absorbed.size);
        target.exclusive = target
            .exclusive
            .intersection(&absorbed.exclusive)
            .copied()
            .collect();
    }
}

/// Give every slot a numeric cell.
///
/// Reserved slots take their requested cell first. Then global, dynamic
/// and main-routine slots take the lowest free cells in creation order,
/// followed by each subroutine's locals. With `share`, subroutines that can
/// never be on the call stack together reuse the same run of cells.
pub fn assign_slots(
    usage: &SlotUsage,
    graph: &CallGraph,
    share: bool,
) -> Result<SlotAssignment, CompileError> {
    let mut ids = BTreeMap::new();
    let mut owner: BTreeMap<u8, ScratchSlot> = BTreeMap::new();

    let all = usage.all();
    for slot in all.iter().copied().filter(ScratchSlot::is_reserved) {
        let Some(cell) = slot.requested() else {
            continue;
        };
        if owner.insert(cell, slot).is_some() {
            return Err(CompileError::ReservedSlotCollision { id: cell });
        }
        ids.insert(slot, cell);
    }

    let reserved: BTreeSet<u8> = owner.keys().copied().collect();
    let mut cursor = CellCursor::new(&reserved);
    let exhausted = |cursor: &CellCursor| CompileError::SlotSpaceExhausted {
        requested: cursor.demand,
        available: NUM_SLOTS,
    };

    let local = usage.local();
    let shareable = |routine: Routine| -> Vec<ScratchSlot> {
        if !share || routine == Routine::Main {
            return Vec::new();
        }
        local
            .get(&routine)
            .into_iter()
            .flatten()
            .copied()
            .filter(|s| !s.is_reserved() && !usage.dynamic().contains(s))
            .collect()
    };

    let mut shared: BTreeMap<SubroutineId, Vec<ScratchSlot>> = BTreeMap::new();
    for routine in local.keys().copied() {
        let slots = shareable(routine);
        if let Some(id) = routine.subroutine().filter(|_| !slots.is_empty()) {
            shared.insert(id, slots);
        }
    }
    let is_shared: BTreeSet<ScratchSlot> = shared.values().flatten().copied().collect();

    for slot in all
        .iter()
        .copied()
        .filter(|s| !s.is_reserved() && !is_shared.contains(s))
    {
        let cell = cursor.take().ok_or_else(|| exhausted(&cursor))?;
        ids.insert(slot, cell);
    }

    if !shared.is_empty() {
        let members: Vec<SubroutineId> = shared.keys().copied().collect();
        let groups = members
            .iter()
            .map(|&id| Group {
                members: BTreeSet::from([id]),
                size: shared[&id].len(),
                exclusive: members
                    .iter()
                    .copied()
                    .filter(|&other| graph.exclusive(id, other))
                    .collect(),
            })
            .collect();

        let mut groups = merge_groups(groups);
        groups.sort_by(|a, b| a.members.cmp(&b.members));

        for group in &groups {
            let mut cells = Vec::with_capacity(group.size);
            for _ in 0..group.size {
                cells.push(cursor.take().ok_or_else(|| exhausted(&cursor))?);
            }
            for member in &group.members {
                for (slot, &cell) in shared[member].iter().zip(&cells) {
                    ids.insert(*slot, cell);
                }
            }
        }

        debug!(
            target: "tealc::scratch",
            subroutines = members.len(),
            groups = groups.len(),
            "shared local slots"
        );
    }

    let assignment = SlotAssignment { ids };
    debug!(
        target: "tealc::scratch",
        slots = assignment.len(),
        cells = assignment.cells().len(),
        "assigned scratch slots"
    );
    Ok(assignment)
}
