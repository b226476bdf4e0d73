use std::collections::BTreeMap;

use tracing::debug;

use crate::compiler::assembly::{AsmArg, AsmLine, Assembly};
use crate::compiler::compile_error::CompileError;
use crate::compiler::scratch::SlotAssignment;
use crate::ir::{Arg, Routine, SubroutineId, TealComponent};
use crate::lang::program::Program;

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "sub".to_string()
    } else {
        cleaned
    }
}

/// Label for every subroutine present, numbered in id order.
pub fn subroutine_labels(
    ids: impl IntoIterator<Item = SubroutineId>,
    program: &Program,
) -> Result<BTreeMap<SubroutineId, String>, CompileError> {
    let mut labels = BTreeMap::new();
    for (index, id) in ids.into_iter().enumerate() {
        let name = program.subroutine(id)?.handle().name();
        labels.insert(id, format!("{}_{}", sanitize(name), index));
    }
    Ok(labels)
}

struct Resolver<'a> {
    slots: &'a SlotAssignment,
    labels: &'a BTreeMap<SubroutineId, String>,
}

impl Resolver<'_> {
    fn arg(&self, arg: &Arg, prefix: &str) -> Result<AsmArg, CompileError> {
        Ok(match arg {
            Arg::Uint(n) => AsmArg::Uint(*n),
            Arg::Bytes(bytes) => AsmArg::Bytes(bytes.clone()),
            Arg::Str(text) => AsmArg::Str(text.clone()),
            Arg::Name(name) => AsmArg::Name(name.clone()),
            Arg::Slot(slot) | Arg::SlotIndex(slot) => {
                let cell = self.slots.get(*slot).ok_or_else(|| {
                    CompileError::internal(format!("{} has no assigned cell", slot))
                })?;
                AsmArg::Uint(cell as u64)
            }
            Arg::Label(label) => AsmArg::Label(label.with_prefix(prefix).to_string()),
            Arg::Subroutine(id) => AsmArg::Label(
                self.labels
                    .get(id)
                    .cloned()
                    .ok_or_else(|| CompileError::internal(format!("no label for subroutine #{}", id.0)))?,
            ),
        })
    }

    fn routine(
        &self,
        code: &[TealComponent],
        prefix: &str,
        out: &mut Vec<AsmLine>,
    ) -> Result<(), CompileError> {
        for component in code {
            let line = match component {
                TealComponent::Label(label) => AsmLine::Label {
                    name: label.with_prefix(prefix).to_string(),
                    comment: None,
                },
                TealComponent::Op(op) => AsmLine::Op {
                    op: op.op,
                    args: op
                        .args
                        .iter()
                        .map(|arg| self.arg(arg, prefix))
                        .collect::<Result<_, _>>()?,
                },
            };
            out.push(line);
        }
        Ok(())
    }
}

/// Link the flattened routines into one program: main first, then every
/// subroutine under its label, with block labels made unique per routine.
pub fn resolve(
    routines: &BTreeMap<Routine, Vec<TealComponent>>,
    program: &Program,
    slots: &SlotAssignment,
    version: u8,
) -> Result<Assembly, CompileError> {
    let labels = subroutine_labels(routines.keys().filter_map(|r| r.subroutine()), program)?;
    let resolver = Resolver {
        slots,
        labels: &labels,
    };
    let mut lines = Vec::new();

    let main = routines
        .get(&Routine::Main)
        .ok_or_else(|| CompileError::internal("main routine was not compiled"))?;
    resolver.routine(main, "main_", &mut lines)?;

    for (id, label) in &labels {
        let code = routines
            .get(&Routine::Subroutine(*id))
            .ok_or_else(|| CompileError::internal(format!("subroutine #{} was not compiled", id.0)))?;
        lines.push(AsmLine::Label {
            name: label.clone(),
            comment: Some(program.subroutine(*id)?.handle().name().to_string()),
        });
        resolver.routine(code, &format!("{}_", label), &mut lines)?;
    }

    debug!(
        target: "tealc::resolve",
        subroutines = labels.len(),
        lines = lines.len(),
        "assembled program"
    );
    Ok(Assembly { version, lines })
}
