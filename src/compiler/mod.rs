pub mod assembly;
pub mod callgraph;
pub mod compile_error;
pub mod context;
pub mod flatten;
pub mod optimize;
pub mod resolve;
pub mod scratch;
pub mod sort;
pub mod spill;
pub mod stack_check;

pub use assembly::{AsmArg, AsmLine, Assembly};
pub use compile_error::{CompileError, ErrorKind};
pub use context::CompileContext;
pub use optimize::OptimizeOptions;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compiler::callgraph::CallGraph;
use crate::compiler::scratch::{SlotUsage, assign_slots, check_initialized};
use crate::ir::{BlockId, Cfg, Mode, Op, Routine, ScratchSlot, SubroutineId, TealComponent, TealOp};
use crate::lang::expr::{Expr, TealType};
use crate::lang::program::{Program, ReturnKind};

pub const MIN_VERSION: u8 = 2;
pub const MAX_VERSION: u8 = 8;

// =============================================================================
// Options and output
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub version: u8,
    pub mode: Mode,
    pub optimize: OptimizeOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            version: MAX_VERSION,
            mode: Mode::Application,
            optimize: OptimizeOptions::default(),
        }
    }
}

impl CompileOptions {
    pub fn validate(&self) -> Result<(), CompileError> {
        if (MIN_VERSION..=MAX_VERSION).contains(&self.version) {
            Ok(())
        } else {
            Err(CompileError::UnsupportedVersion {
                version: self.version,
                min: MIN_VERSION,
                max: MAX_VERSION,
            })
        }
    }
}

/// A compiled program: the linked assembly and its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub version: u8,
    pub mode: Mode,
    pub assembly: Assembly,
    pub text: String,
}

impl CompiledProgram {
    pub fn to_bytes(&self) -> postcard::Result<Vec<u8>> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> postcard::Result<Self> {
        postcard::from_bytes(bytes)
    }
}

// =============================================================================
// Lowering
// =============================================================================

fn routine_name(program: &Program, routine: Routine) -> String {
    match routine.subroutine() {
        None => "main".to_string(),
        Some(id) => program
            .subroutine(id)
            .map(|def| def.handle().name().to_string())
            .unwrap_or_else(|_| routine.to_string()),
    }
}

/// Give a freshly lowered graph its incoming lists and merge straight-line
/// runs.
fn prepare(mut cfg: Cfg, entry: BlockId, routine: &str) -> Result<(Cfg, BlockId), CompileError> {
    cfg.compute_incoming(entry);
    cfg.validate(entry)?;
    let merged = cfg.normalize(entry);
    cfg.validate(entry)?;
    debug!(
        target: "tealc::compile",
        routine,
        blocks = cfg.reachable(entry).len(),
        merged,
        "lowered routine"
    );
    Ok((cfg, entry))
}

fn append(ctx: &mut CompileContext<'_>, end: BlockId, op: Op) -> Result<(), CompileError> {
    let tail = ctx.cfg.simple(vec![TealOp::new(op)]);
    ctx.cfg.set_next(end, tail)
}

fn lower_main(ctx: &mut CompileContext<'_>, main: &dyn Expr) -> Result<(Cfg, BlockId), CompileError> {
    ctx.begin_routine(None);
    let (entry, end) = ctx.lower(main)?;

    if !main.terminates() {
        match main.type_of() {
            TealType::Uint64 | TealType::Anytype => append(ctx, end, Op::Return)?,
            TealType::Bytes => {
                return Err(CompileError::invalid_with_hint(
                    "the main routine produces bytes, but the program result must be a uint64",
                    "compare or convert the value with btoi",
                ));
            }
            TealType::None => {
                return Err(CompileError::invalid_with_hint(
                    "the main routine neither produces a value nor ends the program",
                    "finish it with approve(), reject() or a uint64 expression",
                ));
            }
        }
    }

    let cfg = ctx.finish_routine();
    prepare(cfg, entry, "main")
}

fn lower_subroutine(
    ctx: &mut CompileContext<'_>,
    id: SubroutineId,
) -> Result<(Cfg, BlockId), CompileError> {
    let program = ctx.program();
    let definition = program.subroutine(id)?;
    let handle = definition.handle().clone();
    let body = definition.body(program)?;
    ctx.begin_routine(Some(handle.clone()));

    // the last argument is on top of the stack
    let stores = definition
        .params()
        .iter()
        .rev()
        .map(|param| TealOp::slot(Op::Store, param.slot()))
        .collect();
    let entry = ctx.cfg.simple(stores);
    let (start, end) = ctx.lower(body)?;
    ctx.cfg.set_next(entry, start)?;

    if !body.terminates() {
        let produces = body.type_of().is_value();
        match handle.returns() {
            ReturnKind::Value(_) if !produces => {
                return Err(CompileError::invalid(format!(
                    "subroutine '{}' must return a value, but its body produces none",
                    handle.name()
                )));
            }
            ReturnKind::None if produces => {
                return Err(CompileError::invalid_with_hint(
                    format!(
                        "subroutine '{}' returns nothing, but its body produces a value",
                        handle.name()
                    ),
                    "discard the value with pop(...)",
                ));
            }
            _ => append(ctx, end, Op::Retsub)?,
        }
    }

    let cfg = ctx.finish_routine();
    prepare(cfg, entry, handle.name())
}

// =============================================================================
// Checks
// =============================================================================

fn verify_ops(
    code: &[TealComponent],
    options: &CompileOptions,
    routine: &str,
) -> Result<(), CompileError> {
    for op in code.iter().filter_map(TealComponent::as_op) {
        let info = op.op.info();
        if info.min_version > options.version {
            return Err(CompileError::VersionMismatch {
                what: info.mnemonic.to_string(),
                required: info.min_version,
                version: options.version,
                routine: routine.to_string(),
            });
        }
        if !info.modes.allows(options.mode) {
            return Err(CompileError::ModeMismatch {
                op: info.mnemonic.to_string(),
                mode: options.mode,
                routine: routine.to_string(),
            });
        }
    }
    Ok(())
}

fn snapshot(graphs: &BTreeMap<Routine, (Cfg, BlockId)>) -> BTreeMap<Routine, Vec<TealComponent>> {
    graphs
        .iter()
        .map(|(&routine, (cfg, entry))| {
            let code = cfg
                .reachable(*entry)
                .into_iter()
                .flat_map(|id| cfg.block(id).ops.clone())
                .map(TealComponent::Op)
                .collect();
            (routine, code)
        })
        .collect()
}

// =============================================================================
// Pipeline
// =============================================================================

/// Compile `main` together with every subroutine it reaches.
pub fn compile(
    program: &Program,
    main: &dyn Expr,
    options: &CompileOptions,
) -> Result<CompiledProgram, CompileError> {
    options.validate()?;
    let mut ctx = CompileContext::new(program, options);

    let mut graphs: BTreeMap<Routine, (Cfg, BlockId)> = BTreeMap::new();
    graphs.insert(Routine::Main, lower_main(&mut ctx, main)?);
    loop {
        let pending = ctx
            .referenced()
            .iter()
            .copied()
            .find(|id| !graphs.contains_key(&Routine::Subroutine(*id)));
        let Some(id) = pending else {
            break;
        };
        graphs.insert(Routine::Subroutine(id), lower_subroutine(&mut ctx, id)?);
    }

    if options.optimize.dedupe_values {
        for (cfg, entry) in graphs.values_mut() {
            optimize::dedupe_cfg(cfg, *entry, options.version);
        }
    }
    if options.optimize.elide_store_load {
        let pinned: BTreeSet<ScratchSlot> = SlotUsage::collect(&snapshot(&graphs)).pinned();
        for (routine, (cfg, entry)) in graphs.iter_mut() {
            let removed = optimize::elide_store_load(cfg, *entry, &pinned);
            debug!(target: "tealc::optimize", %routine, removed, "store/load elision");
        }
    }

    let mut flat: BTreeMap<Routine, Vec<TealComponent>> = BTreeMap::new();
    for (&routine, (cfg, entry)) in &graphs {
        let order = sort::sort_blocks(cfg, *entry)?;
        let code = flatten::flatten_blocks(cfg, &order)?;
        verify_ops(&code, options, &routine_name(program, routine))?;
        flat.insert(routine, code);
    }

    let graph = CallGraph::build(&flat);
    let usage = SlotUsage::collect(&flat);
    let locals = usage.local();
    for (&routine, code) in &flat {
        let checked: BTreeSet<ScratchSlot> = usage
            .slots_of(routine)
            .filter(|slot| {
                !slot.is_reserved()
                    && !usage.dynamic().contains(slot)
                    && locals.get(&routine).is_some_and(|l| l.contains(slot))
            })
            .collect();
        check_initialized(&routine_name(program, routine), code, &checked)?;
    }
    let assignment = assign_slots(&usage, &graph, options.optimize.share_local_slots)?;

    let spilled = spill::spill_local_slots(&mut flat, &graph, &locals, program, options.version)?;

    let assembly = resolve::resolve(&flat, program, &assignment, options.version)?;
    let text = assembly.to_string();
    debug!(
        target: "tealc::compile",
        version = options.version,
        mode = %options.mode,
        subroutines = flat.len() - 1,
        cells = assignment.cells().len(),
        spilled,
        "compiled program"
    );

    Ok(CompiledProgram {
        version: options.version,
        mode: options.mode,
        assembly,
        text,
    })
}
