//! End-to-end tests: build programs from expression trees, compile them and
//! check the output both by shape and by running it.

use crate::compiler::context::CompileContext;
use crate::compiler::flatten::{flatten_blocks, recover_blocks};
use crate::compiler::sort::sort_blocks;
use crate::compiler::{
    AsmArg, AsmLine, CompileError, CompileOptions, CompiledProgram, ErrorKind, OptimizeOptions,
    compile, optimize,
};
use crate::ir::{BlockId, Cfg, Mode, Op, TealOp};
use crate::lang::expr::{ExprRef, TealType};
use crate::lang::node::*;
use crate::lang::program::{Program, ReturnKind, ScratchVar, SubroutineHandle};
use crate::vm::{self, Effect, Env, Outcome, StackValue};

// ============================================================
// Test Helpers
// ============================================================

fn options(version: u8, optimize: OptimizeOptions) -> CompileOptions {
    CompileOptions {
        version,
        mode: Mode::Application,
        optimize,
    }
}

fn build(program: &Program, main: &ExprRef, options: CompileOptions) -> CompiledProgram {
    compile(program, main.as_ref(), &options).unwrap()
}

fn compile_err(program: &Program, main: &ExprRef, options: CompileOptions) -> CompileError {
    compile(program, main.as_ref(), &options).unwrap_err()
}

fn env() -> Env {
    let mut env = Env::default();
    env.txn.insert("Amount".to_string(), StackValue::Uint(20));
    env.txn.insert("Fee".to_string(), StackValue::Uint(1000));
    env.app_globals
        .insert(b"count".to_vec(), StackValue::Uint(41));
    env
}

fn execute(compiled: &CompiledProgram, env: &Env) -> Outcome {
    vm::run(&compiled.assembly, env).unwrap()
}

/// Op and its first numeric immediate.
fn op_line(line: &AsmLine) -> Option<(Op, Option<u64>)> {
    match line {
        AsmLine::Op { op, args } => {
            let n = match args.first() {
                Some(AsmArg::Uint(n)) => Some(*n),
                _ => None,
            };
            Some((*op, n))
        }
        AsmLine::Label { .. } => None,
    }
}

fn label_target(line: &AsmLine) -> Option<&str> {
    match line {
        AsmLine::Op { args, .. } => args.iter().find_map(|arg| match arg {
            AsmArg::Label(name) => Some(name.as_str()),
            _ => None,
        }),
        AsmLine::Label { .. } => None,
    }
}

/// Deterministic pseudo-random source for schedule generation.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

// ============================================================
// Sample programs
// ============================================================

fn factorial(program: &mut Program) -> SubroutineHandle {
    program.define("fact", 1, ReturnKind::Value(TealType::Uint64), |scope| {
        let n = scope.params()[0];
        if_else(
            lt(n.load(), int(2)),
            int(1),
            mul(n.load(), call(scope.this(), vec![sub(n.load(), int(1))])),
        )
    }).unwrap()
}

fn fibonacci(program: &mut Program) -> SubroutineHandle {
    program.define("fib", 1, ReturnKind::Value(TealType::Uint64), |scope| {
        let n = scope.params()[0];
        if_else(
            lt(n.load(), int(2)),
            n.load(),
            add(
                call(scope.this(), vec![sub(n.load(), int(1))]),
                call(scope.this(), vec![sub(n.load(), int(2))]),
            ),
        )
    }).unwrap()
}

/// Sum 1..10, skipping 3 and stopping at 7: 1 + 2 + 4 + 5 + 6.
fn loop_sum(program: &Program) -> ExprRef {
    let i = program.scratch_var(TealType::Uint64);
    let total = program.scratch_var(TealType::Uint64);
    seq(vec![
        i.store(int(0)),
        total.store(int(0)),
        while_loop(
            lt(i.load(), int(10)),
            seq(vec![
                i.store(add(i.load(), int(1))),
                if_then(eq(i.load(), int(3)), cont()),
                if_then(eq(i.load(), int(7)), brk()),
                total.store(add(total.load(), i.load())),
            ]),
        ),
        eq(total.load(), int(18)),
    ])
}

fn counter() -> ExprRef {
    seq(vec![
        app_global_put(
            text("count"),
            add(app_global_get(text("count")), int(1)),
        ),
        log(itob_of(app_global_get(text("count")))),
        approve(),
    ])
}

fn itob_of(value: ExprRef) -> ExprRef {
    unary(UnaryKind::Itob, value)
}

/// Repeated reads and a store immediately read back, so both optimizer
/// passes have something to do.
fn redundant(program: &Program) -> ExprRef {
    let v = program.scratch_var(TealType::Uint64);
    let amount = || txn("Amount", TealType::Uint64);
    let fee = || txn("Fee", TealType::Uint64);
    seq(vec![
        v.store(add(amount(), amount())),
        assert(eq(v.load(), int(40))),
        app_global_put(text("doubled"), add(fee(), fee())),
        gt(add(amount(), amount()), int(30)),
    ])
}

// ============================================================
// Flattening
// ============================================================

#[test]
fn test_if_else_single_jump() {
    let program = Program::new();
    let main = if_else(
        gt(txn("Amount", TealType::Uint64), int(10)),
        int(1),
        int(0),
    );
    let compiled = build(&program, &main, CompileOptions::default());
    let assembly = &compiled.assembly;

    assert_eq!(assembly.count(Op::B), 1);
    assert_eq!(assembly.count(Op::Bz) + assembly.count(Op::Bnz), 1);

    let labels: Vec<&str> = assembly
        .lines
        .iter()
        .filter_map(AsmLine::label_name)
        .collect();
    assert_eq!(labels.len(), 2);

    // the jump targets the join point, which the other branch falls into
    let jump = assembly
        .lines
        .iter()
        .find(|line| op_line(line).is_some_and(|(op, _)| op == Op::B))
        .and_then(label_target);
    let join = labels[1];
    assert_eq!(jump, Some(join));
    let at = assembly
        .lines
        .iter()
        .position(|line| line.label_name() == Some(join))
        .unwrap();
    assert!(matches!(
        op_line(&assembly.lines[at - 1]),
        Some((Op::Int, Some(0)))
    ));

    assert!(execute(&compiled, &env()).approved);
    let mut small = env();
    small.txn.insert("Amount".to_string(), StackValue::Uint(5));
    assert!(!execute(&compiled, &small).approved);

    // the join is the only block entered from two places
    let mut ctx = CompileContext::new(&program, &CompileOptions::default());
    let (entry, _) = ctx.lower(main.as_ref()).unwrap();
    let mut cfg = ctx.finish_routine();
    cfg.compute_incoming(entry);
    cfg.normalize(entry);
    let order = sort_blocks(&cfg, entry).unwrap();
    let counts: Vec<usize> = order.iter().map(|&id| cfg.block(id).incoming.len()).collect();
    assert_eq!(counts, vec![0, 1, 1, 2]);
}

#[test]
fn test_loop_with_break_and_continue() {
    for optimize in [OptimizeOptions::default(), OptimizeOptions::all()] {
        let program = Program::new();
        let main = loop_sum(&program);
        let compiled = build(&program, &main, options(8, optimize));
        assert!(execute(&compiled, &env()).approved, "{}", compiled.text);
    }
}

#[test]
fn test_break_outside_loop() {
    let program = Program::new();
    let main = seq(vec![brk(), approve()]);
    let err = compile_err(&program, &main, CompileOptions::default());
    assert!(matches!(err, CompileError::InvalidProgram { .. }));
    assert_eq!(err.kind(), ErrorKind::Input);
}

// ============================================================
// Generated control flow
// ============================================================

enum Stmt {
    Op,
    If(Vec<Stmt>, Vec<Stmt>),
    While(Vec<Stmt>),
    Break,
    Continue,
    Return,
}

fn random_stmts(rng: &mut XorShift, depth: u32) -> Vec<Stmt> {
    (0..1 + rng.below(3))
        .map(|_| {
            let pick = if depth == 0 { rng.below(6) } else { rng.below(9) };
            match pick {
                0..=2 => Stmt::Op,
                3 => Stmt::Break,
                4 => Stmt::Continue,
                5 => Stmt::Return,
                6 => Stmt::While(random_stmts(rng, depth - 1)),
                _ => Stmt::If(random_stmts(rng, depth - 1), random_stmts(rng, depth - 1)),
            }
        })
        .collect()
}

/// Builds a graph straight from a statement tree. Every block gets at least
/// one op so flattened runs map back to blocks one to one.
struct GraphBuilder {
    cfg: Cfg,
    loops: Vec<(BlockId, BlockId)>,
    next_value: u64,
}

impl GraphBuilder {
    fn value(&mut self) -> TealOp {
        self.next_value += 1;
        TealOp::int(self.next_value)
    }

    fn simple(&mut self) -> BlockId {
        let ops = vec![self.value(), TealOp::new(Op::Pop)];
        self.cfg.simple(ops)
    }

    fn conditional(&mut self) -> BlockId {
        let ops = vec![self.value()];
        self.cfg.conditional(ops)
    }

    /// Returns the block control falls out of, or `None` if it never does.
    fn lower(&mut self, current: BlockId, stmts: &[Stmt]) -> Option<BlockId> {
        let mut current = current;
        for stmt in stmts {
            match stmt {
                Stmt::Op => {
                    let op = self.value();
                    let block = self.cfg.block_mut(current);
                    block.ops.push(op);
                    block.ops.push(TealOp::new(Op::Pop));
                }
                Stmt::If(then, other) => {
                    let cond = self.conditional();
                    let (t, f) = (self.simple(), self.simple());
                    self.cfg.set_next(current, cond).unwrap();
                    self.cfg.set_branches(cond, t, f).unwrap();
                    let ends: Vec<BlockId> = [self.lower(t, then), self.lower(f, other)]
                        .into_iter()
                        .flatten()
                        .collect();
                    if ends.is_empty() {
                        return None;
                    }
                    let join = self.simple();
                    for end in ends {
                        self.cfg.set_next(end, join).unwrap();
                    }
                    current = join;
                }
                Stmt::While(body) => {
                    let head = self.conditional();
                    let (start, exit) = (self.simple(), self.simple());
                    self.cfg.set_next(current, head).unwrap();
                    self.cfg.set_branches(head, start, exit).unwrap();
                    self.loops.push((head, exit));
                    if let Some(end) = self.lower(start, body) {
                        self.cfg.set_next(end, head).unwrap();
                    }
                    self.loops.pop();
                    current = exit;
                }
                Stmt::Break | Stmt::Continue => {
                    let Some(&(head, exit)) = self.loops.last() else {
                        continue;
                    };
                    let target = if matches!(stmt, Stmt::Break) { exit } else { head };
                    self.cfg.set_next(current, target).unwrap();
                    return None;
                }
                Stmt::Return => {
                    self.cfg.block_mut(current).ops.push(TealOp::new(Op::Return));
                    return None;
                }
            }
        }
        Some(current)
    }
}

fn random_graph(rng: &mut XorShift) -> (Cfg, BlockId) {
    let mut builder = GraphBuilder {
        cfg: Cfg::new(),
        loops: Vec::new(),
        next_value: 0,
    };
    let entry = builder.simple();
    let stmts = random_stmts(rng, 3);
    if let Some(end) = builder.lower(entry, &stmts) {
        builder.cfg.block_mut(end).ops.push(TealOp::new(Op::Return));
    }
    let mut cfg = builder.cfg;
    cfg.compute_incoming(entry);
    cfg.normalize(entry);
    cfg.validate(entry).unwrap();
    (cfg, entry)
}

#[test]
fn test_sort_covers_generated_graphs() {
    let mut rng = XorShift(0x2545_f491_4f6c_dd1d);
    for round in 0..200 {
        let (cfg, entry) = random_graph(&mut rng);
        let order = sort_blocks(&cfg, entry).unwrap();

        assert_eq!(order.first(), Some(&entry), "round {}", round);
        let mut sorted = order.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), order.len(), "round {}: block emitted twice", round);
        let mut reachable = cfg.reachable(entry);
        reachable.sort();
        assert_eq!(sorted, reachable, "round {}", round);
    }
}

#[test]
fn test_flatten_recover_generated_graphs() {
    let mut rng = XorShift(0xd1b5_4a32_d192_ed03);
    for round in 0..200 {
        let (cfg, entry) = random_graph(&mut rng);
        let order = sort_blocks(&cfg, entry).unwrap();
        let code = flatten_blocks(&cfg, &order).unwrap();
        let blocks = recover_blocks(&code).unwrap();

        assert_eq!(blocks.len(), order.len(), "round {}", round);
        let position = |id: &BlockId| order.iter().position(|o| o == id).unwrap();
        for (recovered, &id) in blocks.iter().zip(&order) {
            let original = cfg.block(id);
            assert_eq!(recovered.ops, original.ops, "round {} {}", round, id);
            let expected: Vec<usize> = original.successors().iter().map(position).collect();
            assert_eq!(recovered.successors, expected, "round {} {}", round, id);
        }
    }
}

// ============================================================
// Recursion and spilling
// ============================================================

#[test]
fn test_recursive_call_spills_three_locals() {
    let mut program = Program::new();
    let f = program.define("f", 1, ReturnKind::Value(TealType::Uint64), |scope| {
        let n = scope.params()[0];
        let a = scope.scratch_var(TealType::Uint64);
        let b = scope.scratch_var(TealType::Uint64);
        seq(vec![
            a.store(mul(n.load(), int(2))),
            b.store(add(n.load(), int(1))),
            if_else(
                eq(n.load(), int(0)),
                int(0),
                add(
                    call(scope.this(), vec![sub(n.load(), int(1))]),
                    add(a.load(), b.load()),
                ),
            ),
        ])
    }).unwrap();
    // f(n) = f(n - 1) + 3n + 1
    let main = eq(call(&f, vec![int(3)]), int(21));
    let compiled = build(&program, &main, CompileOptions::default());
    let lines = &compiled.assembly.lines;

    let start = lines
        .iter()
        .position(|line| line.label_name() == Some("f_0"))
        .unwrap();
    let calls: Vec<usize> = (start..lines.len())
        .filter(|&i| op_line(&lines[i]).is_some_and(|(op, _)| op == Op::Callsub))
        .collect();
    assert_eq!(calls.len(), 1);
    let at = calls[0];

    let before: Vec<_> = lines[at - 6..at].iter().filter_map(op_line).collect();
    let cells: Vec<u64> = before
        .iter()
        .step_by(2)
        .map(|&(op, cell)| {
            assert_eq!(op, Op::Load);
            cell.unwrap()
        })
        .collect();
    assert!(before.iter().skip(1).step_by(2).all(|&l| l == (Op::Cover, Some(1))));
    assert_eq!(cells.len(), 3);
    assert!(cells.windows(2).all(|w| w[0] < w[1]), "creation order");

    let after: Vec<_> = lines[at + 1..at + 5].iter().filter_map(op_line).collect();
    assert_eq!(
        after,
        vec![
            (Op::Cover, Some(3)),
            (Op::Store, Some(cells[2])),
            (Op::Store, Some(cells[1])),
            (Op::Store, Some(cells[0])),
        ]
    );

    assert!(execute(&compiled, &env()).approved);
}

#[test]
fn test_spill_needs_cover_below_v5() {
    let mut program = Program::new();
    let fact = factorial(&mut program);
    let main = eq(call(&fact, vec![int(5)]), int(120));

    // one local, one argument: swap is enough
    let compiled = build(&program, &main, options(4, OptimizeOptions::default()));
    assert_eq!(compiled.assembly.count(Op::Cover), 0);
    assert!(execute(&compiled, &env()).approved);

    let mut program = Program::new();
    let g = program.define("g", 2, ReturnKind::Value(TealType::Uint64), |scope| {
        let (a, b) = (scope.params()[0], scope.params()[1]);
        if_else(
            eq(a.load(), int(0)),
            b.load(),
            call(scope.this(), vec![sub(a.load(), int(1)), b.load()]),
        )
    }).unwrap();
    let main = call(&g, vec![int(2), int(1)]);
    let err = compile_err(&program, &main, options(4, OptimizeOptions::default()));
    assert!(matches!(err, CompileError::InvalidProgram { .. }));

    let compiled = build(&program, &main, options(5, OptimizeOptions::default()));
    assert!(execute(&compiled, &env()).approved);
}

#[test]
fn test_factorial_and_fibonacci() {
    for version in [4, 8] {
        let mut program = Program::new();
        let fib = fibonacci(&mut program);
        let fact = factorial(&mut program);
        let main = seq(vec![
            assert(eq(call(&fib, vec![int(10)]), int(55))),
            eq(call(&fact, vec![int(10)]), int(3_628_800)),
        ]);
        let compiled = build(&program, &main, options(version, OptimizeOptions::default()));
        assert!(execute(&compiled, &env()).approved, "{}", compiled.text);
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Read(usize),
    Bump(usize, u64),
}

#[derive(Debug, Clone)]
struct Schedule {
    /// Per local: value written before the call is `n * m + c`.
    pre: Vec<(u64, u64)>,
    post: Vec<Step>,
    base: u64,
}

impl Schedule {
    fn random(rng: &mut XorShift) -> Self {
        let locals = 1 + rng.below(4) as usize;
        let pre = (0..locals)
            .map(|_| (1 + rng.below(9), rng.below(100)))
            .collect();
        let post = (0..1 + rng.below(6))
            .map(|_| {
                let i = rng.below(locals as u64) as usize;
                if rng.below(3) == 0 {
                    Step::Bump(i, 1 + rng.below(50))
                } else {
                    Step::Read(i)
                }
            })
            .collect();
        Schedule {
            pre,
            post,
            base: rng.below(1000),
        }
    }

    /// What a correct machine computes.
    fn expected(&self, n: u64) -> u64 {
        if n == 0 {
            return self.base;
        }
        let mut locals: Vec<u64> = self.pre.iter().map(|&(m, c)| n * m + c).collect();
        let mut acc = self.expected(n - 1);
        for step in &self.post {
            match *step {
                Step::Read(i) => acc += locals[i],
                Step::Bump(i, k) => locals[i] += k,
            }
        }
        acc
    }

    fn define(self, program: &mut Program) -> SubroutineHandle {
        program.define("walk", 1, ReturnKind::Value(TealType::Uint64), move |scope| {
            let n = scope.params()[0];
            let locals: Vec<ScratchVar> = self
                .pre
                .iter()
                .map(|_| scope.scratch_var(TealType::Uint64))
                .collect();
            let acc = scope.scratch_var(TealType::Uint64);

            let mut items: Vec<ExprRef> = locals
                .iter()
                .zip(&self.pre)
                .map(|(v, &(m, c))| v.store(add(mul(n.load(), int(m)), int(c))))
                .collect();

            let mut recurse = vec![acc.store(call(scope.this(), vec![sub(n.load(), int(1))]))];
            for step in &self.post {
                recurse.push(match *step {
                    Step::Read(i) => acc.store(add(acc.load(), locals[i].load())),
                    Step::Bump(i, k) => locals[i].store(add(locals[i].load(), int(k))),
                });
            }
            recurse.push(ret_value(acc.load()));

            items.push(if_else(
                eq(n.load(), int(0)),
                ret_value(int(self.base)),
                seq(recurse),
            ));
            seq(items)
        }).unwrap()
    }
}

#[test]
fn test_spilled_locals_survive_recursion() {
    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
    let variants = [
        options(5, OptimizeOptions::default()),
        options(8, OptimizeOptions::default()),
        options(8, OptimizeOptions::all()),
    ];

    for _ in 0..40 {
        let schedule = Schedule::random(&mut rng);
        let depth = 1 + rng.below(5);
        let expected = schedule.expected(depth);

        for options in variants {
            let mut program = Program::new();
            let walk = schedule.clone().define(&mut program);
            let main = seq(vec![
                app_global_put(text("r"), call(&walk, vec![int(depth)])),
                approve(),
            ]);
            let compiled = build(&program, &main, options);
            let outcome = execute(&compiled, &Env::default());

            assert_eq!(
                outcome.app_globals.get(b"r".as_slice()),
                Some(&StackValue::Uint(expected)),
                "{:?} depth {} with {:?}\n{}",
                schedule,
                depth,
                options.optimize,
                compiled.text
            );
        }
    }
}

// ============================================================
// Optimizer
// ============================================================

type Sample = fn(&mut Program) -> ExprRef;

fn sample_loop(program: &mut Program) -> ExprRef {
    loop_sum(program)
}

fn sample_counter(_: &mut Program) -> ExprRef {
    counter()
}

fn sample_redundant(program: &mut Program) -> ExprRef {
    redundant(program)
}

fn sample_fact(program: &mut Program) -> ExprRef {
    let fact = factorial(program);
    eq(call(&fact, vec![int(6)]), int(720))
}

fn sample_fib(program: &mut Program) -> ExprRef {
    let fib = fibonacci(program);
    seq(vec![
        app_global_put(text("fib"), call(&fib, vec![int(12)])),
        approve(),
    ])
}

fn sample_indirect(program: &mut Program) -> ExprRef {
    let v = program.scratch_var(TealType::Uint64);
    seq(vec![
        store_indirect(v.index(), int(7)),
        v.store(add(load_indirect(v.index()), load_indirect(v.index()))),
        eq(v.load(), int(14)),
    ])
}

fn samples() -> Vec<(&'static str, Sample)> {
    vec![
        ("loop", sample_loop as Sample),
        ("counter", sample_counter),
        ("redundant", sample_redundant),
        ("fact", sample_fact),
        ("fib", sample_fib),
        ("indirect", sample_indirect),
    ]
}

#[test]
fn test_optimizer_preserves_behavior() {
    let env = env();
    for (name, sample) in samples() {
        let run = |optimize| {
            let mut program = Program::new();
            let main = sample(&mut program);
            let compiled = build(&program, &main, options(8, optimize));
            (execute(&compiled, &env), compiled.assembly.ops().count())
        };
        let (plain, plain_len) = run(OptimizeOptions::default());
        let (optimized, optimized_len) = run(OptimizeOptions::all());

        assert!(plain.approved, "{}", name);
        assert_eq!(optimized.approved, plain.approved, "{}", name);
        assert_eq!(optimized.stack, plain.stack, "{}", name);
        assert_eq!(optimized.effects, plain.effects, "{}", name);
        assert_eq!(optimized.app_globals, plain.app_globals, "{}", name);
        assert!(optimized_len <= plain_len, "{}", name);
    }
}

#[test]
fn test_optimizer_passes_are_idempotent() {
    let program = Program::new();
    let main = redundant(&program);
    let options = options(8, OptimizeOptions::all());
    let mut ctx = CompileContext::new(&program, &options);
    ctx.begin_routine(None);
    let (entry, _) = ctx.lower(main.as_ref()).unwrap();
    let mut cfg = ctx.finish_routine();
    cfg.compute_incoming(entry);
    cfg.normalize(entry);

    assert!(optimize::dedupe_cfg(&mut cfg, entry, 8) > 0);
    assert_eq!(optimize::dedupe_cfg(&mut cfg, entry, 8), 0);

    let pinned = Default::default();
    assert!(optimize::elide_store_load(&mut cfg, entry, &pinned) > 0);
    assert_eq!(optimize::elide_store_load(&mut cfg, entry, &pinned), 0);
    assert_eq!(optimize::dedupe_cfg(&mut cfg, entry, 8), 0);
}

#[test]
fn test_counter_updates_state() {
    let program = Program::new();
    let compiled = build(&program, &counter(), CompileOptions::default());
    let outcome = execute(&compiled, &env());

    assert!(outcome.approved);
    assert_eq!(
        outcome.effects,
        vec![
            Effect::GlobalPut {
                key: b"count".to_vec(),
                value: StackValue::Uint(42)
            },
            Effect::Log(42u64.to_be_bytes().to_vec()),
        ]
    );
}

// ============================================================
// Determinism
// ============================================================

#[test]
fn test_output_is_deterministic() {
    let compile_fresh = || {
        let mut program = Program::new();
        let fib = fibonacci(&mut program);
        let fact = factorial(&mut program);
        let main = seq(vec![
            pop(call(&fact, vec![int(4)])),
            eq(call(&fib, vec![int(7)]), int(13)),
        ]);
        build(&program, &main, options(8, OptimizeOptions::all()))
    };

    let first = compile_fresh();
    let second = compile_fresh();
    assert_eq!(first.text, second.text);
    assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
    assert!(first.text.contains("fib_0: // fib"));
    assert!(first.text.contains("fact_1: // fact"));
}

// ============================================================
// Errors
// ============================================================

#[test]
fn test_mode_mismatch() {
    let program = Program::new();
    let main = seq(vec![log(text("hi")), approve()]);
    let signature = CompileOptions {
        mode: Mode::Signature,
        ..CompileOptions::default()
    };
    let err = compile_err(&program, &main, signature);
    assert!(matches!(err, CompileError::ModeMismatch { ref op, .. } if op == "log"));

    let main = seq(vec![pop(sig_arg(0)), approve()]);
    let err = compile_err(&program, &main, CompileOptions::default());
    assert!(matches!(err, CompileError::ModeMismatch { mode: Mode::Application, .. }));
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[test]
fn test_version_mismatch() {
    let mut program = Program::new();
    let fact = factorial(&mut program);
    let main = eq(call(&fact, vec![int(3)]), int(6));
    let err = compile_err(&program, &main, options(3, OptimizeOptions::default()));
    assert!(matches!(
        err,
        CompileError::VersionMismatch { required: 4, version: 3, .. }
    ));

    let program = Program::new();
    let main = seq(vec![log(text("hi")), approve()]);
    let err = compile_err(&program, &main, options(4, OptimizeOptions::default()));
    assert!(matches!(err, CompileError::VersionMismatch { required: 5, .. }));
}

#[test]
fn test_reserved_slots() {
    let program = Program::new();
    let pinned = program.reserved_var(200, TealType::Uint64);
    let main = seq(vec![pinned.store(int(3)), eq(pinned.load(), int(3))]);
    let compiled = build(&program, &main, options(8, OptimizeOptions::all()));
    assert!(compiled.text.contains("store 200"));
    assert!(compiled.text.contains("load 200"));

    let program = Program::new();
    let a = program.reserved_var(5, TealType::Uint64);
    let b = program.reserved_var(5, TealType::Uint64);
    let main = seq(vec![a.store(int(1)), b.store(int(2)), approve()]);
    let err = compile_err(&program, &main, CompileOptions::default());
    assert_eq!(err, CompileError::ReservedSlotCollision { id: 5 });
    assert!(err.is_internal());
}

#[test]
fn test_slot_space_exhausted() {
    let program = Program::new();
    let mut items: Vec<ExprRef> = (0..257u64)
        .map(|n| program.scratch_var(TealType::Uint64).store(int(n)))
        .collect();
    items.push(approve());
    let err = compile_err(&program, &seq(items), CompileOptions::default());
    assert_eq!(
        err,
        CompileError::SlotSpaceExhausted {
            requested: 257,
            available: 256
        }
    );
}

#[test]
fn test_uninitialized_local_read() {
    let program = Program::new();
    let v = program.scratch_var(TealType::Uint64);
    let main = seq(vec![
        if_then(
            gt(txn("Amount", TealType::Uint64), int(10)),
            v.store(int(1)),
        ),
        eq(v.load(), int(1)),
    ]);
    let err = compile_err(&program, &main, CompileOptions::default());
    assert!(matches!(err, CompileError::UninitializedRead { ref routine, .. } if routine == "main"));
}

#[test]
fn test_call_with_handle_from_another_program() {
    let mut other = Program::new();
    let one = other
        .define("one", 1, ReturnKind::Value(TealType::Uint64), |scope| {
            scope.params()[0].load()
        })
        .unwrap();

    // same id, different subroutine
    let mut program = Program::new();
    program
        .define("two", 2, ReturnKind::Value(TealType::Uint64), |scope| {
            add(scope.params()[0].load(), scope.params()[1].load())
        })
        .unwrap();
    assert_eq!(one.id(), program.subroutines().next().unwrap().handle().id());

    let main = eq(call(&one, vec![int(7)]), int(7));
    let err = compile_err(&program, &main, CompileOptions::default());
    assert!(matches!(err, CompileError::InvalidProgram { ref message, .. } if message.contains("'one'")));
    assert_eq!(err.kind(), ErrorKind::Input);

    // the owning program still compiles it
    let compiled = build(&other, &main, CompileOptions::default());
    assert!(execute(&compiled, &env()).approved);
}
