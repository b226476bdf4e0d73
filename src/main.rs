use std::env;

use tealc::compiler::{CompileError, CompileOptions, CompiledProgram, OptimizeOptions, compile};
use tealc::ir::Mode;
use tealc::lang::expr::{ExprRef, TealType};
use tealc::lang::node::*;
use tealc::lang::program::{Program, ReturnKind};
use tealc::vm::{self, Effect, Env, StackValue};
use tracing_subscriber::EnvFilter;

const DEMOS: [&str; 4] = ["factorial", "fib", "counter", "loop"];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let options = match parse_options(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Error: {}", message);
            print_usage();
            std::process::exit(2);
        }
    };
    let run = args.contains(&"--run".to_string());
    let bytes = args.contains(&"--bytes".to_string());

    // first non-flag argument that is not a flag's value is the demo name
    let demo = args
        .iter()
        .enumerate()
        .find(|(i, a)| {
            !a.starts_with('-')
                && (*i == 0 || !matches!(args[i - 1].as_str(), "--version" | "--mode"))
        })
        .map(|(_, a)| a.as_str());

    let Some(demo) = demo else {
        print_usage();
        std::process::exit(2);
    };

    let mut program = Program::new();
    let main = match build_demo(demo, &mut program) {
        Ok(Some(main)) => main,
        Ok(None) => {
            eprintln!("Error: unknown demo '{}' (expected one of: {})", demo, DEMOS.join(", "));
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let compiled = match compile(&program, main.as_ref(), &options) {
        Ok(compiled) => compiled,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    println!("{}", compiled.text);

    if bytes {
        print_artifact(&compiled);
    }
    if run {
        run_compiled(&compiled);
    }
}

fn print_usage() {
    println!("TEALC - stack-machine contract compiler backend");
    println!();
    println!("Usage:");
    println!("  tealc <demo> [options]    Compile a built-in demo and print its assembly");
    println!();
    println!("Demos: {}", DEMOS.join(", "));
    println!();
    println!("Options:");
    println!("  --version N               Target version ({}..={})", tealc::compiler::MIN_VERSION, tealc::compiler::MAX_VERSION);
    println!("  --mode app|sig            Execution mode (default: app)");
    println!("  --dedupe                  Replace repeated values with dup/dup2");
    println!("  --elide                   Remove store/load pairs");
    println!("  --share-slots             Share scratch cells between exclusive subroutines");
    println!("  --run                     Execute the result in the reference interpreter");
    println!("  --bytes                   Show the size of the serialized artifact");
    println!("  --help, -h                Show this help");
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, String> {
    match args.iter().position(|a| a == flag) {
        None => Ok(None),
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| format!("{} needs a value", flag)),
    }
}

fn parse_options(args: &[String]) -> Result<CompileOptions, String> {
    let mut options = CompileOptions::default();

    if let Some(version) = flag_value(args, "--version")? {
        options.version = version
            .parse()
            .map_err(|_| format!("invalid version '{}'", version))?;
    }
    if let Some(mode) = flag_value(args, "--mode")? {
        options.mode = match mode {
            "app" => Mode::Application,
            "sig" => Mode::Signature,
            other => return Err(format!("invalid mode '{}' (expected app or sig)", other)),
        };
    }

    let has = |flag: &str| args.iter().any(|a| a == flag);
    options.optimize = OptimizeOptions {
        dedupe_values: has("--dedupe"),
        elide_store_load: has("--elide"),
        share_local_slots: has("--share-slots"),
    };
    Ok(options)
}

// =============================================================================
// Demos
// =============================================================================

fn build_demo(name: &str, program: &mut Program) -> Result<Option<ExprRef>, CompileError> {
    let main = match name {
        "factorial" => {
            let fact = program.define("fact", 1, ReturnKind::Value(TealType::Uint64), |scope| {
                let n = scope.params()[0];
                if_else(
                    lt(n.load(), int(2)),
                    int(1),
                    mul(n.load(), call(scope.this(), vec![sub(n.load(), int(1))])),
                )
            })?;
            eq(call(&fact, vec![int(5)]), int(120))
        }
        "fib" => {
            let fib = program.define("fib", 1, ReturnKind::Value(TealType::Uint64), |scope| {
                let n = scope.params()[0];
                if_else(
                    lt(n.load(), int(2)),
                    n.load(),
                    add(
                        call(scope.this(), vec![sub(n.load(), int(1))]),
                        call(scope.this(), vec![sub(n.load(), int(2))]),
                    ),
                )
            })?;
            eq(call(&fib, vec![int(10)]), int(55))
        }
        "counter" => seq(vec![
            app_global_put(
                text("count"),
                add(app_global_get(text("count")), int(1)),
            ),
            approve(),
        ]),
        "loop" => {
            let i = program.scratch_var(TealType::Uint64);
            let total = program.scratch_var(TealType::Uint64);
            seq(vec![
                i.store(int(0)),
                total.store(int(0)),
                while_loop(
                    lt(i.load(), txn("Amount", TealType::Uint64)),
                    seq(vec![
                        i.store(add(i.load(), int(1))),
                        total.store(add(total.load(), i.load())),
                    ]),
                ),
                gt(total.load(), int(0)),
            ])
        }
        _ => return Ok(None),
    };
    Ok(Some(main))
}

fn demo_env() -> Env {
    let mut env = Env::default();
    env.txn.insert("Amount".to_string(), StackValue::Uint(10));
    env.txn.insert("Fee".to_string(), StackValue::Uint(1000));
    env
}

fn print_artifact(compiled: &CompiledProgram) {
    match compiled.to_bytes() {
        Ok(bytes) => println!("\n=== ARTIFACT ===\n{} bytes", bytes.len()),
        Err(e) => {
            eprintln!("Serialization error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_compiled(compiled: &CompiledProgram) {
    println!("\n=== RUN ===");
    match vm::run(&compiled.assembly, &demo_env()) {
        Ok(outcome) => {
            println!("{}", if outcome.approved { "approved" } else { "rejected" });
            println!("steps: {}", outcome.steps);
            for effect in &outcome.effects {
                match effect {
                    Effect::Log(bytes) => println!("log: {}", StackValue::Bytes(bytes.clone())),
                    Effect::GlobalPut { key, value } => {
                        println!("global {} = {}", String::from_utf8_lossy(key), value)
                    }
                }
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
