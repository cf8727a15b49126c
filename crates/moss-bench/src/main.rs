//! Backend comparison harness: times the tree-walking evaluator
//! against the compile-and-run pipeline over the scripts in
//! `benchmark/`.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use clap::{ArgAction, Parser};
use serde::Serialize;

use moss_compiler::Compiler;
use moss_interpreter::eval_program;
use moss_lexer::Lexer;
use moss_object::Environment;
use moss_parser::Parser as MossParser;
use moss_syntax::ast::Program;
use moss_vm::Vm;

#[derive(Parser, Debug)]
#[command(name = "moss-bench", about = "Run Moss backend benchmarks")]
struct Cli {
    /// Specific test(s) to run by name (e.g. arith). If omitted, runs
    /// all discovered scripts.
    #[arg(short = 't', long = "test", action = ArgAction::Append)]
    tests: Vec<String>,

    /// Iterations per test (measured)
    #[arg(short = 'n', long = "iterations", default_value_t = 10)]
    iterations: u32,

    /// Warmup iterations (not measured)
    #[arg(short = 'w', long = "warmup", default_value_t = 2)]
    warmup: u32,

    /// Output JSON file path
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Directory to discover scripts in
    #[arg(long = "dir", default_value = "benchmark")]
    dir: PathBuf,

    /// List discovered tests and exit
    #[arg(long = "list", default_value_t = false)]
    list: bool,
}

#[derive(Debug, Serialize)]
struct BenchResult {
    name: String,
    iterations: u32,
    avg_parse_ms: f64,
    avg_eval_ms: f64,
    avg_vm_ms: f64,
}

#[derive(Debug, Serialize)]
struct Report {
    moss_version: String,
    iterations: u32,
    warmup: u32,
    results: Vec<BenchResult>,
}

fn discover(dir: &Path) -> Vec<PathBuf> {
    let mut scripts: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "moss"))
                .collect()
        })
        .unwrap_or_default();
    scripts.sort();
    scripts
}

fn script_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn parse_source(source: &str) -> Result<Program, String> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize().map_err(|e| format!("lex error: {}", e))?;
    let mut parser = MossParser::new(tokens);
    parser
        .parse_program()
        .map_err(|errors| format!("parse error: {}", errors[0]))
}

fn time_backends(source: &str) -> Result<(f64, f64, f64), String> {
    let parse_start = Instant::now();
    let program = parse_source(source)?;
    let parse_ms = parse_start.elapsed().as_secs_f64() * 1000.0;

    let eval_start = Instant::now();
    let env = Rc::new(RefCell::new(Environment::new()));
    let result = eval_program(&program, &env);
    if let moss_object::Object::Error(msg) = result {
        return Err(format!("eval error: {}", msg));
    }
    let eval_ms = eval_start.elapsed().as_secs_f64() * 1000.0;

    let vm_start = Instant::now();
    let mut compiler = Compiler::new();
    compiler
        .compile(&program)
        .map_err(|e| format!("compile error: {}", e))?;
    let mut vm = Vm::new(compiler.bytecode());
    vm.run().map_err(|e| format!("vm error: {}", e))?;
    let vm_ms = vm_start.elapsed().as_secs_f64() * 1000.0;

    Ok((parse_ms, eval_ms, vm_ms))
}

fn bench_script(path: &Path, iterations: u32, warmup: u32) -> Result<BenchResult, String> {
    let source =
        fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for _ in 0..warmup {
        time_backends(&source)?;
    }

    let mut parse_total = 0.0;
    let mut eval_total = 0.0;
    let mut vm_total = 0.0;
    for _ in 0..iterations {
        let (parse_ms, eval_ms, vm_ms) = time_backends(&source)?;
        parse_total += parse_ms;
        eval_total += eval_ms;
        vm_total += vm_ms;
    }

    let n = f64::from(iterations.max(1));
    Ok(BenchResult {
        name: script_name(path),
        iterations,
        avg_parse_ms: parse_total / n,
        avg_eval_ms: eval_total / n,
        avg_vm_ms: vm_total / n,
    })
}

fn main() {
    let cli = Cli::parse();

    // Keep `puts` quiet during timing runs.
    std::env::set_var("MOSS_BENCH_SILENT", "1");

    let mut scripts = discover(&cli.dir);
    if !cli.tests.is_empty() {
        scripts.retain(|p| cli.tests.iter().any(|t| *t == script_name(p)));
    }
    if scripts.is_empty() {
        eprintln!("no benchmark scripts found in {}", cli.dir.display());
        std::process::exit(1);
    }

    if cli.list {
        for path in &scripts {
            println!("{}", script_name(path));
        }
        return;
    }

    let mut results = Vec::new();
    for path in &scripts {
        match bench_script(path, cli.iterations, cli.warmup) {
            Ok(result) => {
                println!(
                    "{:<16} parse {:>8.3} ms   eval {:>8.3} ms   vm {:>8.3} ms",
                    result.name, result.avg_parse_ms, result.avg_eval_ms, result.avg_vm_ms
                );
                results.push(result);
            }
            Err(e) => {
                eprintln!("{}: {}", script_name(path), e);
                std::process::exit(1);
            }
        }
    }

    if let Some(output) = &cli.output {
        let report = Report {
            moss_version: env!("CARGO_PKG_VERSION").to_string(),
            iterations: cli.iterations,
            warmup: cli.warmup,
            results,
        };
        let json = match serde_json::to_string_pretty(&report) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("failed to serialize report: {}", e);
                std::process::exit(1);
            }
        };
        if let Err(e) = fs::write(output, json) {
            eprintln!("failed to write {}: {}", output.display(), e);
            std::process::exit(1);
        }
        println!("wrote {}", output.display());
    }
}
