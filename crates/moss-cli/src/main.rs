mod repl;

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use owo_colors::OwoColorize;

use moss_compiler::Compiler;
use moss_interpreter::eval_program;
use moss_lexer::Lexer;
use moss_object::{Environment, Object};
use moss_parser::Parser;
use moss_syntax::error::Error;
use moss_vm::Vm;

fn render_error(kind: &str, source: &str, err: &Error) {
    eprintln!("{}: {}", kind.red().bold(), err.msg.red());
    if let (Some(line), Some(col)) = (err.line, err.col) {
        if let Some(src_line) = source.lines().nth(line - 1) {
            eprintln!("  {}", src_line.bright_black());
            let mut marker = String::new();
            if col > 1 {
                marker.push_str(&" ".repeat(col - 1));
            }
            marker.push('^');
            eprintln!("  {}", marker.red());
        } else {
            eprintln!("  at {}:{}", line, col);
        }
    }
}

fn parse_backend(args: &[String]) -> String {
    // default backend is the VM; allow --backend eval or MOSS_BACKEND=eval
    if let Ok(b) = std::env::var("MOSS_BACKEND") {
        return b;
    }
    let mut i = 1usize;
    while i + 1 < args.len() {
        if args[i] == "--backend" || args[i] == "-b" {
            return args[i + 1].clone();
        }
        i += 1;
    }
    "vm".to_string()
}

fn parse_path(args: &[String]) -> Option<&str> {
    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--backend" | "-b" => {
                i += 2;
            }
            s if s.starts_with('-') => {
                i += 1;
            }
            _ => {
                return Some(args[i].as_str());
            }
        }
    }
    None
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let backend = parse_backend(&args);
    let mode = if backend == "eval" {
        repl::Backend::Eval
    } else {
        repl::Backend::Vm
    };

    let path = match parse_path(&args) {
        Some(p) => p,
        None => {
            repl::start_repl_with_backend(mode);
            return;
        }
    };

    if !Path::new(path).exists() {
        eprintln!(
            "{}: {}",
            "error".red().bold(),
            format!("File not found: {}", path).red()
        );
        std::process::exit(1);
    }
    let src = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!(
                "{}: {}",
                "error".red().bold(),
                format!("Failed to read {}: {}", path, e).red()
            );
            std::process::exit(1);
        }
    };

    let mut lexer = Lexer::new(&src);
    let tokens = match lexer.tokenize() {
        Ok(t) => t,
        Err(e) => {
            render_error("Lex error", &src, &e);
            std::process::exit(1);
        }
    };

    let mut parser = Parser::new(tokens);
    let program = match parser.parse_program() {
        Ok(p) => p,
        Err(errors) => {
            for err in &errors {
                eprint!("\t{}\t", err);
            }
            eprintln!();
            std::process::exit(1);
        }
    };

    if backend == "eval" {
        let env = Rc::new(RefCell::new(Environment::new()));
        let result = eval_program(&program, &env);
        if let Object::Error(_) = result {
            eprintln!("{}", result.inspect().red());
            std::process::exit(1);
        }
        println!("{}", result.inspect());
    } else {
        let mut compiler = Compiler::new();
        if let Err(e) = compiler.compile(&program) {
            render_error("Compile error", &src, &e);
            std::process::exit(1);
        }
        let mut vm = Vm::new(compiler.bytecode());
        if let Err(e) = vm.run() {
            render_error("Runtime error", &src, &e);
            std::process::exit(1);
        }
        println!("{}", vm.last_popped_stack_elem().inspect());
    }
}
