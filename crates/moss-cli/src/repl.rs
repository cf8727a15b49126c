use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use owo_colors::OwoColorize;

use moss_compiler::{Compiler, SymbolTable};
use moss_interpreter::eval_program;
use moss_lexer::Lexer;
use moss_object::{Environment, Object};
use moss_parser::Parser;
use moss_syntax::error::Error;
use moss_syntax::token::TokenKind;
use moss_vm::{Vm, GLOBALS_SIZE};

#[derive(Clone, Copy)]
pub enum Backend {
    Vm,
    Eval,
}

pub fn start_repl_with_backend(backend: Backend) {
    println!(
        "{}",
        "Moss REPL. Type :help for help, :quit to exit.".bold().green()
    );

    // State shared across submissions: the compiler's symbol table and
    // constants pool, and the VM's globals array. New submissions keep
    // referencing slots assigned by earlier ones.
    let mut symbol_table = SymbolTable::new();
    let mut constants: Vec<Object> = Vec::new();
    let mut globals: Vec<Object> = vec![Object::Null; GLOBALS_SIZE];
    let mut env = Rc::new(RefCell::new(Environment::new()));

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            "moss> ".cyan().to_string()
        } else {
            "  .. ".cyan().to_string()
        };
        print!("{}", prompt);
        let _ = io::stdout().flush();

        let mut line = String::new();
        let n = match io::stdin().read_line(&mut line) {
            Ok(n) => n,
            Err(_) => {
                println!("<input error>");
                break;
            }
        };
        if n == 0 {
            // EOF
            println!("\nGoodbye.");
            break;
        }
        let trimmed = line.trim_end();

        if buffer.is_empty() && trimmed.starts_with(':') {
            match trimmed {
                ":quit" | ":q" | ":exit" => {
                    println!("Goodbye.");
                    break;
                }
                ":help" | ":h" => {
                    println!(
                        "{}\n  {}     {}\n  {}     {}\n  {}  {}\n  {}    {}",
                        "Commands:".bold(),
                        ":help".yellow(),
                        "Show this help",
                        ":quit".yellow(),
                        "Exit the REPL",
                        ":globals".yellow(),
                        "List bindings defined so far",
                        ":reset".yellow(),
                        "Clear all state"
                    );
                    println!("Type code to evaluate. Multi-line input is supported.");
                    continue;
                }
                ":globals" => {
                    match backend {
                        Backend::Vm => print_globals(&symbol_table, &globals),
                        Backend::Eval => print_env(&env),
                    }
                    continue;
                }
                ":reset" => {
                    symbol_table = SymbolTable::new();
                    constants = Vec::new();
                    globals = vec![Object::Null; GLOBALS_SIZE];
                    env = Rc::new(RefCell::new(Environment::new()));
                    println!("{}", "State reset.".yellow());
                    continue;
                }
                _ => {
                    println!("{}", "Unknown command. Type :help.".red());
                    continue;
                }
            }
        }

        buffer.push_str(&line);

        if !is_complete(&buffer) {
            continue;
        }

        let mut lexer = Lexer::new(&buffer);
        match lexer.tokenize() {
            Ok(tokens) => {
                let mut parser = Parser::new(tokens);
                match parser.parse_program() {
                    Ok(program) => match backend {
                        Backend::Vm => {
                            run_vm_submission(
                                &buffer,
                                &program,
                                &mut symbol_table,
                                &mut constants,
                                &mut globals,
                            );
                        }
                        Backend::Eval => {
                            let result = eval_program(&program, &env);
                            if let Object::Error(_) = result {
                                eprintln!("{}", result.inspect().red());
                            } else {
                                println!("{}", result.inspect().bright_blue());
                            }
                        }
                    },
                    Err(errors) => {
                        for err in &errors {
                            render_error("Parse error", &buffer, err);
                        }
                    }
                }
            }
            Err(e) => render_error("Lex error", &buffer, &e),
        }

        buffer.clear();
    }
}

fn run_vm_submission(
    source: &str,
    program: &moss_syntax::ast::Program,
    symbol_table: &mut SymbolTable,
    constants: &mut Vec<Object>,
    globals: &mut Vec<Object>,
) {
    let mut compiler = Compiler::new_with_state(
        std::mem::take(symbol_table),
        std::mem::take(constants),
    );
    let compiled = compiler.compile(program);
    let bytecode = compiler.bytecode();
    let (table, pool) = compiler.into_state();
    *symbol_table = table;
    *constants = pool;

    if let Err(e) = compiled {
        render_error("Compile error", source, &e);
        return;
    }

    let mut vm = Vm::new_with_globals_store(bytecode, std::mem::take(globals));
    match vm.run() {
        Ok(()) => println!("{}", vm.last_popped_stack_elem().inspect().bright_blue()),
        Err(e) => render_error("Runtime error", source, &e),
    }
    *globals = vm.into_globals();
}

fn print_globals(symbol_table: &SymbolTable, globals: &[Object]) {
    let symbols = symbol_table.snapshot();
    if symbols.is_empty() {
        println!("{}", "<no globals>".dimmed());
        return;
    }
    for symbol in symbols {
        println!(
            "{} = {}",
            symbol.name.yellow(),
            globals[symbol.index].inspect().bright_blue()
        );
    }
}

fn print_env(env: &Rc<RefCell<Environment>>) {
    let vars = env.borrow().snapshot();
    if vars.is_empty() {
        println!("{}", "<no globals>".dimmed());
        return;
    }
    for (name, value) in vars {
        println!("{} = {}", name.yellow(), value.inspect().bright_blue());
    }
}

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

/// A submission is complete when its delimiters balance; until then
/// keep reading lines. Inputs the lexer rejects are handed to the
/// pipeline immediately so the error is reported.
fn is_complete(input: &str) -> bool {
    let mut lexer = Lexer::new(input);
    let tokens = match lexer.tokenize() {
        Ok(t) => t,
        Err(_) => return true,
    };
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    for tk in tokens.iter() {
        match &tk.kind {
            TokenKind::LParen => paren += 1,
            TokenKind::RParen => paren -= 1,
            TokenKind::LBrace => brace += 1,
            TokenKind::RBrace => brace -= 1,
            TokenKind::LBracket => bracket += 1,
            TokenKind::RBracket => bracket -= 1,
            _ => {}
        }
    }
    paren <= 0 && brace <= 0 && bracket <= 0
}
