mod call_frame;
mod chunk;
mod compiler;
mod constants;
mod debug;
mod gc;
mod objects;
mod scanner;
mod std_mod;
mod table;
mod util;
mod value;
mod vm;

use std::io::{BufRead, Write};
use std::process::exit;
use vm::{InterpretResult, VM};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    match args.len() {
        1 => repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: mocha [path]");
            exit(64);
        }
    }
}

fn repl() {
    let mut vm = VM::new();
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        std::io::stdout().flush().expect("Failed to flush stdout");

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                vm.interpret(&line);
            }
            Err(error) => {
                eprintln!("Could not read input: {}", error);
                break;
            }
        }
    }
}

fn run_file(path: &str) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(_) => {
            eprintln!("Could not open file \"{}\".", path);
            exit(74);
        }
    };

    let mut vm = VM::new();
    match vm.interpret(&source) {
        InterpretResult::InterpretOk => {}
        InterpretResult::InterpretCompileError => exit(65),
        InterpretResult::InterpretRuntimeError => exit(70),
    }
}
