//! Interactive REPL.
//!
//! One symbol table and one global store live across the whole session, so
//! bindings from earlier lines stay resolvable and their values stay
//! addressable. Each line is lexed, parsed, compiled, obfuscated, and run
//! on a fresh VM that borrows the shared globals; the line's last popped
//! value is printed back.

use std::io::{BufRead, Write};

use anyhow::Result;
use zeta_core::builtins;
use zeta_core::codec;
use zeta_core::compiler::Compiler;
use zeta_core::object::Object;
use zeta_core::parser::Parser;
use zeta_core::symbol::SymbolTable;
use zeta_core::vm::{Vm, GLOBAL_SIZE};

const PROMPT: &str = ">> ";

const BANNER: &str = r"
==========================================
 ______ _____ _____  _
|___  /|  ___|_   _|/ \
   / / | |__   | | / _ \
  / /  |  __|  | |/ ___ \
 / /___| |___  | / /   \ \
|_____/|_____| |_|_|   |_|
==========================================
";

pub fn start() -> Result<()> {
    welcome();

    let mut symbol_table = SymbolTable::new();
    for (index, builtin) in builtins::REGISTRY.iter().enumerate() {
        symbol_table.define_builtin(index, builtin.name);
    }
    let mut globals = vec![Object::Null; GLOBAL_SIZE];

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("\n\n{}", PROMPT);
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            goodbye();
            return Ok(());
        };
        let line = line?;

        if line.is_empty() {
            continue;
        }
        if line == "clear" || line == "cls" {
            print!("\x1b[2J\x1b[H");
            continue;
        }
        if line == "exit" {
            goodbye();
            return Ok(());
        }

        let mut parser = Parser::from_source(&line);
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            eprint!(
                "{}",
                zeta_core::errors::ZetaError::Parse(parser.errors().to_vec()).report()
            );
            continue;
        }

        // Constants are per-line; the symbol table carries over.
        let mut compiler = Compiler::with_state(symbol_table, Vec::new());
        let compile_result = compiler.compile(&program);
        let bytecode = compiler.bytecode();
        symbol_table = unwind_to_global(compiler.into_symbol_table());

        if let Err(message) = compile_result {
            eprint!("{}", zeta_core::errors::ZetaError::Compile(message).report());
            continue;
        }

        let obfuscated = codec::encrypt_bytecode(bytecode);
        let mut vm = Vm::with_global_store(obfuscated, globals);
        let run_result = vm.run();
        let last = vm.last_popped();
        globals = vm.into_globals();

        match run_result {
            Ok(()) => println!("{}", last.inspect()),
            Err(message) => {
                eprint!("{}", zeta_core::errors::ZetaError::Machine(message).report())
            }
        }
    }
}

/// A failed compile can leave the table inside a function scope; pop back
/// out so the next line starts at the global scope.
fn unwind_to_global(mut table: SymbolTable) -> SymbolTable {
    while !table.is_global() {
        match table.into_outer() {
            Some(outer) => table = outer,
            None => return SymbolTable::new(),
        }
    }
    table
}

fn welcome() {
    print!("{}", BANNER);
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "there".to_string());
    println!("Hello {}! Let's investigate with zeta", user);
    print!("Please get started by using this REPL");
}

fn goodbye() {
    println!("\n");
    println!("---- Leaving for a byte? I'll see you later! ----");
    println!("\n");
}
