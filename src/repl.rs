//! Interactive REPL with state carried across turns.
//!
//! The symbol table, constant pool and global slots survive from one line
//! to the next, so bindings made in an earlier turn stay visible. Errors
//! are turn-local: the loop reports them and keeps reading.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::bytecode::builtins::BUILTINS;
use crate::bytecode::vm::{new_globals, Globals, Vm};
use crate::bytecode::{Compiler, SymbolTable, Value};
use crate::lexer::Scanner;
use crate::parser::Parser;

const PROMPT: &str = "=> ";
const HISTORY_FILE: &str = ".coral_history";

pub struct Repl {
    symbol_table: Rc<RefCell<SymbolTable>>,
    constants: Vec<Value>,
    globals: Globals,
    history_file: PathBuf,
}

impl Repl {
    pub fn new() -> Self {
        let mut table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            table.define_builtin(index, builtin.name);
        }

        Self {
            symbol_table: Rc::new(RefCell::new(table)),
            constants: Vec::new(),
            globals: new_globals(),
            history_file: Self::history_path(),
        }
    }

    fn history_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(HISTORY_FILE),
            None => PathBuf::from(HISTORY_FILE),
        }
    }

    pub fn run(&mut self) {
        println!("Coral {}", env!("CARGO_PKG_VERSION"));

        let mut rl = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(err) => {
                eprintln!("Failed to start line editor: {}", err);
                return;
            }
        };
        let _ = rl.load_history(&self.history_file);

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(&line);
                    self.eval_line(&line);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Input error: {}", err);
                    break;
                }
            }
        }

        let _ = rl.save_history(&self.history_file);
    }

    /// Evaluate one line and print its value, keeping compiler and VM
    /// state for the next turn.
    fn eval_line(&mut self, line: &str) {
        let tokens = match Scanner::new(line).scan_tokens() {
            Ok(tokens) => tokens,
            Err(err) => {
                eprintln!("{}", err.to_string().red());
                return;
            }
        };

        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(errors) => {
                for err in errors {
                    eprintln!("{}", err.to_string().red());
                }
                return;
            }
        };

        let mut compiler =
            Compiler::new_with_state(self.symbol_table.clone(), std::mem::take(&mut self.constants));
        let compiled = compiler.compile(&program);

        // Keep whatever the pool grew to, even on a failed turn, so
        // constant indices never go backwards.
        let bytecode = compiler.bytecode();
        self.constants = bytecode.constants.clone();

        if let Err(err) = compiled {
            eprintln!("{}", format!("Compilation failed: {}", err).red());
            return;
        }

        let mut vm = Vm::new_with_globals(bytecode, self.globals.clone());
        if let Err(err) = vm.run() {
            eprintln!("{}", format!("Bytecode failed to execute: {}", err).red());
            return;
        }

        println!("{}", vm.last_popped_stack_elem());
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}
