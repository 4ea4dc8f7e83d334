//! Coral: a small dynamically-typed scripting language.
//!
//! The pipeline is lexer → parser → bytecode compiler → stack VM. The
//! helpers here wire the phases together; each phase is usable on its own
//! (the REPL, for instance, drives them separately to keep state between
//! turns).

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod repl;

use bytecode::{Bytecode, Compiler, Value, Vm};
use error::CoralError;

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, CoralError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens)
        .parse()
        .map_err(|mut errors| CoralError::Parser(errors.remove(0)))?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<Bytecode, CoralError> {
    let program = parse(source)?;
    let mut compiler = Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}

/// Run a program and return the value of its final statement.
pub fn run(source: &str) -> Result<Value, CoralError> {
    run_with_disassembly(source, false)
}

/// Run a program, optionally printing its disassembly first.
pub fn run_with_disassembly(source: &str, disassemble: bool) -> Result<Value, CoralError> {
    let bytecode = compile(source)?;

    if disassemble {
        print!("{}", bytecode::disassemble_bytecode(&bytecode));
        println!("---");
    }

    let mut vm = Vm::new(bytecode);
    vm.run()?;
    Ok(vm.last_popped_stack_elem())
}

/// Disassemble source code without executing it.
pub fn disassemble(source: &str) -> Result<String, CoralError> {
    let bytecode = compile(source)?;
    Ok(bytecode::disassemble_bytecode(&bytecode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_end_to_end() {
        assert_eq!(run("1 + 2 * 3").unwrap(), Value::Integer(7));
        assert_eq!(run("let x = 5; let y = x + 10; y").unwrap(), Value::Integer(15));
        assert_eq!(run("if (1 < 2) { 10 } else { 20 }").unwrap(), Value::Integer(10));
        assert_eq!(run("if (1 > 2) { 10 } else { 20 }").unwrap(), Value::Integer(20));
        assert_eq!(run("if (false) { 10 }").unwrap(), Value::Null);
    }

    #[test]
    fn test_run_surfaces_each_phase_error() {
        assert!(matches!(run("\"unterminated"), Err(CoralError::Lexer(_))));
        assert!(matches!(run("let = 5;"), Err(CoralError::Parser(_))));
        assert!(matches!(run("missing"), Err(CoralError::Compile(_))));
        assert!(matches!(run("5 + true"), Err(CoralError::Runtime(_))));
    }

    #[test]
    fn test_disassemble_source() {
        let listing = disassemble("let f = fn() { 1 }; f()").unwrap();
        assert!(listing.contains("== main =="));
        assert!(listing.contains("Closure"));
        assert!(listing.contains("Call 0"));
        assert!(listing.contains("RetVal"));
    }
}
