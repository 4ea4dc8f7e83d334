//! Bytecode compiler: lowers the AST to a linear instruction stream.
//!
//! Instructions are emitted into per-scope buffers so function bodies
//! compile independently of their enclosing code; jumps are emitted with a
//! placeholder operand and back-patched once the target offset is known.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Block, Expr, Program, Stmt};
use crate::bytecode::builtins::BUILTINS;
use crate::bytecode::instruction::{make, OpCode};
use crate::bytecode::symbols::{Symbol, SymbolScope, SymbolTable};
use crate::bytecode::value::{CompiledFunction, Value};
use crate::error::CompileError;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Maximum number of entries in the constant pool (16-bit indices).
const MAX_CONSTANTS: usize = 65536;

/// Operand emitted for jumps whose target is back-patched later. Any value
/// fits; this one is easy to spot in a hexdump if a patch is ever missed.
const PLACEHOLDER_JUMP: usize = 9999;

/// The compiled module: main instruction stream plus constant pool,
/// immutable once produced.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constants: Vec<Value>,
}

/// Metadata about an already-emitted instruction, kept per scope for the
/// trailing-Pop peepholes.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// One compilation scope: the instruction buffer of the function currently
/// being compiled, plus its last two emitted instructions.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Vec<u8>,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: Rc<RefCell<SymbolTable>>,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    /// Create a compiler with a fresh global scope. The symbol table is
    /// pre-populated with the builtin registry.
    pub fn new() -> Self {
        let mut table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            table.define_builtin(index, builtin.name);
        }

        Self {
            constants: Vec::new(),
            symbol_table: Rc::new(RefCell::new(table)),
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Create a compiler that continues from an earlier one's symbol table
    /// and constant pool, for REPL continuity.
    pub fn new_with_state(symbol_table: Rc<RefCell<SymbolTable>>, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Compile a whole program. The first error aborts compilation.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// The global symbol table, for carrying into a later compiler via
    /// `new_with_state`.
    pub fn symbol_table(&self) -> Rc<RefCell<SymbolTable>> {
        self.symbol_table.clone()
    }

    /// The compiled module produced so far.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_scope().instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expression(value) => {
                self.compile_expression(value)?;
                self.emit(OpCode::Pop, &[]);
            }

            Stmt::Let { name, value } => {
                // The name is bound before its value compiles so a
                // function literal on the right-hand side can refer to
                // itself.
                let symbol = self.symbol_table.borrow_mut().define(name);
                self.compile_expression(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(OpCode::SetGbl, &[symbol.index]),
                    _ => self.emit(OpCode::SetLcl, &[symbol.index]),
                };
            }

            Stmt::Return(value) => {
                self.compile_expression(value)?;
                self.emit(OpCode::RetVal, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        for stmt in block {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Integer(value) => {
                let index = self.add_constant(Value::Integer(*value))?;
                self.emit(OpCode::Const, &[index]);
            }

            Expr::String(value) => {
                let index = self.add_constant(Value::String(Rc::new(value.clone())))?;
                self.emit(OpCode::Const, &[index]);
            }

            Expr::Boolean(value) => {
                if *value {
                    self.emit(OpCode::True, &[]);
                } else {
                    self.emit(OpCode::False, &[]);
                }
            }

            Expr::Identifier(name) => {
                let resolved = self.symbol_table.borrow_mut().resolve(name);
                let symbol =
                    resolved.ok_or_else(|| CompileError::UnresolvedSymbol(name.clone()))?;
                self.load_symbol(&symbol);
            }

            Expr::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(OpCode::Bang, &[]),
                    "-" => self.emit(OpCode::Neg, &[]),
                    _ => return Err(CompileError::UnknownOperator(operator.clone())),
                };
            }

            Expr::Infix {
                left,
                operator,
                right,
            } => {
                // `<` is lowered as `>` with swapped operands so the VM
                // only implements one ordering comparison.
                if operator == "<" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(OpCode::Gt, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator.as_str() {
                    "+" => self.emit(OpCode::Add, &[]),
                    "-" => self.emit(OpCode::Sub, &[]),
                    "*" => self.emit(OpCode::Mul, &[]),
                    "/" => self.emit(OpCode::Div, &[]),
                    ">" => self.emit(OpCode::Gt, &[]),
                    "==" => self.emit(OpCode::Eq, &[]),
                    "!=" => self.emit(OpCode::Ne, &[]),
                    _ => return Err(CompileError::UnknownOperator(operator.clone())),
                };
            }

            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;
                let jump_not_truthy = self.emit(OpCode::JmpNt, &[PLACEHOLDER_JUMP]);

                self.compile_block(consequence)?;
                // The branch is an expression: keep its value on the stack.
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }

                let jump = self.emit(OpCode::Jmp, &[PLACEHOLDER_JUMP]);
                let after_consequence = self.current_scope().instructions.len();
                self.change_operand(jump_not_truthy, after_consequence);

                match alternative {
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(OpCode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_scope().instructions.len();
                self.change_operand(jump, after_alternative);
            }

            Expr::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
            }

            Expr::Dict(pairs) => {
                // Keys are emitted in display order so the instruction
                // stream is deterministic regardless of source ordering.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::Dict, &[pairs.len() * 2]);
            }

            Expr::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Idx, &[]);
            }

            Expr::Function { parameters, body } => {
                self.enter_scope();

                for parameter in parameters {
                    self.symbol_table.borrow_mut().define(parameter);
                }

                self.compile_block(body)?;

                // Implicit return: the body's final expression value is
                // the return value; an empty body returns null.
                if self.last_instruction_is(OpCode::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(OpCode::RetVal) {
                    self.emit(OpCode::Ret, &[]);
                }

                let (free_symbols, num_locals) = {
                    let table = self.symbol_table.borrow();
                    (table.free_symbols.clone(), table.num_definitions)
                };
                let instructions = self.leave_scope();

                // Load every captured variable in the enclosing scope so
                // the Closure instruction can pick them off the stack.
                for free in &free_symbols {
                    self.load_symbol(free);
                }

                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                };
                let index = self.add_constant(Value::CompiledFunction(Rc::new(function)))?;
                self.emit(OpCode::Closure, &[index, free_symbols.len()]);
            }

            Expr::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGbl, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLcl, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBIn, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
        };
    }

    /// Append a value to the constant pool and return its index.
    fn add_constant(&mut self, value: Value) -> CompileResult<usize> {
        if self.constants.len() >= MAX_CONSTANTS {
            return Err(CompileError::ConstantPoolOverflow);
        }
        self.constants.push(value);
        Ok(self.constants.len() - 1)
    }

    /// Encode and append one instruction; returns its starting position.
    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.current_scope().instructions.len();
        self.current_scope_mut().instructions.extend(instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn set_last_instruction(&mut self, opcode: OpCode, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        matches!(
            self.current_scope().last_instruction,
            Some(last) if last.opcode == op
        )
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
            scope.previous_instruction = None;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let position = match self.current_scope().last_instruction {
            Some(last) => last.position,
            None => return,
        };

        let return_instruction = make(OpCode::RetVal, &[]);
        self.replace_instruction(position, &return_instruction);
        if let Some(last) = self.current_scope_mut().last_instruction.as_mut() {
            last.opcode = OpCode::RetVal;
        }
    }

    /// Overwrite the instruction at `position` in place. The replacement
    /// must have the same width as the original.
    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let instructions = &mut self.current_scope_mut().instructions;
        instructions[position..position + new_instruction.len()].copy_from_slice(new_instruction);
    }

    /// Back-patch the operand of the jump emitted at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = OpCode::from_u8(self.current_scope().instructions[position])
            .expect("patching an instruction that was emitted earlier");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(position, &new_instruction);
    }

    /// Open a fresh instruction buffer and an enclosed symbol table for a
    /// function body.
    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let enclosed = SymbolTable::new_enclosed(self.symbol_table.clone());
        self.symbol_table = Rc::new(RefCell::new(enclosed));
    }

    /// Close the innermost scope, restoring the enclosing symbol table and
    /// returning the scope's instructions.
    fn leave_scope(&mut self) -> Vec<u8> {
        let scope = self.scopes.pop().expect("scope stack is never empty");
        let outer = self
            .symbol_table
            .borrow()
            .outer()
            .expect("every entered scope has an enclosing symbol table");
        self.symbol_table = outer;
        scope.instructions
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("scope stack is never empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
