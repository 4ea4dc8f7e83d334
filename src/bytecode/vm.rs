//! Stack-based virtual machine executing compiled bytecode.
//!
//! Execution walks a frame stack: every function invocation pushes a
//! `Frame` carrying its closure, instruction pointer and base pointer into
//! the shared operand stack. Local slot `i` of a frame lives at
//! `stack[base_pointer + i]`, overlaying the arguments the caller pushed.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bytecode::builtins::{BuiltinDef, BUILTINS};
use crate::bytecode::compiler::Bytecode;
use crate::bytecode::instruction::{read_u16, OpCode};
use crate::bytecode::value::{Closure, CompiledFunction, DictPairs, Value};
use crate::error::RuntimeError;

/// Maximum operand stack depth.
pub const STACK_SIZE: usize = 2048;
/// Number of global variable slots.
pub const GLOBALS_SIZE: usize = 65536;
/// Maximum call depth.
pub const MAX_FRAMES: usize = 2048;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// Host-owned global slots, shareable across REPL turns.
pub type Globals = Rc<RefCell<Vec<Value>>>;

/// A call frame representing one function invocation.
#[derive(Debug)]
struct Frame {
    closure: Rc<Closure>,
    /// Instruction pointer. Starts at -1; the fetch loop pre-increments.
    ip: isize,
    /// Stack index where this frame's local slots begin.
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    fn instructions(&self) -> &[u8] {
        &self.closure.function.instructions
    }
}

/// The bytecode virtual machine.
pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Stack pointer: always the next free slot. `stack[sp - 1]` is the top.
    sp: usize,
    globals: Globals,
    frames: Vec<Frame>,
}

impl Vm {
    /// Create a VM for a compiled module with fresh global slots.
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals(bytecode, new_globals())
    }

    /// Create a VM that reads and writes a caller-owned globals array, for
    /// REPL continuity.
    pub fn new_with_globals(bytecode: Bytecode, globals: Globals) -> Self {
        let main_function = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            function: main_function,
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Execute the loaded module to completion or to the first error.
    pub fn run(&mut self) -> VmResult<()> {
        while self.current_frame().ip + 1 < self.current_frame().instructions().len() as isize {
            let ip = {
                let frame = self.current_frame_mut();
                frame.ip += 1;
                frame.ip as usize
            };

            let byte = self.current_frame().instructions()[ip];
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::UndefinedOpcode(byte))?;

            match op {
                OpCode::Const => {
                    let index = self.read_u16_operand();
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }

                OpCode::Pop => {
                    self.pop();
                }

                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }

                OpCode::True => self.push(Value::Boolean(true))?,
                OpCode::False => self.push(Value::Boolean(false))?,
                OpCode::Null => self.push(Value::Null)?,

                OpCode::Eq | OpCode::Ne | OpCode::Gt => {
                    self.execute_comparison(op)?;
                }

                OpCode::Neg => {
                    let operand = self.pop();
                    match operand {
                        Value::Integer(n) => self.push(Value::Integer(n.wrapping_neg()))?,
                        other => {
                            return Err(RuntimeError::IllegalNegation(other.type_name()));
                        }
                    }
                }

                OpCode::Bang => self.execute_bang_operator()?,

                OpCode::Jmp => {
                    let position = self.read_u16_operand();
                    // -1 because the loop pre-increments.
                    self.current_frame_mut().ip = position as isize - 1;
                }

                OpCode::JmpNt => {
                    let position = self.read_u16_operand();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = position as isize - 1;
                    }
                }

                OpCode::SetGbl => {
                    let index = self.read_u16_operand();
                    let value = self.pop();
                    self.globals.borrow_mut()[index] = value;
                }

                OpCode::GetGbl => {
                    let index = self.read_u16_operand();
                    let value = self.globals.borrow()[index].clone();
                    self.push(value)?;
                }

                OpCode::SetLcl => {
                    let index = self.read_u8_operand();
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base_pointer + index] = value;
                }

                OpCode::GetLcl => {
                    let index = self.read_u8_operand();
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + index].clone();
                    self.push(value)?;
                }

                OpCode::GetBIn => {
                    let index = self.read_u8_operand();
                    self.push(Value::Builtin(&BUILTINS[index]))?;
                }

                OpCode::GetFree => {
                    let index = self.read_u8_operand();
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }

                OpCode::Array => {
                    let count = self.read_u16_operand();
                    let array = self.build_array(self.sp - count, self.sp);
                    self.sp -= count;
                    self.push(array)?;
                }

                OpCode::Dict => {
                    let count = self.read_u16_operand();
                    let dict = self.build_dict(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(dict)?;
                }

                OpCode::Idx => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }

                OpCode::Call => {
                    let num_args = self.read_u8_operand();
                    self.execute_call(num_args)?;
                }

                OpCode::RetVal => {
                    let return_value = self.pop();
                    if self.return_from_frame(return_value)? {
                        return Ok(());
                    }
                }

                OpCode::Ret => {
                    if self.return_from_frame(Value::Null)? {
                        return Ok(());
                    }
                }

                OpCode::Closure => {
                    let const_index = self.read_u16_operand();
                    let num_free = self.read_u8_operand();
                    self.push_closure(const_index, num_free)?;
                }
            }
        }

        Ok(())
    }

    /// The value most recently popped off the stack, valid immediately
    /// after a `Pop`. The REPL prints this after each turn.
    pub fn last_popped_stack_elem(&self) -> Value {
        self.stack[self.sp].clone()
    }

    fn execute_binary_operation(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                self.execute_binary_integer_operation(op, *l, *r)
            }
            (Value::String(l), Value::String(r)) => {
                if op != OpCode::Add {
                    return Err(RuntimeError::UnknownStringOperator(op as u8));
                }
                self.push(Value::String(Rc::new(format!("{}{}", l, r))))
            }
            _ => Err(RuntimeError::UnsupportedBinaryTypes(
                left.type_name(),
                right.type_name(),
            )),
        }
    }

    fn execute_binary_integer_operation(&mut self, op: OpCode, left: i64, right: i64) -> VmResult<()> {
        let result = match op {
            OpCode::Add => left.wrapping_add(right),
            OpCode::Sub => left.wrapping_sub(right),
            OpCode::Mul => left.wrapping_mul(right),
            OpCode::Div => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                left.wrapping_div(right)
            }
            _ => return Err(RuntimeError::UnknownIntegerOperator(op as u8)),
        };
        self.push(Value::Integer(result))
    }

    fn execute_comparison(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        if let (Value::Integer(l), Value::Integer(r)) = (&left, &right) {
            let result = match op {
                OpCode::Eq => l == r,
                OpCode::Ne => l != r,
                OpCode::Gt => l > r,
                _ => return Err(RuntimeError::UnknownOperator(op as u8)),
            };
            return self.push(Value::Boolean(result));
        }

        match op {
            OpCode::Eq => {
                let result = left == right;
                self.push(Value::Boolean(result))
            }
            OpCode::Ne => {
                let result = left != right;
                self.push(Value::Boolean(result))
            }
            _ => Err(RuntimeError::UnknownOperator(op as u8)),
        }
    }

    fn execute_bang_operator(&mut self) -> VmResult<()> {
        let operand = self.pop();
        let result = match operand {
            Value::Integer(n) => n == 0,
            Value::Boolean(b) => !b,
            Value::Null => true,
            other => return Err(RuntimeError::IllegalBang(other.type_name())),
        };
        self.push(Value::Boolean(result))
    }

    fn build_array(&self, start: usize, end: usize) -> Value {
        Value::Array(Rc::new(self.stack[start..end].to_vec()))
    }

    fn build_dict(&self, start: usize, end: usize) -> VmResult<Value> {
        let mut pairs = DictPairs::with_capacity((end - start) / 2);

        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let hash = key
                .hash_key()
                .ok_or_else(|| RuntimeError::UnhashableKey(key.type_name()))?;
            pairs.insert(hash, (key, value));

            i += 2;
        }

        Ok(Value::Dict(Rc::new(pairs)))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> VmResult<()> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                let element = if *i < 0 || *i as usize >= elements.len() {
                    Value::Null
                } else {
                    elements[*i as usize].clone()
                };
                self.push(element)
            }
            (Value::Dict(pairs), _) => {
                let key = index
                    .hash_key()
                    .ok_or_else(|| RuntimeError::UnhashableKey(index.type_name()))?;
                let value = pairs
                    .get(&key)
                    .map(|(_, value)| value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(RuntimeError::IndexUnavailable(left.type_name())),
        }
    }

    /// Unwind one frame, dropping the callee's locals and the callee
    /// itself, and push the return value. Returns true when the returning
    /// frame was the main frame, which ends the program with that value as
    /// the last popped element.
    fn return_from_frame(&mut self, return_value: Value) -> VmResult<bool> {
        let frame = self.pop_frame();
        if self.frames.is_empty() {
            self.sp = frame.base_pointer;
            self.stack[self.sp] = return_value;
            return Ok(true);
        }

        self.sp = frame.base_pointer - 1;
        self.push(return_value)?;
        Ok(false)
    }

    fn execute_call(&mut self, num_args: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(RuntimeError::NotAFunction),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> VmResult<()> {
        let function = &closure.function;
        if num_args != function.num_parameters {
            return Err(RuntimeError::WrongArity {
                want: function.num_parameters,
                got: num_args,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::StackOverflow);
        }

        // Arguments already sit where the first locals belong; reserve the
        // rest of the local slots above them.
        let base_pointer = self.sp - num_args;
        let next_sp = base_pointer + function.num_locals;
        if next_sp > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.frames.push(Frame::new(closure.clone(), base_pointer));
        self.sp = next_sp;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: &'static BuiltinDef, num_args: usize) -> VmResult<()> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (builtin.func)(args);

        // Drop the arguments and the builtin itself.
        self.sp = self.sp - num_args - 1;
        self.push(result.unwrap_or(Value::Null))
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> VmResult<()> {
        let constant = self.constants[const_index].clone();
        let Value::CompiledFunction(function) = constant else {
            return Err(RuntimeError::NotAFunction);
        };

        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top of the stack. The slot is left intact so
    /// `last_popped_stack_elem` can read it. An `if` arm that only binds
    /// (`if (c) { let a = 1; }`) yields no value for the statement-level
    /// Pop, so an empty stack pops as null instead of underflowing.
    fn pop(&mut self) -> Value {
        if self.sp == 0 {
            return Value::Null;
        }
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    /// Read the u16 operand following the current opcode and advance past it.
    fn read_u16_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let operand = read_u16(&frame.closure.function.instructions[ip + 1..]) as usize;
        frame.ip += 2;
        operand
    }

    /// Read the u8 operand following the current opcode and advance past it.
    fn read_u8_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let operand = frame.closure.function.instructions[ip + 1] as usize;
        frame.ip += 1;
        operand
    }

    fn current_frame(&self) -> &Frame {
        // The main frame is installed at construction and never popped.
        self.frames.last().expect("frame stack is never empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("frame stack is never empty")
    }
}

/// Allocate a fresh globals array for `new_with_globals`.
pub fn new_globals() -> Globals {
    Rc::new(RefCell::new(vec![Value::Null; GLOBALS_SIZE]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    enum Expected {
        Int(i64),
        Bool(bool),
        Null,
        Str(&'static str),
        IntArray(&'static [i64]),
        /// Compared via the value's display form (dicts and nested arrays
        /// are identity-equal, so value comparison is useless here).
        Display(&'static str),
        /// A runtime error aborting the run.
        Error(RuntimeError),
        /// A builtin-produced Error value left on the stack.
        ErrorValue(&'static str),
    }

    fn run(input: &str) -> Result<Value, RuntimeError> {
        let tokens = Scanner::new(input).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile error");

        let mut vm = Vm::new(compiler.bytecode());
        vm.run()?;

        // Stack hygiene: every statement leaves the operand stack where it
        // found it, so a completed program ends with an empty stack.
        assert_eq!(vm.sp, 0, "stack not drained for {:?}", input);

        Ok(vm.last_popped_stack_elem())
    }

    fn run_vm_tests(tests: Vec<(&str, Expected)>) {
        for (input, expected) in tests {
            match expected {
                Expected::Error(want) => {
                    let got = run(input).expect_err(&format!("expected error for {:?}", input));
                    assert_eq!(got, want, "input: {:?}", input);
                }
                expected => {
                    let got = run(input).unwrap_or_else(|err| {
                        panic!("vm error for {:?}: {}", input, err);
                    });
                    check_value(input, &got, &expected);
                }
            }
        }
    }

    fn check_value(input: &str, got: &Value, expected: &Expected) {
        match expected {
            Expected::Int(want) => assert_eq!(got, &Value::Integer(*want), "input: {:?}", input),
            Expected::Bool(want) => assert_eq!(got, &Value::Boolean(*want), "input: {:?}", input),
            Expected::Null => assert_eq!(got, &Value::Null, "input: {:?}", input),
            Expected::Str(want) => match got {
                Value::String(s) => assert_eq!(s.as_str(), *want, "input: {:?}", input),
                other => panic!("expected string for {:?}, got {:?}", input, other),
            },
            Expected::IntArray(want) => match got {
                Value::Array(elements) => {
                    let got: Vec<i64> = elements
                        .iter()
                        .map(|element| match element {
                            Value::Integer(n) => *n,
                            other => panic!("expected integer element, got {:?}", other),
                        })
                        .collect();
                    assert_eq!(&got, want, "input: {:?}", input);
                }
                other => panic!("expected array for {:?}, got {:?}", input, other),
            },
            Expected::Display(want) => {
                assert_eq!(&got.to_string(), want, "input: {:?}", input)
            }
            Expected::ErrorValue(want) => match got {
                Value::Error(message) => assert_eq!(message.as_str(), *want, "input: {:?}", input),
                other => panic!("expected error value for {:?}, got {:?}", input, other),
            },
            Expected::Error(_) => unreachable!("handled in run_vm_tests"),
        }
    }

    #[test]
    fn test_integer_arithmetic() {
        run_vm_tests(vec![
            ("1", Expected::Int(1)),
            ("2", Expected::Int(2)),
            ("1 + 2", Expected::Int(3)),
            ("1 - 2", Expected::Int(-1)),
            ("1 * 2", Expected::Int(2)),
            ("4 / 2", Expected::Int(2)),
            ("50 / 2 * 2 + 10 - 5", Expected::Int(55)),
            ("5 + 5 + 5 + 5 - 10", Expected::Int(10)),
            ("2 * 2 * 2 * 2 * 2", Expected::Int(32)),
            ("5 * 2 + 10", Expected::Int(20)),
            ("5 + 2 * 10", Expected::Int(25)),
            ("5 * (2 + 10)", Expected::Int(60)),
            ("-5", Expected::Int(-5)),
            ("-10", Expected::Int(-10)),
            ("-50 + 100 + -50", Expected::Int(0)),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", Expected::Int(50)),
            ("1 + 2 * 3", Expected::Int(7)),
            // Division truncates toward zero.
            ("7 / 2", Expected::Int(3)),
            ("-7 / 2", Expected::Int(-3)),
        ]);
    }

    #[test]
    fn test_boolean_expressions() {
        run_vm_tests(vec![
            ("true", Expected::Bool(true)),
            ("false", Expected::Bool(false)),
            ("1 < 2", Expected::Bool(true)),
            ("1 > 2", Expected::Bool(false)),
            ("1 < 1", Expected::Bool(false)),
            ("1 > 1", Expected::Bool(false)),
            ("1 == 1", Expected::Bool(true)),
            ("1 != 1", Expected::Bool(false)),
            ("1 == 2", Expected::Bool(false)),
            ("1 != 2", Expected::Bool(true)),
            ("true == true", Expected::Bool(true)),
            ("false == false", Expected::Bool(true)),
            ("true == false", Expected::Bool(false)),
            ("true != false", Expected::Bool(true)),
            ("false != true", Expected::Bool(true)),
            ("(1 < 2) == true", Expected::Bool(true)),
            ("(1 < 2) == false", Expected::Bool(false)),
            ("(1 > 2) == true", Expected::Bool(false)),
            ("(1 > 2) == false", Expected::Bool(true)),
        ]);
    }

    #[test]
    fn test_bang_operator() {
        run_vm_tests(vec![
            ("!true", Expected::Bool(false)),
            ("!false", Expected::Bool(true)),
            ("!5", Expected::Bool(false)),
            ("!0", Expected::Bool(true)),
            ("!!true", Expected::Bool(true)),
            ("!!false", Expected::Bool(false)),
            ("!!5", Expected::Bool(true)),
            ("!(if (false) { 5; })", Expected::Bool(true)),
        ]);
    }

    #[test]
    fn test_conditionals() {
        run_vm_tests(vec![
            ("if (true) { 10 }", Expected::Int(10)),
            ("if (true) { 10 } else { 20 }", Expected::Int(10)),
            ("if (false) { 10 } else { 20 }", Expected::Int(20)),
            ("if (1) { 10 }", Expected::Int(10)),
            ("if (1 < 2) { 10 }", Expected::Int(10)),
            ("if (1 < 2) { 10 } else { 20 }", Expected::Int(10)),
            ("if (1 > 2) { 10 } else { 20 }", Expected::Int(20)),
            ("if (1 > 2) { 10 }", Expected::Null),
            ("if (false) { 10 }", Expected::Null),
            ("if (0) { 10 }", Expected::Int(10)),
            (
                "if (if (false) { 10 }) { 10 } else { 20 }",
                Expected::Int(20),
            ),
        ]);
    }

    #[test]
    fn test_global_let_statements() {
        run_vm_tests(vec![
            ("let one = 1; one", Expected::Int(1)),
            ("let one = 1; let two = 2; one + two", Expected::Int(3)),
            ("let one = 1; let two = one + one; one + two", Expected::Int(3)),
            ("let x = 5; let y = x + 10; y", Expected::Int(15)),
        ]);
    }

    #[test]
    fn test_string_expressions() {
        run_vm_tests(vec![
            (r#""coral""#, Expected::Str("coral")),
            (r#""cor" + "al""#, Expected::Str("coral")),
            (r#""cor" + "al" + " reef""#, Expected::Str("coral reef")),
            (r#""a" == "a""#, Expected::Bool(true)),
            (r#""a" != "b""#, Expected::Bool(true)),
        ]);
    }

    #[test]
    fn test_array_literals() {
        run_vm_tests(vec![
            ("[]", Expected::IntArray(&[])),
            ("[1, 2, 3]", Expected::IntArray(&[1, 2, 3])),
            ("[1 + 2, 3 * 4, 5 + 6]", Expected::IntArray(&[3, 12, 11])),
        ]);
    }

    #[test]
    fn test_dict_literals() {
        run_vm_tests(vec![
            ("{}", Expected::Display("[]")),
            ("{1: 2, 2: 3}", Expected::Display("[1:2, 2:3]")),
            ("{1 + 1: 2 * 2, 3 + 3: 4 * 4}", Expected::Display("[2:4, 6:16]")),
            (r#"{"one": 1, "two": 2}"#, Expected::Display("[one:1, two:2]")),
        ]);
    }

    #[test]
    fn test_index_expressions() {
        run_vm_tests(vec![
            ("[1, 2, 3][1]", Expected::Int(2)),
            ("[1, 2, 3][0 + 2]", Expected::Int(3)),
            ("[[1, 1, 1]][0][0]", Expected::Int(1)),
            ("[][0]", Expected::Null),
            ("[1, 2, 3][99]", Expected::Null),
            ("[1][-1]", Expected::Null),
            ("[1][5]", Expected::Null),
            ("{1: 1, 2: 2}[1]", Expected::Int(1)),
            ("{1: 1, 2: 2}[2]", Expected::Int(2)),
            ("{1: 2, 3: 4}[3]", Expected::Int(4)),
            ("{1: 1}[0]", Expected::Null),
            ("{}[0]", Expected::Null),
            (r#"{"key": 7}["key"]"#, Expected::Int(7)),
            ("{true: 1, false: 0}[true]", Expected::Int(1)),
        ]);
    }

    #[test]
    fn test_calling_functions_without_arguments() {
        run_vm_tests(vec![
            (
                "let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();",
                Expected::Int(15),
            ),
            (
                "let one = fn() { 1; }; let two = fn() { 2; }; one() + two()",
                Expected::Int(3),
            ),
            (
                "let a = fn() { 1 }; let b = fn() { a() + 1 }; let c = fn() { b() + 1 }; c();",
                Expected::Int(3),
            ),
        ]);
    }

    #[test]
    fn test_functions_with_return_statements() {
        run_vm_tests(vec![
            (
                "let earlyExit = fn() { return 99; 100; }; earlyExit();",
                Expected::Int(99),
            ),
            (
                "let earlyExit = fn() { return 99; return 100; }; earlyExit();",
                Expected::Int(99),
            ),
        ]);
    }

    #[test]
    fn test_functions_without_return_value() {
        run_vm_tests(vec![
            ("let noReturn = fn() { }; noReturn();", Expected::Null),
            (
                "let noReturn = fn() { };
                 let noReturnTwo = fn() { noReturn(); };
                 noReturn();
                 noReturnTwo();",
                Expected::Null,
            ),
        ]);
    }

    #[test]
    fn test_first_class_functions() {
        run_vm_tests(vec![(
            "let returnsOne = fn() { 1; };
             let returnsOneReturner = fn() { returnsOne; };
             returnsOneReturner()();",
            Expected::Int(1),
        )]);
    }

    #[test]
    fn test_calling_functions_with_bindings() {
        run_vm_tests(vec![
            (
                "let one = fn() { let one = 1; one }; one();",
                Expected::Int(1),
            ),
            (
                "let oneAndTwo = fn() { let one = 1; let two = 2; one + two; }; oneAndTwo();",
                Expected::Int(3),
            ),
            (
                "let oneAndTwo = fn() { let one = 1; let two = 2; one + two; };
                 let threeAndFour = fn() { let three = 3; let four = 4; three + four; };
                 oneAndTwo() + threeAndFour();",
                Expected::Int(10),
            ),
            // Same local slot numbers in different functions stay separate.
            (
                "let firstFoobar = fn() { let foobar = 50; foobar; };
                 let secondFoobar = fn() { let foobar = 100; foobar; };
                 firstFoobar() + secondFoobar();",
                Expected::Int(150),
            ),
            (
                "let globalSeed = 50;
                 let minusOne = fn() { let num = 1; globalSeed - num; };
                 let minusTwo = fn() { let num = 2; globalSeed - num; };
                 minusOne() + minusTwo();",
                Expected::Int(97),
            ),
        ]);
    }

    #[test]
    fn test_calling_functions_with_arguments() {
        run_vm_tests(vec![
            ("let identity = fn(a) { a; }; identity(4);", Expected::Int(4)),
            ("let sum = fn(a, b) { a + b; }; sum(1, 2);", Expected::Int(3)),
            (
                "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2);",
                Expected::Int(3),
            ),
            (
                "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
                Expected::Int(10),
            ),
            (
                "let sum = fn(a, b) { let c = a + b; c; };
                 let outer = fn() { sum(1, 2) + sum(3, 4); };
                 outer();",
                Expected::Int(10),
            ),
            (
                "let globalNum = 10;
                 let sum = fn(a, b) { let c = a + b; c + globalNum; };
                 let outer = fn() { sum(1, 2) + sum(3, 4) + globalNum; };
                 outer() + globalNum;",
                Expected::Int(50),
            ),
        ]);
    }

    #[test]
    fn test_calling_functions_with_wrong_arguments() {
        run_vm_tests(vec![
            (
                "fn() { 1; }(1);",
                Expected::Error(RuntimeError::WrongArity { want: 0, got: 1 }),
            ),
            (
                "fn(a) { a; }();",
                Expected::Error(RuntimeError::WrongArity { want: 1, got: 0 }),
            ),
            (
                "fn(a, b) { a + b; }(1);",
                Expected::Error(RuntimeError::WrongArity { want: 2, got: 1 }),
            ),
        ]);
    }

    #[test]
    fn test_wrong_arity_message() {
        let err = run("fn(a, b) { a + b; }(1);").unwrap_err();
        assert_eq!(err.to_string(), "wrong number of arguments: want 2 got 1");
    }

    #[test]
    fn test_builtin_functions() {
        run_vm_tests(vec![
            (r#"len("")"#, Expected::Int(0)),
            (r#"len("four")"#, Expected::Int(4)),
            (r#"len("hello world")"#, Expected::Int(11)),
            ("len([1, 2, 3])", Expected::Int(3)),
            ("len([])", Expected::Int(0)),
            (
                "len(1)",
                Expected::ErrorValue("argument to `len` not supported, got Integer"),
            ),
            (
                r#"len("one", "two")"#,
                Expected::ErrorValue("wrong number of arguments. got 2, want 1"),
            ),
            (r#"puts("hello", "world")"#, Expected::Null),
            ("first([1, 2, 3])", Expected::Int(1)),
            ("first([])", Expected::Null),
            (r#"first("abc")"#, Expected::Str("a")),
            (
                "first(1)",
                Expected::ErrorValue("argument to `first` is invalid, got Integer"),
            ),
            ("last([1, 2, 3])", Expected::Int(3)),
            ("last([])", Expected::Null),
            (r#"last("abc")"#, Expected::Str("c")),
            ("tail([1, 2, 3])", Expected::IntArray(&[2, 3])),
            ("tail([1])", Expected::Null),
            ("tail([])", Expected::Null),
            (r#"tail("abc")"#, Expected::Str("bc")),
            ("push([], 1)", Expected::IntArray(&[1])),
            (
                "push(1, 1)",
                Expected::ErrorValue("argument to `push` must be Array, got Integer"),
            ),
            ("let a = [1, 2, 3]; len(push(a, 4)) - len(a)", Expected::Int(1)),
            ("let a = [1, 2]; push(a, 3); a", Expected::IntArray(&[1, 2])),
            ("fn() { len([1, 2]) }()", Expected::Int(2)),
        ]);
    }

    #[test]
    fn test_spec_index_scenario() {
        run_vm_tests(vec![(
            "let a = [1, 2, 3]; a[1] + len(a)",
            Expected::Int(5),
        )]);
    }

    #[test]
    fn test_closures() {
        run_vm_tests(vec![
            (
                "let newClosure = fn(a) { fn() { a; }; };
                 let closure = newClosure(99);
                 closure();",
                Expected::Int(99),
            ),
            (
                "let newAdder = fn(a, b) { fn(c) { a + b + c }; };
                 let adder = newAdder(1, 2);
                 adder(8);",
                Expected::Int(11),
            ),
            (
                "let newAdder = fn(a, b) { let c = a + b; fn(d) { c + d }; };
                 let adder = newAdder(1, 2);
                 adder(8);",
                Expected::Int(11),
            ),
            (
                "let newAdderOuter = fn(a, b) {
                     let c = a + b;
                     fn(d) { let e = d + c; fn(f) { e + f; }; };
                 };
                 let newAdderInner = newAdderOuter(1, 2);
                 let adder = newAdderInner(3);
                 adder(8);",
                Expected::Int(14),
            ),
            (
                "let a = 1;
                 let newAdderOuter = fn(b) { fn(c) { fn(d) { a + b + c + d }; }; };
                 let newAdderInner = newAdderOuter(2);
                 let adder = newAdderInner(3);
                 adder(8);",
                Expected::Int(14),
            ),
            (
                "let newClosure = fn(a, b) {
                     let one = fn() { a; };
                     let two = fn() { b; };
                     fn() { one() + two(); };
                 };
                 let closure = newClosure(9, 90);
                 closure();",
                Expected::Int(99),
            ),
            (
                "let adder = fn(a) { fn(b) { a + b } }; adder(2)(3)",
                Expected::Int(5),
            ),
        ]);
    }

    #[test]
    fn test_recursive_functions() {
        run_vm_tests(vec![
            (
                "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
                 countDown(1);",
                Expected::Int(0),
            ),
            (
                "let fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } };
                 fib(10)",
                Expected::Int(55),
            ),
            (
                "let fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } };
                 fib(15)",
                Expected::Int(610),
            ),
        ]);
    }

    #[test]
    fn test_runtime_errors() {
        run_vm_tests(vec![
            (
                "5 + true;",
                Expected::Error(RuntimeError::UnsupportedBinaryTypes("Integer", "Boolean")),
            ),
            (
                "5 + true; 5;",
                Expected::Error(RuntimeError::UnsupportedBinaryTypes("Integer", "Boolean")),
            ),
            (
                r#""a" + 1"#,
                Expected::Error(RuntimeError::UnsupportedBinaryTypes("String", "Integer")),
            ),
            (
                "-true",
                Expected::Error(RuntimeError::IllegalNegation("Boolean")),
            ),
            (
                r#"-"a""#,
                Expected::Error(RuntimeError::IllegalNegation("String")),
            ),
            (
                "!fn() { 1 }",
                Expected::Error(RuntimeError::IllegalBang("Closure")),
            ),
            (
                r#""a" - "b""#,
                Expected::Error(RuntimeError::UnknownStringOperator(OpCode::Sub as u8)),
            ),
            (
                r#""a" > "b""#,
                Expected::Error(RuntimeError::UnknownOperator(OpCode::Gt as u8)),
            ),
            (
                "let noFn = 5; noFn();",
                Expected::Error(RuntimeError::NotAFunction),
            ),
            (
                "5[0]",
                Expected::Error(RuntimeError::IndexUnavailable("Integer")),
            ),
            (
                r#"[1, 2, 3]["str"]"#,
                Expected::Error(RuntimeError::IndexUnavailable("Array")),
            ),
            (
                "{fn() { 1 }: 2}",
                Expected::Error(RuntimeError::UnhashableKey("Closure")),
            ),
            (
                "{1: 1}[fn() { 1 }]",
                Expected::Error(RuntimeError::UnhashableKey("Closure")),
            ),
            ("1 / 0", Expected::Error(RuntimeError::DivisionByZero)),
        ]);
    }

    #[test]
    fn test_frame_overflow_is_reported() {
        let err = run("let f = fn() { f(); }; f();").unwrap_err();
        assert_eq!(err, RuntimeError::StackOverflow);
    }

    #[test]
    fn test_arrays_are_hashable_dict_keys() {
        run_vm_tests(vec![
            ("let k = [1, 2]; {k: 3}[k]", Expected::Int(3)),
            // A structurally-equal literal hashes to the same digest.
            ("{[1, 2]: 3}[[1, 2]]", Expected::Int(3)),
        ]);
    }

    #[test]
    fn test_last_popped_after_each_statement() {
        run_vm_tests(vec![
            ("1; 2; 3;", Expected::Int(3)),
            ("let a = 1; a; a + 1;", Expected::Int(2)),
        ]);
    }

    #[test]
    fn test_binding_only_conditional_arms_do_not_underflow() {
        assert!(run("if (true) { let a = 1; }").is_ok());
        assert!(run("if (false) { let a = 1; }").is_ok());
    }

    #[test]
    fn test_top_level_return_ends_the_program() {
        run_vm_tests(vec![
            ("return 5; 10;", Expected::Int(5)),
            ("let x = 1; return x + 1; x;", Expected::Int(2)),
        ]);
    }

    #[test]
    fn test_globals_survive_across_runs() {
        let compile = |source: &str, state: Option<(&Compiler, Vec<Value>)>| {
            let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
            let program = Parser::new(tokens).parse().expect("parser error");
            let mut compiler = match state {
                None => Compiler::new(),
                Some((previous, constants)) => {
                    Compiler::new_with_state(previous.symbol_table(), constants)
                }
            };
            compiler.compile(&program).expect("compile error");
            compiler
        };

        let globals = new_globals();

        let first = compile("let x = 40;", None);
        let mut vm = Vm::new_with_globals(first.bytecode(), globals.clone());
        vm.run().expect("vm error");

        let second = compile("x + 2", Some((&first, first.bytecode().constants)));
        let mut vm = Vm::new_with_globals(second.bytecode(), globals);
        vm.run().expect("vm error");
        assert_eq!(vm.last_popped_stack_elem(), Value::Integer(42));
    }
}
