//! Builtin functions, registered in a fixed order that `GetBIn` indexes.
//!
//! Builtins report misuse (bad arguments, arity mismatches) as Error
//! *values* flowing back through the stack, never as VM errors. A `None`
//! return becomes `null` on the stack.

use std::rc::Rc;

use crate::bytecode::value::Value;

/// Signature of a builtin: takes its arguments, returns a value or None
/// (pushed as null).
pub type BuiltinFn = fn(Vec<Value>) -> Option<Value>;

/// One entry in the builtin registry.
#[derive(Debug)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// The registry. Order is load-bearing: `GetBIn n` fetches `BUILTINS[n]`,
/// and the compiler registers these names at the same indices.
pub const BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        func: builtin_len,
    },
    BuiltinDef {
        name: "first",
        func: builtin_first,
    },
    BuiltinDef {
        name: "last",
        func: builtin_last,
    },
    BuiltinDef {
        name: "tail",
        func: builtin_tail,
    },
    BuiltinDef {
        name: "push",
        func: builtin_push,
    },
    BuiltinDef {
        name: "puts",
        func: builtin_puts,
    },
];

/// Find a builtin by name (used by tests and embedders; the compiler works
/// through registry indices).
pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn new_error(message: String) -> Value {
    Value::Error(Rc::new(message))
}

fn builtin_len(args: Vec<Value>) -> Option<Value> {
    if args.len() != 1 {
        return Some(new_error(format!(
            "wrong number of arguments. got {}, want 1",
            args.len()
        )));
    }

    match &args[0] {
        Value::String(s) => Some(Value::Integer(s.len() as i64)),
        Value::Array(elements) => Some(Value::Integer(elements.len() as i64)),
        other => Some(new_error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_first(args: Vec<Value>) -> Option<Value> {
    if args.len() != 1 {
        return Some(new_error(format!(
            "wrong number of arguments. got {}, want 1",
            args.len()
        )));
    }

    match &args[0] {
        Value::Array(elements) => elements.first().cloned(),
        Value::String(s) => s
            .chars()
            .next()
            .map(|c| Value::String(Rc::new(c.to_string()))),
        other => Some(new_error(format!(
            "argument to `first` is invalid, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_last(args: Vec<Value>) -> Option<Value> {
    if args.len() != 1 {
        return Some(new_error(format!(
            "wrong number of arguments. got {}, want 1",
            args.len()
        )));
    }

    match &args[0] {
        Value::Array(elements) => elements.last().cloned(),
        Value::String(s) => s
            .chars()
            .next_back()
            .map(|c| Value::String(Rc::new(c.to_string()))),
        other => Some(new_error(format!(
            "argument to `last` is invalid, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_tail(args: Vec<Value>) -> Option<Value> {
    if args.len() != 1 {
        return Some(new_error(format!(
            "wrong number of arguments. got {}, want 1",
            args.len()
        )));
    }

    match &args[0] {
        Value::Array(elements) => {
            if elements.len() > 1 {
                Some(Value::Array(Rc::new(elements[1..].to_vec())))
            } else {
                None
            }
        }
        Value::String(s) => {
            let mut chars = s.chars();
            chars.next()?;
            Some(Value::String(Rc::new(chars.as_str().to_string())))
        }
        other => Some(new_error(format!(
            "argument to `tail` is invalid, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_push(args: Vec<Value>) -> Option<Value> {
    if args.len() != 2 {
        return Some(new_error(format!(
            "wrong number of arguments. got {} want 2",
            args.len()
        )));
    }

    match &args[0] {
        Value::Array(elements) => {
            let mut extended = Vec::with_capacity(elements.len() + 1);
            extended.extend_from_slice(elements);
            extended.push(args[1].clone());
            Some(Value::Array(Rc::new(extended)))
        }
        other => Some(new_error(format!(
            "argument to `push` must be Array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_puts(args: Vec<Value>) -> Option<Value> {
    let mut out = String::new();
    for arg in &args {
        out.push_str(&arg.to_string());
    }
    println!("{}", out);
    None
}
