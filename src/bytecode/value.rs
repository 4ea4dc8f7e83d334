//! Runtime values shared by the compiler (constant pool) and the VM.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::builtins::BuiltinDef;

/// Dict storage: hashed key to original (key, value) pair, preserving
/// insertion order for display.
pub type DictPairs = IndexMap<HashKey, (Value, Value)>;

/// A Coral runtime value.
///
/// Integers, booleans, null and strings compare by value; arrays, dicts,
/// functions and closures compare by identity. Aggregates are immutable
/// after construction, so sharing them behind `Rc` is safe.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Null,
    String(Rc<String>),
    Array(Rc<Vec<Value>>),
    Dict(Rc<DictPairs>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(&'static BuiltinDef),
    Error(Rc<String>),
}

/// A function lowered to bytecode: its instruction stream plus the frame
/// layout the VM needs to invoke it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    /// Total local slots to reserve, parameters included.
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function paired with its captured free-variable values.
#[derive(Debug)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// Key under which a hashable value is stored in a dict: the value's type
/// tag plus a 64-bit digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub kind: &'static str,
    pub value: u64,
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64-bit digest, the stable hash used for string-like keys.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

impl Value {
    /// The value's type name as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Boolean(_) => "Boolean",
            Value::Null => "Null",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Dict(_) => "Dict",
            Value::CompiledFunction(_) => "CompiledFunction",
            Value::Closure(_) => "Closure",
            Value::Builtin(_) => "Builtin",
            Value::Error(_) => "Error",
        }
    }

    /// Everything except `false` and `null` is truthy. Note that integer
    /// zero is truthy; only `!` treats it specially.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }

    /// The dict key for this value, or None if the type is unhashable.
    pub fn hash_key(&self) -> Option<HashKey> {
        let key = match self {
            Value::Integer(n) => HashKey {
                kind: self.type_name(),
                value: *n as u64,
            },
            Value::Boolean(b) => HashKey {
                kind: self.type_name(),
                value: u64::from(*b),
            },
            Value::String(s) => HashKey {
                kind: self.type_name(),
                value: fnv1a(s.as_bytes()),
            },
            // Arrays hash via their display form. Fragile (two distinct
            // arrays can collide through formatting) but stable.
            Value::Array(_) => HashKey {
                kind: self.type_name(),
                value: fnv1a(self.to_string().as_bytes()),
            },
            _ => return None,
        };
        Some(key)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Dict(pairs) => {
                write!(f, "[")?;
                for (i, (key, value)) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}:{}", key, value)?;
                }
                write!(f, "]")
            }
            Value::CompiledFunction(function) => {
                write!(f, "CompiledFn[{:p}]", Rc::as_ptr(function))
            }
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => write!(f, "builtin function"),
            Value::Error(message) => write!(f, "ERROR: {:?}", message),
        }
    }
}
