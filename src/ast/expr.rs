//! Expression AST nodes.
//!
//! Operators are kept as their surface strings rather than enums so the
//! compiler owns the operator vocabulary and can reject anything it does
//! not lower.

use std::fmt;

use crate::ast::stmt::Block;

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal: 42
    Integer(i64),
    /// String literal: "hello"
    String(String),
    /// Boolean literal: true, false
    Boolean(bool),
    /// Variable reference: foo
    Identifier(String),

    /// Prefix operation: -x, !x
    Prefix { operator: String, right: Box<Expr> },

    /// Infix operation: a + b
    Infix {
        left: Box<Expr>,
        operator: String,
        right: Box<Expr>,
    },

    /// Conditional expression: if (cond) { cons } else { alt }
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
    },

    /// Function literal: fn(a, b) { body }
    Function { parameters: Vec<String>, body: Block },

    /// Function call: callee(a, b)
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// Array literal: [1, 2, 3]
    Array(Vec<Expr>),

    /// Dict literal: {k: v, ...}
    Dict(Vec<(Expr, Expr)>),

    /// Index access: collection[index]
    Index { left: Box<Expr>, index: Box<Expr> },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Integer(n) => write!(f, "{}", n),
            Expr::String(s) => write!(f, "{}", s),
            Expr::Boolean(b) => write!(f, "{}", b),
            Expr::Identifier(name) => write!(f, "{}", name),
            Expr::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            Expr::Infix {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{} ", condition)?;
                for stmt in consequence {
                    write!(f, "{}", stmt)?;
                }
                if let Some(alternative) = alternative {
                    write!(f, " else ")?;
                    for stmt in alternative {
                        write!(f, "{}", stmt)?;
                    }
                }
                Ok(())
            }
            Expr::Function { parameters, body } => {
                write!(f, "fn({}) ", parameters.join(", "))?;
                for stmt in body {
                    write!(f, "{}", stmt)?;
                }
                Ok(())
            }
            Expr::Call {
                function,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, args.join(", "))
            }
            Expr::Array(elements) => {
                let elems: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elems.join(", "))
            }
            Expr::Dict(pairs) => {
                let pairs: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Expr::Index { left, index } => write!(f, "({}[{}])", left, index),
        }
    }
}
