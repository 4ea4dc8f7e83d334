//! Statement AST nodes.

use std::fmt;

use crate::ast::expr::Expr;

/// A parsed program: the root node handed to the compiler.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A block of statements, as found in function bodies and `if` arms.
pub type Block = Vec<Stmt>;

/// All statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Binding: `let name = value;`
    Let { name: String, value: Expr },
    /// Early return: `return value;`
    Return(Expr),
    /// An expression evaluated for its value: `value;`
    Expression(Expr),
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Let { name, value } => write!(f, "let {} = {};", name, value),
            Stmt::Return(value) => write!(f, "return {};", value),
            Stmt::Expression(value) => write!(f, "{}", value),
        }
    }
}
