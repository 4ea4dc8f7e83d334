//! Abstract syntax tree consumed by the bytecode compiler.

pub mod expr;
pub mod stmt;

pub use expr::Expr;
pub use stmt::{Block, Program, Stmt};
