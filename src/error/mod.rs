//! Error types for all phases of the Coral pipeline.

use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error, PartialEq)]
pub enum LexerError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("invalid integer literal '{0}'")]
    InvalidInteger(String),
}

/// Parser errors. The parser collects every error in a run instead of
/// stopping at the first; the REPL prints each on its own line.
#[derive(Debug, Error, PartialEq)]
pub enum ParserError {
    #[error("expected next token to be {expected}, got {found} instead")]
    UnexpectedToken { expected: String, found: String },

    #[error("no prefix parse rule for {0}")]
    NoPrefixRule(String),
}

impl ParserError {
    pub fn unexpected_token(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    #[error("constant pool overflow")]
    ConstantPoolOverflow,
}

/// Runtime errors raised by the virtual machine. The first error aborts
/// the run.
#[derive(Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("not a function")]
    NotAFunction,

    #[error("wrong number of arguments: want {want} got {got}")]
    WrongArity { want: usize, got: usize },

    #[error("unsupported types for binary operation: {0} {1}")]
    UnsupportedBinaryTypes(&'static str, &'static str),

    #[error("unknown integer operator: {0}")]
    UnknownIntegerOperator(u8),

    #[error("unknown string operator: {0}")]
    UnknownStringOperator(u8),

    #[error("unknown operator: {0}")]
    UnknownOperator(u8),

    #[error("illegal operator - on type {0}")]
    IllegalNegation(&'static str),

    #[error("illegal operator ! for type: {0}")]
    IllegalBang(&'static str),

    #[error("unhashable key {0}")]
    UnhashableKey(&'static str),

    #[error("index operator unavailable for type {0}")]
    IndexUnavailable(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("opcode {0} not defined")]
    UndefinedOpcode(u8),
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum CoralError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
