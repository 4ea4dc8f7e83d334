//! Pratt parser: token stream to AST.

pub mod precedence;

use crate::ast::{Block, Expr, Program, Stmt};
use crate::error::ParserError;
use crate::lexer::Token;
use precedence::{get_precedence, Precedence};

/// Result type for single parse rules.
type ParseResult<T> = Result<T, ParserError>;

/// The parser builds an AST from a token stream, collecting every error in
/// the run rather than stopping at the first.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<ParserError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the whole token stream. Returns the program, or every parse
    /// error encountered.
    pub fn parse(mut self) -> Result<Program, Vec<ParserError>> {
        let mut program = Program::default();

        while !self.current_is(&Token::Eof) {
            match self.parse_statement() {
                Ok(stmt) => program.statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(program)
        } else {
            Err(self.errors)
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.current() {
            Token::Let => self.parse_let_statement(),
            Token::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> ParseResult<Stmt> {
        self.advance(); // consume `let`

        let name = match self.current().clone() {
            Token::Ident(name) => name,
            other => return Err(ParserError::unexpected_token("an identifier", other.to_string())),
        };
        self.advance();

        self.expect(Token::Assign)?;
        let value = self.parse_expression(Precedence::Lowest)?;

        if self.current_is(&Token::Semicolon) {
            self.advance();
        }

        Ok(Stmt::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> ParseResult<Stmt> {
        self.advance(); // consume `return`

        let value = self.parse_expression(Precedence::Lowest)?;

        if self.current_is(&Token::Semicolon) {
            self.advance();
        }

        Ok(Stmt::Return(value))
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let value = self.parse_expression(Precedence::Lowest)?;

        if self.current_is(&Token::Semicolon) {
            self.advance();
        }

        Ok(Stmt::Expression(value))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.current_is(&Token::Semicolon) && precedence < get_precedence(self.current()) {
            left = match self.current() {
                Token::Plus
                | Token::Minus
                | Token::Star
                | Token::Slash
                | Token::EqualEqual
                | Token::BangEqual
                | Token::Less
                | Token::Greater => self.parse_infix_expression(left)?,
                Token::LeftParen => self.parse_call_expression(left)?,
                Token::LeftBracket => self.parse_index_expression(left)?,
                _ => break,
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        match self.current().clone() {
            Token::Int(value) => {
                self.advance();
                Ok(Expr::Integer(value))
            }
            Token::Str(value) => {
                self.advance();
                Ok(Expr::String(value))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Boolean(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Boolean(false))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Identifier(name))
            }
            Token::Bang | Token::Minus => self.parse_prefix_expression(),
            Token::LeftParen => self.parse_grouped_expression(),
            Token::If => self.parse_if_expression(),
            Token::Fn => self.parse_function_literal(),
            Token::LeftBracket => self.parse_array_literal(),
            Token::LeftBrace => self.parse_dict_literal(),
            other => Err(ParserError::NoPrefixRule(other.to_string())),
        }
    }

    fn parse_prefix_expression(&mut self) -> ParseResult<Expr> {
        let operator = self.current().to_string();
        self.advance();

        let right = self.parse_expression(Precedence::Prefix)?;
        Ok(Expr::Prefix {
            operator,
            right: Box::new(right),
        })
    }

    fn parse_infix_expression(&mut self, left: Expr) -> ParseResult<Expr> {
        let operator = self.current().to_string();
        let precedence = get_precedence(self.current());
        self.advance();

        let right = self.parse_expression(precedence)?;
        Ok(Expr::Infix {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    fn parse_grouped_expression(&mut self) -> ParseResult<Expr> {
        self.advance(); // consume `(`
        let expr = self.parse_expression(Precedence::Lowest)?;
        self.expect(Token::RightParen)?;
        Ok(expr)
    }

    fn parse_if_expression(&mut self) -> ParseResult<Expr> {
        self.advance(); // consume `if`

        self.expect(Token::LeftParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(Token::RightParen)?;

        let consequence = self.parse_block()?;

        let alternative = if self.current_is(&Token::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Expr::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_function_literal(&mut self) -> ParseResult<Expr> {
        self.advance(); // consume `fn`

        self.expect(Token::LeftParen)?;
        let parameters = self.parse_parameters()?;
        let body = self.parse_block()?;

        Ok(Expr::Function { parameters, body })
    }

    fn parse_parameters(&mut self) -> ParseResult<Vec<String>> {
        let mut parameters = Vec::new();

        if self.current_is(&Token::RightParen) {
            self.advance();
            return Ok(parameters);
        }

        loop {
            match self.current().clone() {
                Token::Ident(name) => {
                    parameters.push(name);
                    self.advance();
                }
                other => {
                    return Err(ParserError::unexpected_token(
                        "an identifier",
                        other.to_string(),
                    ))
                }
            }

            if !self.current_is(&Token::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(Token::RightParen)?;
        Ok(parameters)
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.expect(Token::LeftBrace)?;

        let mut statements = Vec::new();
        while !self.current_is(&Token::RightBrace) && !self.current_is(&Token::Eof) {
            statements.push(self.parse_statement()?);
        }

        self.expect(Token::RightBrace)?;
        Ok(statements)
    }

    fn parse_call_expression(&mut self, function: Expr) -> ParseResult<Expr> {
        self.advance(); // consume `(`
        let arguments = self.parse_expression_list(Token::RightParen)?;
        Ok(Expr::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_index_expression(&mut self, left: Expr) -> ParseResult<Expr> {
        self.advance(); // consume `[`
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect(Token::RightBracket)?;
        Ok(Expr::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expr> {
        self.advance(); // consume `[`
        let elements = self.parse_expression_list(Token::RightBracket)?;
        Ok(Expr::Array(elements))
    }

    fn parse_dict_literal(&mut self) -> ParseResult<Expr> {
        self.advance(); // consume `{`

        let mut pairs = Vec::new();
        if self.current_is(&Token::RightBrace) {
            self.advance();
            return Ok(Expr::Dict(pairs));
        }

        loop {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(Token::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if !self.current_is(&Token::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(Token::RightBrace)?;
        Ok(Expr::Dict(pairs))
    }

    fn parse_expression_list(&mut self, end: Token) -> ParseResult<Vec<Expr>> {
        let mut list = Vec::new();

        if self.current_is(&end) {
            self.advance();
            return Ok(list);
        }

        loop {
            list.push(self.parse_expression(Precedence::Lowest)?);
            if !self.current_is(&Token::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(end)?;
        Ok(list)
    }

    /// After an error, skip to the start of the next statement so later
    /// errors in the same run are still reported.
    fn synchronize(&mut self) {
        while !self.current_is(&Token::Eof) {
            if self.current_is(&Token::Semicolon) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn current(&self) -> &Token {
        static EOF: Token = Token::Eof;
        self.tokens.get(self.position).unwrap_or(&EOF)
    }

    fn current_is(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current_is(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(ParserError::unexpected_token(
                expected.to_string(),
                self.current().to_string(),
            ))
        }
    }
}
