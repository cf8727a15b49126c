//! Pratt parser for the Moss language.

use moss_syntax::ast::*;
use moss_syntax::error::{Error, Result};
use moss_syntax::token::{Token, TokenKind};

/// Binding power of infix positions, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,      // == !=
    LessGreater, // < >
    Sum,         // + -
    Product,     // * /
    Prefix,      // -x !x
    Call,        // f(x)
    Index,       // a[0]
}

fn precedence_of(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::EqEq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Less | TokenKind::Greater => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Star | TokenKind::Slash => Precedence::Product,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// Token-buffer parser. Statement-level errors are collected so a
/// single pass can report everything wrong with a submission.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<Error>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        // The lexer always ends the stream with Eof; guard against
        // hand-built token vectors that do not.
        if tokens.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                line: 1,
                col: 1,
            });
        }
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.current().kind == *kind
    }

    fn expect(&mut self, want: TokenKind) -> Result<Token> {
        if self.current().kind == want {
            Ok(self.advance())
        } else {
            let got = self.current();
            Err(Error::with_span(
                format!("expected {}, got {}", want.describe(), got.kind.describe()),
                got.line,
                got.col,
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        if let TokenKind::Ident(name) = &self.current().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            let got = self.current();
            Err(Error::with_span(
                format!("expected identifier, got {}", got.kind.describe()),
                got.line,
                got.col,
            ))
        }
    }

    fn unexpected<T>(&self) -> Result<T> {
        let got = self.current();
        Err(Error::with_span(
            format!("unexpected token {}", got.kind.describe()),
            got.line,
            got.col,
        ))
    }

    /// Parse an entire program. On failure, returns every
    /// statement-level error that was recorded.
    pub fn parse_program(&mut self) -> std::result::Result<Program, Vec<Error>> {
        let mut statements = Vec::new();
        while !self.at(&TokenKind::Eof) {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        if self.errors.is_empty() {
            Ok(Program { statements })
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    /// Skip to just past the next statement boundary so parsing can
    /// resume after an error.
    fn synchronize(&mut self) {
        while !self.at(&TokenKind::Eof) {
            if self.at(&TokenKind::Semicolon) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current().kind {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Result<Statement> {
        self.advance(); // let
        let name = self.expect_ident()?;
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();
        Ok(Statement::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Result<Statement> {
        self.advance(); // return
        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();
        Ok(Statement::Return(value))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();
        Ok(Statement::Expression(expr))
    }

    fn skip_semicolon(&mut self) {
        if self.at(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Parse a single expression; used directly by tests and tools.
    pub fn parse_expr(&mut self) -> Result<Expression> {
        self.parse_expression(Precedence::Lowest)
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression> {
        let mut left = self.parse_prefix()?;
        while !self.at(&TokenKind::Semicolon) && precedence < precedence_of(&self.current().kind)
        {
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression> {
        match self.current().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expression::Identifier(name))
            }
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expression::IntegerLiteral(value))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expression::StringLiteral(value))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Boolean(false))
            }
            TokenKind::Bang => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Prefix {
                    op: PrefixOp::Bang,
                    right: Box::new(right),
                })
            }
            TokenKind::Minus => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Prefix {
                    op: PrefixOp::Minus,
                    right: Box::new(right),
                })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::If => self.parse_if_expression(),
            TokenKind::Fn => self.parse_function_literal(),
            TokenKind::LBracket => {
                self.advance();
                let elements = self.parse_expression_list(TokenKind::RBracket)?;
                Ok(Expression::ArrayLiteral(elements))
            }
            TokenKind::LBrace => self.parse_hash_literal(),
            _ => self.unexpected(),
        }
    }

    fn parse_infix(&mut self, left: Expression) -> Result<Expression> {
        let op = match self.current().kind {
            TokenKind::Plus => InfixOp::Add,
            TokenKind::Minus => InfixOp::Sub,
            TokenKind::Star => InfixOp::Mul,
            TokenKind::Slash => InfixOp::Div,
            TokenKind::Less => InfixOp::Lt,
            TokenKind::Greater => InfixOp::Gt,
            TokenKind::EqEq => InfixOp::Eq,
            TokenKind::NotEq => InfixOp::NotEq,
            TokenKind::LParen => {
                self.advance();
                let arguments = self.parse_expression_list(TokenKind::RParen)?;
                return Ok(Expression::Call {
                    function: Box::new(left),
                    arguments,
                });
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RBracket)?;
                return Ok(Expression::Index {
                    left: Box::new(left),
                    index: Box::new(index),
                });
            }
            _ => return self.unexpected(),
        };
        let precedence = precedence_of(&self.current().kind);
        self.advance();
        let right = self.parse_expression(precedence)?;
        Ok(Expression::Infix {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_if_expression(&mut self) -> Result<Expression> {
        self.advance(); // if
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::RParen)?;
        let consequence = self.parse_block_statement()?;
        let alternative = if self.at(&TokenKind::Else) {
            self.advance();
            Some(self.parse_block_statement()?)
        } else {
            None
        };
        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_function_literal(&mut self) -> Result<Expression> {
        self.advance(); // fn
        self.expect(TokenKind::LParen)?;
        let mut parameters = Vec::new();
        if !self.at(&TokenKind::RParen) {
            parameters.push(self.expect_ident()?);
            while self.at(&TokenKind::Comma) {
                self.advance();
                parameters.push(self.expect_ident()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block_statement()?;
        Ok(Expression::FunctionLiteral { parameters, body })
    }

    fn parse_block_statement(&mut self) -> Result<BlockStatement> {
        self.expect(TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(BlockStatement { statements })
    }

    fn parse_expression_list(&mut self, end: TokenKind) -> Result<Vec<Expression>> {
        let mut list = Vec::new();
        if self.at(&end) {
            self.advance();
            return Ok(list);
        }
        list.push(self.parse_expression(Precedence::Lowest)?);
        while self.at(&TokenKind::Comma) {
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect(end)?;
        Ok(list)
    }

    fn parse_hash_literal(&mut self) -> Result<Expression> {
        self.advance(); // {
        let mut pairs = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if !self.at(&TokenKind::RBrace) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expression::HashLiteral(pairs))
    }
}
