// src/expr/parser.rs

//! Precedence-climbing parser shared by both dialects.
//!
//! The dialects differ only in how the context root is spelled: `$` for
//! yaql, `_` for jinja. Everything else (operators, calls, attribute access)
//! is parsed identically.

use serde_json::Value;

use crate::expr::lexer::Token;
use crate::expr::{Dialect, ExprError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Ast {
    Literal(Value),
    /// The whole variable context (`$` or `_`).
    Root,
    /// A bare identifier that is neither a keyword nor a call, e.g. the
    /// `task1` in `task_state(task1)`.
    Name(String),
    Attr(Box<Ast>, String),
    Index(Box<Ast>, Box<Ast>),
    Call(String, Vec<Ast>),
    Neg(Box<Ast>),
    Not(Box<Ast>),
    Binary(BinOp, Box<Ast>, Box<Ast>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    fn from_token(token: &Token) -> Option<(BinOp, u8)> {
        let op = match token {
            Token::Or => (BinOp::Or, 1),
            Token::And => (BinOp::And, 2),
            Token::Eq => (BinOp::Eq, 4),
            Token::Ne => (BinOp::Ne, 4),
            Token::Lt => (BinOp::Lt, 4),
            Token::Le => (BinOp::Le, 4),
            Token::Gt => (BinOp::Gt, 4),
            Token::Ge => (BinOp::Ge, 4),
            Token::Plus => (BinOp::Add, 5),
            Token::Minus => (BinOp::Sub, 5),
            Token::Star => (BinOp::Mul, 6),
            Token::Slash => (BinOp::Div, 6),
            _ => return None,
        };
        Some(op)
    }
}

/// Precedence of the `not` prefix: binds tighter than `and`, looser than
/// comparisons, so `not $.a = 1` reads as `not ($.a = 1)`.
const NOT_PRECEDENCE: u8 = 3;

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    dialect: Dialect,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>, dialect: Dialect) -> Self {
        Self {
            tokens,
            pos: 0,
            dialect,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Ast, ExprError> {
        let ast = self.expression(0)?;
        match self.peek() {
            Token::Eof => Ok(ast),
            other => Err(ExprError::Parse(format!("unexpected trailing token {other:?}"))),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        let got = self.advance();
        if got == expected {
            Ok(())
        } else {
            Err(ExprError::Parse(format!("expected {expected:?}, found {got:?}")))
        }
    }

    fn expression(&mut self, min_prec: u8) -> Result<Ast, ExprError> {
        let mut lhs = self.prefix()?;

        while let Some((op, prec)) = BinOp::from_token(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.expression(prec + 1)?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Ast, ExprError> {
        match self.peek() {
            Token::Not => {
                self.advance();
                let operand = self.expression(NOT_PRECEDENCE)?;
                Ok(Ast::Not(Box::new(operand)))
            }
            Token::Minus => {
                self.advance();
                let operand = self.prefix()?;
                Ok(Ast::Neg(Box::new(operand)))
            }
            _ => {
                let primary = self.primary()?;
                self.postfix(primary)
            }
        }
    }

    fn primary(&mut self) -> Result<Ast, ExprError> {
        match self.advance() {
            Token::Int(n) => Ok(Ast::Literal(Value::from(n))),
            Token::Float(f) => Ok(Ast::Literal(Value::from(f))),
            Token::Str(s) => Ok(Ast::Literal(Value::String(s))),
            Token::Dollar => Ok(Ast::Root),
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if *self.peek() == Token::LParen {
                    self.advance();
                    let args = self.arguments()?;
                    return Ok(Ast::Call(name, args));
                }
                Ok(self.identifier(name))
            }
            other => Err(ExprError::Parse(format!("unexpected token {other:?}"))),
        }
    }

    fn identifier(&self, name: String) -> Ast {
        match name.as_str() {
            "_" if self.dialect == Dialect::Jinja => Ast::Root,
            "true" | "True" => Ast::Literal(Value::Bool(true)),
            "false" | "False" => Ast::Literal(Value::Bool(false)),
            "null" | "none" | "None" => Ast::Literal(Value::Null),
            _ => Ast::Name(name),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Ast>, ExprError> {
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            match self.advance() {
                Token::Comma => continue,
                Token::RParen => break,
                other => {
                    return Err(ExprError::Parse(format!(
                        "expected ',' or ')' in argument list, found {other:?}"
                    )));
                }
            }
        }
        Ok(args)
    }

    fn postfix(&mut self, mut ast: Ast) -> Result<Ast, ExprError> {
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    match self.advance() {
                        Token::Ident(attr) => ast = Ast::Attr(Box::new(ast), attr),
                        other => {
                            return Err(ExprError::Parse(format!(
                                "expected attribute name after '.', found {other:?}"
                            )));
                        }
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.expression(0)?;
                    self.expect(Token::RBracket)?;
                    ast = Ast::Index(Box::new(ast), Box::new(index));
                }
                _ => return Ok(ast),
            }
        }
    }
}
