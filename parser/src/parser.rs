use std::collections::VecDeque;

use crate::ast::{
    Argument, AssignOp, BinaryOp, DictItem, Expr, ExprKind, Ident, IncDecOp,
    LogicalOp, Program, Stmt, StmtKind, UnaryOp,
};
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

/// An infix operator found while climbing precedence.
#[derive(Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Binding power of an infix token, low to high.
fn infix(kind: &TokenKind) -> Option<(u8, Infix)> {
    Some(match kind {
        TokenKind::PipePipe => (1, Infix::Logical(LogicalOp::Or)),
        TokenKind::AmpAmp => (2, Infix::Logical(LogicalOp::And)),
        TokenKind::Pipe => (3, Infix::Binary(BinaryOp::Or)),
        TokenKind::Caret => (4, Infix::Binary(BinaryOp::Xor)),
        TokenKind::Amp => (5, Infix::Binary(BinaryOp::And)),
        TokenKind::EqEq => (6, Infix::Binary(BinaryOp::Eql)),
        TokenKind::NotEq => (6, Infix::Binary(BinaryOp::Nql)),
        TokenKind::Lt => (7, Infix::Binary(BinaryOp::Lss)),
        TokenKind::Gt => (7, Infix::Binary(BinaryOp::Grt)),
        TokenKind::LtEq => (7, Infix::Binary(BinaryOp::Leq)),
        TokenKind::GtEq => (7, Infix::Binary(BinaryOp::Geq)),
        TokenKind::Shl => (8, Infix::Binary(BinaryOp::Shl)),
        TokenKind::Shr => (8, Infix::Binary(BinaryOp::Shr)),
        TokenKind::Plus => (9, Infix::Binary(BinaryOp::Add)),
        TokenKind::Minus => (9, Infix::Binary(BinaryOp::Sub)),
        TokenKind::Star => (10, Infix::Binary(BinaryOp::Mul)),
        TokenKind::Slash => (10, Infix::Binary(BinaryOp::Div)),
        TokenKind::Percent => (10, Infix::Binary(BinaryOp::Mod)),
        _ => return None,
    })
}

fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
    Some(match kind {
        TokenKind::Assign => AssignOp::Assign,
        TokenKind::PlusAssign => AssignOp::Add,
        TokenKind::MinusAssign => AssignOp::Sub,
        TokenKind::StarAssign => AssignOp::Mul,
        TokenKind::SlashAssign => AssignOp::Div,
        _ => return None,
    })
}

/// Recursive-descent parser over a token stream.
///
/// Comments are skipped. A lexer error token surfaces as a [`ParseError`]
/// carrying the lexer's message.
pub struct Parser<I: Iterator<Item = Token>> {
    tokens: I,
    lookahead: VecDeque<Token>,
    last_span: Span,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: I) -> Self {
        Self {
            tokens,
            lookahead: VecDeque::new(),
            last_span: Span::point(Pos::origin()),
        }
    }

    // ── token plumbing ─────────────────────────────────────────────

    fn fill(&mut self, n: usize) {
        while self.lookahead.len() <= n {
            match self.tokens.next() {
                Some(tok) if tok.is_comment() => continue,
                Some(tok) => self.lookahead.push_back(tok),
                None => {
                    let end = self
                        .lookahead
                        .back()
                        .map_or(self.last_span, |t| t.span);
                    self.lookahead.push_back(Token::new(
                        TokenKind::Eof,
                        Span::point(end.end),
                        "",
                    ));
                }
            }
        }
    }

    fn peek_nth(&mut self, n: usize) -> &Token {
        self.fill(n);
        &self.lookahead[n]
    }

    fn peek_kind(&mut self) -> &TokenKind {
        &self.peek_nth(0).kind
    }

    fn peek_span(&mut self) -> Span {
        self.peek_nth(0).span
    }

    fn advance(&mut self) -> Token {
        self.fill(0);
        let tok = match self.lookahead.pop_front() {
            Some(tok) => tok,
            None => Token::new(TokenKind::Eof, self.last_span, ""),
        };
        self.last_span = tok.span;
        tok
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<Token, ParseError> {
        let tok = self.advance();
        if std::mem::discriminant(&tok.kind) == std::mem::discriminant(expected)
        {
            Ok(tok)
        } else {
            Err(unexpected(&tok, expected.name()))
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Identifier(name) => Ok(Ident {
                name,
                span: tok.span,
            }),
            _ => Err(unexpected(&tok, "identifier")),
        }
    }

    // ── statements ─────────────────────────────────────────────────

    /// Parse the whole input as one compile unit.
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let start = self.peek_span();
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        let end = self.peek_span();
        Ok(Program {
            body,
            span: start.merge(end),
        })
    }

    pub fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek_span();
        match self.peek_kind().clone() {
            TokenKind::Break => {
                self.advance();
                let end = self.expect(&TokenKind::Semicolon)?.span;
                Ok(Stmt::new(StmtKind::Break, start.merge(end)))
            }
            TokenKind::Continue => {
                self.advance();
                let end = self.expect(&TokenKind::Semicolon)?.span;
                Ok(Stmt::new(StmtKind::Continue, start.merge(end)))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                let end = self.expect(&TokenKind::Semicolon)?.span;
                Ok(Stmt::new(StmtKind::Return(value), start.merge(end)))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let condition = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                let body = self.parse_statement()?;
                let span = start.merge(body.span);
                Ok(Stmt::new(
                    StmtKind::While {
                        condition,
                        body: Box::new(body),
                    },
                    span,
                ))
            }
            TokenKind::Import => {
                self.advance();
                let path = self.parse_expression()?;
                let alias = if self.eat(&TokenKind::As) {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                let end = self.expect(&TokenKind::Semicolon)?.span;
                Ok(Stmt::new(StmtKind::Import { path, alias }, start.merge(end)))
            }
            TokenKind::Function
                if matches!(self.peek_nth(1).kind, TokenKind::Identifier(_)) =>
            {
                self.parse_function_declaration()
            }
            TokenKind::LBrace => {
                let (body, span) = self.parse_block()?;
                Ok(Stmt::new(StmtKind::Compound(body), span))
            }
            _ => {
                let expr = self.parse_expression()?;
                let end = self.expect(&TokenKind::Semicolon)?.span;
                Ok(Stmt::new(StmtKind::Expr(expr), start.merge(end)))
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let start = self.advance().span;
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        let end = else_branch.as_ref().map_or(then_branch.span, |s| s.span);
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            start.merge(end),
        ))
    }

    /// `function name(params) { ... }` is sugar for
    /// `name = function(params) { ... };`.
    fn parse_function_declaration(&mut self) -> Result<Stmt, ParseError> {
        let start = self.advance().span;
        let name = self.expect_ident()?;
        let (params, body, end) = self.parse_function_rest()?;
        let span = start.merge(end);
        let function = Expr::new(ExprKind::Function { params, body }, span);
        let target = Expr::new(ExprKind::Ident(name.name), name.span);
        let assign = Expr::new(
            ExprKind::Assign {
                op: AssignOp::Assign,
                target: Box::new(target),
                value: Box::new(function),
            },
            span,
        );
        Ok(Stmt::new(StmtKind::Expr(assign), span))
    }

    fn parse_block(&mut self) -> Result<(Vec<Stmt>, Span), ParseError> {
        let start = self.expect(&TokenKind::LBrace)?.span;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                let tok = self.advance();
                return Err(unexpected(&tok, TokenKind::RBrace.name()));
            }
            body.push(self.parse_statement()?);
        }
        let end = self.advance().span;
        Ok((body, start.merge(end)))
    }

    /// Parameter list and body, after `function` (and the optional name).
    fn parse_function_rest(
        &mut self,
    ) -> Result<(Vec<Argument>, Vec<Stmt>, Span), ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut params: Vec<Argument> = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let ident = self.expect_ident()?;
                if params.iter().any(|p| p.name == ident.name) {
                    return Err(ParseError::new(
                        format!("duplicate parameter `{}`", ident.name),
                        ident.span,
                    ));
                }
                params.push(Argument {
                    name: ident.name,
                    span: ident.span,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        let (body, span) = self.parse_block()?;
        Ok((params, body, span))
    }

    // ── expressions ────────────────────────────────────────────────

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_binary(1)?;
        let Some(op) = assign_op(self.peek_kind()) else {
            return Ok(target);
        };
        let op_span = self.advance().span;
        if !target.is_assignable() {
            return Err(ParseError::new(
                "invalid assignment target",
                target.span.merge(op_span),
            ));
        }
        let value = self.parse_assignment()?;
        let span = target.span.merge(value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    /// Precedence climbing; every infix level is left-associative.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some((prec, op)) = infix(self.peek_kind()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let span = left.span.merge(right.span);
            let (left_box, right_box) = (Box::new(left), Box::new(right));
            left = match op {
                Infix::Binary(op) => Expr::new(
                    ExprKind::Binary {
                        op,
                        left: left_box,
                        right: right_box,
                    },
                    span,
                ),
                Infix::Logical(op) => Expr::new(
                    ExprKind::Logical {
                        op,
                        left: left_box,
                        right: right_box,
                    },
                    span,
                ),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Tilde => Some(UnaryOp::Inv),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance().span;
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }

        let op = match self.peek_kind() {
            TokenKind::PlusPlus => Some(IncDecOp::Inc),
            TokenKind::MinusMinus => Some(IncDecOp::Dec),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance().span;
            let target = self.parse_unary()?;
            return inc_dec(op, true, target, start);
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_list(&TokenKind::RParen, |p| {
                        p.parse_expression()
                    })?;
                    let end = self.last_span;
                    let span = expr.span.merge(end);
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    let end = self.expect(&TokenKind::RBracket)?.span;
                    let span = expr.span.merge(end);
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    let span = expr.span.merge(name.span);
                    expr = Expr::new(
                        ExprKind::Attribute {
                            object: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let tok = self.advance();
                    let op = if tok.kind == TokenKind::PlusPlus {
                        IncDecOp::Inc
                    } else {
                        IncDecOp::Dec
                    };
                    let start = expr.span;
                    expr = inc_dec(op, false, expr, start.merge(tok.span))?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.advance();
        let span = tok.span;
        let kind = match tok.kind {
            TokenKind::Integer(v) => ExprKind::Integer(v),
            TokenKind::Float(v) => ExprKind::Float(v),
            TokenKind::String(s) => ExprKind::String(s),
            TokenKind::True => ExprKind::True,
            TokenKind::False => ExprKind::False,
            TokenKind::Null => ExprKind::Null,
            TokenKind::Identifier(name) => ExprKind::Ident(name),
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                let end = self.expect(&TokenKind::RParen)?.span;
                return Ok(Expr::new(inner.kind, span.merge(end)));
            }
            TokenKind::LBracket => {
                let items = self.parse_list(&TokenKind::RBracket, |p| {
                    p.parse_expression()
                })?;
                return Ok(Expr::new(
                    ExprKind::Array(items),
                    span.merge(self.last_span),
                ));
            }
            TokenKind::LBrace => {
                let items =
                    self.parse_list(&TokenKind::RBrace, Self::parse_dict_item)?;
                return Ok(Expr::new(
                    ExprKind::Dict(items),
                    span.merge(self.last_span),
                ));
            }
            TokenKind::Function => {
                let (params, body, end) = self.parse_function_rest()?;
                return Ok(Expr::new(
                    ExprKind::Function { params, body },
                    span.merge(end),
                ));
            }
            TokenKind::Error(message) => {
                return Err(ParseError::new(message, span));
            }
            _ => return Err(unexpected(&tok, "expression")),
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_dict_item(&mut self) -> Result<DictItem, ParseError> {
        let tok = self.advance();
        let key = match tok.kind {
            TokenKind::String(s) => s,
            TokenKind::Identifier(s) => s,
            _ => return Err(unexpected(&tok, "dictionary key")),
        };
        self.expect(&TokenKind::Colon)?;
        let value = self.parse_expression()?;
        let span = tok.span.merge(value.span);
        Ok(DictItem { key, value, span })
    }

    /// Comma-separated items up to and including `close`; a trailing comma
    /// is allowed.
    fn parse_list<T>(
        &mut self,
        close: &TokenKind,
        mut item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(item(self)?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }
}

fn inc_dec(
    op: IncDecOp,
    prefix: bool,
    target: Expr,
    span: Span,
) -> Result<Expr, ParseError> {
    if !target.is_assignable() {
        let what = match op {
            IncDecOp::Inc => "increment",
            IncDecOp::Dec => "decrement",
        };
        return Err(ParseError::new(format!("invalid {what} target"), target.span));
    }
    let span = span.merge(target.span);
    Ok(Expr::new(
        ExprKind::IncDec {
            op,
            prefix,
            target: Box::new(target),
        },
        span,
    ))
}

fn unexpected(tok: &Token, expected: &str) -> ParseError {
    match &tok.kind {
        TokenKind::Error(message) => ParseError::new(message.clone(), tok.span),
        found => ParseError::new(
            format!("expected {expected}, found {}", found.name()),
            tok.span,
        ),
    }
}
