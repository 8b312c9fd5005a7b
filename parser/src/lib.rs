//! # Parser
//!
//! The tern front end: a streaming lexer and a recursive-descent parser
//! producing a spanned AST.
//!
//! ## Architecture
//!
//! ```text
//!  impl Read (file, &[u8], …)
//!      │
//!      ▼
//!  ┌────────┐    Token stream     ┌────────┐
//!  │ Lexer  │ ──────────────────▶ │ Parser │ ──────▶ Program
//!  └────────┘  (impl Iterator)    └────────┘
//! ```
//!
//! ```rust
//! let program = parser::parse("x = 1 + 2; print(x);").unwrap();
//! assert_eq!(program.body.len(), 2);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

pub use ast::{
    Argument, AssignOp, BinaryOp, DictItem, Expr, ExprKind, Ident, IncDecOp,
    LogicalOp, Program, Stmt, StmtKind, UnaryOp,
};
pub use lexer::Lexer;
pub use parser::{ParseError, Parser};
pub use span::{Pos, Span};
pub use token::{Token, TokenKind};

/// Lex and parse a complete source text.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    Parser::new(Lexer::from_str(source)).parse_program()
}
