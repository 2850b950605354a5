//! Tolerant Lua 5.3 front-end for Luraph-protected sources.
//!
//! The lexer never fails: bytes it cannot place become `Unknown` tokens.
//! The parser builds an annotated AST, marking suspected VM handlers,
//! packed constant pools, and encrypted string literals as it goes.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{BinOp, Block, Expr, FuncBody, LuaValue, Stmt, TableField, TableKey, UnOp, VmOp};
pub use lexer::Lexer;
pub use parser::{parse, ParseError, Parser};
pub use token::{Span, Token, TokenKind};
