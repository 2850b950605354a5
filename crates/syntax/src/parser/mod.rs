//! Recursive-descent parser for Lua 5.3 with Luraph annotations.
//!
//! Expressions use Pratt-style binding powers; statements recover from
//! errors by resynchronizing at the next statement keyword or semicolon.
//! Only an unexpected end of input is fatal.

mod expr;
mod stmt;

use thiserror::Error;

use crate::ast::{Block, Expr, FuncBody, Stmt, TableField, VmOp};
use crate::token::{Span, Token, TokenKind};

/// A position-tagged parse error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("parse error at {line}:{column}: expected {expected}, got {got}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub expected: String,
    pub got: String,
}

impl ParseError {
    fn new(span: Span, expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self {
            line: span.line,
            column: span.column,
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Whether this error hit the end of input inside a construct. Such
    /// errors cannot be recovered by resynchronizing.
    pub fn is_eof(&self) -> bool {
        self.got == "<eof>"
    }
}

/// Parse a token stream into a chunk-level block.
///
/// Recovered (non-fatal) errors are dropped here; use [`Parser`] directly to
/// inspect them.
pub fn parse(tokens: &[Token]) -> Result<Block, ParseError> {
    let mut parser = Parser::new(tokens);
    parser.parse_chunk()
}

pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Errors recovered mid-parse; the tree has gaps where these occurred.
    pub recovered: Vec<ParseError>,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            recovered: Vec::new(),
        }
    }

    fn eof_token(&self) -> &'t Token {
        // scan_all always terminates the stream with Eof.
        self.tokens.last().expect("token stream must end with Eof")
    }

    /// Next token including newlines.
    pub(crate) fn peek_raw(&self) -> &'t Token {
        self.tokens.get(self.pos).unwrap_or_else(|| self.eof_token())
    }

    /// Next meaningful token, skipping newlines.
    pub(crate) fn peek(&self) -> &'t Token {
        let mut i = self.pos;
        while let Some(t) = self.tokens.get(i) {
            if t.kind != TokenKind::Newline {
                return t;
            }
            i += 1;
        }
        self.eof_token()
    }

    /// Meaningful token `n` places ahead (0 = same as `peek`).
    pub(crate) fn peek_ahead(&self, n: usize) -> &'t Token {
        let mut remaining = n;
        let mut i = self.pos;
        while let Some(t) = self.tokens.get(i) {
            if t.kind != TokenKind::Newline {
                if remaining == 0 {
                    return t;
                }
                remaining -= 1;
            }
            i += 1;
        }
        self.eof_token()
    }

    /// Consume and return the next meaningful token.
    pub(crate) fn bump(&mut self) -> Token {
        while self.peek_raw().kind == TokenKind::Newline {
            self.pos += 1;
        }
        let token = self.peek_raw().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    /// Consume the next token if it has the given kind.
    pub(crate) fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    /// Consume a token of the given kind or fail with a tagged error.
    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.bump())
        } else {
            let found = self.peek();
            Err(ParseError::new(found.span, what, found.describe()))
        }
    }

    /// Consume an identifier (plain or obfuscated) and return its text.
    pub(crate) fn expect_name(&mut self) -> Result<(String, bool, Span), ParseError> {
        let token = self.peek();
        if token.kind.is_name() {
            let obfuscated = token.kind == TokenKind::ObfuscatedName;
            let token = self.bump();
            Ok((token.lexeme, obfuscated, token.span))
        } else {
            Err(ParseError::new(token.span, "a name", token.describe()))
        }
    }

    /// Skip ahead to the next plausible statement boundary.
    pub(crate) fn synchronize(&mut self) {
        loop {
            let kind = self.peek().kind;
            if kind == TokenKind::Semicolon {
                self.bump();
                return;
            }
            if kind.starts_statement() || kind.ends_block() {
                return;
            }
            self.bump();
        }
    }
}

/// Whether a function name fits the VM-handler naming patterns:
/// `handler_<digits>`, `vm_<word>`, `op_<word>`, `exec_<word>`, or 16+ chars.
pub(crate) fn handler_name_pattern(name: &str) -> bool {
    if let Some(rest) = name.strip_prefix("handler_") {
        if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
            return true;
        }
    }
    for prefix in ["vm_", "op_", "exec_"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                return true;
            }
        }
    }
    name.len() >= 16
}

/// The VM operation suggested by a callee name, if any.
pub(crate) fn vm_op_for_name(name: &str) -> Option<VmOp> {
    let lower = name.to_ascii_lowercase();
    if lower.contains("loadk") {
        Some(VmOp::LoadK)
    } else if lower.contains("move") {
        Some(VmOp::Move)
    } else if lower.contains("call") {
        Some(VmOp::Call)
    } else if lower.contains("jmp") {
        Some(VmOp::Jmp)
    } else {
        None
    }
}

/// Dense literal pools: 6+ fields, every value a literal or encrypted string.
pub(crate) fn is_constant_table(fields: &[TableField]) -> bool {
    fields.len() >= 6
        && fields
            .iter()
            .all(|f| matches!(f.value, Expr::Literal { .. } | Expr::EncryptedString { .. }))
}

/// Whether a function body contains a call that looks like VM dispatch:
/// a callee matching the handler name patterns, or a 3+-argument call whose
/// callee name is longer than 15 characters.
pub(crate) fn body_suggests_handler(block: &Block) -> bool {
    block.stmts.iter().any(stmt_has_dispatch_call)
}

fn stmt_has_dispatch_call(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Assign { targets, values, .. } => {
            targets.iter().any(expr_has_dispatch_call) || values.iter().any(expr_has_dispatch_call)
        }
        Stmt::Call { call, .. } => expr_has_dispatch_call(call),
        Stmt::Do { block, .. } => body_suggests_handler(block),
        Stmt::While { cond, body, .. } => expr_has_dispatch_call(cond) || body_suggests_handler(body),
        Stmt::Repeat { body, cond, .. } => body_suggests_handler(body) || expr_has_dispatch_call(cond),
        Stmt::If { arms, else_block, .. } => {
            arms.iter()
                .any(|(cond, block)| expr_has_dispatch_call(cond) || body_suggests_handler(block))
                || else_block.as_ref().is_some_and(body_suggests_handler)
        }
        Stmt::NumericFor {
            start, stop, step, body, ..
        } => {
            expr_has_dispatch_call(start)
                || expr_has_dispatch_call(stop)
                || step.as_ref().is_some_and(expr_has_dispatch_call)
                || body_suggests_handler(body)
        }
        Stmt::GenericFor { exprs, body, .. } => {
            exprs.iter().any(expr_has_dispatch_call) || body_suggests_handler(body)
        }
        Stmt::FunctionDecl { body, .. } => body_suggests_handler(&body.block),
        Stmt::Return { exprs, .. } => exprs.iter().any(expr_has_dispatch_call),
        Stmt::Break { .. } | Stmt::Goto { .. } | Stmt::Label { .. } => false,
    }
}

fn expr_has_dispatch_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call { callee, args, .. } => {
            let name_hit = match callee.as_name() {
                Some(name) => handler_name_pattern(name) || (args.len() >= 3 && name.len() > 15),
                None => false,
            };
            name_hit
                || expr_has_dispatch_call(callee)
                || args.iter().any(expr_has_dispatch_call)
        }
        Expr::MethodCall { object, args, .. } => {
            expr_has_dispatch_call(object) || args.iter().any(expr_has_dispatch_call)
        }
        Expr::Unary { operand, .. } => expr_has_dispatch_call(operand),
        Expr::Binary { lhs, rhs, .. } => expr_has_dispatch_call(lhs) || expr_has_dispatch_call(rhs),
        Expr::Index { object, key, .. } => expr_has_dispatch_call(object) || expr_has_dispatch_call(key),
        Expr::Function { body, .. } => body_suggests_handler(&body.block),
        Expr::Table { fields, .. } => fields.iter().any(|f| {
            expr_has_dispatch_call(&f.value)
                || matches!(&f.key, crate::ast::TableKey::Expr(k) if expr_has_dispatch_call(k))
        }),
        Expr::Literal { .. } | Expr::Name { .. } | Expr::Vararg { .. } | Expr::EncryptedString { .. } => false,
    }
}

pub(crate) fn func_decl(
    name: String,
    body: FuncBody,
    is_local: bool,
    span: Span,
) -> Stmt {
    let vm_handler = handler_name_pattern(&name) || body_suggests_handler(&body.block);
    Stmt::FunctionDecl {
        name,
        body,
        is_local,
        vm_handler,
        handler_index: None,
        span,
    }
}
