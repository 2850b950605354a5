//! Statement parsing and block-level error recovery.

use crate::ast::{Block, Expr, Stmt};
use crate::parser::{func_decl, ParseError, Parser};
use crate::token::TokenKind;

impl Parser<'_> {
    /// Parse a whole chunk. Leftover tokens after the top-level block are
    /// recovered as errors rather than aborting.
    pub fn parse_chunk(&mut self) -> Result<Block, ParseError> {
        let mut block = self.parse_block()?;
        while !self.check(TokenKind::Eof) {
            let found = self.peek();
            self.recovered
                .push(ParseError::new(found.span, "a statement", found.describe()));
            self.bump();
            let more = self.parse_block()?;
            block.stmts.extend(more.stmts);
        }
        Ok(block)
    }

    /// Parse statements until a block terminator (`end`, `else`, `elseif`,
    /// `until`, or end of input). `return` always ends the block.
    pub(crate) fn parse_block(&mut self) -> Result<Block, ParseError> {
        let span = self.peek().span;
        let mut stmts = Vec::new();
        loop {
            while self.accept(TokenKind::Semicolon).is_some() {}
            let kind = self.peek().kind;
            if kind.ends_block() {
                break;
            }
            if kind == TokenKind::Return {
                stmts.push(self.parse_return()?);
                while self.accept(TokenKind::Semicolon).is_some() {}
                break;
            }
            match self.parse_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(e) if e.is_eof() => return Err(e),
                Err(e) => {
                    self.recovered.push(e);
                    self.synchronize();
                }
            }
        }
        Ok(Block { stmts, span })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let token = self.peek();
        let span = token.span;
        match token.kind {
            TokenKind::Local => {
                self.bump();
                if self.check(TokenKind::Function) {
                    self.bump();
                    let (name, _, _) = self.expect_name()?;
                    let body = self.parse_func_body()?;
                    Ok(func_decl(name, body, true, span))
                } else {
                    let mut targets = Vec::new();
                    loop {
                        let (name, obfuscated, name_span) = self.expect_name()?;
                        targets.push(Expr::Name {
                            name,
                            obfuscated,
                            span: name_span,
                        });
                        if self.accept(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                    let values = if self.accept(TokenKind::Assign).is_some() {
                        self.parse_expr_list()?
                    } else {
                        Vec::new()
                    };
                    Ok(Stmt::Assign {
                        targets,
                        values,
                        is_local: true,
                        span,
                    })
                }
            }
            TokenKind::Function => {
                self.bump();
                let name = self.parse_func_name()?;
                let body = self.parse_func_body()?;
                Ok(func_decl(name, body, false, span))
            }
            TokenKind::If => {
                self.bump();
                let mut arms = Vec::new();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Then, "'then'")?;
                arms.push((cond, self.parse_block()?));
                let mut else_block = None;
                loop {
                    match self.peek().kind {
                        TokenKind::Elseif => {
                            self.bump();
                            let cond = self.parse_expr()?;
                            self.expect(TokenKind::Then, "'then'")?;
                            arms.push((cond, self.parse_block()?));
                        }
                        TokenKind::Else => {
                            self.bump();
                            else_block = Some(self.parse_block()?);
                            break;
                        }
                        _ => break,
                    }
                }
                self.expect(TokenKind::End, "'end'")?;
                Ok(Stmt::If {
                    arms,
                    else_block,
                    span,
                })
            }
            TokenKind::While => {
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Do, "'do'")?;
                let body = self.parse_block()?;
                self.expect(TokenKind::End, "'end'")?;
                Ok(Stmt::While { cond, body, span })
            }
            TokenKind::Repeat => {
                self.bump();
                let body = self.parse_block()?;
                self.expect(TokenKind::Until, "'until'")?;
                let cond = self.parse_expr()?;
                Ok(Stmt::Repeat { body, cond, span })
            }
            TokenKind::For => {
                self.bump();
                let (first, _, _) = self.expect_name()?;
                if self.accept(TokenKind::Assign).is_some() {
                    let start = self.parse_expr()?;
                    self.expect(TokenKind::Comma, "','")?;
                    let stop = self.parse_expr()?;
                    let step = if self.accept(TokenKind::Comma).is_some() {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    self.expect(TokenKind::Do, "'do'")?;
                    let body = self.parse_block()?;
                    self.expect(TokenKind::End, "'end'")?;
                    Ok(Stmt::NumericFor {
                        var: first,
                        start,
                        stop,
                        step,
                        body,
                        span,
                    })
                } else {
                    let mut names = vec![first];
                    while self.accept(TokenKind::Comma).is_some() {
                        let (name, _, _) = self.expect_name()?;
                        names.push(name);
                    }
                    self.expect(TokenKind::In, "'in'")?;
                    let exprs = self.parse_expr_list()?;
                    self.expect(TokenKind::Do, "'do'")?;
                    let body = self.parse_block()?;
                    self.expect(TokenKind::End, "'end'")?;
                    Ok(Stmt::GenericFor {
                        names,
                        exprs,
                        body,
                        span,
                    })
                }
            }
            TokenKind::Do => {
                self.bump();
                let block = self.parse_block()?;
                self.expect(TokenKind::End, "'end'")?;
                Ok(Stmt::Do { block, span })
            }
            TokenKind::Break => {
                self.bump();
                Ok(Stmt::Break { span })
            }
            TokenKind::Goto => {
                self.bump();
                let (label, _, _) = self.expect_name()?;
                Ok(Stmt::Goto { label, span })
            }
            TokenKind::DoubleColon => {
                self.bump();
                let (name, _, _) = self.expect_name()?;
                self.expect(TokenKind::DoubleColon, "'::'")?;
                Ok(Stmt::Label { name, span })
            }
            _ => self.parse_expr_statement(),
        }
    }

    /// `a.b.c:d` function names, joined with their separators.
    fn parse_func_name(&mut self) -> Result<String, ParseError> {
        let (mut name, _, _) = self.expect_name()?;
        while self.accept(TokenKind::Dot).is_some() {
            let (part, _, _) = self.expect_name()?;
            name.push('.');
            name.push_str(&part);
        }
        if self.accept(TokenKind::Colon).is_some() {
            let (part, _, _) = self.expect_name()?;
            name.push(':');
            name.push_str(&part);
        }
        Ok(name)
    }

    /// Assignment or call statement.
    fn parse_expr_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.peek().span;
        let first = self.parse_suffixed()?;

        if self.check(TokenKind::Assign) || self.check(TokenKind::Comma) {
            let mut targets = vec![first];
            while self.accept(TokenKind::Comma).is_some() {
                targets.push(self.parse_suffixed()?);
            }
            self.expect(TokenKind::Assign, "'='")?;
            for target in &targets {
                if !matches!(target, Expr::Name { .. } | Expr::Index { .. }) {
                    return Err(ParseError::new(
                        target.span(),
                        "an assignable expression",
                        "an expression",
                    ));
                }
            }
            let values = self.parse_expr_list()?;
            return Ok(Stmt::Assign {
                targets,
                values,
                is_local: false,
                span,
            });
        }

        match first {
            Expr::Call { .. } | Expr::MethodCall { .. } => Ok(Stmt::Call { call: first, span }),
            other => Err(ParseError::new(
                other.span(),
                "a statement",
                "an expression",
            )),
        }
    }

    /// `return [explist]`. The expression list is bounded by a newline: a
    /// line break directly after `return` means a bare return.
    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let span = self.bump().span;
        let next_raw = self.peek_raw().kind;
        let next = self.peek().kind;
        let exprs = if next_raw == TokenKind::Newline
            || next == TokenKind::Semicolon
            || next.ends_block()
        {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        Ok(Stmt::Return { exprs, span })
    }
}

