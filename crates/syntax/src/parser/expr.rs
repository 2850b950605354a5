//! Expression parsing: Pratt-style binding powers over the Lua 5.3 grammar.

use crate::ast::{BinOp, Expr, FuncBody, LuaValue, TableField, TableKey, UnOp};
use crate::lexer::{decode_string_lexeme, parse_number};
use crate::parser::{is_constant_table, vm_op_for_name, ParseError, Parser};
use crate::token::{Span, TokenKind};

/// Binding power of the operand of a unary operator. Every binary operator
/// except `^` binds looser than unary, matching Lua (`-a^b` is `-(a^b)`).
const UNARY_BP: u8 = 21;

/// Left/right binding powers for a binary operator token. A right-associative
/// operator has `right < left`.
fn binary_op(kind: TokenKind) -> Option<(BinOp, u8, u8)> {
    Some(match kind {
        TokenKind::Or => (BinOp::Or, 1, 2),
        TokenKind::And => (BinOp::And, 3, 4),
        TokenKind::Less => (BinOp::Lt, 5, 6),
        TokenKind::Greater => (BinOp::Gt, 5, 6),
        TokenKind::LessEq => (BinOp::Le, 5, 6),
        TokenKind::GreaterEq => (BinOp::Ge, 5, 6),
        TokenKind::NotEq => (BinOp::Ne, 5, 6),
        TokenKind::Eq => (BinOp::Eq, 5, 6),
        TokenKind::Pipe => (BinOp::BOr, 7, 8),
        TokenKind::Tilde => (BinOp::BXor, 9, 10),
        TokenKind::Ampersand => (BinOp::BAnd, 11, 12),
        TokenKind::ShiftLeft => (BinOp::Shl, 13, 14),
        TokenKind::ShiftRight => (BinOp::Shr, 13, 14),
        TokenKind::Concat => (BinOp::Concat, 16, 15),
        TokenKind::Plus => (BinOp::Add, 17, 18),
        TokenKind::Minus => (BinOp::Sub, 17, 18),
        TokenKind::Star => (BinOp::Mul, 19, 20),
        TokenKind::Slash => (BinOp::Div, 19, 20),
        TokenKind::DoubleSlash => (BinOp::IDiv, 19, 20),
        TokenKind::Percent => (BinOp::Mod, 19, 20),
        TokenKind::Caret => (BinOp::Pow, 24, 23),
        _ => return None,
    })
}

impl Parser<'_> {
    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(0)
    }

    /// Parse a comma-separated expression list (at least one expression).
    pub(crate) fn parse_expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.accept(TokenKind::Comma).is_some() {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_binary(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some((op, left_bp, right_bp)) = binary_op(self.peek().kind) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(right_bp)?;
            let span = lhs.span();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek();
        let op = match token.kind {
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Not => UnOp::Not,
            TokenKind::Hash => UnOp::Len,
            TokenKind::Tilde => UnOp::BNot,
            _ => return self.parse_suffixed(),
        };
        let span = token.span;
        self.bump();
        let operand = self.parse_binary(UNARY_BP)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    /// A primary expression followed by any number of `.name`, `[expr]`,
    /// call, and method-call suffixes.
    pub(crate) fn parse_suffixed(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.bump();
                    let (name, _, span) = self.expect_name()?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        key: Box::new(Expr::Literal {
                            value: LuaValue::Str(name.into_bytes()),
                            span,
                        }),
                        span,
                    };
                }
                TokenKind::LBracket => {
                    let span = self.bump().span;
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        key: Box::new(key),
                        span,
                    };
                }
                TokenKind::Colon => {
                    let span = self.bump().span;
                    let (method, _, _) = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    expr = Expr::MethodCall {
                        object: Box::new(expr),
                        method,
                        args,
                        span,
                    };
                }
                TokenKind::LParen | TokenKind::Str | TokenKind::EncryptedString | TokenKind::LBrace => {
                    let span = self.peek().span;
                    let args = self.parse_call_args()?;
                    expr = make_call(expr, args, span);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        match self.peek().kind {
            TokenKind::LParen => {
                self.bump();
                let args = if self.check(TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.expect(TokenKind::RParen, "')'")?;
                Ok(args)
            }
            // `f "arg"` and `f { ... }` sugar.
            TokenKind::Str | TokenKind::EncryptedString => {
                let arg = self.parse_primary()?;
                Ok(vec![arg])
            }
            TokenKind::LBrace => Ok(vec![self.parse_table()?]),
            _ => {
                let found = self.peek();
                Err(ParseError::new(found.span, "call arguments", found.describe()))
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let span = token.span;
        match token.kind {
            TokenKind::Nil => {
                self.bump();
                Ok(Expr::Literal {
                    value: LuaValue::Nil,
                    span,
                })
            }
            TokenKind::True | TokenKind::False => {
                self.bump();
                Ok(Expr::Literal {
                    value: LuaValue::Boolean(token.kind == TokenKind::True),
                    span,
                })
            }
            TokenKind::Number => {
                self.bump();
                let value = parse_number(&token.lexeme)
                    .ok_or_else(|| ParseError::new(span, "a number", format!("'{}'", token.lexeme)))?;
                Ok(Expr::Literal { value, span })
            }
            TokenKind::Str => {
                self.bump();
                Ok(Expr::Literal {
                    value: LuaValue::Str(decode_string_lexeme(&token.lexeme)),
                    span,
                })
            }
            TokenKind::EncryptedString => {
                self.bump();
                Ok(Expr::EncryptedString {
                    raw: decode_string_lexeme(&token.lexeme),
                    method: None,
                    span,
                })
            }
            TokenKind::Ellipsis => {
                self.bump();
                Ok(Expr::Vararg { span })
            }
            TokenKind::Function => {
                self.bump();
                let body = self.parse_func_body()?;
                Ok(Expr::Function { body, span })
            }
            TokenKind::Name | TokenKind::ObfuscatedName => {
                let (name, obfuscated, span) = self.expect_name()?;
                Ok(Expr::Name {
                    name,
                    obfuscated,
                    span,
                })
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBrace => self.parse_table(),
            _ => Err(ParseError::new(span, "an expression", token.describe())),
        }
    }

    /// Table constructor: `[expr]=v`, `name=v`, and positional fields,
    /// separated by `,` or `;`.
    pub(crate) fn parse_table(&mut self) -> Result<Expr, ParseError> {
        let span = self.expect(TokenKind::LBrace, "'{'")?.span;
        let mut fields = Vec::new();
        loop {
            if self.check(TokenKind::RBrace) {
                break;
            }
            let field = match self.peek().kind {
                TokenKind::LBracket => {
                    self.bump();
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    self.expect(TokenKind::Assign, "'='")?;
                    TableField {
                        key: TableKey::Expr(key),
                        value: self.parse_expr()?,
                    }
                }
                kind if kind.is_name() && self.peek_ahead(1).kind == TokenKind::Assign => {
                    let (name, _, _) = self.expect_name()?;
                    self.bump();
                    TableField {
                        key: TableKey::Name(name),
                        value: self.parse_expr()?,
                    }
                }
                _ => TableField {
                    key: TableKey::List,
                    value: self.parse_expr()?,
                },
            };
            fields.push(field);
            if self.accept(TokenKind::Comma).is_none() && self.accept(TokenKind::Semicolon).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        let constant_table = is_constant_table(&fields);
        Ok(Expr::Table {
            fields,
            constant_table,
            span,
        })
    }

    /// Parameter list and body: `( params ) block end`.
    pub(crate) fn parse_func_body(&mut self) -> Result<FuncBody, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if !self.check(TokenKind::RParen) {
            loop {
                if self.accept(TokenKind::Ellipsis).is_some() {
                    is_vararg = true;
                    break;
                }
                let (name, _, _) = self.expect_name()?;
                params.push(name);
                if self.accept(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let block = self.parse_block()?;
        self.expect(TokenKind::End, "'end'")?;
        Ok(FuncBody {
            params,
            is_vararg,
            block,
        })
    }
}

/// Build a call expression, annotating VM-dispatch lookalikes.
fn make_call(callee: Expr, args: Vec<Expr>, span: Span) -> Expr {
    let callee_name = match &callee {
        Expr::Name { name, .. } => Some(name.as_str()),
        Expr::Index { key, .. } => match key.as_ref() {
            Expr::Literal {
                value: LuaValue::Str(bytes),
                ..
            } => std::str::from_utf8(bytes).ok(),
            _ => None,
        },
        _ => None,
    };
    let vm_op = callee_name.and_then(vm_op_for_name);
    Expr::Call {
        callee: Box::new(callee),
        args,
        vm_call: vm_op.is_some(),
        vm_op,
        span,
    }
}
