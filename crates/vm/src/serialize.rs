//! Compact one-line serialization of handler bodies.
//!
//! The analyzer stores each handler's body as text so the reconstructor can
//! run its pattern fallback without holding AST references across passes.

use luminol_syntax::ast::{Block, Expr, LuaValue, Stmt, TableKey};

/// Render a block as a single line, statements joined by `; `.
pub fn body_to_string(block: &Block) -> String {
    let parts: Vec<String> = block.stmts.iter().map(stmt_to_string).collect();
    parts.join("; ")
}

fn stmt_to_string(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Assign {
            targets,
            values,
            is_local,
            ..
        } => {
            let prefix = if *is_local { "local " } else { "" };
            let lhs = join_exprs(targets);
            if values.is_empty() {
                format!("{}{}", prefix, lhs)
            } else {
                format!("{}{} = {}", prefix, lhs, join_exprs(values))
            }
        }
        Stmt::Call { call, .. } => expr_to_string(call),
        Stmt::Do { block, .. } => format!("do {} end", body_to_string(block)),
        Stmt::While { cond, body, .. } => {
            format!("while {} do {} end", expr_to_string(cond), body_to_string(body))
        }
        Stmt::Repeat { body, cond, .. } => {
            format!("repeat {} until {}", body_to_string(body), expr_to_string(cond))
        }
        Stmt::If { arms, else_block, .. } => {
            let mut out = String::new();
            for (i, (cond, block)) in arms.iter().enumerate() {
                let kw = if i == 0 { "if" } else { " elseif" };
                out.push_str(&format!("{} {} then {}", kw, expr_to_string(cond), body_to_string(block)));
            }
            if let Some(block) = else_block {
                out.push_str(&format!(" else {}", body_to_string(block)));
            }
            out.push_str(" end");
            out
        }
        Stmt::NumericFor {
            var,
            start,
            stop,
            step,
            body,
            ..
        } => {
            let step_part = match step {
                Some(e) => format!(", {}", expr_to_string(e)),
                None => String::new(),
            };
            format!(
                "for {} = {}, {}{} do {} end",
                var,
                expr_to_string(start),
                expr_to_string(stop),
                step_part,
                body_to_string(body)
            )
        }
        Stmt::GenericFor { names, exprs, body, .. } => format!(
            "for {} in {} do {} end",
            names.join(", "),
            join_exprs(exprs),
            body_to_string(body)
        ),
        Stmt::FunctionDecl { name, body, is_local, .. } => {
            let prefix = if *is_local { "local " } else { "" };
            format!(
                "{}function {}({}) {} end",
                prefix,
                name,
                body.params.join(", "),
                body_to_string(&body.block)
            )
        }
        Stmt::Return { exprs, .. } => {
            if exprs.is_empty() {
                "return".to_string()
            } else {
                format!("return {}", join_exprs(exprs))
            }
        }
        Stmt::Break { .. } => "break".to_string(),
        Stmt::Goto { label, .. } => format!("goto {}", label),
        Stmt::Label { name, .. } => format!("::{}::", name),
    }
}

fn join_exprs(exprs: &[Expr]) -> String {
    exprs.iter().map(expr_to_string).collect::<Vec<_>>().join(", ")
}

fn expr_to_string(expr: &Expr) -> String {
    match expr {
        Expr::Literal { value, .. } => literal_to_string(value),
        Expr::Name { name, .. } => name.clone(),
        Expr::Vararg { .. } => "...".to_string(),
        Expr::Unary { op, operand, .. } => format!("{}{}", op.symbol(), expr_to_string(operand)),
        Expr::Binary { op, lhs, rhs, .. } => format!(
            "{} {} {}",
            expr_to_string(lhs),
            op.symbol(),
            expr_to_string(rhs)
        ),
        Expr::Index { object, key, .. } => match key.as_ref() {
            Expr::Literal {
                value: LuaValue::Str(bytes),
                ..
            } if is_identifier(bytes) => {
                format!("{}.{}", expr_to_string(object), String::from_utf8_lossy(bytes))
            }
            _ => format!("{}[{}]", expr_to_string(object), expr_to_string(key)),
        },
        Expr::Call { callee, args, .. } => {
            format!("{}({})", expr_to_string(callee), join_exprs(args))
        }
        Expr::MethodCall { object, method, args, .. } => {
            format!("{}:{}({})", expr_to_string(object), method, join_exprs(args))
        }
        Expr::Function { body, .. } => format!(
            "function({}) {} end",
            body.params.join(", "),
            body_to_string(&body.block)
        ),
        Expr::Table { fields, .. } => {
            let parts: Vec<String> = fields
                .iter()
                .map(|f| match &f.key {
                    TableKey::List => expr_to_string(&f.value),
                    TableKey::Name(name) => format!("{} = {}", name, expr_to_string(&f.value)),
                    TableKey::Expr(key) => {
                        format!("[{}] = {}", expr_to_string(key), expr_to_string(&f.value))
                    }
                })
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
        Expr::EncryptedString { raw, .. } => literal_to_string(&LuaValue::Str(raw.clone())),
    }
}

fn literal_to_string(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Int(i) => i.to_string(),
        LuaValue::Float(f) => format!("{}", f),
        LuaValue::Str(bytes) => {
            let mut out = String::with_capacity(bytes.len() + 2);
            out.push('"');
            for &b in bytes.iter() {
                match b {
                    b'"' => out.push_str("\\\""),
                    b'\\' => out.push_str("\\\\"),
                    b'\n' => out.push_str("\\n"),
                    0x20..=0x7E => out.push(b as char),
                    _ => out.push_str(&format!("\\x{:02X}", b)),
                }
            }
            out.push('"');
            out
        }
    }
}

fn is_identifier(bytes: &[u8]) -> bool {
    !bytes.is_empty()
        && (bytes[0].is_ascii_alphabetic() || bytes[0] == b'_')
        && bytes.iter().all(|&b| b.is_ascii_alphanumeric() || b == b'_')
}
