//! Opcode inference: name heuristics, then body pattern, then symbolic
//! execution. The first rule that fires wins.

use luminol_bytecode::OpCode;
use luminol_syntax::ast::{BinOp, Block, Expr, Stmt};

use crate::symbolic::{self, constant_index, register_index};

/// Run the inference cascade over a handler.
pub fn infer_opcode(name: &str, body: &Block) -> Option<OpCode> {
    name_heuristic(name)
        .or_else(|| body_pattern(body))
        .or_else(|| symbolic::execute(body).map(|e| e.op))
}

/// Opcode suggested by substrings of the handler name.
///
/// `get`+`table` and `set`+`table` are checked before the bare `table` rule,
/// otherwise it would shadow them.
pub fn name_heuristic(name: &str) -> Option<OpCode> {
    let n = name.to_ascii_lowercase();
    let has = |s: &str| n.contains(s);

    Some(if has("move") || has("copy") {
        OpCode::Move
    } else if (has("load") && has("const")) || has("loadk") {
        OpCode::LoadK
    } else if has("load") && has("bool") {
        OpCode::LoadBool
    } else if has("load") && has("nil") {
        OpCode::LoadNil
    } else if has("call") {
        OpCode::Call
    } else if has("return") {
        OpCode::Return
    } else if has("jump") || has("jmp") {
        OpCode::Jmp
    } else if has("add") {
        OpCode::Add
    } else if has("sub") {
        OpCode::Sub
    } else if has("mul") {
        OpCode::Mul
    } else if has("div") {
        OpCode::Div
    } else if has("mod") {
        OpCode::Mod
    } else if has("pow") {
        OpCode::Pow
    } else if has("concat") {
        OpCode::Concat
    } else if has("get") && has("table") {
        OpCode::GetTable
    } else if has("set") && has("table") {
        OpCode::SetTable
    } else if has("newtable") || has("table") {
        OpCode::NewTable
    } else {
        return None;
    })
}

/// Opcode suggested by the shape of the first statement in the body.
pub fn body_pattern(body: &Block) -> Option<OpCode> {
    match body.stmts.first()? {
        Stmt::Assign { targets, values, .. } => {
            let target = targets.first()?;
            register_index(target)?;
            match values.first()? {
                value @ Expr::Index { .. } => {
                    if register_index(value).is_some() {
                        Some(OpCode::Move)
                    } else if constant_index(value).is_some() {
                        Some(OpCode::LoadK)
                    } else {
                        None
                    }
                }
                Expr::Binary { op, .. } => arith_opcode(*op),
                _ => None,
            }
        }
        Stmt::Call { call, .. } => match call {
            Expr::Call { callee, .. } if register_index(callee).is_some() => Some(OpCode::Call),
            _ => None,
        },
        Stmt::Return { .. } => Some(OpCode::Return),
        _ => None,
    }
}

fn arith_opcode(op: BinOp) -> Option<OpCode> {
    Some(match op {
        BinOp::Add => OpCode::Add,
        BinOp::Sub => OpCode::Sub,
        BinOp::Mul => OpCode::Mul,
        BinOp::Div => OpCode::Div,
        BinOp::Mod => OpCode::Mod,
        BinOp::Pow => OpCode::Pow,
        BinOp::Concat => OpCode::Concat,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminol_syntax::{lexer::Lexer, parser};

    fn body(src: &str) -> Block {
        let tokens = Lexer::scan_all(src.as_bytes());
        parser::parse(&tokens).expect("test body must parse")
    }

    #[test]
    fn test_name_heuristics() {
        assert_eq!(name_heuristic("vm_move_reg"), Some(OpCode::Move));
        assert_eq!(name_heuristic("op_copy"), Some(OpCode::Move));
        assert_eq!(name_heuristic("load_constant"), Some(OpCode::LoadK));
        assert_eq!(name_heuristic("loadk_7"), Some(OpCode::LoadK));
        assert_eq!(name_heuristic("load_bool_x"), Some(OpCode::LoadBool));
        assert_eq!(name_heuristic("exec_call"), Some(OpCode::Call));
        assert_eq!(name_heuristic("do_jmp"), Some(OpCode::Jmp));
        assert_eq!(name_heuristic("handler_add"), Some(OpCode::Add));
        assert_eq!(name_heuristic("get_table_field"), Some(OpCode::GetTable));
        assert_eq!(name_heuristic("set_table_field"), Some(OpCode::SetTable));
        assert_eq!(name_heuristic("make_table"), Some(OpCode::NewTable));
        assert_eq!(name_heuristic("handler_1"), None);
    }

    #[test]
    fn test_body_patterns() {
        assert_eq!(body_pattern(&body("R[0] = R[1]")), Some(OpCode::Move));
        assert_eq!(body_pattern(&body("R[0] = K[2]")), Some(OpCode::LoadK));
        assert_eq!(body_pattern(&body("R[0] = R[1] * R[2]")), Some(OpCode::Mul));
        assert_eq!(body_pattern(&body("R[3](R[4])")), Some(OpCode::Call));
        assert_eq!(body_pattern(&body("return 1")), Some(OpCode::Return));
        assert_eq!(body_pattern(&body("x = 1")), None);
    }

    #[test]
    fn test_cascade_order() {
        // A misleading name wins over the body.
        let b = body("R[0] = R[1]");
        assert_eq!(infer_opcode("vm_add", &b), Some(OpCode::Add));
        // No name hint: the body decides.
        assert_eq!(infer_opcode("handler_3", &b), Some(OpCode::Move));
        // Neither: symbolic execution picks up multi-statement bodies.
        let b = body("local t = 1\nR[0] = K[1]");
        assert_eq!(infer_opcode("handler_9", &b), Some(OpCode::LoadK));
    }
}
