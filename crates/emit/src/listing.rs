//! Readable source listing of a reconstructed prototype.
//!
//! Renders each instruction as the Lua statement it implements, with
//! constants inlined and jump targets turned into labels. This is a
//! rendering of recovered semantics, not a decompiler: opcodes without a
//! statement form become comments carrying their mnemonic.

use std::collections::BTreeSet;
use std::fmt::Write;

use luminol_bytecode::{Constant, Instruction, OpCode, Proto};

/// Render a prototype as Lua-flavored source text.
pub fn render_listing(proto: &Proto) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "local R = {{}}");

    let targets = jump_targets(&proto.code);

    for (pc, insn) in proto.code.iter().enumerate() {
        if targets.contains(&pc) {
            let _ = writeln!(out, "::pc_{}::", pc);
        }
        let _ = writeln!(out, "{}", render_instruction(pc, insn, &proto.constants));
    }
    out
}

fn jump_targets(code: &[Instruction]) -> BTreeSet<usize> {
    let mut targets = BTreeSet::new();
    for (pc, insn) in code.iter().enumerate() {
        if insn.op == OpCode::Jmp {
            if let Some(sbx) = insn.sbx {
                let target = pc as i64 + 1 + sbx as i64;
                if (0..code.len() as i64).contains(&target) {
                    targets.insert(target as usize);
                }
            }
        }
    }
    targets
}

fn render_instruction(pc: usize, insn: &Instruction, constants: &[Constant]) -> String {
    let a = insn.a;
    match insn.op {
        OpCode::Move => format!("R[{}] = R[{}]", a, insn.b),
        OpCode::LoadK => {
            let display = insn
                .bx
                .and_then(|bx| constants.get(bx as usize))
                .map(Constant::display)
                .unwrap_or_else(|| "nil".to_string());
            format!("R[{}] = {}", a, display)
        }
        OpCode::LoadBool => format!("R[{}] = {}", a, insn.b != 0),
        OpCode::LoadNil => format!("R[{}] = nil", a),
        OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow
        | OpCode::IDiv => {
            let symbol = match insn.op {
                OpCode::Add => "+",
                OpCode::Sub => "-",
                OpCode::Mul => "*",
                OpCode::Div => "/",
                OpCode::Mod => "%",
                OpCode::Pow => "^",
                _ => "//",
            };
            format!("R[{}] = R[{}] {} R[{}]", a, insn.b, symbol, insn.c)
        }
        OpCode::Concat => format!("R[{}] = R[{}] .. R[{}]", a, insn.b, insn.c),
        OpCode::GetTable => format!("R[{}] = R[{}][R[{}]]", a, insn.b, insn.c),
        OpCode::SetTable => format!("R[{}][R[{}]] = R[{}]", a, insn.b, insn.c),
        OpCode::NewTable => format!("R[{}] = {{}}", a),
        OpCode::Call => {
            let argc = insn.b.saturating_sub(1);
            let args: Vec<String> = (1..=argc).map(|i| format!("R[{}]", a as u16 + i)).collect();
            format!("R[{}]({})", a, args.join(", "))
        }
        OpCode::Return => "return".to_string(),
        OpCode::Jmp => {
            let target = pc as i64 + 1 + insn.sbx.unwrap_or(0) as i64;
            format!("goto pc_{}", target.max(0))
        }
        other => format!("-- {} {} {} {}", other.mnemonic(), a, insn.b, insn.c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminol_bytecode::Instruction;

    #[test]
    fn test_listing_basic() {
        let mut proto = Proto::new("@test");
        proto.constants.push(Constant::Str(b"print".to_vec()));
        proto.code.push(Instruction::abx(OpCode::LoadK, 0, 0));
        proto.code.push(Instruction::abc(OpCode::Move, 1, 0, 0));
        proto.code.push(Instruction::abc(OpCode::Call, 0, 2, 2));
        proto.code.push(Instruction::abc(OpCode::Return, 0, 1, 0));
        let listing = render_listing(&proto);
        assert!(listing.contains("R[0] = \"print\""));
        assert!(listing.contains("R[1] = R[0]"));
        assert!(listing.contains("R[0](R[1])"));
        assert!(listing.ends_with("return\n"));
    }

    #[test]
    fn test_jump_renders_label() {
        let mut proto = Proto::new("@test");
        proto.code.push(Instruction::asbx(OpCode::Jmp, 0, 1));
        proto.code.push(Instruction::abc(OpCode::Move, 0, 1, 0));
        proto.code.push(Instruction::abc(OpCode::Return, 0, 1, 0));
        let listing = render_listing(&proto);
        assert!(listing.contains("goto pc_2"));
        assert!(listing.contains("::pc_2::"));
    }
}
