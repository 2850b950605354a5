//! Bytecode-level cleanup passes.
//!
//! Run in order to a fixed point: self-move removal, dead LOADK stores,
//! duplicated arithmetic, constant deduplication, and reachability-based
//! dead-code elimination. A final accounting pass computes `max_stack`.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use rustc_hash::FxHashMap;

use luminol_bytecode::{Constant, Instruction, OpCode, Proto};

pub fn optimize(proto: &mut Proto) {
    loop {
        let mut changed = false;
        changed |= remove_self_moves(proto);
        changed |= remove_dead_loadk(proto);
        changed |= remove_duplicate_arith(proto);
        changed |= dedup_constants(proto);
        changed |= eliminate_dead_code(proto);
        if !changed {
            break;
        }
    }
    proto.max_stack = compute_max_stack(&proto.code);
}

/// Pass 1: `MOVE a, a` is a no-op.
fn remove_self_moves(proto: &mut Proto) -> bool {
    let doomed: Vec<usize> = proto
        .code
        .iter()
        .enumerate()
        .filter(|(_, i)| i.op == OpCode::Move && i.b as u32 == i.a as u32)
        .map(|(pc, _)| pc)
        .collect();
    remove_instructions(proto, &doomed)
}

/// Pass 2: a LOADK overwritten by the next LOADK into the same register is
/// a dead store.
fn remove_dead_loadk(proto: &mut Proto) -> bool {
    let mut doomed = Vec::new();
    for pc in 0..proto.code.len().saturating_sub(1) {
        let (first, second) = (&proto.code[pc], &proto.code[pc + 1]);
        if first.op == OpCode::LoadK && second.op == OpCode::LoadK && first.a == second.a {
            doomed.push(pc);
        }
    }
    remove_instructions(proto, &doomed)
}

/// Pass 3: consecutive identical arithmetic instructions collapse to one.
fn remove_duplicate_arith(proto: &mut Proto) -> bool {
    let mut doomed = Vec::new();
    for pc in 0..proto.code.len().saturating_sub(1) {
        let (first, second) = (&proto.code[pc], &proto.code[pc + 1]);
        if is_arith(first.op)
            && first.op == second.op
            && first.a == second.a
            && first.b == second.b
            && first.c == second.c
        {
            doomed.push(pc + 1);
        }
    }
    // Runs of three or more: the scan above may doom overlapping pairs;
    // dooming an instruction twice is harmless, dedup keeps indices unique.
    doomed.dedup();
    remove_instructions(proto, &doomed)
}

fn is_arith(op: OpCode) -> bool {
    matches!(
        op,
        OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Pow
            | OpCode::IDiv
            | OpCode::Concat
    )
}

/// Pass 4: collapse `(type, value)`-equal constants and remap LOADK.
fn dedup_constants(proto: &mut Proto) -> bool {
    let mut first_slot: FxHashMap<ConstKey, u32> = FxHashMap::default();
    let mut remap: Vec<u32> = Vec::with_capacity(proto.constants.len());
    let mut kept: Vec<Constant> = Vec::new();

    for constant in &proto.constants {
        let key = ConstKey::from(constant);
        match first_slot.get(&key) {
            Some(&slot) => remap.push(slot),
            None => {
                let slot = kept.len() as u32;
                first_slot.insert(key, slot);
                kept.push(constant.clone());
                remap.push(slot);
            }
        }
    }

    if kept.len() == proto.constants.len() {
        return false;
    }

    for insn in &mut proto.code {
        if insn.op == OpCode::LoadK {
            if let Some(bx) = insn.bx {
                insn.bx = Some(remap.get(bx as usize).copied().unwrap_or(bx));
            }
        }
    }
    proto.constants = kept;
    true
}

/// Constant identity for deduplication. Floats key on their bit pattern so
/// the pass stays total (NaN merges with NaN).
#[derive(Hash, PartialEq, Eq)]
enum ConstKey {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(u64),
    Str(Vec<u8>),
}

impl From<&Constant> for ConstKey {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Nil => ConstKey::Nil,
            Constant::Boolean(b) => ConstKey::Boolean(*b),
            Constant::Integer(i) => ConstKey::Integer(*i),
            Constant::Float(f) => ConstKey::Float(f.to_bits()),
            Constant::Str(s) => ConstKey::Str(s.clone()),
        }
    }
}

/// Pass 5: forward reachability from pc 0. JMP contributes its target,
/// RETURN contributes nothing, everything else falls through.
fn eliminate_dead_code(proto: &mut Proto) -> bool {
    let len = proto.code.len();
    if len == 0 {
        return false;
    }

    let mut graph: DiGraph<(), ()> = DiGraph::with_capacity(len, len);
    for _ in 0..len {
        graph.add_node(());
    }
    for (pc, insn) in proto.code.iter().enumerate() {
        for succ in successors(pc, insn) {
            if succ < len {
                graph.add_edge(NodeIndex::new(pc), NodeIndex::new(succ), ());
            }
        }
    }

    let mut reachable = vec![false; len];
    let mut dfs = Dfs::new(&graph, NodeIndex::new(0));
    while let Some(node) = dfs.next(&graph) {
        reachable[node.index()] = true;
    }

    let doomed: Vec<usize> = (0..len).filter(|&pc| !reachable[pc]).collect();
    remove_instructions(proto, &doomed)
}

fn successors(pc: usize, insn: &Instruction) -> Vec<usize> {
    match insn.op {
        OpCode::Return => Vec::new(),
        OpCode::Jmp => {
            let sbx = insn.sbx.unwrap_or(0) as i64;
            let target = pc as i64 + 1 + sbx;
            if target >= 0 {
                vec![target as usize]
            } else {
                Vec::new()
            }
        }
        _ => vec![pc + 1],
    }
}

/// Rule 6: stack accounting. The highest written register plus one, the
/// CALL argument and result windows, floored at 2.
fn compute_max_stack(code: &[Instruction]) -> u8 {
    let mut max = 2i64;
    for insn in code {
        let a = insn.a as i64;
        if insn.op.writes_a() {
            max = max.max(a + 1);
        }
        if insn.op == OpCode::Call {
            let b = insn.b as i64;
            let c = insn.c as i64;
            if b > 0 {
                max = max.max(a + b - 1);
            }
            if c > 0 {
                max = max.max(a + c - 1);
            }
        }
    }
    max.min(255) as u8
}

/// Remove the instructions at `doomed` (sorted, unique) and repair every
/// JMP offset to keep targets stable. Jumps into a removed region land on
/// the next surviving instruction.
fn remove_instructions(proto: &mut Proto, doomed: &[usize]) -> bool {
    if doomed.is_empty() {
        return false;
    }

    let len = proto.code.len();
    // new_index[i] = position of instruction i after removal; for removed
    // or past-the-end positions, the next surviving position.
    let mut new_index = vec![0usize; len + 1];
    let mut removed = vec![false; len];
    for &pc in doomed {
        removed[pc] = true;
    }
    let mut kept = 0usize;
    for pc in 0..len {
        new_index[pc] = kept;
        if !removed[pc] {
            kept += 1;
        }
    }
    new_index[len] = kept;

    let old_code = std::mem::take(&mut proto.code);
    let mut code = Vec::with_capacity(kept);
    for (pc, mut insn) in old_code.into_iter().enumerate() {
        if removed[pc] {
            continue;
        }
        if insn.op == OpCode::Jmp {
            if let Some(sbx) = insn.sbx {
                let target = (pc as i64 + 1 + sbx as i64).clamp(0, len as i64) as usize;
                let new_pc = new_index[pc] as i64;
                let new_target = new_index[target] as i64;
                insn.sbx = Some((new_target - new_pc - 1) as i32);
            }
        }
        code.push(insn);
    }
    proto.code = code;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proto_with(code: Vec<Instruction>, constants: Vec<Constant>) -> Proto {
        let mut proto = Proto::new("@test");
        proto.code = code;
        proto.constants = constants;
        proto
    }

    fn abc(op: OpCode, a: u8, b: u16, c: u16) -> Instruction {
        Instruction::abc(op, a, b, c)
    }

    #[test]
    fn test_self_move_removed() {
        let mut proto = proto_with(
            vec![abc(OpCode::Move, 1, 1, 0), abc(OpCode::Return, 0, 1, 0)],
            vec![],
        );
        optimize(&mut proto);
        assert_eq!(proto.code.len(), 1);
        assert_eq!(proto.code[0].op, OpCode::Return);
    }

    #[test]
    fn test_dead_loadk_removed() {
        let mut proto = proto_with(
            vec![
                Instruction::abx(OpCode::LoadK, 0, 0),
                Instruction::abx(OpCode::LoadK, 0, 1),
                abc(OpCode::Return, 0, 1, 0),
            ],
            vec![Constant::Integer(1), Constant::Integer(2)],
        );
        optimize(&mut proto);
        assert_eq!(proto.code.len(), 2);
        assert_eq!(proto.code[0].bx, Some(1));
    }

    #[test]
    fn test_duplicate_arith_removed() {
        let mut proto = proto_with(
            vec![
                abc(OpCode::Add, 0, 1, 2),
                abc(OpCode::Add, 0, 1, 2),
                abc(OpCode::Return, 0, 1, 0),
            ],
            vec![],
        );
        optimize(&mut proto);
        assert_eq!(proto.code.len(), 2);
    }

    #[test]
    fn test_constant_dedup_remaps_loadk() {
        let mut proto = proto_with(
            vec![
                Instruction::abx(OpCode::LoadK, 0, 0),
                Instruction::abx(OpCode::LoadK, 1, 2),
                abc(OpCode::Return, 0, 1, 0),
            ],
            vec![
                Constant::Str(b"print".to_vec()),
                Constant::Integer(7),
                Constant::Str(b"print".to_vec()),
            ],
        );
        optimize(&mut proto);
        assert_eq!(proto.constants.len(), 2);
        assert_eq!(proto.code[1].bx, Some(0));
    }

    #[test]
    fn test_unreachable_code_removed() {
        let mut proto = proto_with(
            vec![
                abc(OpCode::Return, 0, 1, 0),
                abc(OpCode::Move, 0, 1, 0),
                abc(OpCode::Move, 0, 2, 0),
            ],
            vec![],
        );
        optimize(&mut proto);
        assert_eq!(proto.code.len(), 1);
    }

    #[test]
    fn test_jump_offsets_repaired() {
        // JMP over a self-move: after the move is removed the offset
        // shrinks to zero.
        let mut proto = proto_with(
            vec![
                Instruction::asbx(OpCode::Jmp, 0, 1),
                abc(OpCode::Move, 2, 2, 0),
                abc(OpCode::Return, 0, 1, 0),
            ],
            vec![],
        );
        optimize(&mut proto);
        assert_eq!(proto.code.len(), 2);
        assert_eq!(proto.code[0].op, OpCode::Jmp);
        assert_eq!(proto.code[0].sbx, Some(0));
    }

    #[test]
    fn test_max_stack() {
        let mut proto = proto_with(
            vec![
                abc(OpCode::Move, 5, 1, 0),
                abc(OpCode::Call, 3, 4, 2),
                abc(OpCode::Return, 0, 1, 0),
            ],
            vec![],
        );
        optimize(&mut proto);
        // MOVE writes r5 (6), CALL window 3+4-1 = 6.
        assert_eq!(proto.max_stack, 6);
    }

    #[test]
    fn test_max_stack_floor() {
        let mut proto = proto_with(vec![abc(OpCode::Return, 0, 1, 0)], vec![]);
        optimize(&mut proto);
        assert_eq!(proto.max_stack, 2);
    }
}
