//! Instruction reconstruction.
//!
//! Lifts each analyzed handler to Lua 5.3 instructions (one per handler
//! today, but lifting returns a sequence so macro-op handlers stay
//! representable), then runs the peephole and dead-code passes.

pub mod pattern;
pub mod peephole;

use luminol_bytecode::{Instruction, OpCode, Proto, UpvalDesc};
use luminol_vm::symbolic::Emission;
use luminol_vm::{Analysis, Handler};

/// Result of reconstruction: the main prototype plus per-handler warnings.
#[derive(Debug)]
pub struct Reconstructed {
    pub proto: Proto,
    pub warnings: Vec<String>,
    /// Handlers that produced at least one real (non-placeholder) instruction.
    pub recovered: usize,
}

/// Lift all handlers into a single prototype.
///
/// Handlers are processed in index order; the handler index becomes the
/// instruction's line so the original dispatch order stays visible in the
/// debug info.
pub fn reconstruct(analysis: &Analysis, source_name: &str) -> Reconstructed {
    let mut warnings = Vec::new();
    let mut recovered = 0usize;
    let mut code = Vec::with_capacity(analysis.handlers.len() + 1);

    for handler in &analysis.handlers {
        let (instructions, ok) = lift_handler(handler);
        if ok {
            recovered += 1;
        } else {
            log::warn!("handler {} ({}): no recognizable body", handler.index, handler.name);
            warnings.push(format!(
                "handler {} ({}): unrecognized body, emitted MOVE 0 0 0",
                handler.index, handler.name
            ));
        }
        code.extend(instructions);
    }

    // A chunk must end in RETURN for the interpreter's dispatch loop.
    let needs_return = code.last().map_or(true, |i: &Instruction| i.op != OpCode::Return);
    if needs_return {
        let line = analysis.handlers.last().map_or(0, |h| h.index);
        code.push(Instruction::abc(OpCode::Return, 0, 1, 0).with_line(line));
    }

    let mut proto = Proto::new(source_name);
    proto.code = code;
    proto.constants = analysis.constants.clone();
    proto.upvalues = vec![UpvalDesc {
        name: Some("_ENV".to_string()),
        in_stack: true,
        index: 0,
    }];
    proto.last_line_defined = 0;

    peephole::optimize(&mut proto);

    Reconstructed {
        proto,
        warnings,
        recovered,
    }
}

/// Lift one handler to its instruction sequence.
///
/// Cascade: the analyzer's symbolic emission, then the regex pattern pass
/// over the (decrypted) body text, then the name-derived opcode alone, and
/// finally a `MOVE 0 0 0` placeholder. The `bool` reports whether a real
/// lift happened.
pub fn lift_handler(handler: &Handler) -> (Vec<Instruction>, bool) {
    if let Some(emission) = handler.emission {
        return (vec![build_instruction(emission, handler.index)], true);
    }

    let body = handler.decrypted_code.as_deref().unwrap_or(&handler.body_code);
    if let Some(emission) = pattern::match_body(body) {
        return (vec![build_instruction(emission, handler.index)], true);
    }

    if let Some(op) = handler.opcode {
        let emission = Emission { op, a: 0, b: 0, c: 0 };
        return (vec![build_instruction(emission, handler.index)], true);
    }

    (
        vec![Instruction::abc(OpCode::Move, 0, 0, 0).with_line(handler.index)],
        false,
    )
}

/// Shape an emission into the opcode's encoding form.
fn build_instruction(emission: Emission, line: u32) -> Instruction {
    let a = emission.a.clamp(0, u8::MAX as i32) as u8;
    let insn = match emission.op {
        OpCode::LoadK | OpCode::LoadKx | OpCode::Closure => {
            Instruction::abx(emission.op, a, emission.b.max(0) as u32)
        }
        OpCode::Jmp | OpCode::ForLoop | OpCode::ForPrep | OpCode::TForLoop => {
            Instruction::asbx(emission.op, a, emission.b)
        }
        OpCode::ExtraArg => Instruction::ax(emission.op, emission.a.max(0) as u32),
        _ => Instruction::abc(
            emission.op,
            a,
            emission.b.clamp(0, 0x1FF) as u16,
            emission.c.clamp(0, 0x1FF) as u16,
        ),
    };
    insn.with_line(line)
}
