//! Bounded symbolic execution of handler bodies.
//!
//! Interprets a handler over abstract values to discover the one VM
//! operation it implements. Register and constant accesses are recognized
//! through the `R[i]` / `K[i]` indexing convention; everything else becomes
//! an opaque value. The executor never loops: a hard step cap bounds the
//! number of interpreted statements.

use rustc_hash::FxHashMap;

use luminol_bytecode::OpCode;
use luminol_syntax::ast::{BinOp, Block, Expr, LuaValue, Stmt};

/// Maximum number of statements interpreted per handler.
pub const STEP_CAP: usize = 1000;

/// An abstract value tracked by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum SymValue {
    /// Contents of register `i` at entry.
    Register(i64),
    /// Contents of constant slot `i`.
    Constant(i64),
    /// A concrete literal.
    Value(LuaValue),
    /// Anything the executor cannot track.
    Opaque,
}

/// Mutable interpretation state for one handler body.
#[derive(Debug, Default)]
pub struct SymbolicContext {
    pub registers: FxHashMap<i64, SymValue>,
    pub constants: FxHashMap<i64, SymValue>,
    pub globals: FxHashMap<String, SymValue>,
    pub pc: usize,
    steps: usize,
}

/// A fully-resolved instruction emission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    pub op: OpCode,
    pub a: i32,
    pub b: i32,
    pub c: i32,
}

/// Execute a handler body and return the last completed emission.
pub fn execute(body: &Block) -> Option<Emission> {
    let mut ctx = SymbolicContext::default();
    let mut last = None;
    run_block(body, &mut ctx, &mut last);
    last
}

fn run_block(block: &Block, ctx: &mut SymbolicContext, last: &mut Option<Emission>) {
    for stmt in &block.stmts {
        if ctx.steps >= STEP_CAP {
            return;
        }
        ctx.steps += 1;
        ctx.pc += 1;
        run_stmt(stmt, ctx, last);
    }
}

fn run_stmt(stmt: &Stmt, ctx: &mut SymbolicContext, last: &mut Option<Emission>) {
    match stmt {
        Stmt::Assign { targets, values, .. } => {
            if targets.len() == 1 && values.len() == 1 {
                run_assign(&targets[0], &values[0], ctx, last);
            }
        }
        Stmt::Call { call, .. } => {
            if let Some(emission) = call_emission(call) {
                *last = Some(emission);
            }
        }
        Stmt::Return { .. } => {
            *last = Some(Emission {
                op: OpCode::Return,
                a: 0,
                b: 1,
                c: 0,
            });
        }
        // Straight-line interpretation only: nested control flow is walked
        // for its body statements, conditions are not evaluated.
        Stmt::Do { block, .. } => run_block(block, ctx, last),
        Stmt::If { arms, else_block, .. } => {
            for (_, block) in arms {
                run_block(block, ctx, last);
            }
            if let Some(block) = else_block {
                run_block(block, ctx, last);
            }
        }
        Stmt::While { body, .. } | Stmt::Repeat { body, .. } => run_block(body, ctx, last),
        Stmt::NumericFor { body, .. } | Stmt::GenericFor { body, .. } => run_block(body, ctx, last),
        _ => {}
    }
}

fn run_assign(target: &Expr, value: &Expr, ctx: &mut SymbolicContext, last: &mut Option<Emission>) {
    // Only register stores emit; plain name assignments update globals.
    if let Expr::Name { name, .. } = target {
        ctx.globals.insert(name.clone(), eval(value, ctx));
        return;
    }

    let Some(a) = register_index(target) else {
        // Not a register store (table writes through other names, etc).
        return;
    };
    if a < 0 {
        // Dynamically-indexed register: assign index -1 and skip.
        ctx.registers.insert(-1, SymValue::Opaque);
        return;
    }

    match value {
        Expr::Index { .. } => {
            if let Some(b) = register_index(value) {
                if b >= 0 {
                    ctx.registers.insert(a, SymValue::Register(b));
                    *last = Some(Emission {
                        op: OpCode::Move,
                        a: a as i32,
                        b: b as i32,
                        c: 0,
                    });
                }
                return;
            }
            if let Some(b) = constant_index(value) {
                if b >= 0 {
                    ctx.registers.insert(a, SymValue::Constant(b));
                    *last = Some(Emission {
                        op: OpCode::LoadK,
                        a: a as i32,
                        b: b as i32,
                        c: 0,
                    });
                }
                return;
            }
            ctx.registers.insert(a, SymValue::Opaque);
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let Some(opcode) = arith_opcode(*op) else {
                ctx.registers.insert(a, SymValue::Opaque);
                return;
            };
            let b = register_index(lhs).unwrap_or(-1);
            let c = register_index(rhs).unwrap_or(-1);
            if b < 0 || c < 0 {
                ctx.registers.insert(a, SymValue::Opaque);
                return;
            }
            ctx.registers.insert(a, SymValue::Opaque);
            *last = Some(Emission {
                op: opcode,
                a: a as i32,
                b: b as i32,
                c: c as i32,
            });
        }
        Expr::Literal { value: lit, .. } => {
            ctx.registers.insert(a, SymValue::Value(lit.clone()));
        }
        _ => {
            ctx.registers.insert(a, SymValue::Opaque);
        }
    }
}

/// `R[a](args...)` in statement position emits CALL a, #args+1, 2.
fn call_emission(call: &Expr) -> Option<Emission> {
    let Expr::Call { callee, args, .. } = call else {
        return None;
    };
    let a = register_index(callee)?;
    if a < 0 {
        return None;
    }
    Some(Emission {
        op: OpCode::Call,
        a: a as i32,
        b: args.len() as i32 + 1,
        c: 2,
    })
}

fn eval(expr: &Expr, ctx: &SymbolicContext) -> SymValue {
    match expr {
        Expr::Literal { value, .. } => SymValue::Value(value.clone()),
        Expr::Index { .. } => {
            if let Some(i) = register_index(expr) {
                if i >= 0 {
                    return ctx
                        .registers
                        .get(&i)
                        .cloned()
                        .unwrap_or(SymValue::Register(i));
                }
            }
            if let Some(i) = constant_index(expr) {
                if i >= 0 {
                    return SymValue::Constant(i);
                }
            }
            SymValue::Opaque
        }
        _ => SymValue::Opaque,
    }
}

/// Extract `i` from `R[i]`. Returns `-1` for a dynamic index, `None` when
/// the expression is not a register access at all.
pub fn register_index(expr: &Expr) -> Option<i64> {
    indexed_access(expr, "R")
}

/// Extract `i` from `K[i]`, with the same conventions.
pub fn constant_index(expr: &Expr) -> Option<i64> {
    indexed_access(expr, "K")
}

fn indexed_access(expr: &Expr, table: &str) -> Option<i64> {
    let Expr::Index { object, key, .. } = expr else {
        return None;
    };
    if object.as_name() != Some(table) {
        return None;
    }
    match key.as_ref() {
        Expr::Literal {
            value: LuaValue::Int(i),
            ..
        } => Some(*i),
        Expr::Literal {
            value: LuaValue::Float(f),
            ..
        } if f.fract() == 0.0 => Some(*f as i64),
        _ => Some(-1),
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
    fn test_move() {
        let emission = execute(&body("R[0] = R[1]")).unwrap();
        assert_eq!(emission, Emission { op: OpCode::Move, a: 0, b: 1, c: 0 });
    }

    #[test]
    fn test_loadk() {
        let emission = execute(&body("R[2] = K[5]")).unwrap();
        assert_eq!(emission, Emission { op: OpCode::LoadK, a: 2, b: 5, c: 0 });
    }

    #[test]
    fn test_arith() {
        let emission = execute(&body("R[0] = R[1] + R[2]")).unwrap();
        assert_eq!(emission, Emission { op: OpCode::Add, a: 0, b: 1, c: 2 });
        let emission = execute(&body("R[3] = R[4] .. R[5]")).unwrap();
        assert_eq!(emission.op, OpCode::Concat);
    }

    #[test]
    fn test_call() {
        let emission = execute(&body("R[0](R[1], R[2])")).unwrap();
        assert_eq!(emission, Emission { op: OpCode::Call, a: 0, b: 3, c: 2 });
    }

    #[test]
    fn test_return() {
        let emission = execute(&body("do return end")).unwrap();
        assert_eq!(emission, Emission { op: OpCode::Return, a: 0, b: 1, c: 0 });
    }

    #[test]
    fn test_dynamic_index_skipped() {
        // R[i] with a non-literal index is skipped; the MOVE before it wins.
        let emission = execute(&body("R[0] = R[1]\nR[i] = R[2]")).unwrap();
        assert_eq!(emission.op, OpCode::Move);
        assert_eq!(emission.b, 1);
    }

    #[test]
    fn test_last_emission_wins() {
        let emission = execute(&body("R[0] = R[1]\nR[0] = K[3]")).unwrap();
        assert_eq!(emission.op, OpCode::LoadK);
    }

    #[test]
    fn test_unrecognized_body_yields_nothing() {
        assert!(execute(&body("x = y")).is_none());
        assert!(execute(&body("local a = 1")).is_none());
    }
}
