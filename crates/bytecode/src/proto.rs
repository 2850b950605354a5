use crate::constant::Constant;
use crate::instruction::Instruction;
use crate::opcode::OpCode;

/// An upvalue descriptor.
///
/// `in_stack` means the upvalue captures a register of the enclosing
/// function; otherwise `index` names an upvalue slot of the enclosing
/// function.
#[derive(Debug, Clone, PartialEq)]
pub struct UpvalDesc {
    pub name: Option<String>,
    pub in_stack: bool,
    pub index: u8,
}

/// A reconstructed Lua 5.3 function prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct Proto {
    pub source: String,
    pub line_defined: u32,
    pub last_line_defined: u32,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack: u8,
    pub code: Vec<Instruction>,
    pub constants: Vec<Constant>,
    pub upvalues: Vec<UpvalDesc>,
    pub protos: Vec<Proto>,
}

impl Proto {
    /// An empty prototype with the minimum legal stack size.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            line_defined: 0,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: true,
            max_stack: 2,
            code: Vec::new(),
            constants: Vec::new(),
            upvalues: Vec::new(),
            protos: Vec::new(),
        }
    }

    /// Check the structural invariants the emitter relies on.
    ///
    /// - `max_stack` is at least 2
    /// - every LOADK indexes a valid constant
    /// - every JMP lands on a valid pc
    /// - every CLOSURE indexes a valid nested proto
    pub fn validate(&self) -> Result<(), String> {
        if self.max_stack < 2 {
            return Err(format!("max_stack {} below minimum of 2", self.max_stack));
        }
        for (pc, insn) in self.code.iter().enumerate() {
            match insn.op {
                OpCode::LoadK => {
                    let bx = insn.bx.ok_or_else(|| format!("LOADK at pc {} missing bx", pc))?;
                    if bx as usize >= self.constants.len() {
                        return Err(format!(
                            "LOADK at pc {} indexes constant {} of {}",
                            pc,
                            bx,
                            self.constants.len()
                        ));
                    }
                }
                OpCode::Jmp => {
                    let sbx = insn.sbx.ok_or_else(|| format!("JMP at pc {} missing sbx", pc))?;
                    let target = pc as i64 + 1 + sbx as i64;
                    if target < 0 || target > self.code.len() as i64 {
                        return Err(format!("JMP at pc {} targets invalid pc {}", pc, target));
                    }
                }
                OpCode::Closure => {
                    let bx = insn.bx.ok_or_else(|| format!("CLOSURE at pc {} missing bx", pc))?;
                    if bx as usize >= self.protos.len() {
                        return Err(format!(
                            "CLOSURE at pc {} indexes proto {} of {}",
                            pc,
                            bx,
                            self.protos.len()
                        ));
                    }
                }
                _ => {}
            }
        }
        for nested in &self.protos {
            nested.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    #[test]
    fn test_validate_empty() {
        assert!(Proto::new("@test").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_small_stack() {
        let mut p = Proto::new("@test");
        p.max_stack = 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_loadk_bounds() {
        let mut p = Proto::new("@test");
        p.code.push(Instruction::abx(OpCode::LoadK, 0, 0));
        assert!(p.validate().is_err());
        p.constants.push(Constant::Integer(1));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_jmp_bounds() {
        let mut p = Proto::new("@test");
        p.code.push(Instruction::asbx(OpCode::Jmp, 0, 5));
        assert!(p.validate().is_err());
        p.code[0] = Instruction::asbx(OpCode::Jmp, 0, -1);
        assert!(p.validate().is_ok());
    }
}
