/// Lua 5.3 opcodes.
///
/// Each variant documents the instruction format and operand usage, following
/// the notation of lopcodes.h: `R(x)` is a register, `K(x)` a constant,
/// `RK(x)` a register or constant, `U[x]` an upvalue.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// MOVE: R(A) := R(B)
    Move = 0,
    /// LOADK: R(A) := K(Bx)
    LoadK = 1,
    /// LOADKX: R(A) := K(extra arg); followed by EXTRAARG
    LoadKx = 2,
    /// LOADBOOL: R(A) := (bool)B; if C, pc++
    LoadBool = 3,
    /// LOADNIL: R(A), ..., R(A+B) := nil
    LoadNil = 4,
    /// GETUPVAL: R(A) := U[B]
    GetUpval = 5,
    /// GETTABUP: R(A) := U[B][RK(C)]
    GetTabUp = 6,
    /// GETTABLE: R(A) := R(B)[RK(C)]
    GetTable = 7,
    /// SETTABUP: U[A][RK(B)] := RK(C)
    SetTabUp = 8,
    /// SETUPVAL: U[B] := R(A)
    SetUpval = 9,
    /// SETTABLE: R(A)[RK(B)] := RK(C)
    SetTable = 10,
    /// NEWTABLE: R(A) := {} (B = array size hint, C = hash size hint)
    NewTable = 11,
    /// SELF: R(A+1) := R(B); R(A) := R(B)[RK(C)]
    Self_ = 12,
    /// ADD: R(A) := RK(B) + RK(C)
    Add = 13,
    /// SUB: R(A) := RK(B) - RK(C)
    Sub = 14,
    /// MUL: R(A) := RK(B) * RK(C)
    Mul = 15,
    /// MOD: R(A) := RK(B) % RK(C)
    Mod = 16,
    /// POW: R(A) := RK(B) ^ RK(C)
    Pow = 17,
    /// DIV: R(A) := RK(B) / RK(C)
    Div = 18,
    /// IDIV: R(A) := RK(B) // RK(C)
    IDiv = 19,
    /// BAND: R(A) := RK(B) & RK(C)
    BAnd = 20,
    /// BOR: R(A) := RK(B) | RK(C)
    BOr = 21,
    /// BXOR: R(A) := RK(B) ~ RK(C)
    BXor = 22,
    /// SHL: R(A) := RK(B) << RK(C)
    Shl = 23,
    /// SHR: R(A) := RK(B) >> RK(C)
    Shr = 24,
    /// UNM: R(A) := -R(B)
    Unm = 25,
    /// BNOT: R(A) := ~R(B)
    BNot = 26,
    /// NOT: R(A) := not R(B)
    Not = 27,
    /// LEN: R(A) := #R(B)
    Len = 28,
    /// CONCAT: R(A) := R(B) .. ... .. R(C)
    Concat = 29,
    /// JMP: pc += sBx; if A, close upvalues >= A-1
    Jmp = 30,
    /// EQ: if (RK(B) == RK(C)) != A then pc++
    Eq = 31,
    /// LT: if (RK(B) < RK(C)) != A then pc++
    Lt = 32,
    /// LE: if (RK(B) <= RK(C)) != A then pc++
    Le = 33,
    /// TEST: if (bool)R(A) != C then pc++
    Test = 34,
    /// TESTSET: if (bool)R(B) == C then R(A) := R(B) else pc++
    TestSet = 35,
    /// CALL: R(A), ..., R(A+C-2) := R(A)(R(A+1), ..., R(A+B-1))
    Call = 36,
    /// TAILCALL: return R(A)(R(A+1), ..., R(A+B-1))
    TailCall = 37,
    /// RETURN: return R(A), ..., R(A+B-2)
    Return = 38,
    /// FORLOOP: R(A) += R(A+2); if R(A) <?= R(A+1) then pc += sBx, R(A+3) := R(A)
    ForLoop = 39,
    /// FORPREP: R(A) -= R(A+2); pc += sBx
    ForPrep = 40,
    /// TFORCALL: R(A+3), ..., R(A+2+C) := R(A)(R(A+1), R(A+2))
    TForCall = 41,
    /// TFORLOOP: if R(A+1) ~= nil then R(A) := R(A+1), pc += sBx
    TForLoop = 42,
    /// SETLIST: R(A)[(C-1)*50+i] := R(A+i), 1 <= i <= B
    SetList = 43,
    /// CLOSURE: R(A) := closure(protos[Bx])
    Closure = 44,
    /// VARARG: R(A), ..., R(A+B-2) := ...
    VarArg = 45,
    /// EXTRAARG: extra (larger) argument for the previous instruction
    ExtraArg = 46,
}

/// Encoding format of an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    /// opcode(6) + A(8) + C(9) + B(9)
    Abc,
    /// opcode(6) + A(8) + Bx(18)
    Abx,
    /// opcode(6) + A(8) + sBx(18, biased by 131071)
    AsBx,
    /// opcode(6) + Ax(26)
    Ax,
}

impl OpCode {
    /// Try to convert a raw opcode value (low 6 bits of a word) to an OpCode.
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte <= 46 {
            // SAFETY: all values 0..=46 are valid OpCode discriminants
            Some(unsafe { std::mem::transmute::<u8, OpCode>(byte) })
        } else {
            None
        }
    }

    /// The encoding format this opcode uses.
    pub fn mode(self) -> OpMode {
        match self {
            OpCode::LoadK | OpCode::LoadKx | OpCode::Closure => OpMode::Abx,
            OpCode::Jmp | OpCode::ForLoop | OpCode::ForPrep | OpCode::TForLoop => OpMode::AsBx,
            OpCode::ExtraArg => OpMode::Ax,
            _ => OpMode::Abc,
        }
    }

    /// Whether this opcode writes the register named by its A operand.
    ///
    /// Used for stack-size accounting; test/jump/store opcodes do not count.
    pub fn writes_a(self) -> bool {
        !matches!(
            self,
            OpCode::Jmp
                | OpCode::Eq
                | OpCode::Lt
                | OpCode::Le
                | OpCode::Test
                | OpCode::Return
                | OpCode::TailCall
                | OpCode::SetTabUp
                | OpCode::SetUpval
                | OpCode::SetTable
                | OpCode::SetList
                | OpCode::ExtraArg
        )
    }

    /// The all-caps mnemonic, as luac prints it.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Move => "MOVE",
            OpCode::LoadK => "LOADK",
            OpCode::LoadKx => "LOADKX",
            OpCode::LoadBool => "LOADBOOL",
            OpCode::LoadNil => "LOADNIL",
            OpCode::GetUpval => "GETUPVAL",
            OpCode::GetTabUp => "GETTABUP",
            OpCode::GetTable => "GETTABLE",
            OpCode::SetTabUp => "SETTABUP",
            OpCode::SetUpval => "SETUPVAL",
            OpCode::SetTable => "SETTABLE",
            OpCode::NewTable => "NEWTABLE",
            OpCode::Self_ => "SELF",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Mod => "MOD",
            OpCode::Pow => "POW",
            OpCode::Div => "DIV",
            OpCode::IDiv => "IDIV",
            OpCode::BAnd => "BAND",
            OpCode::BOr => "BOR",
            OpCode::BXor => "BXOR",
            OpCode::Shl => "SHL",
            OpCode::Shr => "SHR",
            OpCode::Unm => "UNM",
            OpCode::BNot => "BNOT",
            OpCode::Not => "NOT",
            OpCode::Len => "LEN",
            OpCode::Concat => "CONCAT",
            OpCode::Jmp => "JMP",
            OpCode::Eq => "EQ",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Test => "TEST",
            OpCode::TestSet => "TESTSET",
            OpCode::Call => "CALL",
            OpCode::TailCall => "TAILCALL",
            OpCode::Return => "RETURN",
            OpCode::ForLoop => "FORLOOP",
            OpCode::ForPrep => "FORPREP",
            OpCode::TForCall => "TFORCALL",
            OpCode::TForLoop => "TFORLOOP",
            OpCode::SetList => "SETLIST",
            OpCode::Closure => "CLOSURE",
            OpCode::VarArg => "VARARG",
            OpCode::ExtraArg => "EXTRAARG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_byte_range() {
        assert_eq!(OpCode::from_byte(0), Some(OpCode::Move));
        assert_eq!(OpCode::from_byte(30), Some(OpCode::Jmp));
        assert_eq!(OpCode::from_byte(46), Some(OpCode::ExtraArg));
        assert_eq!(OpCode::from_byte(47), None);
        assert_eq!(OpCode::from_byte(255), None);
    }

    #[test]
    fn test_modes() {
        assert_eq!(OpCode::Move.mode(), OpMode::Abc);
        assert_eq!(OpCode::LoadK.mode(), OpMode::Abx);
        assert_eq!(OpCode::Closure.mode(), OpMode::Abx);
        assert_eq!(OpCode::Jmp.mode(), OpMode::AsBx);
        assert_eq!(OpCode::ExtraArg.mode(), OpMode::Ax);
    }
}
