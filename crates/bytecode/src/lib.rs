//! Lua 5.3 bytecode model.
//!
//! Opcodes, instruction words (encode/decode for all four forms), constant
//! pool values with their serialization tags, function prototypes with
//! structural validation, and the read-back validator for emitted images.

pub mod constant;
pub mod instruction;
pub mod opcode;
pub mod proto;
pub mod validate;

pub use constant::Constant;
pub use instruction::Instruction;
pub use opcode::{OpCode, OpMode};
pub use proto::{Proto, UpvalDesc};
