//! Lua 5.3 `.luac` serialization.
//!
//! Writes the exact little-endian layout of luac 5.3: the fixed header,
//! one byte for the main closure's upvalue count, then the function tree.
//! The buffer grows as needed and the used prefix is returned.

use luminol_bytecode::validate::{
    CONV_DATA, FORMAT_OFFICIAL, INT_CHECK, NUM_CHECK, SIGNATURE, TYPE_SIZES, VERSION_53,
};
use luminol_bytecode::{Constant, Proto};

use luminol_bytecode::constant::{TAG_BOOLEAN, TAG_NIL, TAG_NUMFLT, TAG_NUMINT};

/// Serialize a prototype tree into a complete chunk image.
pub fn write_image(proto: &Proto) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    buf.extend_from_slice(SIGNATURE);
    buf.push(VERSION_53);
    buf.push(FORMAT_OFFICIAL);
    buf.extend_from_slice(CONV_DATA);
    buf.extend_from_slice(&TYPE_SIZES);
    buf.extend_from_slice(&INT_CHECK.to_le_bytes());
    buf.extend_from_slice(&NUM_CHECK.to_le_bytes());

    // Upvalue count of the main closure.
    buf.push(proto.upvalues.len() as u8);

    write_function(&mut buf, proto);
    buf
}

fn write_function(buf: &mut Vec<u8>, proto: &Proto) {
    write_string(buf, proto.source.as_bytes());
    write_u32(buf, proto.line_defined);
    write_u32(buf, proto.last_line_defined);
    buf.push(proto.num_params);
    buf.push(proto.is_vararg as u8);
    buf.push(proto.max_stack);

    // Code.
    write_u32(buf, proto.code.len() as u32);
    for insn in &proto.code {
        write_u32(buf, insn.encode());
    }

    // Constants.
    write_u32(buf, proto.constants.len() as u32);
    for constant in &proto.constants {
        match constant {
            Constant::Nil => buf.push(TAG_NIL),
            Constant::Boolean(b) => {
                buf.push(TAG_BOOLEAN);
                buf.push(*b as u8);
            }
            Constant::Float(f) => {
                buf.push(TAG_NUMFLT);
                buf.extend_from_slice(&f.to_le_bytes());
            }
            Constant::Integer(i) => {
                buf.push(TAG_NUMINT);
                buf.extend_from_slice(&i.to_le_bytes());
            }
            Constant::Str(s) => {
                buf.push(constant.tag());
                write_string(buf, s);
            }
        }
    }

    // Upvalue descriptors.
    write_u32(buf, proto.upvalues.len() as u32);
    for upval in &proto.upvalues {
        buf.push(upval.in_stack as u8);
        buf.push(upval.index);
    }

    // Nested prototypes.
    write_u32(buf, proto.protos.len() as u32);
    for nested in &proto.protos {
        write_function(buf, nested);
    }

    // Debug: per-instruction lines, locals (none), upvalue names.
    write_u32(buf, proto.code.len() as u32);
    for insn in &proto.code {
        write_u32(buf, insn.line.unwrap_or(0));
    }
    write_u32(buf, 0);
    write_u32(buf, proto.upvalues.len() as u32);
    for upval in &proto.upvalues {
        match &upval.name {
            Some(name) => write_string(buf, name.as_bytes()),
            None => buf.push(0),
        }
    }
}

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Dump-format string: one size byte holding `len + 1` (0xFF escapes to a
/// 64-bit size), then the raw bytes. Empty strings are the single byte 0.
fn write_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.is_empty() {
        buf.push(0);
        return;
    }
    let size = bytes.len() + 1;
    if size < 0xFF {
        buf.push(size as u8);
    } else {
        buf.push(0xFF);
        buf.extend_from_slice(&(size as u64).to_le_bytes());
    }
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminol_bytecode::validate::validate_image;
    use luminol_bytecode::{Instruction, OpCode, UpvalDesc};

    fn empty_proto() -> Proto {
        let mut proto = Proto::new("@chunk.lua");
        proto.code.push(Instruction::abc(OpCode::Return, 0, 1, 0));
        proto.upvalues.push(UpvalDesc {
            name: Some("_ENV".to_string()),
            in_stack: true,
            index: 0,
        });
        proto
    }

    #[test]
    fn test_header_round_trip() {
        let image = write_image(&empty_proto());
        let header = validate_image(&image).expect("validator must accept the writer's output");
        assert_eq!(&image[..4], b"\x1bLua");
        assert_eq!(header.version, 0x53);
        assert_eq!(header.format, 0);
        assert_eq!(header.sizes, [4, 8, 4, 8, 8]);
        assert_eq!(header.int_check, 0x5678);
        assert_eq!(header.num_check, 370.5);
    }

    #[test]
    fn test_string_encoding() {
        let mut buf = Vec::new();
        write_string(&mut buf, b"");
        assert_eq!(buf, vec![0]);

        buf.clear();
        write_string(&mut buf, b"print");
        assert_eq!(buf[0], 6);
        assert_eq!(&buf[1..], b"print");

        buf.clear();
        let long = vec![b'x'; 300];
        write_string(&mut buf, &long);
        assert_eq!(buf[0], 0xFF);
        assert_eq!(u64::from_le_bytes(buf[1..9].try_into().unwrap()), 301);
        assert_eq!(buf.len(), 9 + 300);
    }

    #[test]
    fn test_code_words_in_image() {
        let mut proto = empty_proto();
        proto.code.insert(0, Instruction::abc(OpCode::Move, 0, 1, 0));
        let image = write_image(&proto);
        let word = Instruction::abc(OpCode::Move, 0, 1, 0).encode();
        assert!(
            image
                .windows(4)
                .any(|w| w == word.to_le_bytes()),
            "encoded MOVE word not found in image"
        );
    }

    #[test]
    fn test_constants_serialized() {
        let mut proto = empty_proto();
        proto.constants.push(Constant::Str(b"print".to_vec()));
        proto.constants.push(Constant::Integer(42));
        proto.constants.push(Constant::Float(370.5));
        let image = write_image(&proto);
        // "print" appears with its length prefix.
        assert!(image.windows(6).any(|w| w == [6, b'p', b'r', b'i', b'n', b't']));
        // Integer tag + little-endian payload.
        let mut needle = vec![19u8];
        needle.extend_from_slice(&42i64.to_le_bytes());
        assert!(image.windows(needle.len()).any(|w| w == needle.as_slice()));
    }

    #[test]
    fn test_determinism() {
        let proto = empty_proto();
        assert_eq!(write_image(&proto), write_image(&proto));
    }
}
