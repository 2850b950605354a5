//! Read-back validation of emitted chunk images.
//!
//! The emitter's counterpart: re-parses the fixed header of a `.luac` image
//! and confirms every check value. A mismatch means the emitter produced
//! bytes a stock interpreter would reject.

use nom::bytes::complete::{tag, take};
use nom::number::complete::{le_f64, le_i64, le_u8};
use nom::IResult;

/// The 4-byte chunk signature, "\x1bLua".
pub const SIGNATURE: &[u8; 4] = b"\x1bLua";

/// Version byte for Lua 5.3.
pub const VERSION_53: u8 = 0x53;

/// Format byte for the official format.
pub const FORMAT_OFFICIAL: u8 = 0;

/// Conversion-check bytes following the format byte ("\x19\x93\r\n\x1a\n").
pub const CONV_DATA: &[u8; 6] = &[0x19, 0x93, 0x0D, 0x0A, 0x1A, 0x0A];

/// Declared sizes of int, size_t, Instruction, lua_Integer, lua_Number.
pub const TYPE_SIZES: [u8; 5] = [4, 8, 4, 8, 8];

/// Endianness check integer.
pub const INT_CHECK: i64 = 0x5678;

/// Float-format check number.
pub const NUM_CHECK: f64 = 370.5;

/// Parsed header fields of a chunk image.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: u8,
    pub format: u8,
    pub sizes: [u8; 5],
    pub int_check: i64,
    pub num_check: f64,
}

/// Parse the fixed header, accepting any field values past the signature.
pub fn read_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, _) = tag(&SIGNATURE[..])(input)?;
    let (input, version) = le_u8(input)?;
    let (input, format) = le_u8(input)?;
    let (input, _conv) = take(6usize)(input)?;
    let (input, sizes) = take(5usize)(input)?;
    let (input, int_check) = le_i64(input)?;
    let (input, num_check) = le_f64(input)?;

    let mut size_arr = [0u8; 5];
    size_arr.copy_from_slice(sizes);

    Ok((
        input,
        Header {
            version,
            format,
            sizes: size_arr,
            int_check,
            num_check,
        },
    ))
}

/// Validate an emitted image.
///
/// Magic and version are the hard gate; the remaining fields are checked
/// against the constants this crate emits.
pub fn validate_image(bytes: &[u8]) -> Result<Header, String> {
    if bytes.len() < 4 || &bytes[..4] != SIGNATURE {
        return Err("bad magic: not a Lua chunk".to_string());
    }
    let (_, header) = read_header(bytes).map_err(|e| format!("truncated header: {}", e))?;
    if header.version != VERSION_53 {
        return Err(format!(
            "version byte 0x{:02X}, expected 0x{:02X}",
            header.version, VERSION_53
        ));
    }
    if header.format != FORMAT_OFFICIAL {
        return Err(format!("format byte {}, expected 0", header.format));
    }
    if header.sizes != TYPE_SIZES {
        return Err(format!("type sizes {:?}, expected {:?}", header.sizes, TYPE_SIZES));
    }
    if header.int_check != INT_CHECK {
        return Err(format!("integer check 0x{:X}, expected 0x5678", header.int_check));
    }
    if header.num_check != NUM_CHECK {
        return Err(format!("number check {}, expected 370.5", header.num_check));
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(SIGNATURE);
        bytes.push(VERSION_53);
        bytes.push(FORMAT_OFFICIAL);
        bytes.extend_from_slice(CONV_DATA);
        bytes.extend_from_slice(&TYPE_SIZES);
        bytes.extend_from_slice(&INT_CHECK.to_le_bytes());
        bytes.extend_from_slice(&NUM_CHECK.to_le_bytes());
        bytes
    }

    #[test]
    fn test_validate_good_header() {
        let header = validate_image(&sample_header()).unwrap();
        assert_eq!(header.version, 0x53);
        assert_eq!(header.int_check, 0x5678);
        assert_eq!(header.num_check, 370.5);
    }

    #[test]
    fn test_validate_rejects_bad_magic() {
        let mut bytes = sample_header();
        bytes[0] = b'X';
        assert!(validate_image(&bytes).is_err());
    }

    #[test]
    fn test_validate_rejects_wrong_version() {
        let mut bytes = sample_header();
        bytes[4] = 0x51;
        assert!(validate_image(&bytes).unwrap_err().contains("version"));
    }

    #[test]
    fn test_validate_rejects_truncated() {
        let bytes = &sample_header()[..10];
        assert!(validate_image(bytes).is_err());
    }
}
