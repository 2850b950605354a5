//! Candidate-key extraction from obfuscated source text.
//!
//! Luraph dumps embed their session key as a string literal. Three shapes
//! are recognized: long hex runs, Base64-alphabet runs, and the right-hand
//! side of a `local name = "..."` assignment with a long literal.

/// Minimum length of a hex run that qualifies as a key candidate.
const HEX_RUN_MIN: usize = 32;

/// Minimum length of a Base64-alphabet run that qualifies.
const BASE64_RUN_MIN: usize = 16;

/// Minimum byte length of a `local x = "..."` literal that qualifies.
const LOCAL_LITERAL_MIN: usize = 16;

/// Scan source text for key candidates, in discovery order, deduplicated.
///
/// Hex runs contribute both their text bytes and their decoded bytes; the
/// XOR family keys on text while AES dumps sometimes hex-encode the key.
pub fn candidate_keys(source: &str) -> Vec<Vec<u8>> {
    let mut keys: Vec<Vec<u8>> = Vec::new();
    let mut push = |k: Vec<u8>| {
        if !k.is_empty() && !keys.contains(&k) {
            keys.push(k);
        }
    };

    let bytes = source.as_bytes();

    // Maximal alphabet runs; a hex run is also a Base64 run, so scan for the
    // wider alphabet and classify each run.
    let mut i = 0;
    while i < bytes.len() {
        if !is_base64_byte(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && is_base64_byte(bytes[i]) {
            i += 1;
        }
        let run = &bytes[start..i];
        if run.len() >= HEX_RUN_MIN && run.iter().all(u8::is_ascii_hexdigit) {
            push(run.to_vec());
            if let Some(decoded) = super::cipher::maybe_hex_decode(run) {
                push(decoded);
            }
        } else if run.len() >= BASE64_RUN_MIN {
            push(run.to_vec());
        }
    }

    // `local name = "literal"` right-hand sides.
    for line in source.lines() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with("local ") {
            continue;
        }
        let Some(eq) = trimmed.find('=') else { continue };
        if let Some(literal) = first_quoted(&trimmed[eq + 1..]) {
            if literal.len() >= LOCAL_LITERAL_MIN {
                push(literal.as_bytes().to_vec());
            }
        }
    }

    keys
}

/// Whether a single string literal has the shape of a session key:
/// 32+ hex characters or 16+ Base64-alphabet characters.
pub fn is_key_shaped(literal: &[u8]) -> bool {
    (literal.len() >= HEX_RUN_MIN && literal.iter().all(u8::is_ascii_hexdigit))
        || (literal.len() >= BASE64_RUN_MIN && literal.iter().all(|&b| is_base64_byte(b)))
}

fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

fn first_quoted(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let open = bytes.iter().position(|&b| b == b'"' || b == b'\'')?;
    let quote = bytes[open];
    let close = bytes[open + 1..].iter().position(|&b| b == quote)?;
    Some(&text[open + 1..open + 1 + close])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_run() {
        let src = "local k = \"0123456789abcdef0123456789abcdef\"";
        let keys = candidate_keys(src);
        // Text bytes, decoded bytes, and the local-literal rule (duplicate
        // of the text form, deduplicated).
        assert!(keys.contains(&b"0123456789abcdef0123456789abcdef".to_vec()));
        assert!(keys.iter().any(|k| k.len() == 16));
    }

    #[test]
    fn test_base64_run() {
        let keys = candidate_keys("x = decode(\"QWxhZGRpbjpvcGVuIHNlc2FtZQ\")");
        assert!(keys.contains(&b"QWxhZGRpbjpvcGVuIHNlc2FtZQ".to_vec()));
    }

    #[test]
    fn test_local_literal() {
        let keys = candidate_keys("local secret = 'not-base64!! but long enough'");
        assert!(keys.contains(&b"not-base64!! but long enough".to_vec()));
    }

    #[test]
    fn test_short_runs_ignored() {
        let keys = candidate_keys("local a = \"abc\" + deadbeef");
        assert!(keys.is_empty());
    }

    #[test]
    fn test_key_shapes() {
        assert!(is_key_shaped(b"0123456789abcdef0123456789abcdef"));
        assert!(is_key_shaped(b"QWxhZGRpbjpvcGVu"));
        assert!(!is_key_shaped(b"short"));
        assert!(!is_key_shaped(b"spaces are not base64 at all"));
    }
}
