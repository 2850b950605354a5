//! Luraph constant decryption.
//!
//! Five cipher variants selected by [`Method`], with `Auto` trying each and
//! keeping the best-scoring plaintext. Failure is always soft: a failed
//! decryption hands the ciphertext back with `ok = false` so the caller can
//! keep the constant encrypted rather than abort the pipeline.

pub mod cipher;
pub mod keyscan;
pub mod score;

use score::score_plaintext;

/// A decryption algorithm, or `Auto` to try them all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    XorV1,
    XorV2,
    AesCbc,
    AesCbcV2,
    LuraphCustom,
    Auto,
}

/// Fixed trial order for auto-detection; also the tie-break order.
pub const AUTO_ORDER: [Method; 5] = [
    Method::XorV1,
    Method::XorV2,
    Method::AesCbc,
    Method::AesCbcV2,
    Method::LuraphCustom,
];

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::XorV1 => "xor_v1",
            Method::XorV2 => "xor_v2",
            Method::AesCbc => "aes_cbc",
            Method::AesCbcV2 => "aes_cbc_v2",
            Method::LuraphCustom => "luraph_custom",
            Method::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Method> {
        Some(match s {
            "xor_v1" => Method::XorV1,
            "xor_v2" => Method::XorV2,
            "aes_cbc" => Method::AesCbc,
            "aes_cbc_v2" => Method::AesCbcV2,
            "luraph_custom" => Method::LuraphCustom,
            "auto" => Method::Auto,
            _ => return None,
        })
    }
}

/// Supported Luraph releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuraphVersion {
    V11_5,
    V11_6,
    V11_7,
    V11_8,
    V11_8_1,
}

impl LuraphVersion {
    /// Session key length used by this release.
    pub fn key_len(self) -> usize {
        match self {
            LuraphVersion::V11_5 => 16,
            LuraphVersion::V11_6 => 24,
            LuraphVersion::V11_7 | LuraphVersion::V11_8 | LuraphVersion::V11_8_1 => 32,
        }
    }

    /// The cipher this release ships with.
    pub fn default_method(self) -> Method {
        match self {
            LuraphVersion::V11_5 => Method::XorV1,
            LuraphVersion::V11_6 => Method::XorV2,
            LuraphVersion::V11_7 => Method::AesCbc,
            LuraphVersion::V11_8 | LuraphVersion::V11_8_1 => Method::AesCbcV2,
        }
    }

    pub fn parse(s: &str) -> Option<LuraphVersion> {
        Some(match s {
            "11.5" => LuraphVersion::V11_5,
            "11.6" => LuraphVersion::V11_6,
            "11.7" => LuraphVersion::V11_7,
            "11.8" => LuraphVersion::V11_8,
            "11.8.1" => LuraphVersion::V11_8_1,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            LuraphVersion::V11_5 => "11.5",
            LuraphVersion::V11_6 => "11.6",
            LuraphVersion::V11_7 => "11.7",
            LuraphVersion::V11_8 => "11.8",
            LuraphVersion::V11_8_1 => "11.8.1",
        }
    }
}

/// Session encryption parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionInfo {
    pub method: Method,
    pub key: Vec<u8>,
    pub iv: Option<Vec<u8>>,
    pub version: Option<LuraphVersion>,
}

impl EncryptionInfo {
    pub fn new(method: Method, key: Vec<u8>) -> Self {
        Self {
            method,
            key,
            iv: None,
            version: None,
        }
    }

    /// Auto-detect settings with a known key.
    pub fn auto(key: Vec<u8>) -> Self {
        Self::new(Method::Auto, key)
    }
}

/// Outcome of a decryption attempt. `ok = false` leaves the ciphertext in
/// `plaintext` so callers can pass the constant through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Decrypted {
    pub ok: bool,
    pub plaintext: Vec<u8>,
    pub method: Method,
    pub score: i64,
    pub error: Option<String>,
}

impl Decrypted {
    fn failure(cipher: &[u8], method: Method, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            plaintext: cipher.to_vec(),
            method,
            score: score_plaintext(cipher),
            error: Some(error.into()),
        }
    }
}

/// Decrypt a ciphertext according to `info`.
pub fn decrypt(cipher: &[u8], info: &EncryptionInfo) -> Decrypted {
    if info.key.is_empty() {
        return Decrypted::failure(cipher, info.method, "no key available");
    }
    match info.method {
        Method::Auto => auto_decrypt(cipher, info),
        method => run_method(cipher, info, method),
    }
}

/// Encrypt with one of the invertible methods. Used to build fixtures and
/// by the inverse-property tests; AES encryption lives in [`cipher`].
pub fn encrypt(plain: &[u8], key: &[u8], method: Method) -> Option<Vec<u8>> {
    if key.is_empty() {
        return None;
    }
    match method {
        Method::XorV1 => Some(cipher::xor_v1(plain, key)),
        Method::XorV2 => Some(cipher::xor_v2(plain, key)),
        Method::LuraphCustom => Some(cipher::luraph_custom_encrypt(plain, key)),
        _ => None,
    }
}

fn run_method(data: &[u8], info: &EncryptionInfo, method: Method) -> Decrypted {
    let key = &info.key;
    let result: Result<Vec<u8>, String> = match method {
        Method::XorV1 => Ok(cipher::xor_v1(data, key)),
        Method::XorV2 => Ok(cipher::xor_v2(data, key)),
        Method::LuraphCustom => Ok(cipher::luraph_custom_decrypt(data, key)),
        Method::AesCbc => cipher::aes_cbc_decrypt(data, key, info.iv.as_deref()),
        Method::AesCbcV2 => cipher::aes_cbc_v2_decrypt(data, key, info.iv.as_deref()),
        Method::Auto => unreachable!("auto handled by caller"),
    };
    match result {
        Ok(plaintext) => {
            let score = score_plaintext(&plaintext);
            Decrypted {
                ok: true,
                plaintext,
                method,
                score,
                error: None,
            }
        }
        Err(error) => {
            log::debug!("{} failed: {}", method.name(), error);
            Decrypted::failure(data, method, error)
        }
    }
}

/// Run every algorithm and keep the best-scoring plaintext. Ties keep the
/// earliest method in [`AUTO_ORDER`].
fn auto_decrypt(cipher: &[u8], info: &EncryptionInfo) -> Decrypted {
    let mut best: Option<Decrypted> = None;
    for method in AUTO_ORDER {
        let attempt = run_method(cipher, info, method);
        if !attempt.ok {
            continue;
        }
        let better = match &best {
            Some(current) => attempt.score > current.score,
            None => true,
        };
        if better {
            best = Some(attempt);
        }
    }
    best.unwrap_or_else(|| {
        Decrypted::failure(cipher, Method::Auto, "every algorithm failed")
    })
}
