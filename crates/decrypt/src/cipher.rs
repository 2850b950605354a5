//! The five Luraph cipher variants.
//!
//! The XOR family and the custom three-layer cipher are defined as byte
//! loops. AES goes through the RustCrypto `aes`/`cbc` stack; the key width
//! (128/192/256) is chosen from the key length.

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

/// XOR with a repeating key (v11.5).
pub fn xor_v1(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, &b)| b ^ key[i % key.len()])
        .collect()
}

/// XOR with a rotating key: the key byte is offset by the position (v11.6).
pub fn xor_v2(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, &b)| b ^ (key[i % key.len()].wrapping_add(i as u8)))
        .collect()
}

/// Three-layer decrypt: XOR with key, rotate left 3, subtract key.
pub fn luraph_custom_decrypt(cipher: &[u8], key: &[u8]) -> Vec<u8> {
    cipher
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            let k = key[i % key.len()];
            (b ^ k).rotate_left(3).wrapping_sub(k)
        })
        .collect()
}

/// Inverse of [`luraph_custom_decrypt`]: add key, rotate right 3, XOR key.
pub fn luraph_custom_encrypt(plain: &[u8], key: &[u8]) -> Vec<u8> {
    plain
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            let k = key[i % key.len()];
            b.wrapping_add(k).rotate_right(3) ^ k
        })
        .collect()
}

/// Decode hex text to bytes when the input is a pure even-length hex run.
pub fn maybe_hex_decode(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 2 || data.len() % 2 != 0 || !data.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let mut out = Vec::with_capacity(data.len() / 2);
    for pair in data.chunks_exact(2) {
        let hi = hex_value(pair[0]);
        let lo = hex_value(pair[1]);
        out.push((hi << 4) | lo);
    }
    Some(out)
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// IV derivation for the v11.8 AES variant: `iv[i] = key[i mod |key|] XOR i`.
pub fn derive_iv(key: &[u8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    for (i, slot) in iv.iter_mut().enumerate() {
        *slot = key[i % key.len()] ^ i as u8;
    }
    iv
}

/// AES-CBC decrypt of hex-encoded ciphertext with PKCS7 padding (v11.7).
/// The IV defaults to 16 zero bytes.
pub fn aes_cbc_decrypt(cipher: &[u8], key: &[u8], iv: Option<&[u8]>) -> Result<Vec<u8>, String> {
    let raw = maybe_hex_decode(cipher).unwrap_or_else(|| cipher.to_vec());
    let mut iv_buf = [0u8; 16];
    if let Some(iv) = iv {
        if iv.len() != 16 {
            return Err(format!("IV length {} is not 16", iv.len()));
        }
        iv_buf.copy_from_slice(iv);
    }
    cbc_decrypt(key, &iv_buf, raw, true)
}

/// AES-CBC decrypt with key-derived IV and the trailing-byte padding scheme
/// (v11.8 / v11.8.1): the last plaintext byte encodes a padding length in
/// [1, 16] which is stripped.
pub fn aes_cbc_v2_decrypt(cipher: &[u8], key: &[u8], iv: Option<&[u8]>) -> Result<Vec<u8>, String> {
    let raw = maybe_hex_decode(cipher).unwrap_or_else(|| cipher.to_vec());
    let mut iv_buf = derive_iv(key);
    if let Some(iv) = iv {
        if iv.len() != 16 {
            return Err(format!("IV length {} is not 16", iv.len()));
        }
        iv_buf.copy_from_slice(iv);
    }
    let mut plain = cbc_decrypt(key, &iv_buf, raw, false)?;
    let pad = *plain.last().ok_or("empty plaintext")? as usize;
    if !(1..=16).contains(&pad) || pad > plain.len() {
        return Err(format!("trailing padding byte {} out of range", pad));
    }
    plain.truncate(plain.len() - pad);
    Ok(plain)
}

/// AES-CBC encrypt with PKCS7, used to build test vectors.
pub fn aes_cbc_encrypt(plain: &[u8], key: &[u8], iv: &[u8; 16]) -> Result<Vec<u8>, String> {
    let msg_len = plain.len();
    let mut buf = plain.to_vec();
    buf.resize(msg_len + 16 - msg_len % 16, 0);
    macro_rules! encrypt_with {
        ($cipher:ty) => {{
            let enc = cbc::Encryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|e| e.to_string())?;
            enc.encrypt_padded_mut::<Pkcs7>(&mut buf, msg_len)
                .map(|out| out.to_vec())
                .map_err(|e| e.to_string())
        }};
    }
    match key.len() {
        16 => encrypt_with!(aes::Aes128),
        24 => encrypt_with!(aes::Aes192),
        32 => encrypt_with!(aes::Aes256),
        n => Err(format!("AES key length {} is not 16/24/32", n)),
    }
}

fn cbc_decrypt(key: &[u8], iv: &[u8; 16], mut buf: Vec<u8>, pkcs7: bool) -> Result<Vec<u8>, String> {
    if buf.is_empty() || buf.len() % 16 != 0 {
        return Err(format!("ciphertext length {} is not a block multiple", buf.len()));
    }
    macro_rules! decrypt_with {
        ($cipher:ty) => {{
            let dec = cbc::Decryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|e| e.to_string())?;
            if pkcs7 {
                dec.decrypt_padded_mut::<Pkcs7>(&mut buf)
                    .map(|out| out.to_vec())
                    .map_err(|e| e.to_string())
            } else {
                dec.decrypt_padded_mut::<NoPadding>(&mut buf)
                    .map(|out| out.to_vec())
                    .map_err(|e| e.to_string())
            }
        }};
    }
    match key.len() {
        16 => decrypt_with!(aes::Aes128),
        24 => decrypt_with!(aes::Aes192),
        32 => decrypt_with!(aes::Aes256),
        n => Err(format!("AES key length {} is not 16/24/32", n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789ABCDEF";

    #[test]
    fn test_xor_v1_inverse() {
        let plain = b"local x = 1";
        assert_eq!(xor_v1(&xor_v1(plain, KEY), KEY), plain);
    }

    #[test]
    fn test_xor_v2_inverse() {
        let plain = b"while true do end";
        assert_eq!(xor_v2(&xor_v2(plain, KEY), KEY), plain);
    }

    #[test]
    fn test_luraph_custom_inverse() {
        let plain = b"return 42";
        let cipher = luraph_custom_encrypt(plain, KEY);
        assert_eq!(luraph_custom_decrypt(&cipher, KEY), plain);
    }

    #[test]
    fn test_aes_cbc_roundtrip() {
        let plain = b"local hidden = \"secret\"";
        let iv = [0u8; 16];
        let cipher = aes_cbc_encrypt(plain, KEY, &iv).unwrap();
        let decrypted = aes_cbc_decrypt(&cipher, KEY, None).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_aes_cbc_hex_input() {
        let plain = b"print(1)";
        let iv = [0u8; 16];
        let cipher = aes_cbc_encrypt(plain, KEY, &iv).unwrap();
        let hex: String = cipher.iter().map(|b| format!("{:02x}", b)).collect();
        let decrypted = aes_cbc_decrypt(hex.as_bytes(), KEY, None).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_aes_cbc_v2_padding() {
        // Build a v2 ciphertext by hand: pad with 5 bytes, last byte = 5.
        let mut padded = b"local y = 2".to_vec();
        padded.extend_from_slice(&[0, 0, 0, 0, 5]);
        assert_eq!(padded.len(), 16);
        let iv = derive_iv(KEY);
        let mut cipher = padded.clone();
        let enc = cbc::Encryptor::<aes::Aes128>::new_from_slices(KEY, &iv).unwrap();
        let out = enc
            .encrypt_padded_mut::<NoPadding>(&mut cipher, 16)
            .unwrap()
            .to_vec();
        let decrypted = aes_cbc_v2_decrypt(&out, KEY, None).unwrap();
        assert_eq!(decrypted, b"local y = 2");
    }

    #[test]
    fn test_aes_rejects_bad_lengths() {
        assert!(aes_cbc_decrypt(b"short", KEY, None).is_err());
        assert!(aes_cbc_decrypt(&[0u8; 16], b"badkey", None).is_err());
    }

    #[test]
    fn test_derive_iv() {
        let iv = derive_iv(b"0123456789ABCDEF");
        assert_eq!(iv[0], b'0');
        assert_eq!(iv[1], b'1' ^ 1);
        assert_eq!(iv[15], b'F' ^ 15);
    }
}
