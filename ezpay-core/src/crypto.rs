//! AES-256-CBC encryption of request payloads.
//!
//! The plaintext is padded PKCS#7-style against a 32-byte block before it is
//! handed to the cipher, and the cipher itself runs without padding. Padding is
//! always added, so an input that already fills whole blocks gains a full
//! 32-byte block of `0x20`.
use aes::Aes256;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use thiserror::Error;
use tracing::warn;

/// Block size the padding is computed against.
pub const PAD_BLOCK_SIZE: usize = 32;
pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CryptoError {
    #[error("hash key must be between 1 and 32 bytes (got {len})")]
    KeyLength { len: usize },
    #[error("hash IV must be exactly 16 bytes (got {len})")]
    IvLength { len: usize },
    #[error("invalid padding: {0}")]
    Padding(&'static str),
    #[error("invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("decrypted payload is not valid UTF-8")]
    Utf8,
}

pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Append `n` bytes of value `n`, where `n = 32 - len % 32` (always 1..=32).
pub fn pad(input: &[u8]) -> Vec<u8> {
    let pad = PAD_BLOCK_SIZE - input.len() % PAD_BLOCK_SIZE;
    let mut out = Vec::with_capacity(input.len() + pad);
    out.extend_from_slice(input);
    out.resize(input.len() + pad, pad as u8);
    out
}

/// Strip padding added by [`pad`], checking every pad byte.
pub fn unpad(input: &[u8]) -> CryptoResult<&[u8]> {
    if input.is_empty() || input.len() % PAD_BLOCK_SIZE != 0 {
        return Err(CryptoError::Padding("length is not a multiple of 32"));
    }
    let last = input[input.len() - 1];
    let pad = usize::from(last);
    if pad == 0 || pad > PAD_BLOCK_SIZE {
        return Err(CryptoError::Padding("pad length out of range"));
    }
    let (body, tail) = input.split_at(input.len() - pad);
    if tail.iter().any(|&byte| byte != last) {
        return Err(CryptoError::Padding("inconsistent pad bytes"));
    }
    Ok(body)
}

/// Pad and encrypt `plaintext`, returning the raw ciphertext.
///
/// # Errors
/// Returns [`CryptoError::KeyLength`] or [`CryptoError::IvLength`] for unusable key material.
pub fn encrypt(plaintext: &[u8], key: &[u8], iv: &[u8]) -> CryptoResult<Vec<u8>> {
    let key = expand_key(key)?;
    let iv = check_iv(iv)?;
    let cipher = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|_| CryptoError::KeyLength { len: key.len() })?;
    Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(&pad(plaintext)))
}

/// Decrypt raw ciphertext produced by [`encrypt`] and strip the padding.
///
/// # Errors
/// Returns [`CryptoError`] for bad key material, misaligned input or corrupt padding.
pub fn decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> CryptoResult<Vec<u8>> {
    let key = expand_key(key)?;
    let iv = check_iv(iv)?;
    let cipher = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| CryptoError::KeyLength { len: key.len() })?;
    let padded = cipher
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::Padding("ciphertext is not block aligned"))?;
    Ok(unpad(&padded)?.to_vec())
}

/// Encrypt a canonical string into the lowercase hex form sent as `PostData_`.
pub fn encrypt_hex(plaintext: &str, key: &[u8], iv: &[u8]) -> CryptoResult<String> {
    encrypt(plaintext.as_bytes(), key, iv).map(hex::encode)
}

/// Decrypt a hex payload (either case, surrounding whitespace ignored).
pub fn decrypt_hex(payload: &str, key: &[u8], iv: &[u8]) -> CryptoResult<String> {
    let ciphertext = hex::decode(payload.trim())?;
    let plaintext = decrypt(&ciphertext, key, iv)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Utf8)
}

// Short keys are NUL-extended to 32 bytes, matching OpenSSL's AES-256-CBC.
fn expand_key(key: &[u8]) -> CryptoResult<[u8; KEY_LEN]> {
    if key.is_empty() || key.len() > KEY_LEN {
        return Err(CryptoError::KeyLength { len: key.len() });
    }
    if key.len() < KEY_LEN {
        warn!(len = key.len(), "hash key shorter than 32 bytes, zero-extending");
    }
    let mut expanded = [0u8; KEY_LEN];
    expanded[..key.len()].copy_from_slice(key);
    Ok(expanded)
}

fn check_iv(iv: &[u8]) -> CryptoResult<[u8; IV_LEN]> {
    <[u8; IV_LEN]>::try_from(iv).map_err(|_| CryptoError::IvLength { len: iv.len() })
}
