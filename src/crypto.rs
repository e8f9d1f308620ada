//! Cryptographic primitives for the authentication handshake
//!
//! The verifier computation combines server-supplied salt material with the
//! password under one of two schemes: the 11g scheme (SHA-1 + AES-192-CBC)
//! and the 12c scheme (PBKDF2-HMAC-SHA512 + AES-256-CBC). Both use a zero IV;
//! the server contributes all randomness through the salt and its session
//! key half.

use aes::cipher::KeyIvInit;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut};
use md5::Md5;
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use sha2::{Digest, Sha512};

use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;

const ZERO_IV: [u8; 16] = [0u8; 16];
const BLOCK: usize = 16;

/// Verifier schemes announced by the server during the challenge round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VerifierType {
    /// 11g Release 1 verifier
    V11g1 = 0xB152,
    /// 11g Release 2 verifier
    V11g2 = 0x1B25,
    /// 12c and later verifier (PBKDF2)
    V12c = 0x4815,
}

impl VerifierType {
    /// Whether this scheme uses the PBKDF2 key derivation path
    pub fn uses_pbkdf2(&self) -> bool {
        matches!(self, VerifierType::V12c)
    }
}

impl TryFrom<u32> for VerifierType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0xB152 => Ok(VerifierType::V11g1),
            0x1B25 => Ok(VerifierType::V11g2),
            0x4815 => Ok(VerifierType::V12c),
            _ => Err(Error::UnsupportedVerifierType(value)),
        }
    }
}

fn check_key_len(key: &[u8], expected: usize) -> Result<()> {
    if key.len() != expected {
        return Err(Error::AuthenticationFailed(format!(
            "AES key must be {} bytes, got {}",
            expected,
            key.len()
        )));
    }
    Ok(())
}

fn check_ciphertext(ciphertext: &[u8]) -> Result<()> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK != 0 {
        return Err(Error::AuthenticationFailed(format!(
            "ciphertext length must be a multiple of {} bytes, got {}",
            BLOCK,
            ciphertext.len()
        )));
    }
    Ok(())
}

/// Encrypt with AES-256-CBC, zero IV, zero padding only when unaligned
pub fn encrypt_cbc_256(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    encrypt_cbc_256_inner(key, plaintext, false)
}

/// Encrypt with AES-256-CBC, zero IV, PKCS7 padding.
///
/// Session keys, passwords and speedy keys go through this variant.
pub fn encrypt_cbc_256_pkcs7(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    encrypt_cbc_256_inner(key, plaintext, true)
}

fn encrypt_cbc_256_inner(key: &[u8], plaintext: &[u8], pkcs7: bool) -> Result<Vec<u8>> {
    check_key_len(key, 32)?;

    let remainder = plaintext.len() % BLOCK;
    let padding = match (remainder, pkcs7) {
        (0, false) => 0,
        (0, true) => BLOCK,
        (r, false) => BLOCK - r,
        (r, true) => BLOCK - r,
    };

    let mut buffer = plaintext.to_vec();
    let fill = if pkcs7 { padding as u8 } else { 0 };
    buffer.resize(plaintext.len() + padding, fill);

    let total = buffer.len();
    let cipher = Aes256CbcEnc::new(key.into(), &ZERO_IV.into());
    let ciphertext = cipher
        .encrypt_padded_mut::<NoPadding>(&mut buffer, total)
        .map_err(|e| Error::AuthenticationFailed(format!("AES encryption failed: {}", e)))?;
    Ok(ciphertext.to_vec())
}

/// Decrypt with AES-256-CBC, zero IV
pub fn decrypt_cbc_256(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    check_key_len(key, 32)?;
    check_ciphertext(ciphertext)?;

    let cipher = Aes256CbcDec::new(key.into(), &ZERO_IV.into());
    let mut buffer = ciphertext.to_vec();
    let plaintext = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| Error::AuthenticationFailed(format!("AES decryption failed: {}", e)))?;
    Ok(plaintext.to_vec())
}

/// Encrypt with AES-192-CBC, zero IV (11g scheme)
pub fn encrypt_cbc_192(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_key_len(key, 24)?;

    let padding = BLOCK - (plaintext.len() % BLOCK);
    let mut buffer = plaintext.to_vec();
    buffer.resize(plaintext.len() + padding, padding as u8);

    let total = buffer.len();
    let cipher = Aes192CbcEnc::new(key.into(), &ZERO_IV.into());
    let ciphertext = cipher
        .encrypt_padded_mut::<NoPadding>(&mut buffer, total)
        .map_err(|e| Error::AuthenticationFailed(format!("AES encryption failed: {}", e)))?;
    Ok(ciphertext.to_vec())
}

/// Decrypt with AES-192-CBC, zero IV (11g scheme)
pub fn decrypt_cbc_192(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    check_key_len(key, 24)?;
    check_ciphertext(ciphertext)?;

    let cipher = Aes192CbcDec::new(key.into(), &ZERO_IV.into());
    let mut buffer = ciphertext.to_vec();
    let plaintext = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| Error::AuthenticationFailed(format!("AES decryption failed: {}", e)))?;
    Ok(plaintext.to_vec())
}

/// Derive a key with PBKDF2-HMAC-SHA512
pub fn pbkdf2_derive(password: &[u8], salt: &[u8], iterations: u32, length: usize) -> Vec<u8> {
    let mut key = vec![0u8; length];
    pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut key);
    key
}

/// Derive the 64-byte 12c password key.
///
/// Salt is the server verifier data with the speedy-key marker appended.
pub fn password_key_12c(password: &[u8], verifier_data: &[u8], iterations: u32) -> Vec<u8> {
    let mut salt = verifier_data.to_vec();
    salt.extend_from_slice(b"AUTH_PBKDF2_SPEEDY_KEY");
    pbkdf2_derive(password, &salt, iterations, 64)
}

/// Derive the 32-byte 12c password hash: SHA512(password_key || verifier_data)
/// truncated to 32 bytes. This decrypts the server's session key half.
pub fn password_hash_12c(password: &[u8], verifier_data: &[u8], iterations: u32) -> Vec<u8> {
    let password_key = password_key_12c(password, verifier_data, iterations);
    let mut hasher = Sha512::new();
    hasher.update(&password_key);
    hasher.update(verifier_data);
    hasher.finalize()[..32].to_vec()
}

/// Derive the 24-byte 11g password hash: SHA1(password || verifier_data)
/// zero-extended to AES-192 key size
pub fn password_hash_11g(password: &[u8], verifier_data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(password);
    hasher.update(verifier_data);
    let mut result = hasher.finalize().to_vec();
    result.extend_from_slice(&[0u8; 4]);
    result
}

/// Derive the 12c combo key from both session key halves.
///
/// The halves are hex-uppercased, concatenated client-first, then run
/// through PBKDF2 with the server-supplied salt.
pub fn combo_key_12c(
    server_key: &[u8],
    client_key: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Vec<u8>> {
    if server_key.len() < 32 || client_key.len() < 32 {
        return Err(Error::AuthenticationFailed(
            "session key halves must be at least 32 bytes".into(),
        ));
    }
    let combined = format!(
        "{}{}",
        hex::encode_upper(&client_key[..32]),
        hex::encode_upper(&server_key[..32])
    );
    Ok(pbkdf2_derive(combined.as_bytes(), salt, iterations, 32))
}

/// Derive the 24-byte 11g combo key: XOR of bytes 16..40 of both halves,
/// MD5'd in two pieces
pub fn combo_key_11g(server_key: &[u8], client_key: &[u8]) -> Result<Vec<u8>> {
    if server_key.len() < 40 || client_key.len() < 40 {
        return Err(Error::AuthenticationFailed(
            "session key halves must be at least 40 bytes".into(),
        ));
    }
    let mut xored = [0u8; 24];
    for (i, x) in xored.iter_mut().enumerate() {
        *x = server_key[16 + i] ^ client_key[16 + i];
    }

    let mut part1 = Md5::new();
    part1.update(&xored[..16]);
    let mut part2 = Md5::new();
    part2.update(&xored[16..]);

    let mut result = part1.finalize().to_vec();
    result.extend_from_slice(&part2.finalize());
    result.truncate(24);
    Ok(result)
}

/// Generate a random salt for password encryption
pub fn generate_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Generate a random client session key half
pub fn generate_session_key_half(length: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut key = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut key);
    key
}
