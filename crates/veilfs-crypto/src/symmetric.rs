//! AES-CFB encryption with cipher block framing
//!
//! Block format (binary):
//! ```text
//! [N bytes: ciphertext][6 bytes: "00iv00"][16 bytes: IV][2 bytes: "xx"]
//! ```
//!
//! The IV is itself text: 12 random bytes, base64-encoded to exactly 16
//! ASCII characters, used directly as the AES-CFB IV. Decryption validates
//! the frame (terminator and IV marker) but the ciphertext carries no
//! authentication tag, so a wrong passphrase or a flipped ciphertext byte
//! yields garbage plaintext rather than an error.

use aes::{Aes128, Aes256};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb_mode::{Decryptor, Encryptor};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::cipher::CipherSuite;
use crate::error::{CryptError, CryptResult};
use crate::{BLOCK_OVERHEAD, BLOCK_PADDING, IV_MARKER, IV_SEED_SIZE, IV_SIZE};

/// Generate a fresh IV: 12 random bytes, base64-encoded to 16 ASCII bytes.
pub fn generate_iv() -> CryptResult<[u8; IV_SIZE]> {
    let mut seed = [0u8; IV_SEED_SIZE];
    OsRng
        .try_fill_bytes(&mut seed)
        .map_err(|e| CryptError::Randomness(e.to_string()))?;
    let encoded = BASE64.encode(seed);
    debug_assert_eq!(encoded.len(), IV_SIZE);
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(encoded.as_bytes());
    Ok(iv)
}

/// Encrypt `plaintext` into one framed cipher block.
pub fn symmetric_encrypt(
    plaintext: &[u8],
    passphrase: &[u8],
    suite: CipherSuite,
) -> CryptResult<Vec<u8>> {
    if plaintext.is_empty() {
        return Err(CryptError::EmptyInput {
            op: "symmetric_encrypt",
        });
    }
    let iv = generate_iv()?;
    let mut block = Vec::with_capacity(plaintext.len() + BLOCK_OVERHEAD);
    block.extend_from_slice(plaintext);
    cfb_encrypt(suite, passphrase, &iv, &mut block)?;
    block.extend_from_slice(IV_MARKER);
    block.extend_from_slice(&iv);
    block.extend_from_slice(BLOCK_PADDING);
    Ok(block)
}

/// Decrypt one framed cipher block produced by [`symmetric_encrypt`].
pub fn symmetric_decrypt(
    block: &[u8],
    passphrase: &[u8],
    suite: CipherSuite,
) -> CryptResult<Vec<u8>> {
    let (ciphertext, iv) = split_block(block)?;
    let mut plaintext = ciphertext.to_vec();
    cfb_decrypt(suite, passphrase, &iv, &mut plaintext)?;
    Ok(plaintext)
}

/// Split a framed block into ciphertext and IV, validating the trailer.
fn split_block(block: &[u8]) -> CryptResult<(&[u8], [u8; IV_SIZE])> {
    let Some(body) = block.strip_suffix(BLOCK_PADDING) else {
        return Err(CryptError::MalformedBlock(
            "missing terminator padding".into(),
        ));
    };
    if body.len() < IV_MARKER.len() + IV_SIZE {
        return Err(CryptError::MalformedBlock(format!(
            "trailer too short: {} bytes before terminator (need at least {})",
            body.len(),
            IV_MARKER.len() + IV_SIZE
        )));
    }
    let (rest, iv_bytes) = body.split_at(body.len() - IV_SIZE);
    let (ciphertext, marker) = rest.split_at(rest.len() - IV_MARKER.len());
    if marker != IV_MARKER {
        return Err(CryptError::MalformedBlock("IV marker not found".into()));
    }
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(iv_bytes);
    Ok((ciphertext, iv))
}

fn cfb_encrypt(
    suite: CipherSuite,
    passphrase: &[u8],
    iv: &[u8; IV_SIZE],
    buf: &mut [u8],
) -> CryptResult<()> {
    let key = suite.key_bytes(passphrase);
    match suite {
        CipherSuite::Aes256Cfb => Encryptor::<Aes256>::new_from_slices(&key, iv)
            .map_err(|e| CryptError::EncryptionFailed(e.to_string()))?
            .encrypt(buf),
        CipherSuite::Aes128Cfb => Encryptor::<Aes128>::new_from_slices(&key, iv)
            .map_err(|e| CryptError::EncryptionFailed(e.to_string()))?
            .encrypt(buf),
    }
    Ok(())
}

fn cfb_decrypt(
    suite: CipherSuite,
    passphrase: &[u8],
    iv: &[u8; IV_SIZE],
    buf: &mut [u8],
) -> CryptResult<()> {
    let key = suite.key_bytes(passphrase);
    match suite {
        CipherSuite::Aes256Cfb => Decryptor::<Aes256>::new_from_slices(&key, iv)
            .map_err(|e| CryptError::DecryptionFailed(e.to_string()))?
            .decrypt(buf),
        CipherSuite::Aes128Cfb => Decryptor::<Aes128>::new_from_slices(&key, iv)
            .map_err(|e| CryptError::DecryptionFailed(e.to_string()))?
            .decrypt(buf),
    }
    Ok(())
}
