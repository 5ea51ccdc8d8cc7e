//! veilfs-crypto: the primitive crypto engine for VeilFS
//!
//! Per-file content encryption with OpenSSL-compatible AES-CFB framing.
//!
//! On-disk layout:
//! ```text
//! encrypted file   := [header block: sbs bytes][cipher block]*
//! header           := "HBEGIN:cipher:AES-256-CFB:HEND", padded with '-'
//! cipher block     := [ciphertext][6 bytes: "00iv00"][16 bytes: IV][2 bytes: "xx"]
//! private key blob := header (unpadded) || cipher block
//! ```
//!
//! Key material:
//! ```text
//! FileKey (32 random bytes, carried as 44 base64 characters)
//!   └── content cipher passphrase (EVP-style truncate/zero-pad to key size)
//! RSA key pair (per user, PEM)
//!   └── wraps envelope session keys via OAEP-SHA256
//! ```
//!
//! CFB is a stream mode with no authentication tag: a wrong key or a
//! flipped ciphertext byte decrypts to garbage instead of failing. Callers
//! needing integrity must layer it above this format.

pub mod cipher;
pub mod crypt;
pub mod envelope;
pub mod error;
pub mod header;
pub mod keys;
pub mod symmetric;

pub use cipher::{CipherSuite, DEFAULT_CIPHER, LEGACY_CIPHER};
pub use crypt::Crypt;
pub use envelope::{multi_key_decrypt, multi_key_encrypt, MultiKeyEnvelope};
pub use error::{CryptError, CryptResult};
pub use header::{
    format_header, generate_header, header_block, parse_header, HeaderFields, ParsedHeader,
};
pub use keys::{
    decrypt_private_key, encrypt_private_key, generate_file_key, generate_key_pair,
    private_key_from_pem, public_key_from_pem, FileKey, KeyPair,
};
pub use symmetric::{generate_iv, symmetric_decrypt, symmetric_encrypt};

pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Bytes of framing appended to every cipher block: `00iv00` marker (6),
/// IV (16), terminator `xx` (2).
pub const BLOCK_OVERHEAD: usize = 24;

/// AES-CFB initialization vector size in bytes
pub const IV_SIZE: usize = 16;

/// Random bytes drawn per IV; base64-encoding them yields the 16 IV bytes
pub const IV_SEED_SIZE: usize = 12;

/// Marker preceding the IV in a cipher block
pub const IV_MARKER: &[u8; 6] = b"00iv00";

/// Terminating padding of a cipher block
pub const BLOCK_PADDING: &[u8; 2] = b"xx";

/// Random bytes behind a file key before base64 encoding (256-bit)
pub const FILE_KEY_SEED_SIZE: usize = 32;

/// Length of a file key as carried: 44 base64 characters
pub const FILE_KEY_LEN: usize = 44;
