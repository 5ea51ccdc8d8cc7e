//! Supported content cipher suites

use std::fmt;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::error::CryptError;

/// Content cipher for newly written files.
pub const DEFAULT_CIPHER: CipherSuite = CipherSuite::Aes256Cfb;

/// Cipher assumed for files written before headers existed.
pub const LEGACY_CIPHER: CipherSuite = CipherSuite::Aes128Cfb;

/// The AES-CFB variants the on-disk format supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    Aes256Cfb,
    Aes128Cfb,
}

impl CipherSuite {
    /// Cipher key size in bytes.
    pub fn key_size(self) -> usize {
        match self {
            CipherSuite::Aes256Cfb => 32,
            CipherSuite::Aes128Cfb => 16,
        }
    }

    /// Resolve a configured cipher name.
    ///
    /// Unsupported names keep the default and log a warning instead of
    /// failing. Cipher names read from file headers go through [`FromStr`],
    /// where an unsupported name is an error: decrypting existing blocks
    /// with a substituted cipher would produce garbage.
    pub fn from_config_value(value: &str) -> CipherSuite {
        match value.parse() {
            Ok(suite) => suite,
            Err(_) => {
                tracing::warn!(
                    configured = value,
                    fallback = %DEFAULT_CIPHER,
                    "unsupported cipher configured, using fallback"
                );
                DEFAULT_CIPHER
            }
        }
    }

    /// Expand a passphrase to this suite's key size: truncated when longer,
    /// zero-padded when shorter (the OpenSSL EVP convention; file keys are
    /// 44 base64 characters fed to AES-256 this way).
    pub fn key_bytes(self, passphrase: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut key = Zeroizing::new(vec![0u8; self.key_size()]);
        let n = passphrase.len().min(key.len());
        key[..n].copy_from_slice(&passphrase[..n]);
        key
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CipherSuite::Aes256Cfb => "AES-256-CFB",
            CipherSuite::Aes128Cfb => "AES-128-CFB",
        })
    }
}

impl FromStr for CipherSuite {
    type Err = CryptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AES-256-CFB" => Ok(CipherSuite::Aes256Cfb),
            "AES-128-CFB" => Ok(CipherSuite::Aes128Cfb),
            other => Err(CryptError::UnknownCipher(other.to_string())),
        }
    }
}
