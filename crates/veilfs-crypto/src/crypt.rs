//! The configured crypto engine

use std::collections::BTreeMap;

use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::SecretString;
use veilfs_core::CryptoConfig;
use zeroize::Zeroizing;

use crate::cipher::CipherSuite;
use crate::envelope::{multi_key_decrypt, multi_key_encrypt, MultiKeyEnvelope};
use crate::error::CryptResult;
use crate::header::{generate_header, parse_header, ParsedHeader};
use crate::keys::{
    decrypt_private_key, encrypt_private_key, generate_file_key, generate_key_pair, FileKey,
    KeyPair,
};
use crate::symmetric::{symmetric_decrypt, symmetric_encrypt};

/// The primitive crypto engine, bound to a resolved configuration.
///
/// Holds only the configured cipher suite and key-pair modulus size; every
/// operation is otherwise stateless, so one instance may be shared freely.
#[derive(Debug, Clone)]
pub struct Crypt {
    suite: CipherSuite,
    key_bits: usize,
}

impl Crypt {
    /// Resolve from configuration. An unsupported cipher name falls back to
    /// the default with a warning.
    pub fn new(config: &CryptoConfig) -> Self {
        Self {
            suite: CipherSuite::from_config_value(&config.cipher),
            key_bits: config.private_key_bits,
        }
    }

    pub fn with_suite(suite: CipherSuite, key_bits: usize) -> Self {
        Self { suite, key_bits }
    }

    /// The content cipher used for newly written data.
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn generate_key_pair(&self, user: Option<&str>) -> CryptResult<KeyPair> {
        generate_key_pair(self.key_bits, user)
    }

    pub fn generate_file_key(&self) -> CryptResult<FileKey> {
        generate_file_key()
    }

    /// Encrypt one plaintext buffer into a framed cipher block under the
    /// configured suite.
    pub fn symmetric_encrypt(&self, plaintext: &[u8], passphrase: &[u8]) -> CryptResult<Vec<u8>> {
        symmetric_encrypt(plaintext, passphrase, self.suite)
    }

    /// Decrypt one framed cipher block. The suite is explicit because
    /// existing data declares its cipher in the file header, independent of
    /// what this engine is configured to write.
    pub fn symmetric_decrypt(
        &self,
        block: &[u8],
        passphrase: &[u8],
        suite: CipherSuite,
    ) -> CryptResult<Vec<u8>> {
        symmetric_decrypt(block, passphrase, suite)
    }

    /// Header text declaring the configured cipher.
    pub fn generate_header(&self) -> String {
        generate_header(self.suite)
    }

    pub fn parse_header(&self, data: &[u8]) -> CryptResult<ParsedHeader> {
        parse_header(data)
    }

    pub fn encrypt_private_key(&self, pem: &str, password: &SecretString) -> CryptResult<Vec<u8>> {
        encrypt_private_key(pem, password, self.suite)
    }

    pub fn decrypt_private_key(
        &self,
        blob: &[u8],
        password: &SecretString,
    ) -> CryptResult<Option<Zeroizing<String>>> {
        decrypt_private_key(blob, password)
    }

    pub fn multi_key_encrypt(
        &self,
        plaintext: &[u8],
        recipients: &BTreeMap<String, RsaPublicKey>,
    ) -> CryptResult<MultiKeyEnvelope> {
        multi_key_encrypt(plaintext, recipients)
    }

    pub fn multi_key_decrypt(
        &self,
        data: &[u8],
        wrapped_key: &[u8],
        private_key: &RsaPrivateKey,
    ) -> CryptResult<Vec<u8>> {
        multi_key_decrypt(data, wrapped_key, private_key)
    }
}
