use thiserror::Error;

pub type CryptResult<T> = Result<T, CryptError>;

/// Failures of the primitive crypto engine.
#[derive(Debug, Error)]
pub enum CryptError {
    #[error("key pair generation failed for user {user:?}: {reason}")]
    KeyGeneration {
        user: Option<String>,
        reason: String,
    },

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("{op} requires non-empty input")]
    EmptyInput { op: &'static str },

    #[error("multi-key encryption failed: {0}")]
    MultiKeyEncrypt(String),

    #[error("multi-key decryption failed: {0}")]
    MultiKeyDecrypt(String),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("malformed cipher block: {0}")]
    MalformedBlock(String),

    #[error("unsupported cipher: {0}")]
    UnknownCipher(String),

    #[error("system randomness unavailable: {0}")]
    Randomness(String),
}

impl From<CryptError> for veilfs_core::VeilError {
    fn from(err: CryptError) -> Self {
        veilfs_core::VeilError::Crypto(err.to_string())
    }
}
