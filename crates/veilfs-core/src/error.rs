use thiserror::Error;

pub type VeilResult<T> = Result<T, VeilError>;

#[derive(Debug, Error)]
pub enum VeilError {
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("encryption module error: {0}")]
    Module(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
