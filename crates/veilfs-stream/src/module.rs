//! The per-file encryption module contract
//!
//! A module is the strategy object the streaming wrapper drives through a
//! fixed lifecycle: `begin` once before the first block, any number of
//! `encrypt`/`decrypt` calls, `end` once after the last. Metadata operations
//! (`update`, `should_encrypt`, `calculate_unencrypted_size`) are valid in
//! any state. One module instance serves exactly one file open; the registry
//! hands out a fresh instance per resolve.

use thiserror::Error;
use veilfs_core::AccessList;
use veilfs_crypto::{CryptError, HeaderFields};

/// Direction a file was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Read,
    Write,
}

impl StreamMode {
    pub fn is_write(self) -> bool {
        matches!(self, StreamMode::Write)
    }
}

/// Everything a module learns at `begin`, typed and complete; a module must
/// not need any context beyond this.
#[derive(Debug, Clone)]
pub struct BeginContext {
    /// Application-visible path of the file.
    pub path: String,
    /// The user this stream acts as; `None` for public/anonymous access.
    pub user: Option<String>,
    pub mode: StreamMode,
    /// Header fields already on disk; empty for new or legacy files.
    pub header: HeaderFields,
    /// Who may decrypt the file at open time.
    pub access_list: AccessList,
}

/// Lifecycle position of a module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Idle,
    Begun,
    Ended,
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("{op} called in state {state:?}")]
    InvalidState {
        op: &'static str,
        state: ModuleState,
    },

    #[error("no file key available for {path:?}")]
    NoFileKey { path: String },

    #[error(transparent)]
    Crypto(#[from] CryptError),

    #[error("collaborator failure: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl From<ModuleError> for veilfs_core::VeilError {
    fn from(err: ModuleError) -> Self {
        veilfs_core::VeilError::Module(err.to_string())
    }
}

/// Capability set every encryption module implements.
///
/// Object-safe so the registry can store heterogeneous factories and the
/// wrapper can hold `Box<dyn EncryptionModule>`.
pub trait EncryptionModule {
    /// Stable identifier persisted as file metadata. Must never change once
    /// assigned: it ties existing files to the module that encrypted them.
    fn id(&self) -> String;

    /// Human-readable label; localizable, never used as an identifier.
    fn display_name(&self) -> String;

    /// Called exactly once before the first block. Returns the header fields
    /// to write back for a write stream; empty for reads.
    fn begin(&mut self, ctx: BeginContext) -> Result<HeaderFields, ModuleError>;

    /// Called exactly once after the last block. Returns any buffered
    /// remainder the wrapper must still write.
    fn end(&mut self, path: &str) -> Result<Vec<u8>, ModuleError>;

    /// Transform one plaintext block into one cipher block.
    fn encrypt(&mut self, block: &[u8]) -> Result<Vec<u8>, ModuleError>;

    /// Transform one cipher block back into plaintext. `recipient` names the
    /// identity whose key slice unwraps the file key; `None` means the
    /// public/anonymous slot.
    fn decrypt(&mut self, block: &[u8], recipient: Option<&str>) -> Result<Vec<u8>, ModuleError>;

    /// Re-wrap the file key for a changed recipient set without touching
    /// content. Returns `false` when the file has no key (not encrypted).
    fn update(&self, path: &str, access_list: &AccessList) -> Result<bool, ModuleError>;

    /// Policy hook: whether this path should be encrypted at all.
    fn should_encrypt(&self, path: &str) -> Result<bool, ModuleError>;

    /// Derive the logical plaintext size from the stored ciphertext size.
    fn calculate_unencrypted_size(&self, path: &str) -> Result<u64, ModuleError>;

    /// Fixed plaintext block size the wrapper must feed to `encrypt`.
    fn unencrypted_block_size(&self) -> usize;
}
