//! The default encryption module
//!
//! Wraps the primitive crypto engine behind the [`EncryptionModule`]
//! contract: per-block AES-CFB transforms under a per-file key, with the key
//! sealed for the access list in a multi-recipient envelope at `end`.
//!
//! CFB carries no authentication tag. This module preserves that format
//! faithfully, so it provides confidentiality only; tampered ciphertext
//! decrypts to garbage instead of failing.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use veilfs_core::AccessList;
use veilfs_crypto::header::HEADER_CIPHER_KEY;
use veilfs_crypto::{
    generate_file_key, multi_key_encrypt, CipherSuite, Crypt, FileKey, HeaderFields,
    BLOCK_OVERHEAD, LEGACY_CIPHER,
};

use crate::collaborators::{EncryptionPolicy, KeyStore, StorageBackend};
use crate::module::{BeginContext, EncryptionModule, ModuleError, ModuleState, StreamMode};

/// Canonical display name. The module id is derived from this exact string;
/// UI layers may localize what they show, never this constant.
pub const DISPLAY_NAME: &str = "VeilFS Default Encryption Module";

/// Plaintext bytes per block unless overridden.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

struct FileContext {
    path: String,
    user: Option<String>,
    mode: StreamMode,
    suite: CipherSuite,
    access_list: AccessList,
    file_key: Option<FileKey>,
}

/// Default [`EncryptionModule`] backed by [`Crypt`].
pub struct CryptoModule {
    crypt: Crypt,
    key_store: Arc<dyn KeyStore>,
    policy: Arc<dyn EncryptionPolicy>,
    storage: Arc<dyn StorageBackend>,
    block_size: usize,
    state: ModuleState,
    file: Option<FileContext>,
}

impl CryptoModule {
    pub fn new(
        crypt: Crypt,
        key_store: Arc<dyn KeyStore>,
        policy: Arc<dyn EncryptionPolicy>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            crypt,
            key_store,
            policy,
            storage,
            block_size: DEFAULT_BLOCK_SIZE,
            state: ModuleState::Idle,
            file: None,
        }
    }

    /// Override the plaintext block size (tests use small blocks).
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    fn context(&self, op: &'static str) -> Result<&FileContext, ModuleError> {
        if self.state != ModuleState::Begun {
            return Err(ModuleError::InvalidState {
                op,
                state: self.state,
            });
        }
        // Begun implies a file context
        self.file.as_ref().ok_or(ModuleError::InvalidState {
            op,
            state: self.state,
        })
    }

    /// Seal `key` for everyone on `access_list` and persist the envelope.
    fn rewrap(
        &self,
        path: &str,
        key: &FileKey,
        access_list: &AccessList,
    ) -> Result<(), ModuleError> {
        let recipients = self.key_store.public_keys(access_list)?;
        let envelope = multi_key_encrypt(key.as_passphrase(), &recipients)?;
        self.key_store.store_envelope(path, &envelope)?;
        tracing::debug!(
            path,
            recipients = envelope.keys.len(),
            "file key envelope re-wrapped"
        );
        Ok(())
    }
}

impl EncryptionModule for CryptoModule {
    fn id(&self) -> String {
        module_id(DISPLAY_NAME)
    }

    fn display_name(&self) -> String {
        DISPLAY_NAME.to_string()
    }

    fn begin(&mut self, ctx: BeginContext) -> Result<HeaderFields, ModuleError> {
        if self.state != ModuleState::Idle {
            return Err(ModuleError::InvalidState {
                op: "begin",
                state: self.state,
            });
        }

        // A header declares the cipher authoritatively. Without one: new
        // writes take the configured cipher, legacy header-less files the
        // legacy cipher. Header cipher names never fall back silently.
        let suite = match ctx.header.get(HEADER_CIPHER_KEY) {
            Some(name) => name.parse().map_err(ModuleError::Crypto)?,
            None if ctx.mode.is_write() && !self.storage.file_exists(&ctx.path)? => {
                self.crypt.suite()
            }
            None => LEGACY_CIPHER,
        };

        // Writes need the key up front; reads resolve it lazily on the
        // first decrypt, where the recipient context arrives.
        let file_key = if ctx.mode.is_write() {
            match self.key_store.file_key(&ctx.path, ctx.user.as_deref())? {
                Some(existing) => Some(existing),
                None => {
                    tracing::debug!(path = %ctx.path, "generating fresh file key");
                    Some(generate_file_key()?)
                }
            }
        } else {
            None
        };

        let fields = if ctx.mode.is_write() {
            let mut fields = HeaderFields::new();
            fields.insert(HEADER_CIPHER_KEY.to_string(), suite.to_string());
            fields
        } else {
            HeaderFields::new()
        };

        self.file = Some(FileContext {
            path: ctx.path,
            user: ctx.user,
            mode: ctx.mode,
            suite,
            access_list: ctx.access_list,
            file_key,
        });
        self.state = ModuleState::Begun;
        Ok(fields)
    }

    fn end(&mut self, path: &str) -> Result<Vec<u8>, ModuleError> {
        let file = self.context("end")?;
        if file.mode.is_write() {
            let key = file.file_key.as_ref().ok_or_else(|| ModuleError::NoFileKey {
                path: path.to_string(),
            })?;
            // Replace-not-mutate: the whole wrapped-key set is rebuilt. The
            // owner is always a recipient, shared or not.
            let mut access_list = file.access_list.clone();
            if let Some(user) = &file.user {
                if !access_list.contains(user) {
                    access_list.users.push(user.clone());
                }
            }
            self.rewrap(path, key, &access_list)?;
        }
        self.state = ModuleState::Ended;
        self.file = None;
        // Blocks are emitted eagerly from encrypt; nothing is buffered here.
        Ok(Vec::new())
    }

    fn encrypt(&mut self, block: &[u8]) -> Result<Vec<u8>, ModuleError> {
        let file = self.context("encrypt")?;
        let key = file.file_key.as_ref().ok_or_else(|| ModuleError::NoFileKey {
            path: file.path.clone(),
        })?;
        let suite = file.suite;
        Ok(veilfs_crypto::symmetric_encrypt(
            block,
            key.as_passphrase(),
            suite,
        )?)
    }

    fn decrypt(&mut self, block: &[u8], recipient: Option<&str>) -> Result<Vec<u8>, ModuleError> {
        if self.state != ModuleState::Begun {
            return Err(ModuleError::InvalidState {
                op: "decrypt",
                state: self.state,
            });
        }
        let Some(file) = self.file.as_mut() else {
            return Err(ModuleError::InvalidState {
                op: "decrypt",
                state: self.state,
            });
        };
        if file.file_key.is_none() {
            let key = self
                .key_store
                .file_key(&file.path, recipient)?
                .ok_or_else(|| ModuleError::NoFileKey {
                    path: file.path.clone(),
                })?;
            file.file_key = Some(key);
        }
        let key = file.file_key.as_ref().ok_or_else(|| ModuleError::NoFileKey {
            path: file.path.clone(),
        })?;
        Ok(veilfs_crypto::symmetric_decrypt(
            block,
            key.as_passphrase(),
            file.suite,
        )?)
    }

    fn update(&self, path: &str, access_list: &AccessList) -> Result<bool, ModuleError> {
        let Some(key) = self.key_store.file_key(path, None)? else {
            // Not an encrypted file; nothing to re-wrap.
            return Ok(false);
        };
        self.rewrap(path, &key, access_list)?;
        Ok(true)
    }

    fn should_encrypt(&self, path: &str) -> Result<bool, ModuleError> {
        Ok(self.policy.should_encrypt(path)?)
    }

    fn calculate_unencrypted_size(&self, path: &str) -> Result<u64, ModuleError> {
        let stored = self.storage.stored_size(path)?;
        if stored == 0 {
            return Ok(0);
        }

        let mut probe = [0u8; 6];
        let mut reader = self.storage.open_read(path)?;
        let mut read = 0;
        while read < probe.len() {
            let n = reader
                .read(&mut probe[read..])
                .map_err(|e| ModuleError::Collaborator(e.into()))?;
            if n == 0 {
                break;
            }
            read += n;
        }
        let has_header = &probe[..read] == b"HBEGIN";

        let sbs = (self.block_size + BLOCK_OVERHEAD) as u64;
        let content = stored.saturating_sub(if has_header { sbs } else { 0 });
        let full_blocks = content / sbs;
        let tail = content % sbs;
        Ok(full_blocks * self.block_size as u64 + tail.saturating_sub(BLOCK_OVERHEAD as u64))
    }

    fn unencrypted_block_size(&self) -> usize {
        self.block_size
    }
}

/// Stable module id: the first 8 bytes of SHA-256 of the canonical display
/// name, hex-encoded.
fn module_id(display_name: &str) -> String {
    let digest = Sha256::digest(display_name.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
