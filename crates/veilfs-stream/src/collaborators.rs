//! Narrow interfaces to the systems around the pipeline
//!
//! Storage, sharing, size accounting, encryption policy, and key custody are
//! external collaborators. Their failures are opaque here, so every trait
//! returns `anyhow::Result`; the stream and module layers wrap them into
//! their own typed errors.

use std::collections::BTreeMap;
use std::io::Read;

use veilfs_core::AccessList;
use veilfs_crypto::{FileKey, MultiKeyEnvelope, RsaPublicKey};

/// Raw byte access to the backing store.
pub trait StorageBackend {
    fn file_exists(&self, internal_path: &str) -> anyhow::Result<bool>;

    /// Stored (ciphertext + header) size in bytes.
    fn stored_size(&self, internal_path: &str) -> anyhow::Result<u64>;

    /// A fresh reader over the raw stored bytes.
    fn open_read(&self, internal_path: &str) -> anyhow::Result<Box<dyn Read>>;
}

/// Resolves who may decrypt a path right now.
pub trait AccessListProvider {
    fn access_list(&self, path: &str) -> anyhow::Result<AccessList>;
}

/// Receives the final logical (plaintext) size when a writable stream closes.
pub trait SizeReporter {
    fn update_unencrypted_size(&self, full_path: &str, size: u64) -> anyhow::Result<()>;
}

/// Policy hook deciding whether a path gets encrypted at all.
pub trait EncryptionPolicy {
    fn should_encrypt(&self, path: &str) -> anyhow::Result<bool>;
}

/// Key custody: where private keys live and how envelopes are opened is this
/// collaborator's business, not the pipeline's.
pub trait KeyStore {
    /// The unwrapped file key for `path`, opened for `recipient` (`None` is
    /// the public/anonymous slot). `Ok(None)` means the file has no key,
    /// i.e. it is not encrypted.
    fn file_key(&self, path: &str, recipient: Option<&str>) -> anyhow::Result<Option<FileKey>>;

    /// Persist the envelope holding a file's wrapped key set, replacing any
    /// previous one.
    fn store_envelope(&self, path: &str, envelope: &MultiKeyEnvelope) -> anyhow::Result<()>;

    /// Public keys for every resolvable identity on the access list,
    /// including the public-link slot when `access.public` is set.
    fn public_keys(&self, access: &AccessList) -> anyhow::Result<BTreeMap<String, RsaPublicKey>>;
}
