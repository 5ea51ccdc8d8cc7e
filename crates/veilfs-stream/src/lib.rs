//! veilfs-stream: transparent per-file encryption for byte streams
//!
//! Layers, outermost first:
//!
//! - [`EncryptionStream`]: a seekable `Read`/`Write`/`Seek` wrapper that
//!   translates plaintext offsets into block-aligned cipher operations over
//!   a raw storage stream, handling the header block and partial overwrites.
//! - [`EncryptionModule`]: the pluggable per-file strategy the stream drives
//!   (`begin` / per-block transforms / `end`), resolved per open through a
//!   [`ModuleRegistry`]. [`CryptoModule`] is the default implementation over
//!   the `veilfs-crypto` engine.
//! - Collaborator traits ([`StorageBackend`], [`AccessListProvider`],
//!   [`SizeReporter`], [`EncryptionPolicy`], [`KeyStore`]): the narrow
//!   interfaces to storage, sharing, and key custody, implemented by the
//!   embedding application.

pub mod collaborators;
pub mod crypto_module;
pub mod module;
pub mod registry;
pub mod stream;

pub use collaborators::{
    AccessListProvider, EncryptionPolicy, KeyStore, SizeReporter, StorageBackend,
};
pub use crypto_module::{CryptoModule, DEFAULT_BLOCK_SIZE, DISPLAY_NAME};
pub use module::{BeginContext, EncryptionModule, ModuleError, ModuleState, StreamMode};
pub use registry::{ModuleRegistry, RegistryError};
pub use stream::{probe_header, EncryptionStream, OpenParams, StreamError};
