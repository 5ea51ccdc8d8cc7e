//! Shared test doubles: in-memory storage, key store, and stream buffers.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, OnceLock};

use veilfs_core::{AccessList, CryptoConfig};
use veilfs_crypto::{
    generate_key_pair, multi_key_decrypt, private_key_from_pem, public_key_from_pem, Crypt,
    FileKey, MultiKeyEnvelope, RsaPrivateKey, RsaPublicKey, BLOCK_OVERHEAD,
};
use veilfs_stream::{
    AccessListProvider, CryptoModule, EncryptionModule, EncryptionPolicy, EncryptionStream,
    KeyStore, OpenParams, SizeReporter, StorageBackend, StreamMode,
};

/// A clonable in-memory stream; clones share the same bytes, so a test can
/// keep a handle while a stream owns another.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(Cursor::new(bytes))))
    }

    /// Copy of the current contents. Named to stay clear of `Read::bytes`,
    /// which would shadow an inherent `bytes` in files importing the trait.
    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().unwrap().get_ref().clone()
    }

    pub fn len(&self) -> u64 {
        self.0.lock().unwrap().get_ref().len() as u64
    }
}

impl Read for SharedBuf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().unwrap().read(buf)
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}

impl Seek for SharedBuf {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.lock().unwrap().seek(pos)
    }
}

/// Wraps a stream so every seek fails, modeling a pipe-like sink.
pub struct NoSeek<S>(pub S);

impl<S: Read> Read for NoSeek<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<S: Write> Write for NoSeek<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<S> Seek for NoSeek<S> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream does not support seeking",
        ))
    }
}

#[derive(Default)]
pub struct MemStorage {
    files: Mutex<BTreeMap<String, SharedBuf>>,
}

impl MemStorage {
    pub fn register(&self, path: &str, buf: SharedBuf) {
        self.files.lock().unwrap().insert(path.to_string(), buf);
    }
}

impl StorageBackend for MemStorage {
    fn file_exists(&self, internal_path: &str) -> anyhow::Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(internal_path))
    }

    fn stored_size(&self, internal_path: &str) -> anyhow::Result<u64> {
        let files = self.files.lock().unwrap();
        let buf = files
            .get(internal_path)
            .ok_or_else(|| anyhow::anyhow!("no such file: {internal_path}"))?;
        Ok(buf.len())
    }

    fn open_read(&self, internal_path: &str) -> anyhow::Result<Box<dyn Read>> {
        let files = self.files.lock().unwrap();
        let buf = files
            .get(internal_path)
            .ok_or_else(|| anyhow::anyhow!("no such file: {internal_path}"))?;
        Ok(Box::new(Cursor::new(buf.snapshot())))
    }
}

pub struct StaticAccess(pub AccessList);

impl AccessListProvider for StaticAccess {
    fn access_list(&self, _path: &str) -> anyhow::Result<AccessList> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct RecordingSizeReporter {
    sizes: Mutex<BTreeMap<String, u64>>,
}

impl RecordingSizeReporter {
    pub fn reported(&self, path: &str) -> Option<u64> {
        self.sizes.lock().unwrap().get(path).copied()
    }
}

impl SizeReporter for RecordingSizeReporter {
    fn update_unencrypted_size(&self, full_path: &str, size: u64) -> anyhow::Result<()> {
        self.sizes
            .lock()
            .unwrap()
            .insert(full_path.to_string(), size);
        Ok(())
    }
}

pub struct AllowAll;

impl EncryptionPolicy for AllowAll {
    fn should_encrypt(&self, _path: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

pub struct TestUser {
    pub public: RsaPublicKey,
    pub private: RsaPrivateKey,
}

/// Fixed user set with cached RSA keys (small modulus for test speed).
pub fn test_users() -> &'static BTreeMap<String, TestUser> {
    static USERS: OnceLock<BTreeMap<String, TestUser>> = OnceLock::new();
    USERS.get_or_init(|| {
        ["alice", "bob", "carol"]
            .into_iter()
            .map(|name| {
                let pair = generate_key_pair(1024, Some(name)).unwrap();
                let user = TestUser {
                    public: public_key_from_pem(&pair.public_pem).unwrap(),
                    private: private_key_from_pem(&pair.private_pem).unwrap(),
                };
                (name.to_string(), user)
            })
            .collect()
    })
}

/// Key store holding every test user's keys. `recipient = None` unwraps via
/// any slice it holds a private key for (the store's ambient custody).
#[derive(Default)]
pub struct MemKeyStore {
    envelopes: Mutex<BTreeMap<String, MultiKeyEnvelope>>,
}

impl MemKeyStore {
    pub fn envelope(&self, path: &str) -> Option<MultiKeyEnvelope> {
        self.envelopes.lock().unwrap().get(path).cloned()
    }

    pub fn insert_envelope(&self, path: &str, envelope: MultiKeyEnvelope) {
        self.envelopes
            .lock()
            .unwrap()
            .insert(path.to_string(), envelope);
    }
}

impl KeyStore for MemKeyStore {
    fn file_key(&self, path: &str, recipient: Option<&str>) -> anyhow::Result<Option<FileKey>> {
        let envelopes = self.envelopes.lock().unwrap();
        let Some(envelope) = envelopes.get(path) else {
            return Ok(None);
        };
        let users = test_users();

        let (id, wrapped) = match recipient {
            Some(id) => {
                let wrapped = envelope
                    .wrapped_key_for(id)
                    .ok_or_else(|| anyhow::anyhow!("no wrapped key slice for {id}"))?;
                (id.to_string(), wrapped)
            }
            None => envelope
                .keys
                .iter()
                .find(|(id, _)| users.contains_key(*id))
                .map(|(id, wrapped)| (id.clone(), wrapped.as_slice()))
                .ok_or_else(|| anyhow::anyhow!("no openable key slice for {path}"))?,
        };

        let user = users
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown user {id}"))?;
        let passphrase = multi_key_decrypt(&envelope.data, wrapped, &user.private)?;
        Ok(Some(FileKey::from_encoded(String::from_utf8(passphrase)?)?))
    }

    fn store_envelope(&self, path: &str, envelope: &MultiKeyEnvelope) -> anyhow::Result<()> {
        self.insert_envelope(path, envelope.clone());
        Ok(())
    }

    fn public_keys(&self, access: &AccessList) -> anyhow::Result<BTreeMap<String, RsaPublicKey>> {
        let users = test_users();
        Ok(access
            .users
            .iter()
            .filter_map(|id| {
                users
                    .get(id)
                    .map(|user| (id.clone(), user.public.clone()))
            })
            .collect())
    }
}

/// Bundled collaborators for one test scenario.
pub struct World {
    pub storage: Arc<MemStorage>,
    pub access: StaticAccess,
    pub keys: Arc<MemKeyStore>,
    pub sizes: Arc<RecordingSizeReporter>,
    pub block_size: usize,
}

impl World {
    pub fn new(access: AccessList, block_size: usize) -> Self {
        Self {
            storage: Arc::new(MemStorage::default()),
            access: StaticAccess(access),
            keys: Arc::new(MemKeyStore::default()),
            sizes: Arc::new(RecordingSizeReporter::default()),
            block_size,
        }
    }

    pub fn storage_block_size(&self) -> usize {
        self.block_size + BLOCK_OVERHEAD
    }

    pub fn module(&self) -> Box<dyn EncryptionModule> {
        Box::new(
            CryptoModule::new(
                Crypt::new(&CryptoConfig::default()),
                self.keys.clone(),
                Arc::new(AllowAll),
                self.storage.clone(),
            )
            .with_block_size(self.block_size),
        )
    }

    pub fn open<S: Read + Write + Seek>(
        &self,
        source: S,
        params: OpenParams,
    ) -> EncryptionStream<S> {
        EncryptionStream::open(
            source,
            params,
            self.module(),
            self.storage.as_ref(),
            &self.access,
            self.sizes.clone(),
        )
        .unwrap()
    }

    pub fn write_params(&self, path: &str, user: &str) -> OpenParams {
        OpenParams {
            full_path: path.to_string(),
            internal_path: path.to_string(),
            uid: Some(user.to_string()),
            mode: StreamMode::Write,
            header: veilfs_crypto::HeaderFields::new(),
            unencrypted_size: 0,
        }
    }

    /// Read params for a registered file: probes the stored header and
    /// derives the logical size the way the orchestration layer would.
    pub fn read_params(&self, path: &str, user: &str) -> OpenParams {
        let mut reader = self.storage.open_read(path).unwrap();
        let (header, _) =
            veilfs_stream::probe_header(&mut reader, self.storage_block_size()).unwrap();
        let size = self.module().calculate_unencrypted_size(path).unwrap();
        OpenParams {
            full_path: path.to_string(),
            internal_path: path.to_string(),
            uid: Some(user.to_string()),
            mode: StreamMode::Read,
            header,
            unencrypted_size: size,
        }
    }
}

/// Deterministic pattern data distinct at every offset.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 5) ^ 0x5A) as u8)
        .collect()
}
