//! Seekable transparent encryption over a raw ciphertext stream
//!
//! The wrapper presents plaintext byte offsets while the underlying stream
//! holds framed cipher blocks behind an optional header block. Every seek
//! translates through the block formula
//!
//! ```text
//! cipher_offset(p) = header_size + (p / ubs) * sbs      sbs = ubs + 24
//! ```
//!
//! and plaintext never assumes its block boundaries align with storage.
//!
//! Writes are not transactional: a failure mid-write leaves already flushed
//! blocks in place with no rollback. Callers treat a failed write as a
//! potentially inconsistent file and re-upload.

use std::cmp::min;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use thiserror::Error;
use veilfs_crypto::{header_block, parse_header, CryptError, HeaderFields, BLOCK_OVERHEAD};

use crate::collaborators::{AccessListProvider, SizeReporter, StorageBackend};
use crate::module::{BeginContext, EncryptionModule, ModuleError, StreamMode};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Crypto(#[from] CryptError),

    #[error("collaborator failure: {0}")]
    Collaborator(#[from] anyhow::Error),

    #[error("stream was opened read-only")]
    ReadOnly,

    #[error("seek target {target} outside [0, {size}]")]
    SeekOutOfRange { target: i64, size: u64 },

    #[error("non-seekable stream: {op} needs offset {want} but the stream is at {at}")]
    NonSeekable {
        op: &'static str,
        at: u64,
        want: u64,
    },
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(e) => e,
            StreamError::SeekOutOfRange { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
            }
            other => io::Error::other(other.to_string()),
        }
    }
}

impl From<StreamError> for veilfs_core::VeilError {
    fn from(err: StreamError) -> Self {
        veilfs_core::VeilError::Stream(err.to_string())
    }
}

/// Everything known about the file before the stream opens, resolved by the
/// orchestration layer. Constructing this is the whole contract; there is no
/// runtime "missing context key" state.
#[derive(Debug, Clone)]
pub struct OpenParams {
    /// Application-visible path.
    pub full_path: String,
    /// Path in the backing store.
    pub internal_path: String,
    /// Identity this stream acts as; `None` for public/anonymous access.
    pub uid: Option<String>,
    pub mode: StreamMode,
    /// Header fields already on disk (see [`probe_header`]); empty for new
    /// or legacy files.
    pub header: HeaderFields,
    /// Logical plaintext size of the existing content; 0 for new files.
    pub unencrypted_size: u64,
}

struct BlockCache {
    index: u64,
    data: Vec<u8>,
    dirty: bool,
    valid: bool,
}

impl BlockCache {
    fn empty() -> Self {
        Self {
            index: 0,
            data: Vec::new(),
            dirty: false,
            valid: false,
        }
    }
}

/// Transparent encryption wrapper over a raw ciphertext stream.
///
/// One instance per open handle; not safe for concurrent use (the position
/// cursor and block cache mutate on every call). Independent files may run
/// independent streams in parallel.
pub struct EncryptionStream<S: Read + Write + Seek> {
    source: S,
    module: Box<dyn EncryptionModule>,
    size_reporter: Arc<dyn SizeReporter>,
    full_path: String,
    uid: Option<String>,
    read_only: bool,
    seekable: bool,
    /// Raw-stream cursor, tracked explicitly for non-seekable streams.
    raw_pos: u64,
    /// Plaintext cursor.
    position: u64,
    unencrypted_size: u64,
    ubs: u64,
    sbs: u64,
    header_size: u64,
    new_header: HeaderFields,
    header_written: bool,
    cache: BlockCache,
    ended: bool,
    closed: bool,
}

impl<S: Read + Write + Seek> EncryptionStream<S> {
    /// Open a stream over `source`, invoking `begin` on the module exactly
    /// once. The access list comes from the target path, or its parent when
    /// the file does not exist yet (brand-new file under a shared folder).
    pub fn open(
        mut source: S,
        params: OpenParams,
        mut module: Box<dyn EncryptionModule>,
        storage: &dyn StorageBackend,
        access: &dyn AccessListProvider,
        size_reporter: Arc<dyn SizeReporter>,
    ) -> Result<Self, StreamError> {
        let seekable = source.seek(SeekFrom::Current(0)).is_ok();
        let ubs = module.unencrypted_block_size() as u64;
        let sbs = ubs + BLOCK_OVERHEAD as u64;

        let exists = storage.file_exists(&params.internal_path)?;
        let access_path = if exists {
            params.full_path.clone()
        } else {
            parent_path(&params.full_path)
        };
        let access_list = access.access_list(&access_path)?;

        // Legacy header-less files keep their layout: retrofitting a header
        // would shift every block offset.
        let has_header = !params.header.is_empty();
        let header_size = if has_header || (params.mode.is_write() && !exists) {
            sbs
        } else {
            0
        };

        let new_header = module.begin(BeginContext {
            path: params.full_path.clone(),
            user: params.uid.clone(),
            mode: params.mode,
            header: params.header,
            access_list,
        })?;

        tracing::debug!(
            path = %params.full_path,
            mode = ?params.mode,
            seekable,
            size = params.unencrypted_size,
            "encryption stream opened"
        );

        Ok(Self {
            source,
            module,
            size_reporter,
            full_path: params.full_path,
            uid: params.uid,
            read_only: !params.mode.is_write(),
            seekable,
            raw_pos: 0,
            position: 0,
            unencrypted_size: params.unencrypted_size,
            ubs,
            sbs,
            header_size,
            new_header,
            header_written: has_header,
            cache: BlockCache::empty(),
            ended: false,
            closed: false,
        })
    }

    /// Current plaintext position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Logical plaintext size, tracking the maximum position written.
    pub fn unencrypted_size(&self) -> u64 {
        self.unencrypted_size
    }

    /// Flush state and release the stream. `end` runs exactly once; any
    /// remainder a module still holds is written at the tail. Errors here
    /// leave the file potentially inconsistent (no rollback).
    pub fn close(mut self) -> Result<(), StreamError> {
        self.do_close()
    }

    fn do_close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.flush_block()?;
        if !self.ended {
            self.ended = true;
            let remainder = self.module.end(&self.full_path)?;
            if !remainder.is_empty() && !self.read_only {
                // A buffering module's remainder is its tail block; it lands
                // at that block's cipher offset.
                let offset = self.cipher_offset(self.unencrypted_size / self.ubs);
                if self.seekable {
                    self.source.seek(SeekFrom::Start(offset))?;
                    self.raw_pos = offset;
                } else if offset != self.raw_pos {
                    return Err(StreamError::NonSeekable {
                        op: "write remainder",
                        at: self.raw_pos,
                        want: offset,
                    });
                }
                self.source.write_all(&remainder)?;
                self.raw_pos += remainder.len() as u64;
            }
        }
        if !self.read_only {
            self.size_reporter
                .update_unencrypted_size(&self.full_path, self.unencrypted_size)?;
            self.source.flush()?;
        }
        tracing::debug!(
            path = %self.full_path,
            size = self.unencrypted_size,
            "encryption stream closed"
        );
        Ok(())
    }

    fn cipher_offset(&self, index: u64) -> u64 {
        self.header_size + index * self.sbs
    }

    /// Bring the block holding plaintext offset `index * ubs` into the
    /// cache, evicting (and flushing) any other cached block.
    fn load_block(&mut self, index: u64) -> Result<(), StreamError> {
        if self.cache.valid && self.cache.index == index {
            return Ok(());
        }
        self.flush_block()?;

        let block_start = index * self.ubs;
        let plain_len = if block_start >= self.unencrypted_size {
            0
        } else {
            min(self.ubs, self.unencrypted_size - block_start) as usize
        };

        self.cache.index = index;
        self.cache.data.clear();
        self.cache.dirty = false;
        self.cache.valid = false;
        if plain_len == 0 {
            self.cache.valid = true;
            return Ok(());
        }

        if !self.seekable && !self.read_only {
            // A sink we cannot reposition cannot be read back for a
            // read-modify-write; only pure appends are possible.
            return Err(StreamError::NonSeekable {
                op: "overwrite",
                at: self.raw_pos,
                want: self.cipher_offset(index),
            });
        }

        let offset = self.cipher_offset(index);
        self.position_raw_for_read(offset)?;

        let cipher_len = plain_len + BLOCK_OVERHEAD;
        let mut raw = vec![0u8; cipher_len];
        let got = read_full(&mut self.source, &mut raw)?;
        if got < cipher_len {
            return Err(StreamError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("cipher block {index} truncated: {got} of {cipher_len} bytes"),
            )));
        }
        self.raw_pos = offset + cipher_len as u64;

        self.cache.data = self.module.decrypt(&raw, self.uid.as_deref())?;
        self.cache.valid = true;
        Ok(())
    }

    /// Encrypt and write back the cached block if it carries unflushed data.
    fn flush_block(&mut self) -> Result<(), StreamError> {
        if !(self.cache.valid && self.cache.dirty) {
            return Ok(());
        }
        self.cache.dirty = false;
        if self.cache.data.is_empty() {
            return Ok(());
        }

        let cipher = self.module.encrypt(&self.cache.data)?;
        let offset = self.cipher_offset(self.cache.index);
        if self.seekable {
            self.source.seek(SeekFrom::Start(offset))?;
        } else if offset != self.raw_pos {
            return Err(StreamError::NonSeekable {
                op: "write block",
                at: self.raw_pos,
                want: offset,
            });
        }
        self.source.write_all(&cipher)?;
        self.raw_pos = offset + cipher.len() as u64;
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), StreamError> {
        let block = header_block(&self.new_header, self.sbs as usize)?;
        if self.seekable {
            self.source.seek(SeekFrom::Start(0))?;
        } else if self.raw_pos != 0 {
            return Err(StreamError::NonSeekable {
                op: "write header",
                at: self.raw_pos,
                want: 0,
            });
        }
        self.source.write_all(&block)?;
        self.raw_pos = self.sbs;
        self.header_written = true;
        Ok(())
    }

    /// Put the raw stream at `offset` for a read: an explicit seek when
    /// possible, otherwise verified sequential progress (the header block is
    /// consumed and discarded on the way past).
    fn position_raw_for_read(&mut self, offset: u64) -> Result<(), StreamError> {
        if self.seekable {
            self.source.seek(SeekFrom::Start(offset))?;
            self.raw_pos = offset;
            return Ok(());
        }
        if self.raw_pos == 0 && self.header_size > 0 && offset >= self.header_size {
            let mut skip = vec![0u8; self.header_size as usize];
            let got = read_full(&mut self.source, &mut skip)?;
            if (got as u64) < self.header_size {
                return Err(StreamError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "header block truncated",
                )));
            }
            self.raw_pos = self.header_size;
        }
        if offset != self.raw_pos {
            return Err(StreamError::NonSeekable {
                op: "read block",
                at: self.raw_pos,
                want: offset,
            });
        }
        Ok(())
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if buf.is_empty() || self.position >= self.unencrypted_size {
            return Ok(0);
        }
        let mut remaining = min(buf.len() as u64, self.unencrypted_size - self.position) as usize;
        let mut done = 0;

        while remaining > 0 {
            let index = self.position / self.ubs;
            let offset = (self.position % self.ubs) as usize;
            self.load_block(index)?;
            if offset >= self.cache.data.len() {
                break;
            }
            let n = min(remaining, self.cache.data.len() - offset);
            buf[done..done + n].copy_from_slice(&self.cache.data[offset..offset + n]);
            self.position += n as u64;
            done += n;
            remaining -= n;
        }
        Ok(done)
    }

    fn write_inner(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        if self.read_only {
            return Err(StreamError::ReadOnly);
        }
        if data.is_empty() {
            return Ok(0);
        }
        if !self.header_written && self.header_size > 0 {
            self.write_header()?;
        }

        let mut done = 0;
        while done < data.len() {
            let index = self.position / self.ubs;
            let offset = (self.position % self.ubs) as usize;
            // Read-modify-write: bytes in this block outside the write
            // region survive a partial overwrite.
            self.load_block(index)?;

            let n = min(data.len() - done, self.ubs as usize - offset);
            let end = offset + n;
            if self.cache.data.len() < end {
                self.cache.data.resize(end, 0);
            }
            self.cache.data[offset..end].copy_from_slice(&data[done..done + n]);
            self.cache.dirty = true;

            self.position += n as u64;
            done += n;
            self.unencrypted_size = self.unencrypted_size.max(self.position);
        }
        Ok(done)
    }

    fn seek_inner(&mut self, pos: SeekFrom) -> Result<u64, StreamError> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.unencrypted_size as i128 + delta as i128,
        };
        // All whences resolve against plaintext space and clamp to the
        // known size; seeking to EOF (for append) is the upper bound.
        if target < 0 || target as u64 > self.unencrypted_size {
            return Err(StreamError::SeekOutOfRange {
                target: target.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
                size: self.unencrypted_size,
            });
        }
        let target = target as u64;
        if target == self.position {
            return Ok(self.position);
        }

        self.flush_block()?;
        if self.seekable {
            // Commit only after the underlying seek succeeds.
            let raw = self.cipher_offset(target / self.ubs);
            self.source.seek(SeekFrom::Start(raw))?;
            self.raw_pos = raw;
        } else if target / self.ubs != self.cache.index || !self.cache.valid {
            return Err(StreamError::NonSeekable {
                op: "seek",
                at: self.position,
                want: target,
            });
        }
        self.position = target;
        Ok(self.position)
    }
}

impl<S: Read + Write + Seek> Read for EncryptionStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf).map_err(io::Error::from)
    }
}

impl<S: Read + Write + Seek> Write for EncryptionStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_inner(buf).map_err(io::Error::from)
    }

    /// Flushes the block cache and the underlying stream. Unlike `close`,
    /// this may run repeatedly; the module's `end` only runs at close.
    fn flush(&mut self) -> io::Result<()> {
        self.flush_block().map_err(io::Error::from)?;
        self.source.flush()
    }
}

impl<S: Read + Write + Seek> Seek for EncryptionStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_inner(pos).map_err(io::Error::from)
    }
}

impl<S: Read + Write + Seek> Drop for EncryptionStream<S> {
    /// Best-effort close for streams dropped without [`EncryptionStream::close`].
    /// Errors are logged, never panicked on; callers wanting to observe them
    /// must close explicitly.
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.do_close() {
                tracing::warn!(
                    path = %self.full_path,
                    error = %e,
                    "close on drop failed"
                );
            }
        }
    }
}

/// Scan the start of a raw stream for a header.
///
/// Reads at most one storage block and returns the parsed fields plus the
/// on-disk header size (one full block when present, 0 otherwise), ready for
/// [`OpenParams::header`].
pub fn probe_header<R: Read>(
    source: &mut R,
    storage_block_size: usize,
) -> Result<(HeaderFields, u64), StreamError> {
    let mut buf = vec![0u8; storage_block_size];
    let got = read_full(source, &mut buf)?;
    let parsed = parse_header(&buf[..got])?;
    let header_size = if parsed.is_absent() {
        0
    } else {
        storage_block_size as u64
    };
    Ok((parsed.fields, header_size))
}

fn parent_path(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match reader.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}
