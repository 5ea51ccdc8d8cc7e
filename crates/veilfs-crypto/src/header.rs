//! File header generation and parsing
//!
//! ```text
//! HBEGIN:cipher:AES-256-CFB:HEND
//! ```
//!
//! Content files pad the header text with `-` to one full storage block so
//! cipher blocks stay block-aligned; private key blobs carry the bare text.
//! A file that does not start with `HBEGIN` has no header and decrypts with
//! the legacy cipher.

use std::collections::BTreeMap;

use crate::cipher::{CipherSuite, LEGACY_CIPHER};
use crate::error::{CryptError, CryptResult};

/// Leading magic of a header.
pub const HEADER_START: &str = "HBEGIN";
/// Terminating token of a header.
pub const HEADER_END: &str = "HEND";
/// Header key naming the content cipher.
pub const HEADER_CIPHER_KEY: &str = "cipher";

const HEADER_PAD: u8 = b'-';

/// Key/value fields carried in a file header.
pub type HeaderFields = BTreeMap<String, String>;

/// Outcome of scanning the start of a file for a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    pub fields: HeaderFields,
    /// Bytes the raw header text occupies; 0 when absent. Content readers
    /// must still skip one full padded block when a header is present.
    pub len: usize,
}

impl ParsedHeader {
    pub fn absent() -> Self {
        Self {
            fields: HeaderFields::new(),
            len: 0,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.len == 0
    }

    /// The cipher this header declares, or the legacy cipher when the file
    /// has no header (or no cipher field). An unsupported cipher name is an
    /// error.
    pub fn cipher(&self) -> CryptResult<CipherSuite> {
        match self.fields.get(HEADER_CIPHER_KEY) {
            Some(name) => name.parse(),
            None => Ok(LEGACY_CIPHER),
        }
    }
}

/// Render header text from fields.
pub fn format_header(fields: &HeaderFields) -> String {
    let mut header = String::from(HEADER_START);
    for (key, value) in fields {
        header.push(':');
        header.push_str(key);
        header.push(':');
        header.push_str(value);
    }
    header.push(':');
    header.push_str(HEADER_END);
    header
}

/// Header text declaring `suite` as the content cipher.
pub fn generate_header(suite: CipherSuite) -> String {
    let mut fields = HeaderFields::new();
    fields.insert(HEADER_CIPHER_KEY.to_string(), suite.to_string());
    format_header(&fields)
}

/// Header text padded with `-` to exactly `block_size` bytes.
pub fn header_block(fields: &HeaderFields, block_size: usize) -> CryptResult<Vec<u8>> {
    let text = format_header(fields);
    if text.len() > block_size {
        return Err(CryptError::MalformedHeader(format!(
            "header of {} bytes exceeds the storage block size {}",
            text.len(),
            block_size
        )));
    }
    let mut block = text.into_bytes();
    block.resize(block_size, HEADER_PAD);
    Ok(block)
}

/// Parse a header from the start of `data`.
///
/// Returns an absent header when `data` does not begin with `HBEGIN`. A
/// present `HBEGIN` with no `HEND` terminator inside `data`, non-UTF-8
/// field bytes, or a key with no value is a [`CryptError::MalformedHeader`].
pub fn parse_header(data: &[u8]) -> CryptResult<ParsedHeader> {
    if !data.starts_with(HEADER_START.as_bytes()) {
        return Ok(ParsedHeader::absent());
    }
    let end = find(data, HEADER_END.as_bytes()).ok_or_else(|| {
        CryptError::MalformedHeader("HBEGIN without a matching HEND".into())
    })?;
    let len = end + HEADER_END.len();
    let inner = std::str::from_utf8(&data[HEADER_START.len()..end])
        .map_err(|_| CryptError::MalformedHeader("non-UTF-8 header fields".into()))?;

    let mut fields = HeaderFields::new();
    let mut tokens = inner.split(':').filter(|t| !t.is_empty());
    loop {
        match (tokens.next(), tokens.next()) {
            (Some(key), Some(value)) => {
                fields.insert(key.to_string(), value.to_string());
            }
            (Some(key), None) => {
                return Err(CryptError::MalformedHeader(format!(
                    "field {key:?} has no value"
                )));
            }
            (None, _) => break,
        }
    }
    Ok(ParsedHeader { fields, len })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
