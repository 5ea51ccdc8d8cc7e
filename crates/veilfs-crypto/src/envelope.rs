//! Multi-recipient key envelopes
//!
//! One file, one content key, many readers: the plaintext is sealed once
//! under a fresh session key, and the session key is wrapped separately for
//! every recipient with RSA-OAEP(SHA-256). Changing who may read means
//! re-wrapping the session key, never re-encrypting the data.

use std::collections::BTreeMap;

use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::cipher::CipherSuite;
use crate::error::{CryptError, CryptResult};
use crate::keys::generate_file_key;
use crate::symmetric::{symmetric_decrypt, symmetric_encrypt};

/// Sealed data plus one wrapped session key per recipient.
///
/// `keys` cardinality always equals the recipient set the envelope was
/// sealed for. Serializes with base64 byte fields so the key store can
/// persist envelopes as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiKeyEnvelope {
    /// The sealed blob: one cipher block under the session key.
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    /// recipient id -> session key wrapped under that recipient's public key
    #[serde(with = "b64_map")]
    pub keys: BTreeMap<String, Vec<u8>>,
}

impl MultiKeyEnvelope {
    /// The wrapped session key slice for one recipient, if present.
    pub fn wrapped_key_for(&self, recipient: &str) -> Option<&[u8]> {
        self.keys.get(recipient).map(Vec::as_slice)
    }
}

/// Seal `plaintext` for every recipient in the map.
///
/// Recipient identity is preserved as the envelope's map keys. Empty
/// plaintext and an empty recipient set are both rejected: the former would
/// produce an unframeable blob, the latter an envelope nobody can ever open.
pub fn multi_key_encrypt(
    plaintext: &[u8],
    recipients: &BTreeMap<String, RsaPublicKey>,
) -> CryptResult<MultiKeyEnvelope> {
    if plaintext.is_empty() {
        return Err(CryptError::EmptyInput {
            op: "multi_key_encrypt",
        });
    }
    if recipients.is_empty() {
        return Err(CryptError::MultiKeyEncrypt(
            "recipient set is empty".into(),
        ));
    }

    let session = generate_file_key()?;
    let data = symmetric_encrypt(plaintext, session.as_passphrase(), CipherSuite::Aes256Cfb)
        .map_err(|e| CryptError::MultiKeyEncrypt(format!("sealing data: {e}")))?;

    let mut keys = BTreeMap::new();
    for (id, public_key) in recipients {
        let wrapped = public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), session.as_passphrase())
            .map_err(|e| {
                CryptError::MultiKeyEncrypt(format!("wrapping session key for {id}: {e}"))
            })?;
        keys.insert(id.clone(), wrapped);
    }
    debug_assert_eq!(keys.len(), recipients.len());
    Ok(MultiKeyEnvelope { data, keys })
}

/// Open sealed envelope data with one recipient's wrapped key slice.
///
/// An OAEP unwrap failure (wrong private key, or a slice wrapped for a
/// different recipient) is a hard [`CryptError::MultiKeyDecrypt`].
pub fn multi_key_decrypt(
    data: &[u8],
    wrapped_key: &[u8],
    private_key: &RsaPrivateKey,
) -> CryptResult<Vec<u8>> {
    let session = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha256>(), wrapped_key)
            .map_err(|e| CryptError::MultiKeyDecrypt(format!("unwrapping session key: {e}")))?,
    );
    symmetric_decrypt(data, &session, CipherSuite::Aes256Cfb)
        .map_err(|e| CryptError::MultiKeyDecrypt(format!("opening sealed data: {e}")))
}

mod b64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(&text).map_err(serde::de::Error::custom)
    }
}

mod b64_map {
    use std::collections::BTreeMap;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(map.iter().map(|(k, v)| (k, BASE64.encode(v))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let raw: BTreeMap<String, String> = Deserialize::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(k, v)| {
                BASE64
                    .decode(&v)
                    .map(|bytes| (k, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
