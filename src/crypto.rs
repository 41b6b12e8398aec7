use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};

const NONCE_LEN: usize = 12;

/// Per-attachment AES-256 key material. Never serialized; the Debug impl is
/// redacted so key bytes cannot end up in logs by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey([u8; 32]);

impl DataKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn cipher(&self) -> EngineResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0)
            .map_err(|_| EngineError::Integrity("invalid data key length".to_string()))
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(****)")
    }
}

/// Seals attachment bytes under a per-object key. Output is nonce || ciphertext.
pub fn seal_bytes(key: &DataKey, plaintext: &[u8]) -> EngineResult<Vec<u8>> {
    let cipher = key.cipher()?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| EngineError::Integrity("object encryption failed".to_string()))?;
    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

pub fn open_bytes(key: &DataKey, sealed: &[u8]) -> EngineResult<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(EngineError::Integrity("sealed object too short".to_string()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    key.cipher()?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EngineError::Integrity("object decryption failed".to_string()))
}

/// Seals individual record field values under a key derived from the
/// configured master key.
#[derive(Clone)]
pub struct FieldCipher {
    key: DataKey,
}

impl FieldCipher {
    pub fn from_master_key(master_key: &str) -> Self {
        let digest = Sha256::digest(master_key.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key: DataKey(key) }
    }

    pub fn seal_str(&self, plaintext: &str) -> EngineResult<String> {
        let sealed = seal_bytes(&self.key, plaintext.as_bytes())?;
        Ok(BASE64.encode(sealed))
    }

    pub fn open_str(&self, sealed: &str) -> EngineResult<String> {
        let raw = BASE64
            .decode(sealed)
            .map_err(|_| EngineError::Integrity("sealed value is not base64".to_string()))?;
        let plaintext = open_bytes(&self.key, &raw)?;
        String::from_utf8(plaintext)
            .map_err(|_| EngineError::Integrity("sealed value is not utf-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{open_bytes, seal_bytes, DataKey, FieldCipher};

    #[test]
    fn field_values_roundtrip() {
        let cipher = FieldCipher::from_master_key("unit-test-master");
        let sealed = cipher.seal_str("very confidential").unwrap();
        assert_ne!(sealed, "very confidential");
        assert_eq!(cipher.open_str(&sealed).unwrap(), "very confidential");
    }

    #[test]
    fn object_bytes_roundtrip() {
        let key = DataKey::generate();
        let sealed = seal_bytes(&key, b"binary payload").unwrap();
        assert_eq!(open_bytes(&key, &sealed).unwrap(), b"binary payload");
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = DataKey::generate();
        let mut sealed = seal_bytes(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(open_bytes(&key, &sealed).is_err());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let sealed = seal_bytes(&DataKey::generate(), b"payload").unwrap();
        assert!(open_bytes(&DataKey::generate(), &sealed).is_err());
    }

    #[test]
    fn debug_output_is_redacted() {
        let rendered = format!("{:?}", DataKey::generate());
        assert_eq!(rendered, "DataKey(****)");
    }
}
