use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::rngs::OsRng;
use rand_core::TryRngCore;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::Error;

/// Encrypts OAuth tokens before they reach the database. Output format is
/// base64(nonce || ciphertext) with a fresh 12-byte nonce per call.
#[derive(Clone)]
pub struct Encryptor {
    cipher: Arc<Aes256Gcm>,
}

impl Encryptor {
    /// Creates an `Encryptor` from a 32-byte AES-256 key.
    pub fn new(key_bytes: &[u8]) -> Result<Self, Error> {
        if key_bytes.len() != 32 {
            return Err(Error::KeyDerivation(format!(
                "AES-256 key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::clone_from_slice(key_bytes);
        Ok(Self {
            cipher: Arc::new(Aes256Gcm::new(&key)),
        })
    }

    pub fn encrypt(&self, data: &str) -> Result<String, Error> {
        let mut nonce_bytes = [0u8; 12];
        let mut rng = OsRng;
        rng.try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, data.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encrypted_data: &str) -> Result<String, Error> {
        let data = BASE64
            .decode(encrypted_data)
            .map_err(|e| Error::Decryption(e.to_string()))?;

        // The first 12 bytes are the nonce.
        if data.len() < 12 {
            return Err(Error::Decryption(
                "Ciphertext too short (missing nonce)".to_owned(),
            ));
        }
        let (nonce_bytes, ciphertext) = data.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::Decryption(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| Error::Decryption(e.to_string()))
    }
}

/// Reads the base64-encoded 32-byte master key from `path`, generating and
/// persisting a fresh one on first run.
pub fn load_or_create_key(path: &Path) -> Result<[u8; 32], Error> {
    if path.exists() {
        let encoded = std::fs::read_to_string(path)?;
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::KeyDerivation(format!("Bad key file: {}", e)))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::KeyDerivation("Key file is not 32 bytes".to_string()))?;
        return Ok(key);
    }

    let mut key = [0u8; 32];
    let mut rng = OsRng;
    rng.try_fill_bytes(&mut key)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    std::fs::write(path, BASE64.encode(key))?;
    info!("Generated new master key at {}", path.display());
    Ok(key)
}
