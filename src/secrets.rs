//! Encryption for persona model-config env-var secrets.
//!
//! Format: `enc:v1:<base64 iv>:<base64 tag>:<base64 ciphertext>`, AES-256-GCM
//! with a 256-bit key kept in the `schema_meta` table (key
//! [`crate::db::meta_keys::AGENT_PERSONA_ENV_KEY`]). Each value gets a fresh
//! 12-byte IV. A value with an unrecognized prefix is treated as plaintext
//! (and re-encrypted on the next write); a malformed `enc:v1:` value decrypts
//! to an empty string rather than erroring, since a wrong env value should
//! never crash persona loading.

use crate::error::{Result, SecretsError};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use aes_gcm::aead::rand_core::RngCore;
use sqlx::SqlitePool;

const PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

/// The 256-bit key used for all persona env-var encryption in this process.
#[derive(Clone)]
pub struct EnvKey(Key<Aes256Gcm>);

impl EnvKey {
    /// Load the key from `schema_meta`, generating and persisting a fresh one
    /// if absent.
    pub async fn load_or_create(pool: &SqlitePool) -> Result<Self> {
        use crate::db::meta_keys::AGENT_PERSONA_ENV_KEY;

        if let Some(encoded) = crate::db::meta_get(pool, AGENT_PERSONA_ENV_KEY).await? {
            let bytes = B64
                .decode(encoded.trim())
                .map_err(|_| SecretsError::InvalidKey)?;
            if bytes.len() != 32 {
                return Err(SecretsError::InvalidKey.into());
            }
            return Ok(Self(*Key::<Aes256Gcm>::from_slice(&bytes)));
        }

        let mut raw = [0u8; 32];
        OsRng.fill_bytes(&mut raw);
        crate::db::meta_set(pool, AGENT_PERSONA_ENV_KEY, &B64.encode(raw)).await?;
        Ok(Self(*Key::<Aes256Gcm>::from_slice(&raw)))
    }

    /// Encrypt `plaintext`, producing the `enc:v1:` wire format.
    pub fn encrypt(&self, plaintext: &str) -> std::result::Result<String, SecretsError> {
        let cipher = Aes256Gcm::new(&self.0);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut combined = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SecretsError::EncryptionFailed(e.to_string()))?;
        // `aes_gcm` appends the 16-byte tag to the ciphertext; split it back
        // out so the wire format keeps tag and ciphertext as separate fields.
        let tag_start = combined.len().saturating_sub(16);
        let tag = combined.split_off(tag_start);
        let ciphertext = combined;

        Ok(format!(
            "{PREFIX}{}:{}:{}",
            B64.encode(nonce_bytes),
            B64.encode(&tag),
            B64.encode(&ciphertext),
        ))
    }

    /// Decrypt a wire-format value. Values without the `enc:v1:` prefix are
    /// returned as-is (treated as legacy plaintext). A malformed `enc:v1:`
    /// value decodes to an empty string.
    pub fn decrypt(&self, value: &str) -> String {
        let Some(rest) = value.strip_prefix(PREFIX) else {
            return value.to_string();
        };

        let parts: Vec<&str> = rest.splitn(3, ':').collect();
        let [iv_b64, tag_b64, ct_b64] = parts.as_slice() else {
            return String::new();
        };

        let Ok(nonce_bytes) = B64.decode(iv_b64) else {
            return String::new();
        };
        let Ok(tag) = B64.decode(tag_b64) else {
            return String::new();
        };
        let Ok(ciphertext) = B64.decode(ct_b64) else {
            return String::new();
        };
        if nonce_bytes.len() != NONCE_LEN {
            return String::new();
        }

        let mut combined = ciphertext;
        combined.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(&self.0);
        let nonce = Nonce::from_slice(&nonce_bytes);
        match cipher.decrypt(nonce, combined.as_slice()) {
            Ok(plaintext) => String::from_utf8(plaintext).unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    /// True if `value` is already in wire format.
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> EnvKey {
        let mut raw = [0u8; 32];
        OsRng.fill_bytes(&mut raw);
        EnvKey(*Key::<Aes256Gcm>::from_slice(&raw))
    }

    #[test]
    fn round_trips_exactly() {
        let key = test_key();
        let encrypted = key.encrypt("sk-ant-super-secret").unwrap();
        assert!(EnvKey::is_encrypted(&encrypted));
        assert_eq!(key.decrypt(&encrypted), "sk-ant-super-secret");
    }

    #[test]
    fn fresh_iv_each_call() {
        let key = test_key();
        let a = key.encrypt("same-value").unwrap();
        let b = key.encrypt("same-value").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unrecognized_prefix_is_plaintext() {
        let key = test_key();
        assert_eq!(key.decrypt("plain-api-key"), "plain-api-key");
    }

    #[test]
    fn malformed_enc_value_decrypts_to_empty() {
        let key = test_key();
        assert_eq!(key.decrypt("enc:v1:not-valid-base64"), "");
        assert_eq!(key.decrypt("enc:v1:aa:bb:cc"), "");
    }
}
