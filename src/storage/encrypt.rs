//! At-rest encryption for sensitive metadata fields
//!
//! LLM API keys and code-host access tokens are envelope-encrypted with
//! AES-256-GCM before they hit SQLite. The wire format is
//! `enc:v1:` + base64(nonce || ciphertext || tag). Values without the prefix
//! decrypt to themselves, so databases written before encryption was enabled
//! keep working.

use std::fs;
use std::io::Write;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

const ENC_PREFIX: &str = "enc:v1:";
const KEY_FILE_NAME: &str = ".encryption_key";
const KEY_SIZE: usize = 32;
const ENV_KEY: &str = "CLICKNOOK_ENCRYPTION_KEY";

/// Field encryptor. Construct with [`Encryptor::new`] for real key material
/// or [`Encryptor::disabled`] to get a passthrough (handy in tests).
pub struct Encryptor {
    cipher: Option<Aes256Gcm>,
}

impl Encryptor {
    /// Create an encryptor keyed from the `CLICKNOOK_ENCRYPTION_KEY` env var
    /// (hex, 64 chars). When the variable is unset, a key file at
    /// `<data_dir>/.encryption_key` is read, or generated with 0600
    /// permissions on first run.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let key_bytes = load_key(data_dir)?;
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Some(Aes256Gcm::new(key)),
        })
    }

    /// A no-op encryptor: encrypt and decrypt return their input unchanged.
    pub fn disabled() -> Self {
        Self { cipher: None }
    }

    /// Encrypt plaintext into the `enc:v1:` envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_string());
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| anyhow::anyhow!("encrypting field"))?;

        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{ENC_PREFIX}{}", BASE64.encode(payload)))
    }

    /// Decrypt a value previously produced by [`encrypt`]. Values without
    /// the envelope prefix are returned as-is (legacy plaintext).
    pub fn decrypt(&self, value: &str) -> Result<String> {
        let Some(cipher) = &self.cipher else {
            return Ok(value.to_string());
        };

        let Some(encoded) = value.strip_prefix(ENC_PREFIX) else {
            return Ok(value.to_string());
        };

        let data = BASE64.decode(encoded).context("decoding ciphertext")?;
        let nonce_size = 12;
        if data.len() < nonce_size {
            bail!("ciphertext too short");
        }

        let (nonce, ciphertext) = data.split_at(nonce_size);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow::anyhow!("decrypting field"))?;

        String::from_utf8(plaintext).context("decrypted field is not utf-8")
    }

    /// Convenience wrapper for optional fields.
    pub fn encrypt_opt(&self, value: Option<&str>) -> Result<Option<String>> {
        value.map(|v| self.encrypt(v)).transpose()
    }

    /// Convenience wrapper for optional fields.
    pub fn decrypt_opt(&self, value: Option<&str>) -> Result<Option<String>> {
        value.map(|v| self.decrypt(v)).transpose()
    }
}

/// Load the key from the environment or the data-dir key file, generating
/// the file if neither exists.
fn load_key(data_dir: &Path) -> Result<Vec<u8>> {
    if let Ok(env_key) = std::env::var(ENV_KEY) {
        if !env_key.is_empty() {
            let key = hex::decode(env_key.trim())
                .with_context(|| format!("{ENV_KEY} is not valid hex"))?;
            if key.len() != KEY_SIZE {
                bail!(
                    "{ENV_KEY} must be {KEY_SIZE} bytes ({} hex chars), got {} bytes",
                    KEY_SIZE * 2,
                    key.len()
                );
            }
            return Ok(key);
        }
    }

    let key_path = data_dir.join(KEY_FILE_NAME);

    match fs::read_to_string(&key_path) {
        Ok(contents) => {
            let key = hex::decode(contents.trim())
                .with_context(|| format!("key file {} is not valid hex", key_path.display()))?;
            if key.len() != KEY_SIZE {
                bail!(
                    "key file {}: expected {KEY_SIZE} bytes, got {}",
                    key_path.display(),
                    key.len()
                );
            }
            Ok(key)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let key: [u8; KEY_SIZE] = rand::random();

            let mut opts = fs::OpenOptions::new();
            opts.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                opts.mode(0o600);
            }
            let mut file = opts
                .open(&key_path)
                .with_context(|| format!("writing key file {}", key_path.display()))?;
            writeln!(file, "{}", hex::encode(key))?;

            Ok(key.to_vec())
        }
        Err(e) => Err(e).with_context(|| format!("reading key file {}", key_path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn encryptor() -> Encryptor {
        let dir = tempdir().unwrap();
        // Key file is generated on first use; keep the dir alive for the call.
        let enc = Encryptor::new(dir.path()).unwrap();
        enc
    }

    #[test]
    fn round_trip() {
        let enc = encryptor();
        let ciphertext = enc.encrypt("sk-ant-secret-key").unwrap();
        assert!(ciphertext.starts_with("enc:v1:"));
        assert_eq!(enc.decrypt(&ciphertext).unwrap(), "sk-ant-secret-key");
    }

    #[test]
    fn plaintext_passthrough() {
        let enc = encryptor();
        assert_eq!(enc.decrypt("legacy-plaintext-token").unwrap(), "legacy-plaintext-token");
    }

    #[test]
    fn distinct_nonces() {
        let enc = encryptor();
        let a = enc.encrypt("same input").unwrap();
        let b = enc.encrypt("same input").unwrap();
        assert_ne!(a, b, "nonce must be fresh per encryption");
    }

    #[test]
    fn disabled_is_noop() {
        let enc = Encryptor::disabled();
        assert_eq!(enc.encrypt("value").unwrap(), "value");
        assert_eq!(enc.decrypt("value").unwrap(), "value");
    }

    #[test]
    fn key_file_reused_across_instances() {
        let dir = tempdir().unwrap();
        let first = Encryptor::new(dir.path()).unwrap();
        let ciphertext = first.encrypt("persist me").unwrap();

        let second = Encryptor::new(dir.path()).unwrap();
        assert_eq!(second.decrypt(&ciphertext).unwrap(), "persist me");
    }

    #[test]
    fn corrupt_envelope_fails() {
        let enc = encryptor();
        assert!(enc.decrypt("enc:v1:!!!not-base64!!!").is_err());
        assert!(enc.decrypt("enc:v1:AAAA").is_err()); // shorter than a nonce
    }

    #[test]
    fn optional_helpers() {
        let enc = encryptor();
        assert_eq!(enc.encrypt_opt(None).unwrap(), None);
        let round = enc
            .decrypt_opt(enc.encrypt_opt(Some("v")).unwrap().as_deref())
            .unwrap();
        assert_eq!(round, Some("v".to_string()));
    }
}
