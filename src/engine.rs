//! Challenge engines.
//!
//! Handles:
//! - ChallengeEngine trait: accumulate ciphertext, produce the response token
//! - EngineFactory trait: build a fresh engine per attempt from the config snapshot
//! - RsaChallenge: ratbox-compatible RSA-OAEP/SHA-1 engine
//!
//! The ratbox response is `base64(sha1(rsa_oaep_decrypt(base64_decode(ciphertext))))`.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha1::{Digest, Sha1};

use crate::config::ChallengeConfig;
use crate::error::{DecryptError, KeyLoadError};

/// One in-progress challenge decryption.
pub trait ChallengeEngine: Send {
    /// Append a ciphertext fragment. Fragments are kept in arrival order.
    fn push(&mut self, fragment: &str);

    /// Decrypt everything pushed so far and produce the response token.
    fn finalise(&mut self) -> Result<String, DecryptError>;
}

/// Builds engines from configuration.
pub trait EngineFactory: Send + Sync {
    type Engine: ChallengeEngine;

    fn build(&self, config: &ChallengeConfig) -> Result<Self::Engine, KeyLoadError>;
}

/// RSA engine for ratbox-style CHALLENGE.
pub struct RsaChallenge {
    key: RsaPrivateKey,
    buffer: String,
}

impl RsaChallenge {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self {
            key,
            buffer: String::new(),
        }
    }

    /// Load a PEM private key. PKCS#8 (optionally encrypted) and PKCS#1 are accepted.
    pub fn from_keyfile(path: &Path, password: &str) -> Result<Self, KeyLoadError> {
        let pem = zeroize::Zeroizing::new(std::fs::read_to_string(path).map_err(|source| {
            KeyLoadError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?);

        let key = if pem.contains("BEGIN ENCRYPTED PRIVATE KEY") {
            RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, password.as_bytes()).map_err(|_| {
                KeyLoadError::Locked {
                    path: path.to_path_buf(),
                }
            })?
        } else if pem.contains("BEGIN RSA PRIVATE KEY") {
            if pem.contains("Proc-Type: 4,ENCRYPTED") {
                return Err(KeyLoadError::Decode {
                    path: path.to_path_buf(),
                    reason: "legacy encrypted PKCS#1 keys are unsupported; convert to PKCS#8"
                        .to_string(),
                });
            }
            RsaPrivateKey::from_pkcs1_pem(&pem).map_err(|e| KeyLoadError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| KeyLoadError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        Ok(Self::new(key))
    }
}

impl ChallengeEngine for RsaChallenge {
    fn push(&mut self, fragment: &str) {
        self.buffer.push_str(fragment.trim());
    }

    fn finalise(&mut self) -> Result<String, DecryptError> {
        let encoded = std::mem::take(&mut self.buffer);
        if encoded.is_empty() {
            return Err(DecryptError::Empty);
        }
        let ciphertext = STANDARD.decode(encoded.as_bytes())?;
        let plaintext = zeroize::Zeroizing::new(self.key.decrypt(Oaep::new::<Sha1>(), &ciphertext)?);
        let digest = Sha1::digest(plaintext.as_slice());
        Ok(STANDARD.encode(digest))
    }
}

/// Factory for [`RsaChallenge`] engines reading the configured key file.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaEngineFactory;

impl EngineFactory for RsaEngineFactory {
    type Engine = RsaChallenge;

    fn build(&self, config: &ChallengeConfig) -> Result<RsaChallenge, KeyLoadError> {
        let path = config.keyfile_path().ok_or(KeyLoadError::NotConfigured)?;
        RsaChallenge::from_keyfile(&path, config.password.expose())
    }
}
