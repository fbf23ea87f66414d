/*
    envelope.rs - Encryption envelope metadata

    The envelope is the metadata produced by the external encryption module
    for one message: cipher suite, nonce, authentication tag and the sender
    key version active at encryption time. No key material or plaintext is
    ever part of it.
*/

use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cipher suites the engine knows the metadata shape of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherSuite {
    /// libsodium `crypto_box` (direct messages)
    #[serde(rename = "x25519-xsalsa20-poly1305")]
    X25519XSalsa20Poly1305,
    /// AES-256-GCM (group messages)
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
}

impl CipherSuite {
    pub const ALL: [CipherSuite; 3] = [
        CipherSuite::X25519XSalsa20Poly1305,
        CipherSuite::Aes256Gcm,
        CipherSuite::XChaCha20Poly1305,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CipherSuite::X25519XSalsa20Poly1305 => "x25519-xsalsa20-poly1305",
            CipherSuite::Aes256Gcm => "aes-256-gcm",
            CipherSuite::XChaCha20Poly1305 => "xchacha20-poly1305",
        }
    }

    /// Required nonce length in bytes
    pub fn nonce_len(&self) -> usize {
        match self {
            CipherSuite::X25519XSalsa20Poly1305 => 24,
            CipherSuite::Aes256Gcm => 12,
            CipherSuite::XChaCha20Poly1305 => 24,
        }
    }

    /// Required authentication tag length in bytes
    pub fn tag_len(&self) -> usize {
        16
    }
}

impl FromStr for CipherSuite {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CipherSuite::ALL
            .iter()
            .copied()
            .find(|suite| suite.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::InvalidEnvelope(format!("unsupported algorithm '{}'", s)))
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-message encryption metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    pub algorithm: CipherSuite,
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub auth_tag: Vec<u8>,
    /// Sender key version active when the message was encrypted
    pub key_version: u32,
}

impl EncryptionEnvelope {
    /// Build an envelope, checking nonce and tag against the suite
    pub fn new(
        algorithm: CipherSuite,
        nonce: Vec<u8>,
        auth_tag: Vec<u8>,
        key_version: u32,
    ) -> EngineResult<Self> {
        let envelope = Self {
            algorithm,
            nonce,
            auth_tag,
            key_version,
        };
        envelope.validate_shape()?;
        Ok(envelope)
    }

    /// Structural checks that need no key registry
    pub fn validate_shape(&self) -> EngineResult<()> {
        if self.nonce.is_empty() {
            return Err(EngineError::InvalidEnvelope("nonce is empty".into()));
        }
        if self.nonce.len() != self.algorithm.nonce_len() {
            return Err(EngineError::InvalidEnvelope(format!(
                "nonce is {} bytes, {} requires {}",
                self.nonce.len(),
                self.algorithm,
                self.algorithm.nonce_len()
            )));
        }
        if self.auth_tag.is_empty() {
            return Err(EngineError::InvalidEnvelope("auth tag is empty".into()));
        }
        if self.auth_tag.len() != self.algorithm.tag_len() {
            return Err(EngineError::InvalidEnvelope(format!(
                "auth tag is {} bytes, {} requires {}",
                self.auth_tag.len(),
                self.algorithm,
                self.algorithm.tag_len()
            )));
        }
        if self.key_version == 0 {
            return Err(EngineError::InvalidEnvelope("key version 0 is never issued".into()));
        }
        Ok(())
    }
}
