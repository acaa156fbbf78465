//! URL signing configuration types.
//!
//! Keys and salts are written as hex strings in YAML and paired by index.
//! Default values are sourced from `crate::constants`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SIGNATURE_SIZE, MAX_SIGNATURE_SIZE};

fn default_signature_size() -> usize {
    DEFAULT_SIGNATURE_SIZE
}

/// Raw key or salt bytes, hex-encoded in configuration
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        hex::decode(hex_str.trim())
            .map(SecretKey)
            .map_err(|e| format!("invalid hex secret: {}", e))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SecretKey {
    fn from(bytes: Vec<u8>) -> Self {
        SecretKey(bytes)
    }
}

impl TryFrom<String> for SecretKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SecretKey::from_hex(&value)
    }
}

impl From<SecretKey> for String {
    fn from(key: SecretKey) -> Self {
        hex::encode(key.0)
    }
}

// Never print secrets
impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED; {} bytes])", self.0.len())
    }
}

/// Signature verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default)]
    pub keys: Vec<SecretKey>,
    #[serde(default)]
    pub salts: Vec<SecretKey>,
    /// Number of HMAC bytes kept in the signature (1-32, default: 32)
    #[serde(default = "default_signature_size")]
    pub signature_size: usize,
    /// Accept unsigned requests even when keys are configured
    #[serde(default)]
    pub allow_insecure: bool,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            salts: Vec::new(),
            signature_size: default_signature_size(),
            allow_insecure: false,
        }
    }
}

impl SigningConfig {
    /// Signatures are checked iff keys exist and insecure mode is off
    pub fn is_enforced(&self) -> bool {
        !self.allow_insecure && !self.keys.is_empty()
    }

    /// Key/salt pairs in configuration order
    pub fn pairs(&self) -> impl Iterator<Item = (&SecretKey, &SecretKey)> {
        self.keys.iter().zip(self.salts.iter())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.keys.len() != self.salts.len() {
            return Err(format!(
                "signing: {} keys but {} salts, they must be paired",
                self.keys.len(),
                self.salts.len()
            ));
        }

        if let Some(index) = self.keys.iter().position(SecretKey::is_empty) {
            return Err(format!("signing: key #{} is empty", index));
        }

        if self.signature_size == 0 || self.signature_size > MAX_SIGNATURE_SIZE {
            return Err(format!(
                "signing: signature_size must be between 1 and {}, got {}",
                MAX_SIGNATURE_SIZE, self.signature_size
            ));
        }

        Ok(())
    }
}
