//! URL signature verification
//!
//! A signature covers everything after the access token, including the
//! leading slash:
//! ```text
//! signature = base64url(truncate(HMAC-SHA256(key, salt + "/" + rest), signature_size))
//! ```
//! Several key/salt pairs can be configured at once (key rotation); a request
//! is accepted when any pair produces its signature.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::config::SigningConfig;
use crate::constants::BYPASS_TOKEN;
use crate::error::ProcessingError;

type HmacSha256 = Hmac<Sha256>;

/// Generate the signature for `signed_path` with one key/salt pair
///
/// `signed_path` is the request path after the access token, starting with
/// `/`. The digest is truncated to `size` bytes (at most 32).
pub fn generate_signature(signed_path: &str, key: &[u8], salt: &[u8], size: usize) -> Option<String> {
    let digest = compute_hmac_signature(key, salt, signed_path)?;
    let size = size.min(digest.len());
    Some(base64_url_encode(&digest[..size]))
}

/// Prefix `path` with its signature using the first configured pair
///
/// Returns `None` when no key is configured. `path` may be given with or
/// without its leading slash.
pub fn sign_path(path: &str, config: &SigningConfig) -> Option<String> {
    let (key, salt) = config.pairs().next()?;
    let signed_path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let signature = generate_signature(
        &signed_path,
        key.as_bytes(),
        salt.as_bytes(),
        config.signature_size,
    )?;
    Some(format!("/{}{}", signature, signed_path))
}

/// Check the access token of a request
///
/// # Returns
/// * `Ok(())` if signing is not enforced or any pair matches
/// * `Err(ProcessingError::InvalidSignature)` otherwise
pub fn verify_signature(
    token: &str,
    signed_path: &str,
    config: &SigningConfig,
) -> Result<(), ProcessingError> {
    if !config.is_enforced() {
        return Ok(());
    }

    if token == BYPASS_TOKEN {
        debug!("bypass token rejected, signing is enforced");
        return Err(ProcessingError::InvalidSignature);
    }

    // Check every pair so timing does not reveal which one matched
    let mut matched = false;
    for (key, salt) in config.pairs() {
        if let Some(expected) = generate_signature(
            signed_path,
            key.as_bytes(),
            salt.as_bytes(),
            config.signature_size,
        ) {
            matched |= constant_time_compare(token, &expected);
        }
    }

    if matched {
        Ok(())
    } else {
        Err(ProcessingError::InvalidSignature)
    }
}

/// Compute HMAC-SHA256 over salt followed by the signed path
fn compute_hmac_signature(key: &[u8], salt: &[u8], signed_path: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(salt);
    mac.update(signed_path.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

/// Base64url encode (URL-safe, no padding)
fn base64_url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Constant-time string comparison to prevent timing attacks
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
