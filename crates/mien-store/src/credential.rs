//! Admin PIN credential material.
//!
//! The PIN is never persisted in clear: creation draws a random salt and
//! stores a SHA-256 digest of salt and PIN. Verification recomputes the
//! digest and compares without early exit.

use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use mien_core::AdminCredential;

/// Minimum accepted PIN length, in characters.
pub const MIN_PIN_LEN: usize = 4;

const SALT_BYTES: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("PIN must be at least {MIN_PIN_LEN} characters")]
    PinTooShort,
    #[error("PIN confirmation does not match")]
    PinMismatch,
}

/// Validate the PIN pair and build a credential with a fresh random salt.
pub fn create_credential(
    name: &str,
    pin: &str,
    pin_confirm: &str,
) -> Result<AdminCredential, CredentialError> {
    if pin.chars().count() < MIN_PIN_LEN {
        return Err(CredentialError::PinTooShort);
    }
    if pin != pin_confirm {
        return Err(CredentialError::PinMismatch);
    }

    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = to_hex(&salt);
    let pin_hash = digest(&salt, pin);

    Ok(AdminCredential {
        name: name.to_string(),
        pin_hash,
        salt,
    })
}

/// Check a PIN against a stored credential.
///
/// Compares the full digest with no early exit, so the comparison cost does
/// not depend on where the digests diverge.
pub fn verify_pin(cred: &AdminCredential, pin: &str) -> bool {
    let candidate = digest(&cred.salt, pin);
    if candidate.len() != cred.pin_hash.len() {
        return false;
    }
    candidate
        .bytes()
        .zip(cred.pin_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn digest(salt: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
