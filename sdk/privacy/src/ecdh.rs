//! ECDH Shared Secrets
//!
//! Key agreement between Ed25519 key pairs. Both halves are converted to
//! their X25519 (Montgomery) form before scalar multiplication:
//!
//! ```text
//! private:  a = clamp(SHA-512(seed)[0..32])
//! public:   u = (1 + y) / (1 - y) mod p
//! secret:   X25519(a, u_B) == X25519(b, u_A)
//! ```
//!
//! The clamping is the same one Ed25519 applies when deriving its public key,
//! so the Montgomery image of `A = a·G` is exactly `a·9`. That identity is
//! what makes the exchange symmetric.

use sha2::{Digest, Sha512};

use crate::errors::{PrivacyError, Result};
use crate::field::{FieldElement, edwards_y_to_montgomery_u};
use crate::keys::{KEY_LEN, parse_public_key, secret_seed};

/// A 32-byte Diffie-Hellman shared secret
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Clamp a scalar per RFC 7748
pub fn clamp_scalar(mut scalar: [u8; 32]) -> [u8; 32] {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
    scalar
}

/// Convert Ed25519 secret material (32-byte seed or 64-byte secret key) to
/// an X25519 scalar.
pub fn montgomery_private(secret: &[u8]) -> Result<[u8; 32]> {
    let seed = secret_seed(secret)?;
    let digest = Sha512::digest(seed);

    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&digest[..32]);
    Ok(clamp_scalar(scalar))
}

/// Convert a compressed Ed25519 public key to an X25519 `u` coordinate.
pub fn montgomery_public(public: &[u8]) -> Result<[u8; 32]> {
    let mut y_bytes = parse_public_key(public)?;
    // Sign bit of x lives in the top bit
    y_bytes[KEY_LEN - 1] &= 0x7f;

    let y = FieldElement::from_le_bytes(&y_bytes);
    let u = edwards_y_to_montgomery_u(&y).ok_or_else(|| {
        PrivacyError::InvalidKeyMaterial("identity point has no Montgomery form".into())
    })?;
    Ok(u.to_le_bytes())
}

/// Derive the shared secret between `private_key` and `public_key`.
///
/// Fails with `InvalidKeyMaterial` for malformed keys and for low-order
/// points that would yield the all-zero secret.
pub fn derive_shared_secret(private_key: &[u8], public_key: &[u8]) -> Result<SharedSecret> {
    let scalar = montgomery_private(private_key)?;
    let u = montgomery_public(public_key)?;

    let secret = x25519_dalek::x25519(scalar, u);
    if secret.iter().all(|&b| b == 0) {
        return Err(PrivacyError::InvalidKeyMaterial(
            "public key is a low-order point".into(),
        ));
    }

    Ok(SharedSecret(secret))
}
