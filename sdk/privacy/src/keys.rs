//! Key Registry
//!
//! Ed25519 key pairs and the viewing/spending split that forms a shielded
//! account's long-term identity.
//!
//! ```text
//! StealthKeyPair = {
//!     viewing:  (v, V)   // detects incoming payments
//!     spending: (s, S)   // authorizes moving them
//! }
//! ```
//!
//! Private halves are 32-byte Ed25519 seeds. They never appear in `Debug`
//! output and only cross the trust boundary sealed (see `SealedKeyMaterial`).

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::encryption::SymmetricCipher;
use crate::errors::{PrivacyError, Result};

/// Length of an Ed25519 seed / compressed public key
pub const KEY_LEN: usize = 32;

/// An Ed25519 key pair held as (seed, compressed public point)
#[derive(Clone)]
pub struct KeyPair {
    secret: [u8; KEY_LEN],
    public: [u8; KEY_LEN],
}

/// Ephemeral key pairs are ordinary key pairs used once per transfer
pub type EphemeralKeyPair = KeyPair;

impl KeyPair {
    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        let mut seed = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Deterministically derive a key pair from a 32-byte seed
    pub fn from_seed(seed: [u8; KEY_LEN]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        Self {
            secret: seed,
            public: signing.verifying_key().to_bytes(),
        }
    }

    /// Rebuild from secret material: a 32-byte seed or a 64-byte
    /// `seed || public` secret key. For the 64-byte form the embedded public
    /// key must match the seed.
    pub fn from_secret(secret: &[u8]) -> Result<Self> {
        let seed = secret_seed(secret)?;
        let pair = Self::from_seed(seed);
        if secret.len() == 2 * KEY_LEN && secret[KEY_LEN..] != pair.public {
            return Err(PrivacyError::InvalidKeyMaterial(
                "embedded public key does not match seed".into(),
            ));
        }
        Ok(pair)
    }

    pub fn secret_bytes(&self) -> &[u8; KEY_LEN] {
        &self.secret
    }

    pub fn public_bytes(&self) -> &[u8; KEY_LEN] {
        &self.public
    }

    /// Chain-native (base58) rendering of the public key
    pub fn public_base58(&self) -> String {
        bs58::encode(self.public).into_string()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public))
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Extract the 32-byte seed from secret key material
pub(crate) fn secret_seed(secret: &[u8]) -> Result<[u8; KEY_LEN]> {
    if secret.len() != KEY_LEN && secret.len() != 2 * KEY_LEN {
        return Err(PrivacyError::InvalidKeyMaterial(format!(
            "secret key must be 32 or 64 bytes, got {}",
            secret.len()
        )));
    }
    let mut seed = [0u8; KEY_LEN];
    seed.copy_from_slice(&secret[..KEY_LEN]);
    if seed.iter().all(|&b| b == 0) {
        return Err(PrivacyError::InvalidKeyMaterial("secret key is all zero".into()));
    }
    Ok(seed)
}

/// Decode and validate a compressed Ed25519 public key
pub fn parse_public_key(bytes: &[u8]) -> Result<[u8; KEY_LEN]> {
    let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
        PrivacyError::InvalidKeyMaterial(format!(
            "public key must be 32 bytes, got {}",
            bytes.len()
        ))
    })?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|_| PrivacyError::InvalidKeyMaterial("point is not on the curve".into()))?;
    Ok(arr)
}

/// Decode a hex-encoded public key
pub fn parse_public_key_hex(s: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = hex::decode(s)
        .map_err(|e| PrivacyError::InvalidKeyMaterial(format!("bad hex: {}", e)))?;
    parse_public_key(&bytes)
}

/// The viewing/spending key pair identifying a shielded account
#[derive(Debug, Clone)]
pub struct StealthKeyPair {
    viewing: KeyPair,
    spending: KeyPair,
}

impl StealthKeyPair {
    pub fn generate() -> Self {
        Self {
            viewing: KeyPair::generate(),
            spending: KeyPair::generate(),
        }
    }

    pub fn from_parts(viewing: KeyPair, spending: KeyPair) -> Self {
        Self { viewing, spending }
    }

    pub fn viewing(&self) -> &KeyPair {
        &self.viewing
    }

    pub fn spending(&self) -> &KeyPair {
        &self.spending
    }

    pub fn viewing_public(&self) -> &[u8; KEY_LEN] {
        self.viewing.public_bytes()
    }

    pub fn spending_public(&self) -> &[u8; KEY_LEN] {
        self.spending.public_bytes()
    }

    /// The public half, safe to publish
    pub fn meta(&self) -> StealthMetaKeys {
        StealthMetaKeys {
            viewing_public: *self.viewing.public_bytes(),
            spending_public: *self.spending.public_bytes(),
        }
    }

    /// Seal both private halves with the configured cipher
    pub fn seal(&self, cipher: &dyn SymmetricCipher) -> Result<SealedKeyMaterial> {
        let mut plaintext = Vec::with_capacity(2 * KEY_LEN);
        plaintext.extend_from_slice(self.viewing.secret_bytes());
        plaintext.extend_from_slice(self.spending.secret_bytes());

        Ok(SealedKeyMaterial {
            viewing_public: *self.viewing.public_bytes(),
            spending_public: *self.spending.public_bytes(),
            ciphertext: cipher.encrypt(&plaintext)?,
        })
    }
}

/// Published meta-address: the two public keys a sender needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthMetaKeys {
    #[serde(with = "hex::serde")]
    pub viewing_public: [u8; KEY_LEN],
    #[serde(with = "hex::serde")]
    pub spending_public: [u8; KEY_LEN],
}

/// Private key material sealed for storage or transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKeyMaterial {
    #[serde(with = "hex::serde")]
    pub viewing_public: [u8; KEY_LEN],
    #[serde(with = "hex::serde")]
    pub spending_public: [u8; KEY_LEN],
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

impl SealedKeyMaterial {
    /// Open the sealed private halves and check them against the public keys
    pub fn open(&self, cipher: &dyn SymmetricCipher) -> Result<StealthKeyPair> {
        let plaintext = cipher.decrypt(&self.ciphertext)?;
        if plaintext.len() != 2 * KEY_LEN {
            return Err(PrivacyError::InvalidKeyMaterial(
                "sealed key material has wrong length".into(),
            ));
        }

        let viewing = KeyPair::from_secret(&plaintext[..KEY_LEN])?;
        let spending = KeyPair::from_secret(&plaintext[KEY_LEN..])?;
        if viewing.public_bytes() != &self.viewing_public
            || spending.public_bytes() != &self.spending_public
        {
            return Err(PrivacyError::InvalidKeyMaterial(
                "sealed private keys do not match public keys".into(),
            ));
        }

        Ok(StealthKeyPair::from_parts(viewing, spending))
    }
}

/// Long-term identity of a shielded account, as stored
///
/// Keyed by the hex spending public key. Private halves are only held
/// sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedAccount {
    pub account_id: String,
    pub keys: StealthMetaKeys,
    pub sealed: SealedKeyMaterial,
    pub created_at: u64,
}

impl ShieldedAccount {
    pub fn new(sealed: SealedKeyMaterial, created_at: u64) -> Self {
        let keys = StealthMetaKeys {
            viewing_public: sealed.viewing_public,
            spending_public: sealed.spending_public,
        };
        Self {
            account_id: Self::id_for(&keys),
            keys,
            sealed,
            created_at,
        }
    }

    pub fn id_for(keys: &StealthMetaKeys) -> String {
        hex::encode(keys.spending_public)
    }
}

/// Hex SHA-256 of a public key, used as a non-reversible key reference
pub fn key_fingerprint(public: &[u8; KEY_LEN]) -> String {
    hex::encode(Sha256::digest(public))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::ChaChaCipher;

    #[test]
    fn test_account_keyed_by_spending_key() {
        let keys = StealthKeyPair::generate();
        let sealed = keys.seal(&ChaChaCipher::new([4u8; 32])).unwrap();
        let account = ShieldedAccount::new(sealed, 42);

        assert_eq!(account.keys, keys.meta());
        assert_eq!(account.account_id, hex::encode(keys.spending_public()));
        assert_eq!(account.created_at, 42);
    }

    #[test]
    fn test_from_seed_deterministic() {
        let a = KeyPair::from_seed([7u8; 32]);
        let b = KeyPair::from_seed([7u8; 32]);
        assert_eq!(a.public_bytes(), b.public_bytes());
        assert_ne!(a.public_bytes(), KeyPair::from_seed([8u8; 32]).public_bytes());
    }

    #[test]
    fn test_from_secret_accepts_64_byte_form() {
        let pair = KeyPair::generate();
        let mut full = pair.secret_bytes().to_vec();
        full.extend_from_slice(pair.public_bytes());

        let rebuilt = KeyPair::from_secret(&full).unwrap();
        assert_eq!(rebuilt.public_bytes(), pair.public_bytes());

        full[40] ^= 1;
        assert!(matches!(
            KeyPair::from_secret(&full),
            Err(PrivacyError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_rejects_bad_secret() {
        assert!(KeyPair::from_secret(&[1u8; 31]).is_err());
        assert!(KeyPair::from_secret(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_parse_public_key() {
        let pair = KeyPair::generate();
        assert_eq!(&parse_public_key(pair.public_bytes()).unwrap(), pair.public_bytes());
        assert!(parse_public_key(&[1u8; 31]).is_err());
        assert!(parse_public_key_hex("zz").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let pair = KeyPair::from_seed([0xAB; 32]);
        let out = format!("{:?}", pair);
        assert!(out.contains("<redacted>"));
        assert!(!out.contains(&hex::encode([0xAB; 32])));
    }

    #[test]
    fn test_seal_and_open() {
        let cipher = ChaChaCipher::new([9u8; 32]);
        let keys = StealthKeyPair::generate();
        let sealed = keys.seal(&cipher).unwrap();

        let opened = sealed.open(&cipher).unwrap();
        assert_eq!(opened.meta(), keys.meta());
        assert_eq!(
            opened.spending().secret_bytes(),
            keys.spending().secret_bytes()
        );
    }

    #[test]
    fn test_seal_fails_closed_without_key() {
        let keys = StealthKeyPair::generate();
        assert_eq!(
            keys.seal(&ChaChaCipher::unconfigured()).unwrap_err(),
            PrivacyError::EncryptionKeyMissing
        );
    }
}
