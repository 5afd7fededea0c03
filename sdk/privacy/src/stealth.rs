//! Stealth Addresses
//!
//! One-time receiving addresses derived from a recipient's published
//! viewing/spending public keys and a fresh ephemeral key pair.
//!
//! ```text
//! Sender:     ss   = ECDH(e, V)
//!             seed = SHA-256("shade/stealth/v1" || ss || S)
//!             P    = Ed25519(seed).public          <- one-time address
//!             publish (P, E, seal(meta))
//!
//! Recipient:  ss   = ECDH(v, E)                    (same as sender)
//!             seed = SHA-256("shade/stealth/v1" || ss || S(s))
//!             p    = Ed25519(seed)                 <- spends from P
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ecdh::{SharedSecret, derive_shared_secret};
use crate::encryption::SymmetricCipher;
use crate::errors::{PrivacyError, Result};
use crate::keys::{
    EphemeralKeyPair, KEY_LEN, KeyPair, StealthKeyPair, key_fingerprint, parse_public_key,
};

const STEALTH_DOMAIN: &[u8] = b"shade/stealth/v1";
const META_VERSION: u8 = 1;

/// Prefix of every shielded address string
pub const SHIELDED_ADDRESS_PREFIX: &str = "zs1";
/// Total length of a shielded address string (prefix + 64 hex chars)
pub const SHIELDED_ADDRESS_LEN: usize = SHIELDED_ADDRESS_PREFIX.len() + 2 * KEY_LEN;

/// Result of deriving a stealth address on the sender side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthAddress {
    /// One-time Ed25519 public key
    #[serde(with = "hex::serde")]
    pub address: [u8; KEY_LEN],
    #[serde(with = "hex::serde")]
    pub ephemeral_public: [u8; KEY_LEN],
    /// Sealed `StealthMeta`; context for recovery, not a spend capability
    #[serde(with = "hex::serde")]
    pub encrypted_meta: Vec<u8>,
}

impl StealthAddress {
    /// Shielded string form (`zs1` + hex public key)
    pub fn shielded(&self) -> String {
        encode_shielded_address(&self.address)
    }

    /// Chain-native (base58) form for the ledger collaborator
    pub fn base58(&self) -> String {
        bs58::encode(self.address).into_string()
    }

    /// Whether this address was derived for `keys`
    pub fn is_for(&self, keys: &StealthKeyPair) -> bool {
        recover_stealth_keypair(
            keys.viewing().secret_bytes(),
            keys.spending().secret_bytes(),
            &self.ephemeral_public,
        )
        .map(|pair| pair.public_bytes() == &self.address)
        .unwrap_or(false)
    }
}

/// Derivation context sealed into `encrypted_meta`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthMeta {
    pub version: u8,
    #[serde(with = "hex::serde")]
    pub ephemeral_public: [u8; KEY_LEN],
    /// Fingerprint of the viewing key the address was derived against
    pub viewing_key_ref: String,
    pub spending_key_hash: String,
}

fn stealth_seed(shared: &SharedSecret, spending_public: &[u8; KEY_LEN]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(STEALTH_DOMAIN);
    hasher.update(shared.as_bytes());
    hasher.update(spending_public);
    hasher.finalize().into()
}

/// Derive a one-time address for the recipient `(viewing_public, spending_public)`.
pub fn derive_stealth_address(
    viewing_public: &[u8],
    spending_public: &[u8],
    ephemeral: &EphemeralKeyPair,
    cipher: &dyn SymmetricCipher,
) -> Result<StealthAddress> {
    let viewing_public = parse_public_key(viewing_public)?;
    let spending_public = parse_public_key(spending_public)?;

    let shared = derive_shared_secret(ephemeral.secret_bytes(), &viewing_public)?;
    let stealth = KeyPair::from_seed(stealth_seed(&shared, &spending_public));

    let meta = StealthMeta {
        version: META_VERSION,
        ephemeral_public: *ephemeral.public_bytes(),
        viewing_key_ref: key_fingerprint(&viewing_public),
        spending_key_hash: key_fingerprint(&spending_public),
    };
    let meta_bytes =
        serde_json::to_vec(&meta).map_err(|e| PrivacyError::Serialization(e.to_string()))?;

    Ok(StealthAddress {
        address: *stealth.public_bytes(),
        ephemeral_public: *ephemeral.public_bytes(),
        encrypted_meta: cipher.encrypt(&meta_bytes)?,
    })
}

/// Recover the one-time key pair on the recipient side.
///
/// With the matching viewing/spending private keys and ephemeral public key
/// this reproduces the sender's address exactly; any other input yields an
/// unrelated key pair.
pub fn recover_stealth_keypair(
    viewing_private: &[u8],
    spending_private: &[u8],
    ephemeral_public: &[u8],
) -> Result<KeyPair> {
    let shared = derive_shared_secret(viewing_private, ephemeral_public)?;
    let spending = KeyPair::from_secret(spending_private)?;
    Ok(KeyPair::from_seed(stealth_seed(&shared, spending.public_bytes())))
}

/// Open the sealed derivation context
pub fn open_stealth_meta(
    encrypted_meta: &[u8],
    cipher: &dyn SymmetricCipher,
) -> Result<StealthMeta> {
    let bytes = cipher.decrypt(encrypted_meta)?;
    serde_json::from_slice(&bytes).map_err(|e| PrivacyError::Serialization(e.to_string()))
}

/// Encode a public key as a shielded address string
pub fn encode_shielded_address(public: &[u8; KEY_LEN]) -> String {
    format!("{}{}", SHIELDED_ADDRESS_PREFIX, hex::encode(public))
}

/// Validate the shielded address format (fixed prefix, fixed length, hex body)
pub fn validate_shielded_address(address: &str) -> Result<()> {
    if !address.starts_with(SHIELDED_ADDRESS_PREFIX) {
        return Err(PrivacyError::InvalidAddress(format!(
            "missing '{}' prefix",
            SHIELDED_ADDRESS_PREFIX
        )));
    }
    if address.len() != SHIELDED_ADDRESS_LEN {
        return Err(PrivacyError::InvalidAddress(format!(
            "expected {} characters, got {}",
            SHIELDED_ADDRESS_LEN,
            address.len()
        )));
    }
    let body = &address[SHIELDED_ADDRESS_PREFIX.len()..];
    if !body.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
        return Err(PrivacyError::InvalidAddress("body must be lowercase hex".into()));
    }
    Ok(())
}

/// Decode a shielded address back to the one-time public key
pub fn decode_shielded_address(address: &str) -> Result<[u8; KEY_LEN]> {
    validate_shielded_address(address)?;
    let mut out = [0u8; KEY_LEN];
    hex::decode_to_slice(&address[SHIELDED_ADDRESS_PREFIX.len()..], &mut out)
        .map_err(|e| PrivacyError::InvalidAddress(e.to_string()))?;
    Ok(out)
}

/// Stored shielded address record. Immutable once created; a new transfer
/// supersedes it with a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedAddress {
    pub public_address: String,
    pub viewing_key_ref: String,
    pub spending_key_hash: String,
    pub stealth_meta: StealthMetaRecord,
    pub created_at: u64,
}

/// Public part of the stealth metadata kept alongside an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthMetaRecord {
    #[serde(with = "hex::serde")]
    pub ephemeral_public: [u8; KEY_LEN],
    #[serde(with = "hex::serde")]
    pub encrypted: Vec<u8>,
}

impl ShieldedAddress {
    pub fn from_stealth(
        stealth: &StealthAddress,
        viewing_public: &[u8; KEY_LEN],
        spending_public: &[u8; KEY_LEN],
        created_at: u64,
    ) -> Self {
        Self {
            public_address: stealth.shielded(),
            viewing_key_ref: key_fingerprint(viewing_public),
            spending_key_hash: key_fingerprint(spending_public),
            stealth_meta: StealthMetaRecord {
                ephemeral_public: stealth.ephemeral_public,
                encrypted: stealth.encrypted_meta.clone(),
            },
            created_at,
        }
    }
}
