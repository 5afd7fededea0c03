//! Finite Field Arithmetic
//!
//! Arithmetic over GF(p) with p = 2^255 - 19, the base field shared by
//! Ed25519 and X25519. Used to map Edwards `y` coordinates onto Montgomery
//! `u` coordinates:
//!
//! ```text
//! u = (1 + y) / (1 - y) mod p
//! ```
//!
//! Elements are kept fully reduced. Inversion uses the extended Euclidean
//! algorithm rather than Fermat exponentiation.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};
use std::sync::LazyLock;

/// The field prime 2^255 - 19
pub static FIELD_PRIME: LazyLock<BigUint> =
    LazyLock::new(|| (BigUint::one() << 255u32) - BigUint::from(19u32));

/// Serialized width of a field element
pub const FIELD_BYTES: usize = 32;

/// An element of GF(2^255 - 19)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldElement(BigUint);

impl FieldElement {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn one() -> Self {
        Self(BigUint::one())
    }

    pub fn from_u64(v: u64) -> Self {
        Self(BigUint::from(v) % &*FIELD_PRIME)
    }

    /// Interpret little-endian bytes as an integer and reduce mod p
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_le(bytes) % &*FIELD_PRIME)
    }

    /// Little-endian encoding, zero padded to 32 bytes
    pub fn to_le_bytes(&self) -> [u8; FIELD_BYTES] {
        let bytes = self.0.to_bytes_le();
        let mut arr = [0u8; FIELD_BYTES];
        arr[..bytes.len()].copy_from_slice(&bytes);
        arr
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, rhs: &Self) -> Self {
        Self((&self.0 + &rhs.0) % &*FIELD_PRIME)
    }

    pub fn sub(&self, rhs: &Self) -> Self {
        Self((&self.0 + &*FIELD_PRIME - &rhs.0) % &*FIELD_PRIME)
    }

    pub fn mul(&self, rhs: &Self) -> Self {
        Self((&self.0 * &rhs.0) % &*FIELD_PRIME)
    }

    /// Multiplicative inverse, `None` for zero
    pub fn invert(&self) -> Option<Self> {
        mod_inverse(&self.0, &FIELD_PRIME).map(Self)
    }

    /// `self / rhs`, `None` when `rhs` is zero
    pub fn div(&self, rhs: &Self) -> Option<Self> {
        rhs.invert().map(|inv| self.mul(&inv))
    }
}

/// Modular inverse via the extended Euclidean algorithm.
///
/// Returns `None` when `a` and `modulus` are not coprime (including `a == 0`).
pub fn mod_inverse(a: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    if modulus.is_zero() {
        return None;
    }

    let m = BigInt::from_biguint(Sign::Plus, modulus.clone());
    let mut old_r = BigInt::from_biguint(Sign::Plus, a % modulus);
    let mut r = m.clone();
    let mut old_s = BigInt::one();
    let mut s = BigInt::zero();

    while !r.is_zero() {
        let q = &old_r / &r;

        let next_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, next_r);

        let next_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }

    if !old_r.is_one() {
        return None;
    }

    // Normalize into [0, m)
    let normalized = ((old_s % &m) + &m) % &m;
    normalized.to_biguint()
}

/// Map an Edwards `y` coordinate to the Montgomery `u` coordinate.
///
/// `None` when `y == 1` (the identity), where `1 - y` has no inverse.
pub fn edwards_y_to_montgomery_u(y: &FieldElement) -> Option<FieldElement> {
    let one = FieldElement::one();
    let numerator = one.add(y);
    let denominator = one.sub(y);
    numerator.div(&denominator)
}
