use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Deref;

/// Integer currency units used for prices and balances
pub type Amount = u128;

// Address identifies a participant: a collector, an artist, or a component
// such as the registry or an exchange engine. 32 bytes, resembling a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = hex::encode(&self.0[0..6]);
        write!(f, "addr:{}", prefix)
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for Address {
    fn default() -> Self {
        Address([0; 32])
    }
}

impl Deref for Address {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Address {
    pub fn new(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    /// Get a reference to the internal bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// True for the all-zero identity
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }

    pub fn create_address(seeds: &[&[u8]], bump: u8) -> [u8; 32] {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"ATELIER_Address");

        for seed in seeds {
            hasher.update(seed);
        }

        hasher.update([bump]);

        hasher.finalize().into()
    }

    /// Verify that a 32-byte array is not a valid point on the ed25519 curve
    ///
    /// Returns true if the bytes do not represent a valid curve point.
    /// Returns false if the bytes do represent a valid curve point.
    pub fn is_off_curve(bytes: &[u8; 32]) -> bool {
        let Ok(compressed_edwards_y) = CompressedEdwardsY::from_slice(bytes.as_ref()) else {
            return true;
        };
        compressed_edwards_y.decompress().is_none()
    }

    /// Try to derive a component address for the given seeds.
    ///
    /// Derived addresses are off-curve, so no private key can sign for them;
    /// only the component that owns the seeds can act as that address.
    pub fn try_derive(seeds: &[&[u8]]) -> Option<(Address, u8)> {
        for bump in 0..=u8::MAX {
            let bytes = Address::create_address(seeds, bump);
            if Address::is_off_curve(&bytes) {
                return Some((Address(bytes), bump));
            }
        }
        None
    }

    /// Derive a component address.
    ///
    /// This is the first off-curve address [`Address::try_derive`] finds.
    /// If all 256 bumps land on the curve, the bump-0 digest is returned
    /// unchanged. That address is on the curve, so it is an ordinary
    /// address rather than a derived one. Callers that need the off-curve
    /// guarantee use [`Address::try_derive`].
    pub fn derive(seeds: &[&[u8]]) -> Address {
        match Address::try_derive(seeds) {
            Some((address, _)) => address,
            None => Address(Address::create_address(seeds, 0)),
        }
    }
}

/// Identifier of a token tracked by the registry. Chosen by the minter,
/// immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub u64);

impl TokenId {
    pub fn new(id: u64) -> Self {
        TokenId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for TokenId {
    fn from(id: u64) -> Self {
        TokenId(id)
    }
}
