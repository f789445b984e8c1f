use std::fmt;
use std::str::FromStr;

use crate::hex;
use crate::HashError;

/// An object identifier — the 20-byte SHA-1 digest of an object's content.
///
/// Ordering is lexicographic over the raw bytes, which is the canonical
/// order for every sorted on-disk table (pack index, graph identifier list).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; Self::RAW_LEN]);

impl ObjectId {
    /// Raw digest width in bytes.
    pub const RAW_LEN: usize = 20;
    /// Hex representation width.
    pub const HEX_LEN: usize = Self::RAW_LEN * 2;
    /// The null (all-zeros) id.
    pub const NULL: Self = Self([0u8; Self::RAW_LEN]);

    /// Wrap a raw digest.
    pub const fn from_raw(raw: [u8; Self::RAW_LEN]) -> Self {
        Self(raw)
    }

    /// Create an id from a byte slice, validating its length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        let raw: [u8; Self::RAW_LEN] =
            bytes.try_into().map_err(|_| HashError::DigestLength {
                expected: Self::RAW_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(raw))
    }

    /// Parse a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let mut raw = [0u8; Self::RAW_LEN];
        hex::decode(s, &mut raw)?;
        Ok(Self(raw))
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; Self::RAW_LEN] {
        &self.0
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// The first digest byte, used as the fan-out key.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Whether this is the all-zeros id.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; Self::RAW_LEN]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
