//! Primitive identifier and amount types shared across the workspace.

use crate::error::{ChainError, Result};
use crate::hash::Hash256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount, denominated in the network's smallest unit.
pub type Amount = u64;

/// Block height, zero-indexed from genesis.
pub type Height = u64;

/// A transaction's canonical identifier: the first 4 bytes of its SHA-256
/// hash, rendered as 8 hex characters. Narrower than a full hash because
/// anchors reference it constantly and the full 32 bytes buy no extra
/// collision resistance this workspace needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId([u8; 4]);

impl TxId {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<Hash256> for TxId {
    fn from(hash: Hash256) -> Self {
        Self(hash.truncated_id())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&str> for TxId {
    type Error = ChainError;

    fn try_from(hex_string: &str) -> Result<Self> {
        let bytes = hex::decode(hex_string).map_err(|e| ChainError::InvalidHex(e.to_string()))?;
        if bytes.len() != 4 {
            return Err(ChainError::InvalidHex(format!(
                "expected 4 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 4];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

/// One of the six spending-security tiers an address's first character
/// encodes. `required_leading_zero_bits` is the number of leading zero
/// bits `SHA256(address ++ pubKey)` must carry for that pubkey to be
/// accepted as the address's owner (the "address-security check").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityClass {
    Weak,
    Contrast,
    Secure,
    Powerful,
    Ultimate,
    MultiSig,
}

/// Bitcoin/`bs58`-default alphabet, in encoding order. Kept local rather
/// than pulled from the `bs58` crate so the class table below doesn't
/// depend on that crate exposing its alphabet as iterable data.
const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

impl SecurityClass {
    /// Fixed assignment of base58-alphabet positions to classes, cycling
    /// through the six tiers in table order. The alphabet excludes
    /// `0`/`O`/`I`/`l`, so this never needs a 59th bucket.
    const TABLE: [Self; 6] = [
        Self::Weak,
        Self::Contrast,
        Self::Secure,
        Self::Powerful,
        Self::Ultimate,
        Self::MultiSig,
    ];

    fn from_leading_char(c: char) -> Result<Self> {
        let index = BASE58_ALPHABET
            .iter()
            .position(|&b| b == c as u8)
            .ok_or_else(|| ChainError::InvalidBase58(format!("'{c}' is not a base58 character")))?;
        Ok(Self::TABLE[index % Self::TABLE.len()])
    }

    #[must_use]
    pub const fn required_leading_zero_bits(self) -> u32 {
        match self {
            Self::Weak | Self::MultiSig => 0,
            Self::Contrast => 4,
            Self::Secure => 8,
            Self::Powerful => 12,
            Self::Ultimate => 16,
        }
    }
}

/// A 20-character base58 address whose first character encodes a
/// [`SecurityClass`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    const ENCODED_LEN: usize = 20;

    /// Validates and wraps a base58 address string.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not exactly 20 base58 characters or its
    /// leading character does not belong to the base58 alphabet.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.chars().count() != Self::ENCODED_LEN {
            return Err(ChainError::InvalidBase58(format!(
                "expected {} characters, got {}",
                Self::ENCODED_LEN,
                raw.chars().count()
            )));
        }
        bs58::decode(raw)
            .into_vec()
            .map_err(|e| ChainError::InvalidBase58(e.to_string()))?;
        let leading = raw.chars().next().expect("length checked above");
        SecurityClass::from_leading_char(leading)?;
        Ok(Self(raw.to_string()))
    }

    /// Wraps an already-encoded address without re-validating it. Used by
    /// [`crate::crypto::derive_address`], which only ever produces
    /// well-formed output.
    #[must_use]
    pub(crate) fn from_raw(encoded: String) -> Self {
        Self(encoded)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The security class this address's first character declares.
    ///
    /// # Panics
    ///
    /// Never, for any `Address` obtained through [`Address::parse`] or
    /// [`crate::crypto::derive_address`] -- both validate the leading
    /// character up front.
    #[must_use]
    pub fn security_class(&self) -> SecurityClass {
        let leading = self.0.chars().next().expect("address is never empty");
        SecurityClass::from_leading_char(leading).expect("validated at construction")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txid_round_trips_through_hex() {
        let id = TxId::from_bytes([0xde, 0xad, 0xbe, 0xef]);
        let parsed = TxId::try_from(id.to_string().as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn txid_rejects_wrong_length() {
        assert!(TxId::try_from("deadbeefaa").is_err());
    }

    #[test]
    fn txid_derives_from_hash_prefix() {
        let hash = Hash256::sha256(b"some tx bytes");
        let id: TxId = hash.into();
        assert_eq!(id.as_bytes(), &hash.truncated_id());
    }

    #[test]
    fn address_parse_rejects_wrong_length() {
        let too_short = bs58::encode([1u8; 8]).into_string();
        assert!(Address::parse(&too_short).is_err());
    }

    #[test]
    fn address_parse_accepts_twenty_base58_characters() {
        let encoded = format!("1{}", "2".repeat(19));
        assert!(Address::parse(&encoded).is_ok());
    }

    #[test]
    fn address_parse_rejects_non_base58_character() {
        let encoded = format!("0{}", "2".repeat(19));
        assert!(Address::parse(&encoded).is_err());
    }

    #[test]
    fn security_class_follows_leading_character_table() {
        let weak = Address::parse(&format!("1{}", "2".repeat(19))).unwrap();
        assert_eq!(weak.security_class(), SecurityClass::Weak);
        let contrast = Address::parse(&format!("2{}", "2".repeat(19))).unwrap();
        assert_eq!(contrast.security_class(), SecurityClass::Contrast);
    }
}
