use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 256-bit digest used for transaction canonical hashes, validator
/// hashes, and block proof-of-work hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes SHA-256 of the given bytes.
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        Self(hash)
    }

    /// Truncates to the 4-byte (8 hex char) prefix used as a tx id.
    #[must_use]
    pub fn truncated_id(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.0[..4]);
        out
    }

    /// Counts leading zero bits, used by the difficulty check.
    #[must_use]
    pub fn leading_zero_bits(&self) -> u32 {
        let mut zeros = 0;
        for &byte in &self.0 {
            if byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }

    /// The 5 bits immediately following `zeros` leading zero bits,
    /// interpreted as an integer. Used for the `adjust` difficulty check.
    #[must_use]
    pub fn bits_after(&self, zeros: u32) -> u32 {
        let mut value: u32 = 0;
        for i in 0..5u32 {
            let bit_index = zeros + i;
            let byte_index = (bit_index / 8) as usize;
            if byte_index >= self.0.len() {
                break;
            }
            let bit_in_byte = 7 - (bit_index % 8);
            let bit = (self.0[byte_index] >> bit_in_byte) & 1;
            value = (value << 1) | u32::from(bit);
        }
        value
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&str> for Hash256 {
    type Error = ChainError;

    fn try_from(hex_string: &str) -> Result<Self> {
        let bytes = hex::decode(hex_string).map_err(|e| ChainError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(ChainError::InvalidHex(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_displays_as_64_zero_chars() {
        assert_eq!(Hash256::zero().to_string(), "0".repeat(64));
    }

    #[test]
    fn sha256_is_deterministic_and_nonzero() {
        let a = Hash256::sha256(b"hello world");
        let b = Hash256::sha256(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, Hash256::zero());
    }

    #[test]
    fn leading_zero_bits_counts_across_byte_boundary() {
        let hash = Hash256::from_bytes([
            0, 0, 0, 0b0001_0000, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0, 0, 0,
        ]);
        assert_eq!(hash.leading_zero_bits(), 27);
    }

    #[test]
    fn bits_after_reads_five_bit_window() {
        let hash = Hash256::from_bytes([
            0b0000_0101,
            0b1000_0000,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
        ]);
        assert_eq!(hash.leading_zero_bits(), 5);
        assert_eq!(hash.bits_after(4), 0b0101_1);
    }

    #[test]
    fn roundtrips_through_hex_string() {
        let hash = Hash256::sha256(b"roundtrip");
        let hex_string = hash.to_string();
        let parsed = Hash256::try_from(hex_string.as_str()).unwrap();
        assert_eq!(hash, parsed);
    }
}
