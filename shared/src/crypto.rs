//! Cryptographic primitives: Ed25519 witness signatures, Argon2id proof of
//! work and address derivation.

use crate::error::{ChainError, Result};
use crate::hash::Hash256;
use crate::types::Address;
use argon2::{Algorithm, Argon2, Params, Version};
use ed25519_dalek::{Signature as DalekSignature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

/// Owns a private key and signs messages with it. Kept as a trait so that
/// transaction construction never has to hold key material directly --
/// only something that can produce a public key and a signature on demand.
pub trait Signer {
    fn public_key(&self) -> [u8; 32];
    fn sign(&self, message: &[u8]) -> [u8; 64];
}

/// An Ed25519 keypair implementing [`Signer`].
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Reconstructs a signer from a 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns an error if `seed` is not exactly 32 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = seed.try_into().map_err(|_| ChainError::InvalidKeySize {
            expected: 32,
            actual: seed.len(),
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }
}

impl Signer for Ed25519Signer {
    fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verifies an Ed25519 signature against a public key and message. Used by
/// the validator when checking a `Sig`/`SigOrSlash` witness.
#[must_use]
pub fn verify_signature(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let sig = DalekSignature::from_bytes(signature);
    verifying_key.verify(message, &sig).is_ok()
}

/// Argon2id parameters used for the two distinct purposes this node hashes
/// with Argon2: sealing a block (expensive, `t=1, m=2^18, p=1`, 32-byte
/// output) and deriving an address from a public key (cheap, `m=2^16`,
/// 16-byte output). Kept distinct because the block-sealing cost is a
/// consensus parameter while address derivation only needs to be
/// collision-resistant, not slow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argon2Purpose {
    BlockSeal,
    AddressDerivation,
}

impl Argon2Purpose {
    fn params(self) -> Params {
        match self {
            Self::BlockSeal => Params::new(1 << 18, 1, 1, Some(32)).expect("valid argon2 params"),
            Self::AddressDerivation => {
                Params::new(1 << 16, 1, 1, Some(16)).expect("valid argon2 params")
            }
        }
    }
}

/// Hashes `input` with Argon2id under a fixed, purpose-specific salt so the
/// function stays deterministic -- the salt's job here is domain separation,
/// not secrecy.
///
/// # Errors
///
/// Returns an error if Argon2 hashing fails (only possible with a malformed
/// salt, which this function never produces).
pub fn argon2id_hash(input: &[u8], purpose: Argon2Purpose) -> Result<Vec<u8>> {
    let params = purpose.params();
    let output_len = params.output_len().unwrap_or(32);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = match purpose {
        Argon2Purpose::BlockSeal => b"contrast-block-seal-v1\0\0\0\0\0\0\0\0\0",
        Argon2Purpose::AddressDerivation => b"contrast-address-v1\0\0\0\0\0\0\0\0\0\0\0\0",
    };
    let mut out = vec![0u8; output_len];
    argon2
        .hash_password_into(input, salt, &mut out)
        .map_err(|e| ChainError::CryptographicError(e.to_string()))?;
    Ok(out)
}

/// Derives the 20-character base58 address for a public key via Argon2id.
/// The leading character is fixed to the `Weak` security class: plain
/// derivation binds a pubkey to an address directly and carries none of
/// the extra leading-zero proof [`verify_address_security`] checks for the
/// higher classes.
///
/// # Errors
///
/// Returns an error if the Argon2 hash computation fails.
pub fn derive_address(public_key: &[u8; 32]) -> Result<Address> {
    let digest = argon2id_hash(public_key, Argon2Purpose::AddressDerivation)?;
    let body = bs58::encode(&digest).into_string();
    let mut encoded = String::with_capacity(20);
    encoded.push('1');
    encoded.extend(body.chars().chain(std::iter::repeat('2')).take(19));
    Ok(Address::from_raw(encoded))
}

/// `address`'s declared [`crate::types::SecurityClass`] sets a minimum
/// count of leading zero bits that `SHA256(address ++ pubKey)` must carry
/// for `pubKey` to be accepted as authorized over that address.
#[must_use]
pub fn verify_address_security(address: &Address, public_key: &[u8; 32]) -> bool {
    let mut preimage = address.as_str().as_bytes().to_vec();
    preimage.extend_from_slice(public_key);
    let digest = Hash256::sha256(&preimage);
    digest.leading_zero_bits() >= address.security_class().required_leading_zero_bits()
}
