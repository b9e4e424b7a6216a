pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{
    argon2id_hash, derive_address, verify_address_security, verify_signature, Argon2Purpose, Ed25519Signer, Signer,
};
pub use error::{ChainError, Result};
pub use hash::Hash256;
pub use types::{Address, Amount, Height, SecurityClass, TxId};
