use thiserror::Error;

/// Low-level failures shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("cryptographic error: {0}")]
    CryptographicError(String),

    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, ChainError>;
