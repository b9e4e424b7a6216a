use crate::anchor::Anchor;
use shared::ChainError;
use shared::TxId;
use thiserror::Error;

/// Every way a transaction, block, or mempool admission can be rejected.
/// Each variant corresponds to a distinct rejection reason a caller might
/// want to branch on, rather than a bag of opaque strings.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("insufficient fee")]
    InsufficientFee,

    #[error("negative fee: outputs exceed inputs")]
    NegativeFee,

    #[error("transaction hash mismatch")]
    TxHashMismatch,

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("witness missing for input")]
    WitnessMissing,

    #[error("duplicate witness for input")]
    DuplicateWitness,

    #[error("conflicting utxo spend, already consumed by {existing}")]
    ConflictingUtxos { existing: TxId },

    #[error("transaction already present in the mempool")]
    AlreadyPresent,

    #[error("utxo not found for anchor {0:?}")]
    UtxoNotFound(Anchor),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error(transparent)]
    Shared(#[from] ChainError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
