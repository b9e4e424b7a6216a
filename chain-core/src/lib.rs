pub mod anchor;
pub mod block;
pub mod chain;
pub mod codec;
pub mod error;
pub mod mempool;
pub mod rules;
pub mod transaction;
pub mod utxo;
pub mod validator;

pub use anchor::Anchor;
pub use block::{Block, PrevHash, RewardSchedule, GENESIS_SENTINEL};
pub use chain::{Chain, ChainParams};
pub use codec::Codec;
pub use error::CoreError;
pub use mempool::{FeeRateKey, Mempool, MempoolEntry};
pub use rules::RuleTag;
pub use transaction::{Transaction, TxInput, TxOutput, Witness};
pub use utxo::{UtxoIndex, UtxoIndexDelta};

pub use shared::{Address, Amount, ChainError, Hash256, Height, Result as SharedResult, TxId};

pub type Result<T> = error::Result<T>;
