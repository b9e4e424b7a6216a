use serde::{Deserialize, Serialize};
use shared::{Height, TxId};
use std::fmt;

/// Points at a single transaction output: the height of the block that
/// created it, the transaction that contains it, and its position within
/// that transaction's output list. The height is part of the anchor
/// itself rather than looked up separately -- every UTXO and every input
/// reference carries its own provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub height: Height,
    pub tx_id: TxId,
    pub vout: u32,
}

impl Anchor {
    #[must_use]
    pub const fn new(height: Height, tx_id: TxId, vout: u32) -> Self {
        Self {
            height,
            tx_id,
            vout,
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.height, self.tx_id, self.vout)
    }
}
