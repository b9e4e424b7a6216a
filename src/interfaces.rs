//! External-interface contracts: storage, gossip, and wallet signing. No
//! concrete backend is implemented here -- a real libp2p swarm, a real KV
//! engine, and wallet key-derivation UX are all external collaborators per
//! the workspace's scope. An in-memory `BlockStore` is provided as a test
//! double only.

use chain_core::Transaction;
use shared::{Address, ChainError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum StoreOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Key-value persistence contract: `block:{hash}`, a height-to-hash
/// secondary index, and a latest-block pointer all live behind this same
/// interface, addressed by convention in the keys callers choose.
pub trait BlockStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn del(&mut self, key: &[u8]) -> Result<()>;
    fn batch(&mut self, ops: Vec<StoreOp>) -> Result<()>;
}

/// One gossip topic (`new_transaction`, `new_block_candidate`,
/// `new_block_finalized`). Payloads are canonical binary encodings; this
/// trait doesn't care which, it just moves bytes.
pub trait GossipTopic {
    fn publish(&self, payload: Vec<u8>) -> Result<()>;
}

/// The node consumes `{pubKeyHex, privKeyHex, address}` tuples and a
/// `sign` operation; it never persists private keys itself.
pub trait WalletSigner {
    fn address(&self) -> Address;
    fn sign_transaction(&self, tx: Transaction) -> Result<Transaction>;
}

/// In-memory `BlockStore` for tests and local demos. Never used as the
/// node's real persistence layer.
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    entries: HashMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryBlockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn del(&mut self, key: &[u8]) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn batch(&mut self, ops: Vec<StoreOp>) -> Result<()> {
        for op in ops {
            match op {
                StoreOp::Put { key, value } => self.put(&key, &value)?,
                StoreOp::Delete { key } => self.del(&key)?,
            }
        }
        Ok(())
    }
}

/// Errs on every operation; exercises the node core's fatal-error path
/// (`StorageFailure` is expected to poison the job loop) without standing
/// up a real backend.
#[derive(Debug, Default)]
pub struct FailingBlockStore;

impl BlockStore for FailingBlockStore {
    fn put(&mut self, _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(ChainError::IoError("store unavailable".into()))
    }

    fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>> {
        Err(ChainError::IoError("store unavailable".into()))
    }

    fn del(&mut self, _key: &[u8]) -> Result<()> {
        Err(ChainError::IoError("store unavailable".into()))
    }

    fn batch(&mut self, _ops: Vec<StoreOp>) -> Result<()> {
        Err(ChainError::IoError("store unavailable".into()))
    }
}
