pub mod config;
pub mod interfaces;
pub mod node_core;

pub use config::{MempoolConfig, NodeConfig};
pub use interfaces::{BlockStore, FailingBlockStore, GossipTopic, InMemoryBlockStore, StoreOp, WalletSigner};
pub use node_core::{NodeCore, NodeState};
