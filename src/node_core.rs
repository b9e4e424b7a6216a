//! Single-writer scheduler. Replaces the ad hoc `idle/active/pausing/paused`
//! state machine with an explicit single-consumer job queue
//! (`std::sync::mpsc`) plus a condvar-backed idle notification: a caller
//! needing an exclusive-state rendezvous submits a job via `submit_job` and
//! that job runs to completion, alone, on the one worker thread -- no
//! spin-waiting on a shared flag.

use chain_core::{Block, Chain, Mempool, Result as CoreResult, Transaction};
use shared::{Address, TxId};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

pub struct NodeState {
    pub chain: Chain,
    pub mempool: Mempool,
}

impl NodeState {
    #[must_use]
    pub fn new(chain: Chain, mempool: Mempool) -> Self {
        Self { chain, mempool }
    }
}

type Job = Box<dyn FnOnce(&mut NodeState) + Send>;

enum QueueEntry {
    Run(Job),
    Shutdown,
}

pub struct NodeCore {
    sender: mpsc::Sender<QueueEntry>,
    worker: Option<JoinHandle<()>>,
    idle: Arc<(Mutex<bool>, Condvar)>,
}

impl NodeCore {
    #[must_use]
    pub fn spawn(mut state: NodeState) -> Self {
        let (sender, receiver) = mpsc::channel::<QueueEntry>();
        let idle = Arc::new((Mutex::new(true), Condvar::new()));
        let idle_worker = Arc::clone(&idle);

        let worker = thread::spawn(move || {
            for entry in receiver {
                {
                    let (lock, _) = &*idle_worker;
                    *lock.lock().expect("idle mutex poisoned") = false;
                }
                match entry {
                    QueueEntry::Run(job) => job(&mut state),
                    QueueEntry::Shutdown => break,
                }
                {
                    let (lock, cvar) = &*idle_worker;
                    *lock.lock().expect("idle mutex poisoned") = true;
                    cvar.notify_all();
                }
            }
        });

        Self {
            sender,
            worker: Some(worker),
            idle,
        }
    }

    /// Enqueues `f` and blocks until the worker thread has run it to
    /// completion, returning whatever it produced. Every node-core
    /// operation is built on top of this.
    pub fn submit_job<T, F>(&self, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&mut NodeState) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();
        let job: Job = Box::new(move |state| {
            let _ = reply_tx.send(f(state));
        });
        self.sender
            .send(QueueEntry::Run(job))
            .expect("worker thread outlives every submit_job caller");
        reply_rx.recv().expect("worker always sends exactly one reply")
    }

    /// Blocks until the job queue is empty and the worker is idle. Not
    /// required for correctness (every `submit_job` caller already
    /// rendezvous on its own reply) but useful for tests and graceful
    /// shutdown.
    pub fn wait_idle(&self) {
        let (lock, cvar) = &*self.idle;
        let mut idle = lock.lock().expect("idle mutex poisoned");
        while !*idle {
            idle = cvar.wait(idle).expect("idle mutex poisoned");
        }
    }

    /// `admitTransaction(tx, replaceTxId?)`.
    ///
    /// # Errors
    ///
    /// Returns the mempool's admission error (shape/balance/signature
    /// failure, or a rejected/failed RBF).
    pub fn admit_transaction(&self, tx: Transaction, replace_tx_id: Option<TxId>) -> CoreResult<()> {
        self.submit_job(move |state| {
            let utxo_index = state.chain.utxo_index().clone();
            state.mempool.submit(tx, replace_tx_id, &utxo_index)
        })
    }

    /// `applyMinedBlock(block)`.
    ///
    /// # Errors
    ///
    /// Returns [`chain_core::CoreError::InvalidBlock`] or a transaction
    /// validation error; the chain and mempool are left unchanged.
    pub fn apply_mined_block(&self, block: Block) -> CoreResult<()> {
        self.submit_job(move |state| {
            let txs = block.txs.clone();
            state.chain.apply_block(block)?;
            state.mempool.digest_block_txs(&txs);
            Ok(())
        })
    }

    /// `buildCandidate`: pauses nothing explicitly -- running inside a
    /// single job already gives it an exclusive, consistent view of both
    /// the chain tip and the mempool.
    pub fn build_candidate(
        &self,
        validator: Address,
        coinbase_recipient: Address,
        coinbase_nonce: Vec<u8>,
        pos_timestamp: i64,
    ) -> Block {
        self.submit_job(move |state| {
            let max_block_size = state.chain.params().max_block_size as u64;
            let selected = state.mempool.select_for_block(max_block_size);
            let tx_ids: Vec<TxId> = selected.iter().map(|tx| tx.id).collect();
            let fee_total = state.mempool.fee_total_of(&tx_ids);
            state
                .chain
                .build_candidate(selected, fee_total, validator, coinbase_recipient, coinbase_nonce, pos_timestamp)
        })
    }
}

impl Drop for NodeCore {
    fn drop(&mut self) {
        let _ = self.sender.send(QueueEntry::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::ChainParams;

    fn address(byte: u8) -> Address {
        let mut s = bs58::encode([byte]).into_string();
        s.extend(std::iter::repeat('2').take(20usize.saturating_sub(s.len())));
        s.truncate(20);
        Address::parse(&s).unwrap()
    }

    fn spawn_core() -> NodeCore {
        let chain = Chain::genesis(ChainParams::default(), address(1), address(2), 0).unwrap();
        let mempool = Mempool::new(5_000);
        NodeCore::spawn(NodeState::new(chain, mempool))
    }

    #[test]
    fn build_candidate_on_fresh_chain_has_one_tx_and_zero_fees() {
        let core = spawn_core();
        let candidate = core.build_candidate(address(3), address(4), vec![9], 1_000);
        assert_eq!(candidate.index, 1);
        assert!(candidate.txs[0].is_validator_reward());
        assert_eq!(candidate.txs[0].outputs[0].amount(), 0);
    }

    #[test]
    fn jobs_run_serially_and_reply_exactly_once() {
        let core = spawn_core();
        for _ in 0..20 {
            let _ = core.build_candidate(address(5), address(6), vec![1], 0);
        }
        core.wait_idle();
    }
}
