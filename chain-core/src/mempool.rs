//! Fee-rate ordered, anchor-indexed, RBF-aware mempool. Generalises the
//! fee-sorted entry list + spent-outpoint set shape of a simpler
//! single-pass mempool into the anchor-indexed design this chain requires
//! for precise conflict detection and replacement.

use crate::anchor::Anchor;
use crate::error::{CoreError, Result};
use crate::transaction::{Transaction, TxInput};
use crate::utxo::UtxoIndex;
use crate::validator;
use shared::{Amount, TxId};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

/// Fixed-point `fee * PRECISION / weight`, so fee-rate ordering never
/// depends on floating-point rounding.
const FEE_RATE_PRECISION: u128 = 1_000_000;

pub type FeeRateKey = u128;

#[must_use]
pub fn fee_rate_key(fee: Amount, weight_bytes: u64) -> FeeRateKey {
    if weight_bytes == 0 {
        return 0;
    }
    (u128::from(fee) * FEE_RATE_PRECISION) / u128::from(weight_bytes)
}

#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub fee: Amount,
    pub weight_bytes: u64,
    pub fee_per_byte: FeeRateKey,
    pub enqueued_seq: u64,
}

pub struct Mempool {
    max_entries: usize,
    next_seq: u64,
    tx_by_id: HashMap<TxId, MempoolEntry>,
    by_fee_rate: BTreeSet<(Reverse<FeeRateKey>, u64, TxId)>,
    by_consumed_anchor: HashMap<Anchor, TxId>,
}

impl Mempool {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            next_seq: 0,
            tx_by_id: HashMap::new(),
            by_fee_rate: BTreeSet::new(),
            by_consumed_anchor: HashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tx_by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx_by_id.is_empty()
    }

    #[must_use]
    pub fn contains(&self, tx_id: &TxId) -> bool {
        self.tx_by_id.contains_key(tx_id)
    }

    fn consumed_anchors(tx: &Transaction) -> impl Iterator<Item = &Anchor> {
        tx.inputs.iter().filter_map(|input| match input {
            TxInput::Anchor(anchor) => Some(anchor),
            _ => None,
        })
    }

    /// Validates `tx` against `utxo_index` and admits it, or arbitrates a
    /// replace-by-fee if it conflicts with an existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyPresent`] if `tx`'s id is already
    /// admitted (the pool is left unchanged), the validator's error if
    /// `tx` is invalid, or [`CoreError::ConflictingUtxos`] if it consumes
    /// an anchor already claimed by a different entry and either no
    /// `replace_tx_id` was given, it names the wrong entry, or its
    /// fee-per-byte does not strictly exceed the entry being replaced.
    pub fn submit(
        &mut self,
        tx: Transaction,
        replace_tx_id: Option<TxId>,
        utxo_index: &UtxoIndex,
    ) -> Result<()> {
        if self.tx_by_id.contains_key(&tx.id) {
            return Err(CoreError::AlreadyPresent);
        }
        let fee = validator::validate(&tx, utxo_index)?;
        let weight_bytes = tx.estimated_weight();
        let fee_per_byte = fee_rate_key(fee, weight_bytes);

        let conflicting: Vec<TxId> = Self::consumed_anchors(&tx)
            .filter_map(|anchor| self.by_consumed_anchor.get(anchor).copied())
            .collect();

        if let Some(&existing_id) = conflicting.first() {
            if conflicting.iter().any(|id| *id != existing_id) {
                return Err(CoreError::ConflictingUtxos { existing: existing_id });
            }
            let existing = self
                .tx_by_id
                .get(&existing_id)
                .expect("by_consumed_anchor only ever points at live entries");
            let replacement_allowed =
                replace_tx_id == Some(existing_id) && fee_per_byte > existing.fee_per_byte;
            if !replacement_allowed {
                return Err(CoreError::ConflictingUtxos { existing: existing_id });
            }
            self.remove_entry(&existing_id);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let tx_id = tx.id;
        for anchor in Self::consumed_anchors(&tx) {
            self.by_consumed_anchor.insert(*anchor, tx_id);
        }
        self.by_fee_rate.insert((Reverse(fee_per_byte), seq, tx_id));
        self.tx_by_id.insert(
            tx_id,
            MempoolEntry {
                tx,
                fee,
                weight_bytes,
                fee_per_byte,
                enqueued_seq: seq,
            },
        );

        self.capacity_eviction();
        Ok(())
    }

    fn remove_entry(&mut self, tx_id: &TxId) -> Option<MempoolEntry> {
        let entry = self.tx_by_id.remove(tx_id)?;
        self.by_fee_rate
            .remove(&(Reverse(entry.fee_per_byte), entry.enqueued_seq, *tx_id));
        for anchor in Self::consumed_anchors(&entry.tx) {
            if self.by_consumed_anchor.get(anchor) == Some(tx_id) {
                self.by_consumed_anchor.remove(anchor);
            }
        }
        Some(entry)
    }

    /// Removes every mempool entry whose anchor was just consumed by a
    /// non-reward transaction in an applied block.
    pub fn digest_block_txs(&mut self, txs: &[Transaction]) {
        let consumed: Vec<Anchor> = txs
            .iter()
            .filter(|tx| !tx.is_reward_tx())
            .flat_map(Self::consumed_anchors)
            .copied()
            .collect();
        for anchor in consumed {
            if let Some(tx_id) = self.by_consumed_anchor.get(&anchor).copied() {
                self.remove_entry(&tx_id);
            }
        }
    }

    /// Drops entries referencing anchors no longer present in the index.
    /// Called after re-orgs since `digest_block_txs` alone can't detect
    /// anchors invalidated by a reverted block.
    pub fn prune_spent(&mut self, utxo_index: &UtxoIndex) {
        let stale: Vec<TxId> = self
            .tx_by_id
            .iter()
            .filter(|(_, entry)| {
                Self::consumed_anchors(&entry.tx).any(|anchor| utxo_index.lookup(anchor).is_none())
            })
            .map(|(id, _)| *id)
            .collect();
        for tx_id in stale {
            self.remove_entry(&tx_id);
        }
    }

    /// Iterates entries highest-fee-rate first, including whichever fit
    /// under `limit_bytes`, stopping once the running total exceeds 98% of
    /// the limit. Returns clones suitable for embedding directly in a
    /// block candidate.
    #[must_use]
    pub fn select_for_block(&self, limit_bytes: u64) -> Vec<Transaction> {
        let mut selected = Vec::new();
        let mut running_total: u64 = 0;
        let early_stop = (limit_bytes as f64 * 0.98) as u64;
        for (_, _, tx_id) in &self.by_fee_rate {
            let entry = &self.tx_by_id[tx_id];
            if running_total + entry.weight_bytes > limit_bytes {
                continue;
            }
            running_total += entry.weight_bytes;
            selected.push(entry.tx.clone());
            if running_total > early_stop {
                break;
            }
        }
        selected
    }

    /// While over `max_entries`, evicts the single lowest-fee-rate entry.
    pub fn capacity_eviction(&mut self) {
        while self.tx_by_id.len() > self.max_entries {
            if let Some(&(_, _, tx_id)) = self.by_fee_rate.iter().next_back() {
                self.remove_entry(&tx_id);
            } else {
                break;
            }
        }
    }

    #[must_use]
    pub fn fee_total_of(&self, tx_ids: &[TxId]) -> Amount {
        tx_ids
            .iter()
            .filter_map(|id| self.tx_by_id.get(id))
            .map(|entry| entry.fee)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleTag;
    use crate::transaction::TxOutput;
    use shared::{derive_address, Address, Ed25519Signer, Signer};

    fn address(byte: u8) -> Address {
        let mut s = bs58::encode([byte]).into_string();
        s.extend(std::iter::repeat('2').take(20usize.saturating_sub(s.len())));
        s.truncate(20);
        Address::parse(&s).unwrap()
    }

    fn funded_index_and_signer() -> (UtxoIndex, Ed25519Signer, TxId) {
        let mut index = UtxoIndex::new();
        let signer = Ed25519Signer::generate();
        let sender = derive_address(&signer.public_key()).unwrap();
        let coinbase = Transaction::coinbase(sender, 10_000, vec![1]);
        let coinbase_id = coinbase.id;
        index.apply_block(0, std::slice::from_ref(&coinbase)).unwrap();
        (index, signer, coinbase_id)
    }

    fn signed_spend(signer: &Ed25519Signer, anchor: Anchor, amount: Amount, recipient: Address) -> Transaction {
        let mut tx = Transaction {
            id: TxId::from_bytes([0; 4]),
            version: 1,
            inputs: vec![TxInput::Anchor(anchor)],
            outputs: vec![TxOutput::Standard {
                amount,
                rule: RuleTag::Sig,
                address: recipient,
            }],
            witnesses: vec![],
        };
        tx.id = tx.compute_id();
        let pre_image = tx.canonical_body_bytes();
        let signature = signer.sign(&pre_image);
        tx.witnesses.push(crate::transaction::Witness {
            signature,
            public_key: signer.public_key(),
        });
        tx
    }

    #[test]
    fn submit_admits_a_valid_transaction() {
        let (index, signer, coinbase_id) = funded_index_and_signer();
        let anchor = Anchor::new(0, coinbase_id, 0);
        let tx = signed_spend(&signer, anchor, 9000, address(9));
        let mut mempool = Mempool::new(100);
        mempool.submit(tx.clone(), None, &index).unwrap();
        assert!(mempool.contains(&tx.id));
    }

    #[test]
    fn resubmitting_the_same_transaction_is_a_distinct_outcome_and_a_no_op() {
        let (index, signer, coinbase_id) = funded_index_and_signer();
        let anchor = Anchor::new(0, coinbase_id, 0);
        let tx = signed_spend(&signer, anchor, 9000, address(9));
        let mut mempool = Mempool::new(100);
        mempool.submit(tx.clone(), None, &index).unwrap();
        let len_before = mempool.len();

        assert!(matches!(
            mempool.submit(tx.clone(), None, &index),
            Err(CoreError::AlreadyPresent)
        ));
        assert_eq!(mempool.len(), len_before);
        assert!(mempool.contains(&tx.id));
    }

    #[test]
    fn second_spender_without_replace_is_rejected() {
        let (index, signer, coinbase_id) = funded_index_and_signer();
        let anchor = Anchor::new(0, coinbase_id, 0);
        let first = signed_spend(&signer, anchor, 9000, address(9));
        let second = signed_spend(&signer, anchor, 8000, address(10));
        let mut mempool = Mempool::new(100);
        mempool.submit(first, None, &index).unwrap();
        assert!(matches!(
            mempool.submit(second, None, &index),
            Err(CoreError::ConflictingUtxos { .. })
        ));
    }

    #[test]
    fn rbf_requires_strictly_higher_fee_per_byte() {
        let (index, signer, coinbase_id) = funded_index_and_signer();
        let anchor = Anchor::new(0, coinbase_id, 0);
        let first = signed_spend(&signer, anchor, 9000, address(9));
        let first_id = first.id;
        let mut mempool = Mempool::new(100);
        mempool.submit(first, None, &index).unwrap();

        let equal_fee = signed_spend(&signer, anchor, 9000, address(11));
        assert!(matches!(
            mempool.submit(equal_fee, Some(first_id), &index),
            Err(CoreError::ConflictingUtxos { .. })
        ));

        let higher_fee = signed_spend(&signer, anchor, 8000, address(12));
        mempool.submit(higher_fee.clone(), Some(first_id), &index).unwrap();
        assert!(!mempool.contains(&first_id));
        assert!(mempool.contains(&higher_fee.id));
    }

    #[test]
    fn digest_block_txs_removes_consumed_entries() {
        let (index, signer, coinbase_id) = funded_index_and_signer();
        let anchor = Anchor::new(0, coinbase_id, 0);
        let tx = signed_spend(&signer, anchor, 9000, address(9));
        let mut mempool = Mempool::new(100);
        mempool.submit(tx.clone(), None, &index).unwrap();
        mempool.digest_block_txs(std::slice::from_ref(&tx));
        assert!(!mempool.contains(&tx.id));
    }

    #[test]
    fn select_for_block_respects_byte_cap() {
        let (index, signer, coinbase_id) = funded_index_and_signer();
        let anchor = Anchor::new(0, coinbase_id, 0);
        let tx = signed_spend(&signer, anchor, 9000, address(9));
        let weight = tx.estimated_weight();
        let mut mempool = Mempool::new(100);
        mempool.submit(tx, None, &index).unwrap();
        assert!(mempool.select_for_block(weight - 1).is_empty());
        assert_eq!(mempool.select_for_block(weight).len(), 1);
    }

    #[test]
    fn capacity_eviction_drops_lowest_fee_rate_first() {
        let (index, signer, coinbase_id) = funded_index_and_signer();
        let anchor = Anchor::new(0, coinbase_id, 0);
        let tx = signed_spend(&signer, anchor, 9000, address(9));
        let mut mempool = Mempool::new(0);
        mempool.submit(tx.clone(), None, &index).unwrap();
        assert!(!mempool.contains(&tx.id));
    }
}
