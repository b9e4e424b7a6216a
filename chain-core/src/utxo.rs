//! Maps anchors to unspent outputs, indexed by owning address, with
//! balances materialised rather than summed on every query.

use crate::anchor::Anchor;
use crate::error::{CoreError, Result};
use crate::transaction::{Transaction, TxInput, TxOutput};
use serde::{Deserialize, Serialize};
use shared::{Address, Amount};
use std::collections::{HashMap, HashSet};

/// Records exactly what an `apply_block` call did, so a caller (the
/// `Chain`) can later undo it precisely during a re-org without this index
/// needing to keep a full history of itself.
#[derive(Debug, Default)]
pub struct UtxoIndexDelta {
    removed: Vec<(Anchor, TxOutput)>,
    created: Vec<Anchor>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UtxoIndex {
    utxo_by_anchor: HashMap<Anchor, TxOutput>,
    utxos_by_address: HashMap<Address, HashSet<Anchor>>,
    balance_by_address: HashMap<Address, Amount>,
}

impl UtxoIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lookup(&self, anchor: &Anchor) -> Option<&TxOutput> {
        self.utxo_by_anchor.get(anchor)
    }

    #[must_use]
    pub fn balance_of(&self, address: &Address) -> Amount {
        self.balance_by_address.get(address).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn utxos_of(&self, address: &Address) -> Vec<Anchor> {
        self.utxos_by_address
            .get(address)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Applies every transaction in `block_index`/`txs` in order: consumed
    /// anchors are destroyed, new outputs are created at
    /// `(block_index, tx.id, vout)`. On the first error the index is left
    /// exactly as it was before the call -- nothing partially applied
    /// survives.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UtxoNotFound`] if an input references an
    /// anchor not present in the index.
    pub fn apply_block(&mut self, block_index: u64, txs: &[Transaction]) -> Result<UtxoIndexDelta> {
        let mut delta = UtxoIndexDelta::default();
        match self.try_apply(block_index, txs, &mut delta) {
            Ok(()) => Ok(delta),
            Err(err) => {
                self.rollback(&delta);
                Err(err)
            }
        }
    }

    fn try_apply(
        &mut self,
        block_index: u64,
        txs: &[Transaction],
        delta: &mut UtxoIndexDelta,
    ) -> Result<()> {
        for tx in txs {
            if !tx.is_reward_tx() {
                for input in &tx.inputs {
                    if let TxInput::Anchor(anchor) = input {
                        let output = self.remove(anchor)?;
                        delta.removed.push((*anchor, output));
                    }
                }
            }
            for (vout, output) in tx.outputs.iter().enumerate() {
                if output.amount() == 0 {
                    continue;
                }
                let anchor = Anchor::new(block_index, tx.id, vout as u32);
                self.insert(anchor, output.clone());
                delta.created.push(anchor);
            }
        }
        Ok(())
    }

    /// Exact inverse of the `apply_block` call that produced `delta`.
    pub fn revert_delta(&mut self, delta: UtxoIndexDelta) {
        self.rollback(&delta);
    }

    fn rollback(&mut self, delta: &UtxoIndexDelta) {
        for anchor in &delta.created {
            let _ = self.remove(anchor);
        }
        for (anchor, output) in delta.removed.iter().rev() {
            self.insert(*anchor, output.clone());
        }
    }

    fn insert(&mut self, anchor: Anchor, output: TxOutput) {
        if let TxOutput::Standard { amount, address, .. } = &output {
            *self.balance_by_address.entry(address.clone()).or_insert(0) += amount;
            self.utxos_by_address
                .entry(address.clone())
                .or_default()
                .insert(anchor);
        }
        self.utxo_by_anchor.insert(anchor, output);
    }

    fn remove(&mut self, anchor: &Anchor) -> Result<TxOutput> {
        let output = self
            .utxo_by_anchor
            .remove(anchor)
            .ok_or(CoreError::UtxoNotFound(*anchor))?;
        if let TxOutput::Standard { amount, address, .. } = &output {
            if let Some(balance) = self.balance_by_address.get_mut(address) {
                *balance -= amount;
            }
            if let Some(set) = self.utxos_by_address.get_mut(address) {
                set.remove(anchor);
            }
        }
        Ok(output)
    }

    /// Invariant 1 of the UTXO index: the sum of every materialised
    /// balance equals `expected_cumulative_coin_base`.
    #[must_use]
    pub fn total_balance(&self) -> Amount {
        self.balance_by_address.values().sum()
    }

    /// Invariant 2: every indexed anchor appears in exactly one address's
    /// UTXO set.
    #[must_use]
    pub fn anchors_and_addresses_agree(&self) -> bool {
        let from_address_index: HashSet<Anchor> = self
            .utxos_by_address
            .values()
            .flat_map(|set| set.iter().copied())
            .collect();
        let standard_anchors: HashSet<Anchor> = self
            .utxo_by_anchor
            .iter()
            .filter(|(_, output)| matches!(output, TxOutput::Standard { .. }))
            .map(|(anchor, _)| *anchor)
            .collect();
        from_address_index == standard_anchors
    }
}
