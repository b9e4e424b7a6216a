//! Block header/body, difficulty, reward schedule, and proof-of-work
//! sealing, kept as one module since the reward schedule and difficulty
//! arithmetic are meaningless without the block fields they operate on --
//! together they form one "Block engine" component.

use crate::codec::{decode_bytes, decode_varuint, encode_bytes, encode_varuint, Codec};
use crate::error::{CoreError, Result};
use crate::transaction::{Transaction, TxInput};
use serde::{Deserialize, Serialize};
use shared::{argon2id_hash, Address, Amount, Argon2Purpose, Hash256, Height};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The only permitted non-hex `prevHash`: the genesis block's declared
/// predecessor.
pub const GENESIS_SENTINEL: &str = "ContrastGenesisBlock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrevHash {
    Genesis,
    Hash(Hash256),
}

impl fmt::Display for PrevHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Genesis => write!(f, "{GENESIS_SENTINEL}"),
            Self::Hash(hash) => write!(f, "{hash}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: Height,
    pub supply: Amount,
    pub coin_base: Amount,
    pub difficulty: u32,
    pub legitimacy: i32,
    pub prev_hash: PrevHash,
    pub pos_timestamp: i64,
    pub timestamp: i64,
    pub hash: Hash256,
    pub nonce: Vec<u8>,
    pub txs: Vec<Transaction>,
}

impl Block {
    /// `Txs[1]`'s coinbase nonce, concatenated after the header nonce when
    /// sealing, per the canonical `nonce = headerNonce ‖ coinbaseNonce`.
    #[must_use]
    pub fn coinbase_nonce(&self) -> Option<&[u8]> {
        match self.txs.get(1)?.inputs.first()? {
            TxInput::Coinbase { nonce } => Some(nonce),
            _ => None,
        }
    }

    #[must_use]
    pub fn full_seal_nonce(&self) -> Vec<u8> {
        let mut out = self.nonce.clone();
        if let Some(coinbase_nonce) = self.coinbase_nonce() {
            out.extend_from_slice(coinbase_nonce);
        }
        out
    }

    /// `string(prevHash ‖ index ‖ supply ‖ difficulty ‖ (concat of tx ids) ‖ coinBase)`.
    #[must_use]
    pub fn canonical_signature_string(&self) -> String {
        let tx_ids: String = self.txs.iter().map(|tx| tx.id.to_string()).collect();
        format!(
            "{}{}{}{}{}{}",
            self.prev_hash, self.index, self.supply, self.difficulty, tx_ids, self.coin_base
        )
    }

    /// Computes the Argon2id proof-of-work hash for the block's current
    /// fields and nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying Argon2 hashing fails.
    pub fn compute_pow_hash(&self) -> Result<Hash256> {
        let signature_hex = hex::encode(self.canonical_signature_string().as_bytes());
        let mut pow_input = signature_hex.into_bytes();
        pow_input.extend_from_slice(&hex::encode(self.full_seal_nonce()).into_bytes());
        let digest = argon2id_hash(&pow_input, Argon2Purpose::BlockSeal)?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Ok(Hash256::from_bytes(bytes))
    }

    /// Declared difficulty decomposed as `(zeros, adjust)` per §4.5.
    #[must_use]
    pub const fn difficulty_components(final_difficulty: u32) -> (u32, u32) {
        (final_difficulty / 16, final_difficulty % 16)
    }

    #[must_use]
    pub fn meets_difficulty(hash: &Hash256, final_difficulty: u32) -> bool {
        let (zeros, adjust) = Self::difficulty_components(final_difficulty);
        hash.leading_zero_bits() >= zeros && hash.bits_after(zeros) >= adjust
    }

    /// `declaredDifficulty + timeDiffAdjustment + legitimacy`, floored at 1.
    #[must_use]
    pub fn final_difficulty(&self, target_block_time_ms: i64) -> u32 {
        let adjustment = time_diff_adjustment(self.pos_timestamp, self.timestamp, target_block_time_ms);
        let raw = i64::from(self.difficulty) + i64::from(adjustment) + i64::from(self.legitimacy);
        raw.max(1) as u32
    }

    /// Recomputes the proof-of-work hash and checks it both satisfies the
    /// final-difficulty condition and matches the block's declared `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBlock`] if the hash doesn't match or
    /// doesn't meet the required difficulty.
    pub fn verify_pow(&self, target_block_time_ms: i64) -> Result<()> {
        let recomputed = self.compute_pow_hash()?;
        if recomputed != self.hash {
            return Err(CoreError::InvalidBlock("declared hash does not match recomputation".into()));
        }
        let final_difficulty = self.final_difficulty(target_block_time_ms);
        if !Self::meets_difficulty(&recomputed, final_difficulty) {
            return Err(CoreError::InvalidBlock("hash does not meet required difficulty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn validator_reward_tx(&self) -> Option<&Transaction> {
        self.txs.first()
    }

    #[must_use]
    pub fn coinbase_tx(&self) -> Option<&Transaction> {
        self.txs.get(1)
    }

    /// Checks the parent-linkage invariants from §3: `index`, `prevHash`,
    /// and `supply` all agree with `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBlock`] on any mismatch.
    pub fn validate_against_parent(&self, parent: &Self) -> Result<()> {
        if self.index != parent.index + 1 {
            return Err(CoreError::InvalidBlock("index does not follow parent".into()));
        }
        if self.prev_hash != PrevHash::Hash(parent.hash) {
            return Err(CoreError::InvalidBlock("prevHash does not match parent".into()));
        }
        if self.supply != parent.supply + parent.coin_base {
            return Err(CoreError::InvalidBlock("supply does not follow parent coinBase".into()));
        }
        Ok(())
    }
}

/// Maps signed `legitimacy` onto the unsigned varuint wire format without
/// the sign-extension blowup a plain `as u64` cast would cause for
/// negative values.
const fn zigzag_encode(value: i32) -> u64 {
    (((value << 1) ^ (value >> 31)) as u32) as u64
}

const fn zigzag_decode(encoded: u64) -> i32 {
    let encoded = encoded as u32;
    ((encoded >> 1) as i32) ^ -((encoded & 1) as i32)
}

/// `maxAdj − round((timestamp − posTimestamp)/targetBlockTime · maxAdj)`.
fn time_diff_adjustment(pos_timestamp: i64, timestamp: i64, target_block_time_ms: i64) -> i32 {
    const MAX_ADJ: f64 = 32.0;
    let elapsed = (timestamp - pos_timestamp) as f64;
    let ratio = elapsed / target_block_time_ms as f64;
    (MAX_ADJ - (ratio * MAX_ADJ).round()) as i32
}

/// Every `blocksBeforeAdjustment` blocks, compares the observed average
/// inter-block interval to the target and shifts difficulty accordingly.
#[must_use]
pub fn retarget_difficulty(
    current_difficulty: u32,
    block_timestamps: &[i64],
    target_block_time_ms: i64,
    threshold_per_diff_increment_pct: f64,
) -> u32 {
    if block_timestamps.len() < 2 {
        return current_difficulty;
    }
    let span = (block_timestamps[block_timestamps.len() - 1] - block_timestamps[0]) as f64;
    let intervals = (block_timestamps.len() - 1) as f64;
    let average_interval = span / intervals;
    let deviation_pct = (target_block_time_ms as f64 - average_interval) / target_block_time_ms as f64 * 100.0;
    let steps = (deviation_pct.abs() / threshold_per_diff_increment_pct).floor() as i64;
    let steps = steps.min(32);
    if deviation_pct > 0.0 {
        current_difficulty.saturating_add(steps as u32)
    } else {
        current_difficulty.saturating_sub(steps as u32).max(1)
    }
}

/// Fibonacci-halving reward schedule. `reward_for(epoch) = fib(GENESIS_FIB_INDEX - epoch)`,
/// clamped at `minBlockReward`, since `Fib(n+2) - Fib(n+1) = Fib(n)` means
/// each halving steps one index back along the same Fibonacci sequence
/// that produced the genesis reward (`Fib(38) == 39_088_169`).
pub struct RewardSchedule {
    halving_interval: u64,
    max_supply: Amount,
    min_block_reward: Amount,
    fib_cache: RefCell<Vec<u64>>,
}

const GENESIS_FIB_INDEX: usize = 38;
pub const GENESIS_REWARD: Amount = 39_088_169;

impl RewardSchedule {
    #[must_use]
    pub fn new(halving_interval: u64, max_supply: Amount) -> Self {
        Self {
            halving_interval,
            max_supply,
            min_block_reward: 1,
            fib_cache: RefCell::new(vec![0, 1]),
        }
    }

    fn fib(&self, n: usize) -> u64 {
        let mut cache = self.fib_cache.borrow_mut();
        while cache.len() <= n {
            let len = cache.len();
            let next = cache[len - 1].saturating_add(cache[len - 2]);
            cache.push(next);
        }
        cache[n]
    }

    /// The uncapped reward for the halving epoch that `block_index` falls
    /// in (before applying the supply-cap clip).
    #[must_use]
    pub fn base_reward_for(&self, block_index: Height) -> Amount {
        let epoch = block_index / self.halving_interval;
        if epoch as usize > GENESIS_FIB_INDEX {
            return self.min_block_reward;
        }
        let fib_index = GENESIS_FIB_INDEX - epoch as usize;
        self.fib(fib_index).max(self.min_block_reward)
    }

    /// The actual `coinBase` for a block built on top of `current_supply`,
    /// clipped so the running total never exceeds `maxSupply`.
    #[must_use]
    pub fn coin_base_for(&self, block_index: Height, current_supply: Amount) -> Amount {
        if current_supply >= self.max_supply {
            return 0;
        }
        let base = self.base_reward_for(block_index);
        let remaining = self.max_supply - current_supply;
        base.min(remaining)
    }
}

/// Searches the nonce space across `worker_count` threads until a nonce is
/// found that makes the block's PoW hash satisfy `final_difficulty`, or
/// `should_stop` is set by a caller wanting to abandon a stale candidate.
///
/// # Errors
///
/// Returns an error if Argon2 hashing fails for every attempt (not
/// expected in practice).
pub fn seal_with_proof_of_work(
    mut candidate: Block,
    final_difficulty: u32,
    worker_count: usize,
    should_stop: &Arc<AtomicBool>,
) -> Result<Block> {
    let worker_count = worker_count.max(1);
    let found: std::sync::Mutex<Option<(u64, Hash256)>> = std::sync::Mutex::new(None);
    std::thread::scope(|scope| {
        for worker_id in 0..worker_count {
            let candidate = &candidate;
            let found = &found;
            let should_stop = Arc::clone(should_stop);
            scope.spawn(move || {
                let mut nonce_value: u64 = worker_id as u64;
                loop {
                    if should_stop.load(Ordering::Relaxed) || found.lock().unwrap().is_some() {
                        return;
                    }
                    let mut attempt = candidate.clone();
                    attempt.nonce = nonce_value.to_le_bytes().to_vec();
                    if let Ok(hash) = attempt.compute_pow_hash() {
                        if Block::meets_difficulty(&hash, final_difficulty) {
                            let mut slot = found.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some((nonce_value, hash));
                            }
                            return;
                        }
                    }
                    nonce_value += worker_count as u64;
                }
            });
        }
    });
    let (nonce_value, hash) = found
        .into_inner()
        .unwrap()
        .ok_or_else(|| CoreError::InvalidBlock("proof of work search exhausted".into()))?;
    candidate.nonce = nonce_value.to_le_bytes().to_vec();
    candidate.hash = hash;
    Ok(candidate)
}

impl Codec for Block {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(encode_varuint(self.index));
        out.extend(encode_varuint(self.supply));
        out.extend(encode_varuint(self.coin_base));
        out.extend(encode_varuint(u64::from(self.difficulty)));
        out.extend(encode_varuint(zigzag_encode(self.legitimacy)));
        out.extend(encode_bytes(self.prev_hash.to_string().as_bytes()));
        out.extend(encode_varuint(self.pos_timestamp as u64));
        out.extend(encode_varuint(self.timestamp as u64));
        out.extend_from_slice(self.hash.as_bytes());
        out.extend(encode_bytes(&self.nonce));
        out.extend(encode_varuint(self.txs.len() as u64));
        for tx in &self.txs {
            out.extend(tx.encode());
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let (index, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let (supply, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let (coin_base, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let (difficulty, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let (legitimacy_raw, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let (prev_hash_bytes, consumed) = decode_bytes(&bytes[offset..])?;
        offset += consumed;
        let prev_hash_str = std::str::from_utf8(&prev_hash_bytes)
            .map_err(|e| CoreError::MalformedTransaction(e.to_string()))?;
        let prev_hash = if prev_hash_str == GENESIS_SENTINEL {
            PrevHash::Genesis
        } else {
            PrevHash::Hash(Hash256::try_from(prev_hash_str)?)
        };
        let (pos_timestamp, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let (timestamp, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let hash_bytes: [u8; 32] = bytes[offset..offset + 32]
            .try_into()
            .map_err(|_| CoreError::MalformedTransaction("truncated block hash".into()))?;
        offset += 32;
        let (nonce, consumed) = decode_bytes(&bytes[offset..])?;
        offset += consumed;
        let (tx_count, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let mut txs = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            let (tx, consumed) = Transaction::decode(&bytes[offset..])?;
            offset += consumed;
            txs.push(tx);
        }
        Ok((
            Self {
                index,
                supply,
                coin_base,
                difficulty: difficulty as u32,
                legitimacy: zigzag_decode(legitimacy_raw),
                prev_hash,
                pos_timestamp: pos_timestamp as i64,
                timestamp: timestamp as i64,
                hash: Hash256::from_bytes(hash_bytes),
                nonce,
                txs,
            },
            offset,
        ))
    }
}

/// Convenience for tests and the genesis path: a validator-reward tx with
/// no fees plus a coinbase tx, unsealed (zero hash/nonce).
#[must_use]
pub fn unsealed_block(
    index: Height,
    supply: Amount,
    coin_base: Amount,
    difficulty: u32,
    legitimacy: i32,
    prev_hash: PrevHash,
    pos_timestamp: i64,
    validator: Address,
    coinbase_recipient: Address,
    fee_total: Amount,
) -> Block {
    let header_hash = Hash256::sha256(format!("{index}{prev_hash}").as_bytes());
    let validator_reward = Transaction::validator_reward(validator, header_hash, fee_total);
    let coinbase = Transaction::coinbase(coinbase_recipient, coin_base, vec![]);
    Block {
        index,
        supply,
        coin_base,
        difficulty,
        legitimacy,
        prev_hash,
        pos_timestamp,
        timestamp: pos_timestamp,
        hash: Hash256::zero(),
        nonce: vec![],
        txs: vec![validator_reward, coinbase],
    }
}
