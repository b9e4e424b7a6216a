//! Transactions: anchors in, amounts+rules out, witnessed by signatures.

use crate::anchor::Anchor;
use crate::codec::{decode_bytes, decode_varuint, encode_bytes, encode_varuint, Codec};
use crate::error::{CoreError, Result};
use crate::rules::RuleTag;
use serde::{Deserialize, Serialize};
use shared::{Address, Amount, Hash256, TxId};
use std::collections::HashSet;

/// A single declared source of value for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxInput {
    /// A regular spend of a previously created output.
    Anchor(Anchor),
    /// The validator-reward transaction's sole input: the address being
    /// paid and a hash derived from the block header it is paid for.
    ValidatorReward { address: Address, hash: Hash256 },
    /// The coinbase transaction's sole input: the miner's nonce.
    Coinbase { nonce: Vec<u8> },
}

impl TxInput {
    const TAG_ANCHOR: u8 = 0;
    const TAG_VALIDATOR_REWARD: u8 = 1;
    const TAG_COINBASE: u8 = 2;

    #[must_use]
    pub const fn is_reward_or_coinbase(&self) -> bool {
        !matches!(self, Self::Anchor(_))
    }
}

/// A single declared destination of value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutput {
    Standard {
        amount: Amount,
        rule: RuleTag,
        address: Address,
    },
    /// Arbitrary data carried on-chain with no spendable value.
    Inscription(Vec<u8>),
}

impl TxOutput {
    const TAG_STANDARD: u8 = 0;
    const TAG_INSCRIPTION: u8 = 1;

    #[must_use]
    pub const fn amount(&self) -> Amount {
        match self {
            Self::Standard { amount, .. } => *amount,
            Self::Inscription(_) => 0,
        }
    }
}

/// A signature/public-key pair authorizing one or more inputs. Rendered in
/// the source format as `"signatureHex:pubKeyHex"`; kept here as raw bytes
/// since every consumer needs them as bytes anyway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    #[serde(
        serialize_with = "serialize_signature",
        deserialize_with = "deserialize_signature"
    )]
    pub signature: [u8; 64],
    pub public_key: [u8; 32],
}

/// `serde`'s array impls only cover lengths up to 32, so the 64-byte
/// signature needs an explicit slice-based (de)serializer.
fn serialize_signature<S: serde::Serializer>(
    sig: &[u8; 64],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    sig.as_slice().serialize(s)
}

fn deserialize_signature<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> std::result::Result<[u8; 64], D::Error> {
    let bytes: Vec<u8> = Vec::deserialize(d)?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| serde::de::Error::custom(format!("expected 64 bytes, got {}", v.len())))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub witnesses: Vec<Witness>,
}

impl Transaction {
    /// Builds the validator-reward transaction paying `fee_total` to
    /// `validator` for a block whose header hashes to `header_hash`.
    #[must_use]
    pub fn validator_reward(validator: Address, header_hash: Hash256, fee_total: Amount) -> Self {
        let mut tx = Self {
            id: TxId::from_bytes([0; 4]),
            version: 1,
            inputs: vec![TxInput::ValidatorReward {
                address: validator.clone(),
                hash: header_hash,
            }],
            outputs: vec![TxOutput::Standard {
                amount: fee_total,
                rule: RuleTag::Sig,
                address: validator,
            }],
            witnesses: vec![],
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Builds the coinbase transaction creating `reward` new supply for
    /// `recipient`, sealed with the miner's `nonce`.
    #[must_use]
    pub fn coinbase(recipient: Address, reward: Amount, nonce: Vec<u8>) -> Self {
        let mut tx = Self {
            id: TxId::from_bytes([0; 4]),
            version: 1,
            inputs: vec![TxInput::Coinbase { nonce }],
            outputs: vec![TxOutput::Standard {
                amount: reward,
                rule: RuleTag::Sig,
                address: recipient,
            }],
            witnesses: vec![],
        };
        tx.id = tx.compute_id();
        tx
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        matches!(self.inputs.first(), Some(TxInput::Coinbase { .. }))
    }

    #[must_use]
    pub fn is_validator_reward(&self) -> bool {
        matches!(self.inputs.first(), Some(TxInput::ValidatorReward { .. }))
    }

    #[must_use]
    pub fn is_reward_tx(&self) -> bool {
        self.is_coinbase() || self.is_validator_reward()
    }

    /// Canonical encoding of `(inputs, outputs)` only -- the pre-image
    /// hashed to derive `id`. Witnesses and the id itself are excluded
    /// since the id authenticates only the transaction's economic content.
    #[must_use]
    pub fn canonical_body_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(encode_varuint(self.inputs.len() as u64));
        for input in &self.inputs {
            out.extend(encode_input(input));
        }
        out.extend(encode_varuint(self.outputs.len() as u64));
        for output in &self.outputs {
            out.extend(encode_output(output));
        }
        out
    }

    #[must_use]
    pub fn compute_id(&self) -> TxId {
        Hash256::sha256(&self.canonical_body_bytes()).into()
    }

    /// Stage 1 (Shape) + stage 3 (Hash) of validation, the parts that are
    /// pure functions of the transaction alone.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedTransaction`] for shape violations or
    /// [`CoreError::TxHashMismatch`] if `id` does not match its body.
    pub fn validate_shape_and_hash(&self) -> Result<()> {
        self.validate_shape_and_hash_shape_only()?;
        if self.compute_id() != self.id {
            return Err(CoreError::TxHashMismatch);
        }
        Ok(())
    }

    /// Stage 1 (Shape) alone, with the hash check (stage 3) left out so the
    /// validator can run stage 2 (Balance) in between, matching the
    /// cheapest-first validation ordering.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedTransaction`] for shape violations.
    pub fn validate_shape_and_hash_shape_only(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(CoreError::MalformedTransaction("no inputs".into()));
        }
        if self.outputs.is_empty() {
            return Err(CoreError::MalformedTransaction("no outputs".into()));
        }
        for output in &self.outputs {
            if let TxOutput::Standard { amount, .. } = output {
                if *amount == 0 && !self.is_reward_tx() {
                    return Err(CoreError::MalformedTransaction(
                        "non-reward output amount must be > 0".into(),
                    ));
                }
            }
        }
        if !self.is_reward_tx() {
            let anchors: Vec<&Anchor> = self
                .inputs
                .iter()
                .filter_map(|input| match input {
                    TxInput::Anchor(anchor) => Some(anchor),
                    _ => None,
                })
                .collect();
            if anchors.len() != self.inputs.len() {
                return Err(CoreError::MalformedTransaction(
                    "non-reward transaction carries a reward-style input".into(),
                ));
            }
            let unique: HashSet<&Anchor> = anchors.iter().copied().collect();
            if unique.len() != anchors.len() {
                return Err(CoreError::MalformedTransaction("duplicate input anchor".into()));
            }
        }
        let mut seen_outputs = HashSet::new();
        for output in &self.outputs {
            if let TxOutput::Standard { amount, address, .. } = output {
                let key = (address.as_str().to_string(), *amount);
                if !seen_outputs.insert(key) {
                    return Err(CoreError::MalformedTransaction("duplicate output".into()));
                }
            }
        }
        Ok(())
    }

    /// Approximate on-wire weight in bytes, used for fee-rate and
    /// block-size accounting.
    #[must_use]
    pub fn estimated_weight(&self) -> u64 {
        Codec::encode(self).len() as u64
    }
}

fn encode_input(input: &TxInput) -> Vec<u8> {
    match input {
        TxInput::Anchor(anchor) => {
            let mut out = vec![TxInput::TAG_ANCHOR];
            out.extend(encode_varuint(anchor.height));
            out.extend_from_slice(anchor.tx_id.as_bytes());
            out.extend(encode_varuint(u64::from(anchor.vout)));
            out
        }
        TxInput::ValidatorReward { address, hash } => {
            let mut out = vec![TxInput::TAG_VALIDATOR_REWARD];
            out.extend(encode_bytes(address.as_str().as_bytes()));
            out.extend_from_slice(hash.as_bytes());
            out
        }
        TxInput::Coinbase { nonce } => {
            let mut out = vec![TxInput::TAG_COINBASE];
            out.extend(encode_bytes(nonce));
            out
        }
    }
}

fn decode_input(bytes: &[u8]) -> Result<(TxInput, usize)> {
    let tag = *bytes
        .first()
        .ok_or_else(|| CoreError::MalformedTransaction("empty input".into()))?;
    let mut offset = 1;
    let input = match tag {
        TxInput::TAG_ANCHOR => {
            let (height, consumed) = decode_varuint(&bytes[offset..])?;
            offset += consumed;
            let tx_id_bytes: [u8; 4] = bytes[offset..offset + 4]
                .try_into()
                .map_err(|_| CoreError::MalformedTransaction("truncated anchor tx id".into()))?;
            offset += 4;
            let (vout, consumed) = decode_varuint(&bytes[offset..])?;
            offset += consumed;
            TxInput::Anchor(Anchor::new(height, TxId::from_bytes(tx_id_bytes), vout as u32))
        }
        TxInput::TAG_VALIDATOR_REWARD => {
            let (address_bytes, consumed) = decode_bytes(&bytes[offset..])?;
            offset += consumed;
            let address_str = std::str::from_utf8(&address_bytes)
                .map_err(|e| CoreError::MalformedTransaction(e.to_string()))?;
            let address = shared::Address::parse(address_str)?;
            let hash_bytes: [u8; 32] = bytes[offset..offset + 32]
                .try_into()
                .map_err(|_| CoreError::MalformedTransaction("truncated hash".into()))?;
            offset += 32;
            TxInput::ValidatorReward {
                address,
                hash: Hash256::from_bytes(hash_bytes),
            }
        }
        TxInput::TAG_COINBASE => {
            let (nonce, consumed) = decode_bytes(&bytes[offset..])?;
            offset += consumed;
            TxInput::Coinbase { nonce }
        }
        other => {
            return Err(CoreError::MalformedTransaction(format!(
                "unknown input tag {other}"
            )))
        }
    };
    Ok((input, offset))
}

fn encode_output(output: &TxOutput) -> Vec<u8> {
    match output {
        TxOutput::Standard {
            amount,
            rule,
            address,
        } => {
            let mut out = vec![TxOutput::TAG_STANDARD];
            out.extend(encode_varuint(*amount));
            out.extend(rule.encode());
            out.extend(encode_bytes(address.as_str().as_bytes()));
            out
        }
        TxOutput::Inscription(data) => {
            let mut out = vec![TxOutput::TAG_INSCRIPTION];
            out.extend(encode_bytes(data));
            out
        }
    }
}

fn decode_output(bytes: &[u8]) -> Result<(TxOutput, usize)> {
    let tag = *bytes
        .first()
        .ok_or_else(|| CoreError::MalformedTransaction("empty output".into()))?;
    let mut offset = 1;
    let output = match tag {
        TxOutput::TAG_STANDARD => {
            let (amount, consumed) = decode_varuint(&bytes[offset..])?;
            offset += consumed;
            let (rule, consumed) = RuleTag::decode(&bytes[offset..])?;
            offset += consumed;
            let (address_bytes, consumed) = decode_bytes(&bytes[offset..])?;
            offset += consumed;
            let address_str = std::str::from_utf8(&address_bytes)
                .map_err(|e| CoreError::MalformedTransaction(e.to_string()))?;
            let address = shared::Address::parse(address_str)?;
            TxOutput::Standard {
                amount,
                rule,
                address,
            }
        }
        TxOutput::TAG_INSCRIPTION => {
            let (data, consumed) = decode_bytes(&bytes[offset..])?;
            offset += consumed;
            TxOutput::Inscription(data)
        }
        other => {
            return Err(CoreError::MalformedTransaction(format!(
                "unknown output tag {other}"
            )))
        }
    };
    Ok((output, offset))
}

impl Codec for Transaction {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.id.as_bytes());
        out.extend(encode_varuint(self.witnesses.len() as u64));
        for witness in &self.witnesses {
            out.extend_from_slice(&witness.signature);
            out.extend_from_slice(&witness.public_key);
        }
        out.extend(encode_varuint(u64::from(self.version)));
        out.extend(encode_varuint(self.inputs.len() as u64));
        for input in &self.inputs {
            out.extend(encode_input(input));
        }
        out.extend(encode_varuint(self.outputs.len() as u64));
        for output in &self.outputs {
            out.extend(encode_output(output));
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let id_bytes: [u8; 4] = bytes
            .get(0..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| CoreError::MalformedTransaction("truncated tx id".into()))?;
        let mut offset = 4;
        let (witness_count, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let mut witnesses = Vec::with_capacity(witness_count as usize);
        for _ in 0..witness_count {
            let signature: [u8; 64] = bytes[offset..offset + 64]
                .try_into()
                .map_err(|_| CoreError::MalformedTransaction("truncated signature".into()))?;
            offset += 64;
            let public_key: [u8; 32] = bytes[offset..offset + 32]
                .try_into()
                .map_err(|_| CoreError::MalformedTransaction("truncated pubkey".into()))?;
            offset += 32;
            witnesses.push(Witness {
                signature,
                public_key,
            });
        }
        let (version, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let (input_count, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let (input, consumed) = decode_input(&bytes[offset..])?;
            offset += consumed;
            inputs.push(input);
        }
        let (output_count, consumed) = decode_varuint(&bytes[offset..])?;
        offset += consumed;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            let (output, consumed) = decode_output(&bytes[offset..])?;
            offset += consumed;
            outputs.push(output);
        }
        Ok((
            Self {
                id: TxId::from_bytes(id_bytes),
                version: version as u32,
                inputs,
                outputs,
                witnesses,
            },
            offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_address(byte: u8) -> Address {
        let mut s = bs58::encode([byte]).into_string();
        s.extend(std::iter::repeat('2').take(20usize.saturating_sub(s.len())));
        s.truncate(20);
        Address::parse(&s).unwrap()
    }

    #[test]
    fn coinbase_round_trips_through_codec() {
        let tx = Transaction::coinbase(test_address(1), 39_088_169, vec![1, 2, 3]);
        let encoded = tx.encode();
        let (decoded, consumed) = Transaction::decode(&encoded).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn coinbase_id_matches_its_body() {
        let tx = Transaction::coinbase(test_address(2), 1000, vec![9]);
        assert!(tx.validate_shape_and_hash().is_ok());
    }

    #[test]
    fn tampered_id_fails_hash_check() {
        let mut tx = Transaction::coinbase(test_address(3), 1000, vec![9]);
        tx.id = TxId::from_bytes([9, 9, 9, 9]);
        assert!(matches!(
            tx.validate_shape_and_hash(),
            Err(CoreError::TxHashMismatch)
        ));
    }

    #[test]
    fn rejects_zero_amount_output_on_non_reward_tx() {
        let anchor = Anchor::new(1, TxId::from_bytes([1, 2, 3, 4]), 0);
        let mut tx = Transaction {
            id: TxId::from_bytes([0; 4]),
            version: 1,
            inputs: vec![TxInput::Anchor(anchor)],
            outputs: vec![TxOutput::Standard {
                amount: 0,
                rule: RuleTag::Sig,
                address: test_address(4),
            }],
            witnesses: vec![],
        };
        tx.id = tx.compute_id();
        assert!(tx.validate_shape_and_hash().is_err());
    }

    #[test]
    fn rejects_duplicate_input_anchors() {
        let anchor = Anchor::new(1, TxId::from_bytes([1, 2, 3, 4]), 0);
        let mut tx = Transaction {
            id: TxId::from_bytes([0; 4]),
            version: 1,
            inputs: vec![TxInput::Anchor(anchor), TxInput::Anchor(anchor)],
            outputs: vec![TxOutput::Standard {
                amount: 1,
                rule: RuleTag::Sig,
                address: test_address(5),
            }],
            witnesses: vec![],
        };
        tx.id = tx.compute_id();
        assert!(tx.validate_shape_and_hash().is_err());
    }
}
