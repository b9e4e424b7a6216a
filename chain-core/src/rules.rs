//! Spending rules attached to a transaction output.
//!
//! Rather than a general bytecode interpreter dispatching on an opcode
//! looked up at runtime, this workspace has a fixed, small set of spending
//! conditions expressed as a closed tagged variant: every rule the chain
//! understands is a case here, version numbers live inside the variants
//! that need them, and the codec maps tags 0..4 bijectively rather than
//! dispatching on a string name.

use crate::codec::{decode_varuint, encode_varuint, Codec};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use shared::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleTag {
    Sig,
    SigOrSlash { slash_after: u64 },
    LockUntilBlock { height: u64 },
    MultiSigCreate { threshold: u8, participants: Vec<Address> },
    P2pExchange { counterparty: Address, expires_at: u64 },
}

impl RuleTag {
    const TAG_SIG: u8 = 0;
    const TAG_SIG_OR_SLASH: u8 = 1;
    const TAG_LOCK_UNTIL_BLOCK: u8 = 2;
    const TAG_MULTI_SIG_CREATE: u8 = 3;
    const TAG_P2P_EXCHANGE: u8 = 4;

    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Sig => Self::TAG_SIG,
            Self::SigOrSlash { .. } => Self::TAG_SIG_OR_SLASH,
            Self::LockUntilBlock { .. } => Self::TAG_LOCK_UNTIL_BLOCK,
            Self::MultiSigCreate { .. } => Self::TAG_MULTI_SIG_CREATE,
            Self::P2pExchange { .. } => Self::TAG_P2P_EXCHANGE,
        }
    }

    /// Maximum number of inputs a transaction consuming an output under
    /// this rule may carry, and whether every one of them must be owned
    /// by the same address. Keyed by discriminant, not recomputed per
    /// call -- this is the stage-4 `UTXO_CREATION_CONDITIONS` table.
    #[must_use]
    pub const fn creation_conditions(&self) -> RuleConditions {
        match self {
            Self::Sig | Self::SigOrSlash { .. } | Self::LockUntilBlock { .. } => RuleConditions {
                max_inputs: 1,
                same_address_required: false,
            },
            Self::MultiSigCreate { .. } => RuleConditions {
                max_inputs: usize::MAX,
                same_address_required: false,
            },
            Self::P2pExchange { .. } => RuleConditions {
                max_inputs: 2,
                same_address_required: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleConditions {
    pub max_inputs: usize,
    pub same_address_required: bool,
}

impl Codec for RuleTag {
    fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.tag()];
        match self {
            Self::Sig => {}
            Self::SigOrSlash { slash_after } => out.extend(encode_varuint(*slash_after)),
            Self::LockUntilBlock { height } => out.extend(encode_varuint(*height)),
            Self::MultiSigCreate {
                threshold,
                participants,
            } => {
                out.push(*threshold);
                out.extend(encode_varuint(participants.len() as u64));
                for participant in participants {
                    let bytes = participant.as_str().as_bytes();
                    out.extend(encode_varuint(bytes.len() as u64));
                    out.extend_from_slice(bytes);
                }
            }
            Self::P2pExchange {
                counterparty,
                expires_at,
            } => {
                let bytes = counterparty.as_str().as_bytes();
                out.extend(encode_varuint(bytes.len() as u64));
                out.extend_from_slice(bytes);
                out.extend(encode_varuint(*expires_at));
            }
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let tag = *bytes
            .first()
            .ok_or_else(|| CoreError::MalformedTransaction("empty rule tag".into()))?;
        let mut offset = 1;
        let rule = match tag {
            Self::TAG_SIG => Self::Sig,
            Self::TAG_SIG_OR_SLASH => {
                let (slash_after, consumed) = decode_varuint(&bytes[offset..])?;
                offset += consumed;
                Self::SigOrSlash { slash_after }
            }
            Self::TAG_LOCK_UNTIL_BLOCK => {
                let (height, consumed) = decode_varuint(&bytes[offset..])?;
                offset += consumed;
                Self::LockUntilBlock { height }
            }
            Self::TAG_MULTI_SIG_CREATE => {
                let threshold = *bytes
                    .get(offset)
                    .ok_or_else(|| CoreError::MalformedTransaction("missing threshold".into()))?;
                offset += 1;
                let (count, consumed) = decode_varuint(&bytes[offset..])?;
                offset += consumed;
                let mut participants = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let (len, consumed) = decode_varuint(&bytes[offset..])?;
                    offset += consumed;
                    let len = len as usize;
                    let raw = std::str::from_utf8(&bytes[offset..offset + len])
                        .map_err(|e| CoreError::MalformedTransaction(e.to_string()))?;
                    participants.push(Address::parse(raw)?);
                    offset += len;
                }
                Self::MultiSigCreate {
                    threshold,
                    participants,
                }
            }
            Self::TAG_P2P_EXCHANGE => {
                let (len, consumed) = decode_varuint(&bytes[offset..])?;
                offset += consumed;
                let len = len as usize;
                let raw = std::str::from_utf8(&bytes[offset..offset + len])
                    .map_err(|e| CoreError::MalformedTransaction(e.to_string()))?;
                let counterparty = Address::parse(raw)?;
                offset += len;
                let (expires_at, consumed) = decode_varuint(&bytes[offset..])?;
                offset += consumed;
                Self::P2pExchange {
                    counterparty,
                    expires_at,
                }
            }
            other => {
                return Err(CoreError::MalformedTransaction(format!(
                    "unknown rule tag {other}"
                )))
            }
        };
        Ok((rule, offset))
    }
}
