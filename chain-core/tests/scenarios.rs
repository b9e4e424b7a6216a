//! End-to-end scenarios exercising the public surface of `chain-core`
//! together: chain assembly, mempool admission, block sealing, and
//! re-org handling.

use chain_core::block::{seal_with_proof_of_work, unsealed_block, GENESIS_REWARD};
use chain_core::{Anchor, Block, Chain, ChainParams, Codec, CoreError, Mempool, PrevHash, RuleTag, UtxoIndex};
use chain_core::{Transaction, TxInput, TxOutput, Witness};
use shared::{derive_address, Address, Amount, Ed25519Signer, Signer};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn address(byte: u8) -> Address {
    let mut s = bs58::encode([byte]).into_string();
    s.extend(std::iter::repeat('2').take(20usize.saturating_sub(s.len())));
    s.truncate(20);
    Address::parse(&s).unwrap()
}

/// Seals `candidate` for acceptance onto `chain`: pins `timestamp` to
/// exactly one target interval after `pos_timestamp` (so
/// `timeDiffAdjustment` contributes nothing) and searches for a nonce at
/// the resulting final difficulty.
fn seal_for_chain(chain: &Chain, mut candidate: Block) -> Block {
    let target = chain.params().target_block_time_ms;
    candidate.timestamp = candidate.pos_timestamp + target;
    let final_difficulty = candidate.final_difficulty(target);
    seal_with_proof_of_work(candidate, final_difficulty, 1, &Arc::new(AtomicBool::new(false))).unwrap()
}

fn signed_transfer(signer: &Ed25519Signer, anchor: Anchor, outputs: Vec<TxOutput>) -> Transaction {
    let mut tx = Transaction {
        id: shared::TxId::from_bytes([0; 4]),
        version: 1,
        inputs: vec![TxInput::Anchor(anchor)],
        outputs,
        witnesses: vec![],
    };
    tx.id = tx.compute_id();
    let pre_image = tx.canonical_body_bytes();
    let signature = signer.sign(&pre_image);
    tx.witnesses.push(Witness {
        signature,
        public_key: signer.public_key(),
    });
    tx
}

#[test]
fn scenario_genesis_candidate_has_the_documented_shape() {
    let validator = address(1);
    let coinbase_recipient = address(2);
    let chain = Chain::genesis(ChainParams::default(), validator, coinbase_recipient, 0).unwrap();

    let genesis = chain.tip();
    assert_eq!(genesis.index, 0);
    assert_eq!(genesis.supply, 0);
    assert_eq!(genesis.coin_base, GENESIS_REWARD);
    assert_eq!(genesis.prev_hash.to_string(), chain_core::GENESIS_SENTINEL);
    // Txs[0] is the (zero-fee) validator-reward tx, Txs[1] the coinbase --
    // the two reward transactions every block carries, per the block
    // module's invariants.
    assert_eq!(genesis.txs.len(), 2);
    assert!(genesis.txs[0].is_validator_reward());
    assert_eq!(genesis.txs[0].outputs[0].amount(), 0);
}

#[test]
fn scenario_first_block_accepted_yields_documented_balances() {
    let validator = address(3);
    let coinbase_recipient = address(4);
    let target_block_time_ms = ChainParams::default().target_block_time_ms;

    let mut candidate = unsealed_block(
        0,
        0,
        GENESIS_REWARD,
        1,
        0,
        PrevHash::Genesis,
        0,
        validator.clone(),
        coinbase_recipient.clone(),
        0,
    );
    candidate.timestamp = candidate.pos_timestamp + target_block_time_ms;
    let final_difficulty = candidate.final_difficulty(target_block_time_ms);
    let sealed = seal_with_proof_of_work(candidate, final_difficulty, 1, &Arc::new(AtomicBool::new(false))).unwrap();

    sealed.verify_pow(target_block_time_ms).unwrap();

    let mut utxo_index = UtxoIndex::new();
    utxo_index.apply_block(sealed.index, &sealed.txs).unwrap();

    assert_eq!(utxo_index.balance_of(&validator), 0);
    assert_eq!(utxo_index.balance_of(&coinbase_recipient), GENESIS_REWARD);
}

#[test]
fn scenario_simple_transfer_leaves_documented_change() {
    let validator = address(5);
    let sender_signer = Ed25519Signer::generate();
    let sender = derive_address(&sender_signer.public_key()).unwrap();
    let recipient_b = address(6);

    let mut chain = Chain::genesis(ChainParams::default(), validator.clone(), sender.clone(), 0).unwrap();
    let genesis_coinbase_id = chain.tip().coinbase_tx().unwrap().id;
    let anchor = Anchor::new(0, genesis_coinbase_id, 0);

    let fee: Amount = 1_000;
    let pay_b: Amount = 30_000_000;
    let change = GENESIS_REWARD - pay_b - fee;
    let transfer = signed_transfer(
        &sender_signer,
        anchor,
        vec![
            TxOutput::Standard {
                amount: pay_b,
                rule: RuleTag::Sig,
                address: recipient_b.clone(),
            },
            TxOutput::Standard {
                amount: change,
                rule: RuleTag::Sig,
                address: sender.clone(),
            },
        ],
    );

    let mut mempool = Mempool::new(5_000);
    mempool.submit(transfer.clone(), None, chain.utxo_index()).unwrap();

    let selected = mempool.select_for_block(chain.params().max_block_size as u64);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, transfer.id);

    let fee_total = mempool.fee_total_of(&[transfer.id]);
    assert_eq!(fee_total, fee);

    let next_coinbase_recipient = address(7);
    let candidate = chain.build_candidate(selected, fee_total, validator.clone(), next_coinbase_recipient, vec![2], 10_000);
    let sealed = seal_for_chain(&chain, candidate);
    chain.apply_block(sealed).unwrap();

    assert_eq!(chain.utxo_index().balance_of(&recipient_b), pay_b);
    assert_eq!(chain.utxo_index().balance_of(&sender), change);
    assert_eq!(chain.utxo_index().balance_of(&validator), fee);
}

#[test]
fn scenario_readmitting_an_already_present_tx_is_a_no_op() {
    let validator = address(19);
    let sender_signer = Ed25519Signer::generate();
    let sender = derive_address(&sender_signer.public_key()).unwrap();

    let chain = Chain::genesis(ChainParams::default(), validator, sender, 0).unwrap();
    let coinbase_id = chain.tip().coinbase_tx().unwrap().id;
    let anchor = Anchor::new(0, coinbase_id, 0);

    let transfer = signed_transfer(
        &sender_signer,
        anchor,
        vec![TxOutput::Standard {
            amount: GENESIS_REWARD - 1_000,
            rule: RuleTag::Sig,
            address: address(20),
        }],
    );

    let mut mempool = Mempool::new(5_000);
    mempool.submit(transfer.clone(), None, chain.utxo_index()).unwrap();
    let len_before = mempool.len();

    assert!(matches!(
        mempool.submit(transfer.clone(), None, chain.utxo_index()),
        Err(CoreError::AlreadyPresent)
    ));
    assert_eq!(mempool.len(), len_before);
    assert!(mempool.contains(&transfer.id));
}

#[test]
fn scenario_double_spend_rejected_unless_valid_rbf() {
    let validator = address(8);
    let sender_signer = Ed25519Signer::generate();
    let sender = derive_address(&sender_signer.public_key()).unwrap();

    let chain = Chain::genesis(ChainParams::default(), validator, sender, 0).unwrap();
    let coinbase_id = chain.tip().coinbase_tx().unwrap().id;
    let anchor = Anchor::new(0, coinbase_id, 0);

    let low_fee = signed_transfer(
        &sender_signer,
        anchor,
        vec![TxOutput::Standard {
            amount: GENESIS_REWARD - 1_000,
            rule: RuleTag::Sig,
            address: address(9),
        }],
    );
    let low_fee_id = low_fee.id;

    let mut mempool = Mempool::new(5_000);
    mempool.submit(low_fee.clone(), None, chain.utxo_index()).unwrap();

    // Same fee-per-byte, no replace_tx_id named: rejected outright.
    let same_fee_rival = signed_transfer(
        &sender_signer,
        anchor,
        vec![TxOutput::Standard {
            amount: GENESIS_REWARD - 1_000,
            rule: RuleTag::Sig,
            address: address(10),
        }],
    );
    assert!(matches!(
        mempool.submit(same_fee_rival, None, chain.utxo_index()),
        Err(CoreError::ConflictingUtxos { existing }) if existing == low_fee_id
    ));

    // Strictly higher fee-per-byte and the correct replace_tx_id: evicts
    // the original.
    let higher_fee_rival = signed_transfer(
        &sender_signer,
        anchor,
        vec![TxOutput::Standard {
            amount: GENESIS_REWARD - 5_000,
            rule: RuleTag::Sig,
            address: address(11),
        }],
    );
    let higher_fee_id = higher_fee_rival.id;
    mempool
        .submit(higher_fee_rival, Some(low_fee_id), chain.utxo_index())
        .unwrap();
    assert!(!mempool.contains(&low_fee_id));
    assert!(mempool.contains(&higher_fee_id));
}

#[test]
fn scenario_reorg_restores_balances_and_frees_anchors() {
    let validator = address(12);
    let signer_c = Ed25519Signer::generate();
    let coinbase_recipient_c = derive_address(&signer_c.public_key()).unwrap();
    let recipient_d = address(13);

    let mut chain = Chain::genesis(ChainParams::default(), validator.clone(), coinbase_recipient_c.clone(), 0).unwrap();
    let genesis_coinbase_id = chain.tip().coinbase_tx().unwrap().id;
    let anchor = Anchor::new(0, genesis_coinbase_id, 0);

    let spend_in_b1 = signed_transfer(
        &signer_c,
        anchor,
        vec![TxOutput::Standard {
            amount: 500_000,
            rule: RuleTag::Sig,
            address: recipient_d.clone(),
        }],
    );
    let fee_b1 = GENESIS_REWARD - 500_000;

    let candidate_b1 = chain.build_candidate(
        vec![spend_in_b1.clone()],
        fee_b1,
        validator.clone(),
        coinbase_recipient_c.clone(),
        vec![1],
        10_000,
    );
    let b1 = seal_for_chain(&chain, candidate_b1);
    chain.apply_block(b1).unwrap();

    let candidate_b2 = chain.build_candidate(vec![], 0, validator.clone(), coinbase_recipient_c.clone(), vec![2], 20_000);
    let b2 = seal_for_chain(&chain, candidate_b2);
    chain.apply_block(b2).unwrap();

    assert_eq!(chain.height(), 2);
    assert_eq!(chain.utxo_index().balance_of(&recipient_d), 500_000);

    // The alternative branch never spends the genesis coinbase output.
    chain.revert_tip().unwrap();
    chain.revert_tip().unwrap();
    assert_eq!(chain.height(), 0);
    assert!(chain.utxo_index().lookup(&anchor).is_some());

    let coinbase_recipient_alt = address(14);
    for (nonce, pos_timestamp) in [(vec![10u8], 10_000i64), (vec![11], 20_000), (vec![12], 30_000)] {
        let candidate = chain.build_candidate(vec![], 0, validator.clone(), coinbase_recipient_alt.clone(), nonce, pos_timestamp);
        let sealed = seal_for_chain(&chain, candidate);
        chain.apply_block(sealed).unwrap();
    }
    assert_eq!(chain.height(), 3);

    let cumulative_coin_base: Amount = (0..=3).map(|h| chain.block_at(h).unwrap().coin_base).sum();
    let total_balances = chain.utxo_index().balance_of(&validator)
        + chain.utxo_index().balance_of(&coinbase_recipient_c)
        + chain.utxo_index().balance_of(&coinbase_recipient_alt)
        + chain.utxo_index().balance_of(&recipient_d);
    assert_eq!(total_balances, cumulative_coin_base);
    assert_eq!(chain.utxo_index().balance_of(&recipient_d), 0);

    // The original b1 spend consumed an anchor that's unspent again on
    // the winning branch -- it is re-admissible.
    let mut mempool = Mempool::new(5_000);
    mempool.submit(spend_in_b1, None, chain.utxo_index()).unwrap();
}

#[test]
fn scenario_supply_cap_clips_then_zeroes_coin_base() {
    let validator = address(15);
    let coinbase_recipient = address(16);
    let chain = Chain::genesis(
        ChainParams {
            max_supply: 1_000_000,
            ..ChainParams::default()
        },
        validator,
        coinbase_recipient,
        0,
    )
    .unwrap();

    let schedule = chain.reward_schedule();
    assert_eq!(schedule.coin_base_for(1, 999_995), 5);
    assert_eq!(schedule.coin_base_for(2, 1_000_000), 0);
}

#[test]
fn block_round_trips_through_codec_end_to_end() {
    let validator = address(17);
    let coinbase_recipient = address(18);
    let chain = Chain::genesis(ChainParams::default(), validator, coinbase_recipient, 0).unwrap();
    let encoded = chain.tip().encode();
    let (decoded, consumed) = Block::decode(&encoded).unwrap();
    assert_eq!(&decoded, chain.tip());
    assert_eq!(consumed, encoded.len());
}
