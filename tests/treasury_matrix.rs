//! Treasury deposits across the proportions a runtime may be configured
//! with, for native calls and every Ethereum transaction type.
//!
//! Each transaction gets its own block, and the treasury gain of that block is
//! compared with the fee rebuilt from the node's quote, multiplier and runtime
//! constants.

use fee_auditor::constants::{ConstantStore, RuntimeName};
use fee_auditor::fees::{eip1559_tip_paid, FeePath};
use fee_auditor::portions::calc_treasury_increase;
use fee_auditor::test_utils::{MockChain, TxSpec, GWEI, TREASURY_ACCOUNT, UNIT};
use fee_auditor::types::{AccountId, Balance, BlockHash, EthereumTransaction, H160};
use fee_auditor::{verify_block_fees, AuditConfig, ChainClient, FeeEngine, FeeSplit};

const PROPORTIONS_PPB: [u32; 8] = [
    0,
    10_000_000,
    355_000_000,
    400_000_000,
    500_000_000,
    963_000_000,
    990_000_000,
    1_000_000_000,
];

const GAS: u128 = 21_000;

#[derive(Clone, Copy, Debug)]
enum Kind {
    Native,
    Legacy,
    Eip2930,
    Eip1559,
}

const KINDS: [Kind; 4] = [Kind::Native, Kind::Legacy, Kind::Eip2930, Kind::Eip1559];

fn payer() -> AccountId {
    H160::repeat_byte(0x42)
}

/// Base fee per gas the runtime derives from the multiplier stored at `at`.
async fn base_fee_at(chain: &MockChain, at: BlockHash) -> u128 {
    let multiplier = chain.next_fee_multiplier(at).await.unwrap();
    let spec_version = chain.spec_version(at).await.unwrap();
    let weight_fee = ConstantStore::for_runtime(RuntimeName::Moonbase)
        .weight_fee_at(spec_version)
        .unwrap();
    FeeEngine::default()
        .base_fee_from_multiplier(multiplier, weight_fee)
        .unwrap()
}

fn ethereum_transaction(kind: Kind, base_fee: u128, tip: u128) -> Option<EthereumTransaction> {
    match kind {
        Kind::Native => None,
        Kind::Legacy => Some(EthereumTransaction::Legacy {
            gas_price: base_fee + tip,
        }),
        Kind::Eip2930 => Some(EthereumTransaction::Eip2930 {
            gas_price: base_fee + tip,
        }),
        // With the max fee at the priority fee the cap and the
        // `priority - base` rule agree on the tip.
        Kind::Eip1559 => Some(EthereumTransaction::Eip1559 {
            max_fee_per_gas: base_fee + tip,
            max_priority_fee_per_gas: base_fee + tip,
        }),
    }
}

/// Produces one block holding a single transaction of `kind` and returns the
/// fee including tip and the tip, computed without the auditor.
async fn produce_one(chain: &MockChain, kind: Kind, tip: u128) -> (Balance, Balance) {
    let parent = chain.hash_of(chain.best_number()).unwrap();
    let base_fee = base_fee_at(chain, parent).await;
    let Some(transaction) = ethereum_transaction(kind, base_fee, tip) else {
        let number = chain.produce_block(vec![TxSpec::transfer_with_tip(payer(), 0, tip)]);
        let block = chain.block(chain.hash_of(number).unwrap()).await.unwrap();
        let quote = chain
            .query_fee_info(&block.extrinsics[1], parent)
            .await
            .unwrap();
        return (quote.partial_fee + tip, tip);
    };
    chain.produce_block(vec![TxSpec::ethereum(payer(), transaction, 0)]);

    let base_paid = GAS * base_fee;
    let tip_paid = match transaction {
        EthereumTransaction::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            eip1559_tip_paid(max_fee_per_gas, max_priority_fee_per_gas, base_fee, GAS, base_paid)
                .unwrap()
        }
        EthereumTransaction::Legacy { gas_price } | EthereumTransaction::Eip2930 { gas_price } => {
            GAS * (gas_price - base_fee)
        }
    };
    (base_paid + tip_paid, tip_paid)
}

async fn audit_proportion(treasury_ppb: u32, tip: u128) {
    let split = FeeSplit::TreasuryFloor { treasury_ppb };
    let chain = MockChain::dev()
        .with_split(split)
        .with_account(payer(), 1_000 * UNIT);
    let config = AuditConfig {
        split,
        ..AuditConfig::default()
    };

    for kind in KINDS {
        let treasury_before = chain.free_balance(TREASURY_ACCOUNT);
        let (fee_with_tip, tip_paid) = produce_one(&chain, kind, tip).await;
        let treasury_gain = chain.free_balance(TREASURY_ACCOUNT) - treasury_before;
        let context = format!("{kind:?} at {treasury_ppb} ppb, tip {tip}");

        assert_eq!(
            treasury_gain,
            calc_treasury_increase(fee_with_tip, tip_paid, split),
            "{context}"
        );
        match treasury_ppb {
            0 => assert_eq!(treasury_gain, 0, "{context}"),
            1_000_000_000 => assert_eq!(treasury_gain, fee_with_tip, "{context}"),
            _ => assert!(treasury_gain > 0 && treasury_gain < fee_with_tip, "{context}"),
        }

        let number = chain.best_number();
        let report = verify_block_fees(&chain, &config, number, number, 0)
            .await
            .unwrap_or_else(|err| panic!("{context}: {err}"));
        let fees = &report.blocks[0].extrinsics;
        assert_eq!(fees.len(), 1, "{context}");
        let expected_path = match kind {
            Kind::Native => FeePath::Native,
            _ => FeePath::Evm,
        };
        assert_eq!(fees[0].path, expected_path, "{context}");
        assert_eq!(fees[0].tx_fees, fee_with_tip, "{context}");
        assert_eq!(fees[0].tx_fees - fees[0].tx_burnt, treasury_gain, "{context}");
    }
}

#[tokio::test]
async fn every_proportion_without_tip() {
    for treasury_ppb in PROPORTIONS_PPB {
        audit_proportion(treasury_ppb, 0).await;
    }
}

#[tokio::test]
async fn every_proportion_with_tip() {
    for treasury_ppb in PROPORTIONS_PPB {
        audit_proportion(treasury_ppb, GWEI + 7).await;
    }
}
