//! Fee recomputation for EVM and native extrinsics, and the running totals
//! over blocks and ranges.
//!
//! Every fee component (base fee, tip, partial fee) is split on its own and
//! the burnt parts are summed afterwards. Splitting the sum instead gives a
//! different result whenever both components round down, and the runtime
//! splits per component.

use serde::Serialize;
use sp_core::U256;

use crate::constants::{EXTRINSIC_BASE_WEIGHT, FEE_MULTIPLIER_DENOMINATOR, WEIGHT_PER_GAS};
use crate::error::{AuditError, AuditResult};
use crate::portions::{calculate_fee_portions, FeeSplit};
use crate::types::{AccountId, Balance, BlockHash, BlockNumber, EthereumTransaction, Weight};

/// Fees charged for one extrinsic and the part of them that is burnt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub fees: Balance,
    pub burnt: Balance,
}

impl FeeBreakdown {
    /// Share of `fees` expected to land in the treasury.
    pub fn treasury(&self) -> Balance {
        self.fees - self.burnt
    }

    fn add_component(&mut self, amount: Balance, split: FeeSplit) -> AuditResult<()> {
        let portions = calculate_fee_portions(amount, split);
        self.fees = checked_add(self.fees, amount, "extrinsic fees")?;
        self.burnt = checked_add(self.burnt, portions.burnt, "extrinsic burnt fees")?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePath {
    Evm,
    Native,
}

/// Result for one fee-paying extrinsic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtrinsicFee {
    pub index: u32,
    pub call: String,
    pub path: FeePath,
    pub payer: AccountId,
    pub tx_fees: Balance,
    pub tx_burnt: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockFees {
    pub number: BlockNumber,
    pub hash: BlockHash,
    pub block_fees: Balance,
    pub block_burnt: Balance,
    pub extrinsics: Vec<ExtrinsicFee>,
}

impl BlockFees {
    pub fn new(number: BlockNumber, hash: BlockHash) -> Self {
        Self {
            number,
            hash,
            block_fees: 0,
            block_burnt: 0,
            extrinsics: Vec::new(),
        }
    }

    pub fn push(&mut self, fee: ExtrinsicFee) -> AuditResult<()> {
        self.block_fees = checked_add(self.block_fees, fee.tx_fees, "block fees")?;
        self.block_burnt = checked_add(self.block_burnt, fee.tx_burnt, "block burnt fees")?;
        self.extrinsics.push(fee);
        Ok(())
    }
}

/// Totals over a contiguous run of blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RangeFees {
    pub sum_block_fees: Balance,
    pub sum_block_burnt: Balance,
    pub blocks: u32,
}

impl RangeFees {
    pub fn fold(&mut self, block: &BlockFees) -> AuditResult<()> {
        self.sum_block_fees = checked_add(self.sum_block_fees, block.block_fees, "range fees")?;
        self.sum_block_burnt =
            checked_add(self.sum_block_burnt, block.block_burnt, "range burnt fees")?;
        self.blocks += 1;
        Ok(())
    }

    /// Joins the totals of two adjacent sub-ranges.
    pub fn merge(self, other: RangeFees) -> AuditResult<RangeFees> {
        Ok(RangeFees {
            sum_block_fees: checked_add(self.sum_block_fees, other.sum_block_fees, "range fees")?,
            sum_block_burnt: checked_add(
                self.sum_block_burnt,
                other.sum_block_burnt,
                "range burnt fees",
            )?,
            blocks: self.blocks + other.blocks,
        })
    }
}

fn checked_add(a: Balance, b: Balance, what: &'static str) -> AuditResult<Balance> {
    a.checked_add(b).ok_or(AuditError::Overflow(what))
}

fn checked_mul(a: Balance, b: Balance, what: &'static str) -> AuditResult<Balance> {
    a.checked_mul(b).ok_or(AuditError::Overflow(what))
}

fn u256_to_balance(value: U256, what: &'static str) -> AuditResult<Balance> {
    if value > U256::from(u128::MAX) {
        return Err(AuditError::Overflow(what));
    }
    Ok(value.low_u128())
}

/// `max(0, signal - base_fee_per_gas)`.
pub fn effective_tip_per_gas(signal: u128, base_fee_per_gas: u128) -> u128 {
    signal.saturating_sub(base_fee_per_gas)
}

pub fn gas_used(weight: Weight, weight_per_gas: u64) -> u128 {
    (weight.ref_time / weight_per_gas.max(1)) as u128
}

/// Fees of an Ethereum transaction that used `gas_used` gas.
pub fn evm_fee(
    gas_used: u128,
    base_fee_per_gas: u128,
    transaction: &EthereumTransaction,
    split: FeeSplit,
) -> AuditResult<FeeBreakdown> {
    let tip_per_gas = effective_tip_per_gas(transaction.priority_fee_signal(), base_fee_per_gas);
    let base_fees_paid = checked_mul(gas_used, base_fee_per_gas, "evm base fee")?;
    let tip_as_fees_paid = checked_mul(gas_used, tip_per_gas, "evm tip")?;

    let mut breakdown = FeeBreakdown::default();
    breakdown.add_component(base_fees_paid, split)?;
    breakdown.add_component(tip_as_fees_paid, split)?;
    Ok(breakdown)
}

/// Fees of a signed native extrinsic: quoted partial fee plus tip.
pub fn native_fee(
    partial_fee: Balance,
    tip: Balance,
    split: FeeSplit,
) -> AuditResult<FeeBreakdown> {
    let mut breakdown = FeeBreakdown::default();
    breakdown.add_component(partial_fee, split)?;
    breakdown.add_component(tip, split)?;
    Ok(breakdown)
}

/// `unadjusted * multiplier / 10^18`, computed in 256 bits.
pub fn adjusted_weight_fee(unadjusted: Balance, multiplier: u128) -> AuditResult<Balance> {
    let value = U256::from(unadjusted) * U256::from(multiplier)
        / U256::from(FEE_MULTIPLIER_DENOMINATOR);
    u256_to_balance(value, "adjusted weight fee")
}

/// `length_fee + adjusted weight fee + base_fee`, the partial fee the
/// runtime should have charged.
pub fn expected_partial_fee(
    length_fee: Balance,
    unadjusted_weight_fee: Balance,
    multiplier: u128,
    base_fee: Balance,
) -> AuditResult<Balance> {
    let weight_fee = adjusted_weight_fee(unadjusted_weight_fee, multiplier)?;
    let sum = checked_add(length_fee, weight_fee, "partial fee")?;
    checked_add(sum, base_fee, "partial fee")
}

/// Base fee per gas implied by the fee multiplier:
/// `multiplier * (weight_fee * weight_per_gas) / 10^18`.
pub fn base_fee_from_multiplier(
    multiplier: u128,
    weight_fee: Balance,
    weight_per_gas: u64,
) -> AuditResult<Balance> {
    let per_gas = U256::from(weight_fee) * U256::from(weight_per_gas);
    let value = U256::from(multiplier) * per_gas / U256::from(FEE_MULTIPLIER_DENOMINATOR);
    u256_to_balance(value, "base fee from multiplier")
}

/// Tip an EIP-1559 transaction ends up paying to the block author.
///
/// Returns zero when `already_paid` does not even cover the base fee.
pub fn eip1559_tip_paid(
    max_fee_per_gas: u128,
    max_priority_fee_per_gas: u128,
    base_fee: u128,
    gas_used: u128,
    already_paid: Balance,
) -> AuditResult<Balance> {
    let priority = max_fee_per_gas
        .saturating_sub(base_fee)
        .min(max_priority_fee_per_gas);
    let per_gas = checked_add(base_fee, priority, "eip1559 fee per gas")?;
    let actual_fee = checked_mul(gas_used, per_gas, "eip1559 actual fee")?;
    let actual_base_fee = checked_mul(gas_used, base_fee, "eip1559 base fee")?;
    if already_paid < actual_base_fee {
        return Ok(0);
    }
    Ok(actual_fee - actual_base_fee)
}

/// Fee arithmetic parameterised by the audit configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeEngine {
    pub split: FeeSplit,
    pub weight_per_gas: u64,
    pub extrinsic_base_weight: u64,
}

impl Default for FeeEngine {
    fn default() -> Self {
        Self {
            split: FeeSplit::default(),
            weight_per_gas: WEIGHT_PER_GAS,
            extrinsic_base_weight: EXTRINSIC_BASE_WEIGHT,
        }
    }
}

impl FeeEngine {
    pub fn new(split: FeeSplit, weight_per_gas: u64, extrinsic_base_weight: u64) -> Self {
        Self {
            split,
            weight_per_gas,
            extrinsic_base_weight,
        }
    }

    pub fn evm(
        &self,
        dispatch_weight: Weight,
        base_fee_per_gas: u128,
        transaction: &EthereumTransaction,
    ) -> AuditResult<FeeBreakdown> {
        let gas = gas_used(dispatch_weight, self.weight_per_gas);
        evm_fee(gas, base_fee_per_gas, transaction, self.split)
    }

    pub fn base_fee_from_multiplier(
        &self,
        multiplier: u128,
        weight_fee: Balance,
    ) -> AuditResult<Balance> {
        base_fee_from_multiplier(multiplier, weight_fee, self.weight_per_gas)
    }

    /// Tip an EIP-1559 sender would pay with the priority fee capped by
    /// `max_fee_per_gas`, given the gas its dispatch weight implies.
    pub fn eip1559_tip_paid(
        &self,
        dispatch_weight: Weight,
        base_fee_per_gas: u128,
        transaction: &EthereumTransaction,
        already_paid: Balance,
    ) -> AuditResult<Option<Balance>> {
        let EthereumTransaction::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } = *transaction
        else {
            return Ok(None);
        };
        let gas = gas_used(dispatch_weight, self.weight_per_gas);
        eip1559_tip_paid(
            max_fee_per_gas,
            max_priority_fee_per_gas,
            base_fee_per_gas,
            gas,
            already_paid,
        )
        .map(Some)
    }

    pub fn native(&self, partial_fee: Balance, tip: Balance) -> AuditResult<FeeBreakdown> {
        native_fee(partial_fee, tip, self.split)
    }

    pub fn extrinsic_base_weight(&self) -> Weight {
        Weight::from_ref_time(self.extrinsic_base_weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp_arithmetic::Perbill;

    const GWEI: u128 = 1_000_000_000;

    #[test]
    fn eip1559_transfer_at_one_gwei() {
        let tx = EthereumTransaction::Eip1559 {
            max_fee_per_gas: 10 * GWEI,
            max_priority_fee_per_gas: GWEI,
        };
        let breakdown = evm_fee(21_000, GWEI, &tx, FeeSplit::default()).unwrap();
        assert_eq!(breakdown.fees, 21_000_000_000_000);
        assert_eq!(breakdown.burnt, 16_800_000_000_000);
        assert_eq!(breakdown.treasury(), 4_200_000_000_000);
    }

    #[test]
    fn tip_clamps_to_zero_below_base_fee() {
        assert_eq!(effective_tip_per_gas(5, 10), 0);
        assert_eq!(effective_tip_per_gas(15, 10), 5);
        let tx = EthereumTransaction::Legacy { gas_price: 3 };
        let breakdown = evm_fee(100, 10, &tx, FeeSplit::default()).unwrap();
        assert_eq!(breakdown.fees, 1_000);
    }

    #[test]
    fn legacy_gas_price_above_base_adds_tip() {
        let tx = EthereumTransaction::Legacy { gas_price: 13 };
        // base 10 * 7 = 70 -> burnt 56, tip 3 * 7 = 21 -> burnt 16
        let breakdown = evm_fee(7, 10, &tx, FeeSplit::default()).unwrap();
        assert_eq!(breakdown.fees, 91);
        assert_eq!(breakdown.burnt, 72);
    }

    #[test]
    fn components_are_split_independently() {
        // floor(0.8 * 7) + floor(0.8 * 7) = 10, floor(0.8 * 14) = 11
        let breakdown = native_fee(7, 7, FeeSplit::default()).unwrap();
        assert_eq!(breakdown.fees, 14);
        assert_eq!(breakdown.burnt, 10);
        assert_eq!(calculate_fee_portions(14, FeeSplit::default()).burnt, 11);
    }

    #[test]
    fn gas_used_is_floored() {
        let engine = FeeEngine::default();
        let weight = Weight::from_ref_time(21_000 * 25_000 + 24_999);
        assert_eq!(gas_used(weight, engine.weight_per_gas), 21_000);
    }

    #[test]
    fn partial_fee_composition() {
        let fee = expected_partial_fee(100, 1_000, 2 * FEE_MULTIPLIER_DENOMINATOR, 50).unwrap();
        assert_eq!(fee, 2_150);
        let floored = adjusted_weight_fee(3, FEE_MULTIPLIER_DENOMINATOR / 2).unwrap();
        assert_eq!(floored, 1);
    }

    #[test]
    fn adjusted_weight_fee_does_not_overflow_in_intermediate() {
        let fee = adjusted_weight_fee(u128::MAX, FEE_MULTIPLIER_DENOMINATOR).unwrap();
        assert_eq!(fee, u128::MAX);
        assert!(matches!(
            adjusted_weight_fee(u128::MAX, 2 * FEE_MULTIPLIER_DENOMINATOR),
            Err(AuditError::Overflow(_))
        ));
    }

    #[test]
    fn base_fee_at_unit_multiplier_is_weight_fee_per_gas() {
        let fee =
            base_fee_from_multiplier(FEE_MULTIPLIER_DENOMINATOR, 50_000, WEIGHT_PER_GAS).unwrap();
        assert_eq!(fee, 1_250_000_000);
        let eight_times =
            base_fee_from_multiplier(8 * FEE_MULTIPLIER_DENOMINATOR, 50_000, WEIGHT_PER_GAS)
                .unwrap();
        assert_eq!(eight_times, 10_000_000_000);
    }

    #[test]
    fn engine_base_fee_uses_configured_weight_per_gas() {
        let engine = FeeEngine::new(FeeSplit::default(), 50_000, EXTRINSIC_BASE_WEIGHT);
        let fee = engine
            .base_fee_from_multiplier(FEE_MULTIPLIER_DENOMINATOR, 50_000)
            .unwrap();
        assert_eq!(fee, 2_500_000_000);
        assert_eq!(
            FeeEngine::default()
                .base_fee_from_multiplier(FEE_MULTIPLIER_DENOMINATOR, 50_000)
                .unwrap(),
            1_250_000_000
        );
    }

    #[test]
    fn engine_eip1559_tip_only_for_dynamic_fee_transactions() {
        let engine = FeeEngine::default();
        let weight = Weight::from_ref_time(100 * WEIGHT_PER_GAS);
        let dynamic = EthereumTransaction::Eip1559 {
            max_fee_per_gas: 12,
            max_priority_fee_per_gas: 5,
        };
        assert_eq!(engine.eip1559_tip_paid(weight, 10, &dynamic, 1_200).unwrap(), Some(200));
        let legacy = EthereumTransaction::Legacy { gas_price: 12 };
        assert_eq!(engine.eip1559_tip_paid(weight, 10, &legacy, 1_200).unwrap(), None);
    }

    #[test]
    fn eip1559_tip_paid_respects_max_fee() {
        // priority capped by max_fee - base_fee = 2
        let tip = eip1559_tip_paid(12, 5, 10, 100, 1_200).unwrap();
        assert_eq!(tip, 200);
        let uncapped = eip1559_tip_paid(100, 5, 10, 100, 1_500).unwrap();
        assert_eq!(uncapped, 500);
        assert_eq!(eip1559_tip_paid(100, 5, 10, 100, 999).unwrap(), 0);
    }

    #[test]
    fn range_fold_and_merge_agree() {
        let mut first = BlockFees::new(1, BlockHash::zero());
        first
            .push(ExtrinsicFee {
                index: 1,
                call: "balances.transfer".into(),
                path: FeePath::Native,
                payer: AccountId::zero(),
                tx_fees: 10,
                tx_burnt: 8,
            })
            .unwrap();
        let mut second = BlockFees::new(2, BlockHash::zero());
        second
            .push(ExtrinsicFee {
                index: 0,
                call: "ethereum.transact".into(),
                path: FeePath::Evm,
                payer: AccountId::zero(),
                tx_fees: 5,
                tx_burnt: 4,
            })
            .unwrap();

        let mut whole = RangeFees::default();
        whole.fold(&first).unwrap();
        whole.fold(&second).unwrap();

        let mut left = RangeFees::default();
        left.fold(&first).unwrap();
        let mut right = RangeFees::default();
        right.fold(&second).unwrap();

        assert_eq!(left.merge(right).unwrap(), whole);
        assert_eq!(whole.sum_block_burnt, 12);
    }

    #[test]
    fn treasury_floor_policy_flows_through_engine() {
        let engine = FeeEngine::new(
            FeeSplit::treasury(Perbill::from_percent(50)),
            WEIGHT_PER_GAS,
            EXTRINSIC_BASE_WEIGHT,
        );
        let breakdown = engine.native(11, 3).unwrap();
        // treasury floor(5.5) + floor(1.5) = 6, burnt = 14 - 6
        assert_eq!(breakdown.burnt, 8);
        assert_eq!(engine.extrinsic_base_weight(), Weight::from_ref_time(EXTRINSIC_BASE_WEIGHT));
    }
}
