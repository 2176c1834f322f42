//! Burnt / treasury split of collected fees.
//!
//! Runtimes compute one side with a floored `Perbill` multiplication and give
//! the remainder to the other side. Which side is floored depends on the
//! runtime generation, so the rule is part of [`FeeSplit`].

use serde::{Deserialize, Serialize};
use sp_arithmetic::{PerThing, Perbill};

use crate::types::Balance;

/// How a fee amount is divided between burning and the treasury.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FeeSplit {
    /// `burnt = floor(amount * burn)`, treasury takes the remainder.
    BurnFloor { burn_ppb: u32 },
    /// `treasury = floor(amount * treasury)`, the remainder is burnt.
    TreasuryFloor { treasury_ppb: u32 },
}

impl Default for FeeSplit {
    fn default() -> Self {
        Self::burn(Perbill::from_percent(80))
    }
}

impl FeeSplit {
    pub fn burn(ratio: Perbill) -> Self {
        Self::BurnFloor {
            burn_ppb: ratio.deconstruct(),
        }
    }

    pub fn treasury(ratio: Perbill) -> Self {
        Self::TreasuryFloor {
            treasury_ppb: ratio.deconstruct(),
        }
    }

    /// Raw parts per billion carried by the rule.
    pub fn parts(&self) -> u32 {
        match self {
            FeeSplit::BurnFloor { burn_ppb } => *burn_ppb,
            FeeSplit::TreasuryFloor { treasury_ppb } => *treasury_ppb,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.parts() <= Perbill::ACCURACY
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePortions {
    pub burnt: Balance,
    pub treasury: Balance,
}

impl FeePortions {
    pub fn total(&self) -> Balance {
        self.burnt + self.treasury
    }
}

/// Splits `amount` according to `split`. `burnt + treasury == amount` always.
pub fn calculate_fee_portions(amount: Balance, split: FeeSplit) -> FeePortions {
    match split {
        FeeSplit::BurnFloor { burn_ppb } => {
            let burnt = Perbill::from_parts(burn_ppb).mul_floor(amount);
            FeePortions {
                burnt,
                treasury: amount - burnt,
            }
        }
        FeeSplit::TreasuryFloor { treasury_ppb } => {
            let treasury = Perbill::from_parts(treasury_ppb).mul_floor(amount);
            FeePortions {
                burnt: amount - treasury,
                treasury,
            }
        }
    }
}

/// Expected drop in total issuance for a fee that includes `tip`.
///
/// The fee without tip and the tip are split separately, so the result can
/// differ by one from splitting `fee_with_tip` in one go.
pub fn calc_issuance_decrease(fee_with_tip: Balance, tip: Balance, split: FeeSplit) -> Balance {
    let tip = tip.min(fee_with_tip);
    let fee_without_tip = fee_with_tip - tip;
    calculate_fee_portions(fee_without_tip, split).burnt + calculate_fee_portions(tip, split).burnt
}

/// Expected treasury increase for a fee that includes `tip`.
pub fn calc_treasury_increase(fee_with_tip: Balance, tip: Balance, split: FeeSplit) -> Balance {
    fee_with_tip - calc_issuance_decrease(fee_with_tip, tip, split)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_burns_eighty_percent() {
        let portions = calculate_fee_portions(1_000, FeeSplit::default());
        assert_eq!(portions.burnt, 800);
        assert_eq!(portions.treasury, 200);
    }

    #[test]
    fn burn_floor_rounds_burnt_down() {
        let portions = calculate_fee_portions(7, FeeSplit::default());
        // 7 * 0.8 = 5.6
        assert_eq!(portions.burnt, 5);
        assert_eq!(portions.treasury, 2);
    }

    #[test]
    fn treasury_floor_rounds_treasury_down() {
        let split = FeeSplit::treasury(Perbill::from_rational(355u32, 1000u32));
        let portions = calculate_fee_portions(111_112, split);
        // 111_112 * 0.355 = 39_444.76
        assert_eq!(portions.treasury, 39_444);
        assert_eq!(portions.burnt, 71_668);
    }

    #[test]
    fn extreme_ratios() {
        let all_burnt = calculate_fee_portions(u128::MAX, FeeSplit::burn(Perbill::one()));
        assert_eq!(all_burnt.burnt, u128::MAX);
        assert_eq!(all_burnt.treasury, 0);

        let all_treasury = calculate_fee_portions(42, FeeSplit::treasury(Perbill::one()));
        assert_eq!(all_treasury.treasury, 42);
        assert_eq!(all_treasury.burnt, 0);
    }

    #[test]
    fn issuance_and_treasury_deltas_cover_the_fee() {
        let split = FeeSplit::treasury(Perbill::from_rational(963u32, 1000u32));
        let fee = 21_000_000_000_128;
        let tip = 128;
        let decrease = calc_issuance_decrease(fee, tip, split);
        let increase = calc_treasury_increase(fee, tip, split);
        assert_eq!(decrease + increase, fee);
    }

    #[test]
    fn tip_larger_than_fee_is_clamped() {
        let split = FeeSplit::default();
        assert_eq!(calc_issuance_decrease(5, 10, split), 4);
        assert_eq!(calc_treasury_increase(5, 10, split), 1);
        assert_eq!(calc_issuance_decrease(5, 10, split), calc_issuance_decrease(5, 5, split));
    }

    #[test]
    fn split_serializes_with_rule_tag() {
        let json = serde_json::to_string(&FeeSplit::default()).unwrap();
        assert_eq!(json, r#"{"rule":"burn_floor","burn_ppb":800000000}"#);
        let back: FeeSplit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FeeSplit::default());
    }

    #[test]
    fn out_of_range_parts_are_invalid() {
        assert!(!FeeSplit::BurnFloor {
            burn_ppb: Perbill::ACCURACY + 1
        }
        .is_valid());
    }
}
