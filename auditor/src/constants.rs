//! Runtime constants, some of which change with the runtime spec version.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::types::Balance;

/// Ref-time weight charged per unit of EVM gas.
pub const WEIGHT_PER_GAS: u64 = 25_000;
/// Base weight every extrinsic pays on top of its own dispatch weight.
pub const EXTRINSIC_BASE_WEIGHT: u64 = 250_000_000;
/// Fixed-point denominator of `TransactionPayment::NextFeeMultiplier`.
pub const FEE_MULTIPLIER_DENOMINATOR: u128 = 1_000_000_000_000_000_000;

/// A value keyed by the first spec version it applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConstant<T> {
    values: BTreeMap<u32, T>,
}

impl<T: Copy> RuntimeConstant<T> {
    pub fn new(entries: impl IntoIterator<Item = (u32, T)>) -> Self {
        Self {
            values: entries.into_iter().collect(),
        }
    }

    /// Value of the greatest entry whose key is `<= spec_version`.
    pub fn get(&self, spec_version: u32) -> Option<T> {
        self.values
            .range(..=spec_version)
            .next_back()
            .map(|(_, value)| *value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeName {
    Moonbase,
    Moonriver,
    Moonbeam,
}

impl fmt::Display for RuntimeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeName::Moonbase => "moonbase",
            RuntimeName::Moonriver => "moonriver",
            RuntimeName::Moonbeam => "moonbeam",
        };
        f.write_str(name)
    }
}

impl FromStr for RuntimeName {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "moonbase" | "moonbase-alpha" => Ok(RuntimeName::Moonbase),
            "moonriver" => Ok(RuntimeName::Moonriver),
            "moonbeam" => Ok(RuntimeName::Moonbeam),
            other => Err(AuditError::InvalidConfig(format!(
                "unknown runtime `{other}`"
            ))),
        }
    }
}

/// Per-runtime fee constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantStore {
    pub runtime: RuntimeName,
    /// Native fee charged per unit of ref-time weight.
    pub weight_fee: RuntimeConstant<Balance>,
    /// Base fee per gas when the fee multiplier is at its initial value.
    pub genesis_base_fee: RuntimeConstant<Balance>,
}

impl ConstantStore {
    pub fn for_runtime(runtime: RuntimeName) -> Self {
        let (weight_fee, genesis_base_fee) = match runtime {
            RuntimeName::Moonbase | RuntimeName::Moonriver => (
                RuntimeConstant::new([(0, 50_000), (3400, 12_500)]),
                RuntimeConstant::new([(0, 10_000_000_000), (3400, 2_500_000_000)]),
            ),
            RuntimeName::Moonbeam => (
                RuntimeConstant::new([(0, 5_000_000), (3400, 1_250_000)]),
                RuntimeConstant::new([(0, 1_000_000_000_000), (3400, 250_000_000_000)]),
            ),
        };
        Self {
            runtime,
            weight_fee,
            genesis_base_fee,
        }
    }

    pub fn weight_fee_at(&self, spec_version: u32) -> Option<Balance> {
        self.weight_fee.get(spec_version)
    }

    pub fn genesis_base_fee_at(&self, spec_version: u32) -> Option<Balance> {
        self.genesis_base_fee.get(spec_version)
    }
}
