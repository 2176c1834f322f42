use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{EXTRINSIC_BASE_WEIGHT, WEIGHT_PER_GAS};
use crate::error::{AuditError, AuditResult};
use crate::fees::FeeEngine;
use crate::history::HistoricSearch;
use crate::portions::FeeSplit;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Blocks fetched concurrently per batch.
    pub concurrency: usize,
    pub split: FeeSplit,
    pub weight_per_gas: u64,
    pub extrinsic_base_weight: u64,
    /// Call sections whose treasury deposits are not checked.
    pub deposit_check_exclusions: Vec<String>,
    /// Assumed block time used to size historic search steps.
    pub historic_step_ms: u64,
    pub max_historic_steps: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            split: FeeSplit::default(),
            weight_per_gas: WEIGHT_PER_GAS,
            extrinsic_base_weight: EXTRINSIC_BASE_WEIGHT,
            deposit_check_exclusions: vec!["sudo".to_string()],
            historic_step_ms: 30_000,
            max_historic_steps: 64,
        }
    }
}

impl AuditConfig {
    pub fn load(path: impl AsRef<Path>) -> AuditResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AuditResult<()> {
        if self.concurrency == 0 {
            return Err(AuditError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        if !self.split.is_valid() {
            return Err(AuditError::InvalidConfig(format!(
                "split ratio {} exceeds one billion parts",
                self.split.parts()
            )));
        }
        if self.weight_per_gas == 0 {
            return Err(AuditError::InvalidConfig(
                "weight_per_gas must be non-zero".into(),
            ));
        }
        if self.historic_step_ms == 0 || self.max_historic_steps == 0 {
            return Err(AuditError::InvalidConfig(
                "historic search needs a non-zero step and step budget".into(),
            ));
        }
        Ok(())
    }

    pub fn fee_engine(&self) -> FeeEngine {
        FeeEngine::new(self.split, self.weight_per_gas, self.extrinsic_base_weight)
    }

    pub fn historic_search(&self) -> HistoricSearch {
        HistoricSearch {
            step_ms: self.historic_step_ms,
            max_steps: self.max_historic_steps,
        }
    }

    pub fn is_deposit_check_excluded(&self, section: &str) -> bool {
        self.deposit_check_exclusions
            .iter()
            .any(|excluded| excluded == section)
    }
}
