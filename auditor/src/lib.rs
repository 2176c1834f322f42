//! Fee reconciliation auditor.
//!
//! Recomputes the fee of every extrinsic in a block range, splits it into
//! burnt and treasury portions and reconciles the totals against treasury
//! deposits, payer balances and total issuance.

pub mod audit;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod error;
pub mod explorer;
pub mod fees;
pub mod fetcher;
pub mod heights;
pub mod history;
pub mod portions;
pub mod types;
pub mod verifier;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use audit::{verify_block_fees, verify_latest_block_fees, AuditReport, GapEntry, Reconciler};
pub use classifier::{classify, map_extrinsics, ClassificationGap};
pub use config::AuditConfig;
pub use error::{AuditError, AuditResult, ClientError, ClientResult};
pub use explorer::{explore_block_range, BlockVisitor};
pub use fees::{BlockFees, FeeEngine, RangeFees};
pub use fetcher::{get_block_details, ChainClient};
pub use heights::HeightWaiters;
pub use history::{get_block_array, HistoricSearch};
pub use portions::{calculate_fee_portions, FeePortions, FeeSplit};
pub use verifier::{CheckKind, Mismatch};
