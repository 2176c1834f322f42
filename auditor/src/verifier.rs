//! Cross-checks between recomputed fees and what the chain recorded.
//!
//! Every check returns a [`VerificationOutcome`]; a failure carries enough
//! context to locate the offending extrinsic without re-running the audit.

use std::fmt;

use serde::Serialize;

use crate::types::{Balance, BlockNumber, EventKind, ExtrinsicWithOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// `tx_fees - tx_burnt` against the extrinsic's `treasury.Deposit` events.
    TreasuryDeposit,
    /// Payer's free balance delta against `tx_fees`.
    PayerBalance,
    /// Recomputed partial fee against `TransactionFeePaid`.
    FeePaidEvent,
    /// Recomputed partial fee against the node's `query_info` quote.
    FeeQuote,
    /// Total issuance drop over the range against the summed burnt fees.
    TotalIssuance,
}

impl CheckKind {
    fn title(&self) -> &'static str {
        match self {
            CheckKind::TreasuryDeposit => "Deposit Amount Discrepancy!",
            CheckKind::PayerBalance => "Payer Balance Discrepancy!",
            CheckKind::FeePaidEvent => "Fee Paid Event Discrepancy!",
            CheckKind::FeeQuote => "Fee Quote Discrepancy!",
            CheckKind::TotalIssuance => "Total Issuance Discrepancy!",
        }
    }

    fn labels(&self) -> (&'static str, &'static str) {
        match self {
            CheckKind::TreasuryDeposit => ("fees not burnt", "all deposits"),
            CheckKind::PayerBalance => ("tx fees", "balance spent"),
            CheckKind::FeePaidEvent => ("expected partial fee", "fee paid event"),
            CheckKind::FeeQuote => ("expected partial fee", "rpc quoted fee"),
            CheckKind::TotalIssuance => ("burnt fees", "supply diff"),
        }
    }
}

/// Identity and rendering of the extrinsic a mismatch was found in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtrinsicContext {
    pub index: u32,
    pub call: String,
    pub args: Vec<String>,
    pub events: Vec<String>,
}

impl ExtrinsicContext {
    pub fn of(tx: &ExtrinsicWithOutcome) -> Self {
        Self {
            index: tx.extrinsic.index,
            call: tx.extrinsic.call_name(),
            args: tx.extrinsic.args.clone(),
            events: tx.events.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub check: CheckKind,
    /// Block the extrinsic lives in, or the last block of the range for
    /// [`CheckKind::TotalIssuance`].
    pub block: BlockNumber,
    pub extrinsic: Option<ExtrinsicContext>,
    pub expected: Balance,
    pub actual: Balance,
    pub note: Option<String>,
}

impl Mismatch {
    fn new(check: CheckKind, block: BlockNumber, expected: Balance, actual: Balance) -> Self {
        Self {
            check,
            block,
            extrinsic: None,
            expected,
            actual,
            note: None,
        }
    }

    fn with_extrinsic(mut self, tx: &ExtrinsicWithOutcome) -> Self {
        self.extrinsic = Some(ExtrinsicContext::of(tx));
        self
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.check.title())?;
        writeln!(f, "    Block: #{}", self.block)?;
        if let Some(extrinsic) = &self.extrinsic {
            writeln!(f, "Extrinsic: {} (index {})", extrinsic.call, extrinsic.index)?;
            writeln!(f, "     Args: ")?;
            for arg in &extrinsic.args {
                writeln!(f, "          - {arg}")?;
            }
            writeln!(f, "   Events: ")?;
            for event in &extrinsic.events {
                writeln!(f, "          - {event}")?;
            }
        }
        if let Some(note) = &self.note {
            writeln!(f, "     Note: {note}")?;
        }
        let (expected_label, actual_label) = self.check.labels();
        writeln!(f, "{expected_label:>21} : {:>30}", self.expected)?;
        write!(f, "{actual_label:>21} : {:>30}", self.actual)
    }
}

pub type VerificationOutcome = Result<(), Mismatch>;

/// Sum of the `treasury.Deposit` events emitted by `tx`.
pub fn treasury_deposits(tx: &ExtrinsicWithOutcome) -> Balance {
    tx.events
        .iter()
        .filter_map(|event| match event.kind {
            EventKind::TreasuryDeposit { value } => Some(value),
            _ => None,
        })
        .fold(0, Balance::saturating_add)
}

/// The treasury must have received exactly the unburnt part of the fees.
pub fn check_treasury_deposit(
    block: BlockNumber,
    tx: &ExtrinsicWithOutcome,
    tx_fees: Balance,
    tx_burnt: Balance,
) -> VerificationOutcome {
    let expected = tx_fees.saturating_sub(tx_burnt);
    let deposits = treasury_deposits(tx);
    if expected == deposits {
        return Ok(());
    }
    Err(Mismatch::new(CheckKind::TreasuryDeposit, block, expected, deposits).with_extrinsic(tx))
}

/// `before - after - expected_balance_diff` must equal `tx_fees`.
pub fn check_payer_balance(
    block: BlockNumber,
    tx: &ExtrinsicWithOutcome,
    tx_fees: Balance,
    before: Balance,
    after: Balance,
    expected_balance_diff: Balance,
) -> VerificationOutcome {
    let spent = before
        .checked_sub(after)
        .and_then(|spent| spent.checked_sub(expected_balance_diff));
    match spent {
        Some(spent) if spent == tx_fees => Ok(()),
        Some(spent) => {
            Err(Mismatch::new(CheckKind::PayerBalance, block, tx_fees, spent).with_extrinsic(tx))
        }
        None => Err(Mismatch::new(CheckKind::PayerBalance, block, tx_fees, 0)
            .with_extrinsic(tx)
            .with_note(format!(
                "free balance went from {before} to {after}, less than the expected difference {expected_balance_diff}"
            ))),
    }
}

/// Recomputed partial fee against a value the node reported.
pub fn check_partial_fee(
    check: CheckKind,
    block: BlockNumber,
    tx: &ExtrinsicWithOutcome,
    expected: Balance,
    reported: Balance,
) -> VerificationOutcome {
    if expected == reported {
        return Ok(());
    }
    Err(Mismatch::new(check, block, expected, reported).with_extrinsic(tx))
}

/// Issuance before the range minus issuance at its end equals the burnt fees.
pub fn check_issuance(
    to: BlockNumber,
    issuance_before: Balance,
    issuance_after: Balance,
    sum_block_burnt: Balance,
) -> VerificationOutcome {
    match issuance_before.checked_sub(issuance_after) {
        Some(decrease) if decrease == sum_block_burnt => Ok(()),
        Some(decrease) => Err(Mismatch::new(
            CheckKind::TotalIssuance,
            to,
            sum_block_burnt,
            decrease,
        )),
        None => Err(
            Mismatch::new(CheckKind::TotalIssuance, to, sum_block_burnt, 0).with_note(format!(
                "total issuance grew by {}",
                issuance_after - issuance_before
            )),
        ),
    }
}
