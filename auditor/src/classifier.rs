//! Groups event records by extrinsic and tells EVM from native extrinsics.

use std::fmt;

use serde::Serialize;
use tracing::trace;

use crate::types::{
    AccountId, DispatchInfo, EthereumTransaction, EventKind, EventRecord, ExtrinsicWithOutcome,
    FeeQuote, Phase, RawExtrinsic,
};

/// Pairs every extrinsic with the events emitted during its
/// `ApplyExtrinsic(index)` phase and with its fee quote.
///
/// `quotes` is positional: `quotes[i]` belongs to `extrinsics[i]`. Missing
/// trailing entries are treated as "no quote".
pub fn map_extrinsics(
    extrinsics: Vec<RawExtrinsic>,
    records: &[EventRecord],
    quotes: Vec<Option<FeeQuote>>,
) -> Vec<ExtrinsicWithOutcome> {
    let mut quotes = quotes.into_iter();
    extrinsics
        .into_iter()
        .enumerate()
        .map(|(position, extrinsic)| {
            let index = position as u32;
            let events: Vec<_> = records
                .iter()
                .filter(|record| record.phase == Phase::ApplyExtrinsic(index))
                .map(|record| record.event.clone())
                .collect();

            let mut dispatch_info = None;
            let mut dispatch_error = None;
            for event in &events {
                match &event.kind {
                    EventKind::ExtrinsicSuccess { dispatch_info: info } => {
                        dispatch_info = Some(*info);
                    }
                    EventKind::ExtrinsicFailed {
                        dispatch_error: error,
                        dispatch_info: info,
                    } => {
                        dispatch_info = Some(*info);
                        dispatch_error = Some(error.clone());
                    }
                    _ => {}
                }
            }
            trace!(
                extrinsic = index,
                call = %extrinsic.call_name(),
                events = events.len(),
                "mapped extrinsic"
            );

            ExtrinsicWithOutcome {
                extrinsic,
                events,
                dispatch_info,
                dispatch_error,
                fee_quote: quotes.next().flatten(),
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxOrigin {
    Evm {
        transaction: EthereumTransaction,
        /// Sender reported by `ethereum.Executed`, if the event was emitted.
        sender: Option<AccountId>,
    },
    Native {
        signer: Option<AccountId>,
    },
}

impl TxOrigin {
    pub fn is_evm(&self) -> bool {
        matches!(self, TxOrigin::Evm { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub origin: TxOrigin,
    pub outcome: DispatchOutcome,
    pub dispatch_info: DispatchInfo,
}

impl Classification {
    /// Signed extrinsics that pay fees, and every Ethereum transaction.
    pub fn is_fee_paying(&self) -> bool {
        match &self.origin {
            TxOrigin::Evm { .. } => true,
            TxOrigin::Native { signer } => self.dispatch_info.pays_fee && signer.is_some(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// Neither `ExtrinsicSuccess` nor `ExtrinsicFailed` was emitted.
    NoDispatchEvent,
    /// An `ethereum` extrinsic whose transaction payload could not be read.
    NoEthereumTransaction,
}

/// An extrinsic the auditor could not classify. It is left out of the
/// totals instead of being counted as zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassificationGap {
    pub index: u32,
    pub call: String,
    pub reason: GapReason,
}

impl fmt::Display for ClassificationGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            GapReason::NoDispatchEvent => "no dispatch outcome event",
            GapReason::NoEthereumTransaction => "undecodable ethereum transaction",
        };
        write!(f, "extrinsic {} ({}): {}", self.index, self.call, reason)
    }
}

pub fn classify(tx: &ExtrinsicWithOutcome) -> Result<Classification, ClassificationGap> {
    let gap = |reason| ClassificationGap {
        index: tx.extrinsic.index,
        call: tx.extrinsic.call_name(),
        reason,
    };

    let dispatch_info = tx.dispatch_info.ok_or_else(|| gap(GapReason::NoDispatchEvent))?;
    let outcome = match &tx.dispatch_error {
        Some(error) => DispatchOutcome::Failed {
            error: error.clone(),
        },
        None => DispatchOutcome::Success,
    };

    let origin = if tx.extrinsic.is_ethereum() {
        let transaction = tx
            .extrinsic
            .ethereum
            .ok_or_else(|| gap(GapReason::NoEthereumTransaction))?;
        let sender = tx.find_event(|kind| match kind {
            EventKind::EthereumExecuted { from } => Some(*from),
            _ => None,
        });
        TxOrigin::Evm {
            transaction,
            sender,
        }
    } else {
        TxOrigin::Native {
            signer: tx.extrinsic.signer,
        }
    };

    Ok(Classification {
        origin,
        outcome,
        dispatch_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DispatchClass, Event, Weight, H160};

    fn extrinsic(index: u32, section: &str, signer: Option<AccountId>) -> RawExtrinsic {
        RawExtrinsic {
            index,
            section: section.into(),
            method: "call".into(),
            signer,
            tip: 0,
            encoded: vec![0u8; 10],
            args: Vec::new(),
            ethereum: None,
        }
    }

    fn info(pays_fee: bool) -> DispatchInfo {
        DispatchInfo {
            weight: Weight::from_ref_time(1_000),
            class: DispatchClass::Normal,
            pays_fee,
        }
    }

    fn record(index: u32, kind: EventKind) -> EventRecord {
        EventRecord {
            phase: Phase::ApplyExtrinsic(index),
            event: Event::new("system", "Event", kind),
        }
    }

    #[test]
    fn events_are_grouped_by_phase() {
        let records = vec![
            record(0, EventKind::ExtrinsicSuccess { dispatch_info: info(false) }),
            EventRecord {
                phase: Phase::Finalization,
                event: Event::new("system", "Other", EventKind::Other),
            },
            record(
                1,
                EventKind::ExtrinsicFailed {
                    dispatch_error: "BadOrigin".into(),
                    dispatch_info: info(true),
                },
            ),
            record(1, EventKind::TreasuryDeposit { value: 5 }),
        ];
        let mapped = map_extrinsics(
            vec![extrinsic(0, "timestamp", None), extrinsic(1, "balances", None)],
            &records,
            vec![None],
        );
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].events.len(), 1);
        assert_eq!(mapped[1].events.len(), 2);
        assert_eq!(mapped[1].dispatch_error.as_deref(), Some("BadOrigin"));
        assert!(mapped[1].fee_quote.is_none());
    }

    #[test]
    fn missing_outcome_is_a_gap() {
        let mapped = map_extrinsics(vec![extrinsic(0, "balances", None)], &[], Vec::new());
        let gap = classify(&mapped[0]).unwrap_err();
        assert_eq!(gap.reason, GapReason::NoDispatchEvent);
        assert_eq!(gap.call, "balances.call");
    }

    #[test]
    fn ethereum_section_is_evm_and_always_pays() {
        let sender = H160::repeat_byte(0xaa);
        let mut tx = extrinsic(0, "ethereum", None);
        tx.ethereum = Some(EthereumTransaction::Legacy { gas_price: 1 });
        let records = vec![
            record(0, EventKind::EthereumExecuted { from: sender }),
            record(0, EventKind::ExtrinsicSuccess { dispatch_info: info(false) }),
        ];
        let mapped = map_extrinsics(vec![tx], &records, Vec::new());
        let classification = classify(&mapped[0]).unwrap();
        assert!(classification.origin.is_evm());
        assert!(classification.is_fee_paying());
        assert_eq!(
            classification.origin,
            TxOrigin::Evm {
                transaction: EthereumTransaction::Legacy { gas_price: 1 },
                sender: Some(sender),
            }
        );
    }

    #[test]
    fn unsigned_native_does_not_pay() {
        let records = vec![record(0, EventKind::ExtrinsicSuccess { dispatch_info: info(true) })];
        let mapped = map_extrinsics(vec![extrinsic(0, "timestamp", None)], &records, Vec::new());
        assert!(!classify(&mapped[0]).unwrap().is_fee_paying());

        let signer = Some(H160::repeat_byte(1));
        let mapped = map_extrinsics(vec![extrinsic(0, "balances", signer)], &records, Vec::new());
        let classification = classify(&mapped[0]).unwrap();
        assert!(classification.is_fee_paying());
        assert_eq!(classification.outcome, DispatchOutcome::Success);
    }
}
