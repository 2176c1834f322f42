//! Range audit: recompute every fee in a block range and reconcile the
//! totals against the chain.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{classify, Classification, ClassificationGap, TxOrigin};
use crate::config::AuditConfig;
use crate::error::{AuditError, AuditResult, ClientError};
use crate::explorer::{explore_block_range, BlockVisitor};
use crate::fees::{
    expected_partial_fee, BlockFees, ExtrinsicFee, FeeBreakdown, FeeEngine, FeePath, RangeFees,
};
use crate::fetcher::{block_hash_of, ChainClient};
use crate::types::{
    AccountId, Balance, BlockDetails, BlockHash, BlockId, BlockNumber, BlockRange,
    EthereumTransaction, EventKind, ExtrinsicWithOutcome,
};
use crate::verifier::{
    check_issuance, check_partial_fee, check_payer_balance, check_treasury_deposit, CheckKind,
};

/// An extrinsic left out of the totals, with the block it was found in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GapEntry {
    pub block: BlockNumber,
    #[serde(flatten)]
    pub gap: ClassificationGap,
}

/// Outcome of a successful audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub from: BlockNumber,
    pub to: BlockNumber,
    pub totals: RangeFees,
    pub issuance_before: Balance,
    pub issuance_after: Balance,
    pub blocks: Vec<BlockFees>,
    pub gaps: Vec<GapEntry>,
}

impl AuditReport {
    pub fn sum_block_fees(&self) -> Balance {
        self.totals.sum_block_fees
    }

    pub fn sum_block_burnt(&self) -> Balance {
        self.totals.sum_block_burnt
    }

    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Folds visited blocks into per-block and range totals, running the
/// per-extrinsic checks as it goes.
pub struct Reconciler<'a, C: ?Sized> {
    client: &'a C,
    config: &'a AuditConfig,
    engine: FeeEngine,
    expected_balance_diff: Balance,
    /// Post-state of the previously visited block.
    previous_hash: BlockHash,
    totals: RangeFees,
    blocks: Vec<BlockFees>,
    gaps: Vec<GapEntry>,
}

impl<'a, C> Reconciler<'a, C>
where
    C: ChainClient + ?Sized,
{
    pub fn new(
        client: &'a C,
        config: &'a AuditConfig,
        start_parent: BlockHash,
        expected_balance_diff: Balance,
    ) -> Self {
        Self {
            client,
            config,
            engine: config.fee_engine(),
            expected_balance_diff,
            previous_hash: start_parent,
            totals: RangeFees::default(),
            blocks: Vec::new(),
            gaps: Vec::new(),
        }
    }

    pub fn into_parts(self) -> (RangeFees, Vec<BlockFees>, Vec<GapEntry>) {
        (self.totals, self.blocks, self.gaps)
    }

    async fn evm_fee(
        &self,
        number: BlockNumber,
        index: u32,
        transaction: &EthereumTransaction,
        sender: Option<AccountId>,
        classification: &Classification,
        base_fee_per_gas: &mut Option<u128>,
    ) -> AuditResult<(FeeBreakdown, AccountId)> {
        let sender = sender.ok_or(AuditError::MissingEvent {
            block: number,
            index,
            event: "ethereum.Executed",
        })?;

        let base_fee = match base_fee_per_gas {
            Some(fee) => *fee,
            None => {
                let parent = number.saturating_sub(1);
                let fee = self
                    .client
                    .base_fee_per_gas(parent)
                    .await
                    .map_err(fetch_err(parent))?;
                *base_fee_per_gas = Some(fee);
                fee
            }
        };
        let breakdown = self
            .engine
            .evm(classification.dispatch_info.weight, base_fee, transaction)?;
        if let Some(capped_tip) = self.engine.eip1559_tip_paid(
            classification.dispatch_info.weight,
            base_fee,
            transaction,
            breakdown.fees,
        )? {
            debug!(
                block = number,
                extrinsic = index,
                fees = breakdown.fees,
                capped_tip,
                "eip-1559 tip under the max fee cap"
            );
        }
        Ok((breakdown, sender))
    }

    async fn native_fee(
        &self,
        number: BlockNumber,
        tx: &ExtrinsicWithOutcome,
        signer: AccountId,
    ) -> AuditResult<FeeBreakdown> {
        let index = tx.extrinsic.index;
        let quote = tx.fee_quote.ok_or_else(|| {
            AuditError::fetch(
                BlockId::Number(number),
                ClientError::Decode(format!("no fee quote for signed extrinsic {index}")),
            )
        })?;
        let breakdown = self.engine.native(quote.partial_fee, tx.extrinsic.tip)?;

        // The event reports the fee including the tip.
        let paid = tx
            .find_event(|kind| match kind {
                EventKind::TransactionFeePaid {
                    actual_fee, tip, ..
                } => Some(actual_fee.saturating_sub(*tip)),
                _ => None,
            })
            .ok_or(AuditError::MissingEvent {
                block: number,
                index,
                event: "transactionPayment.TransactionFeePaid",
            })?;

        let at = self.previous_hash;
        let (length_fee, unadjusted_weight_fee, multiplier, base_fee) = futures::try_join!(
            self.client.query_length_to_fee(tx.extrinsic.encoded_len(), at),
            self.client.query_weight_to_fee(quote.weight, at),
            self.client.next_fee_multiplier(at),
            self.client.query_weight_to_fee(self.engine.extrinsic_base_weight(), at),
        )
        .map_err(fetch_err(number))?;
        let expected =
            expected_partial_fee(length_fee, unadjusted_weight_fee, multiplier, base_fee)?;
        debug!(
            block = number,
            extrinsic = index,
            %signer,
            length_fee,
            unadjusted_weight_fee,
            multiplier,
            base_fee,
            expected,
            "native fee recomputed"
        );

        check_partial_fee(CheckKind::FeePaidEvent, number, tx, expected, paid)?;
        check_partial_fee(CheckKind::FeeQuote, number, tx, expected, quote.partial_fee)?;
        Ok(breakdown)
    }

    async fn reconcile_extrinsic(
        &self,
        details: &BlockDetails,
        tx: &ExtrinsicWithOutcome,
        classification: Classification,
        base_fee_per_gas: &mut Option<u128>,
        block_fees: &mut BlockFees,
    ) -> AuditResult<()> {
        let number = details.number();
        let index = tx.extrinsic.index;

        let charged = match &classification.origin {
            _ if !classification.is_fee_paying() => None,
            TxOrigin::Evm {
                transaction,
                sender,
            } => {
                let (breakdown, sender) = self
                    .evm_fee(
                        number,
                        index,
                        transaction,
                        *sender,
                        &classification,
                        base_fee_per_gas,
                    )
                    .await?;
                Some((breakdown, sender, FeePath::Evm))
            }
            TxOrigin::Native {
                signer: Some(signer),
            } => {
                let breakdown = self.native_fee(number, tx, *signer).await?;
                Some((breakdown, *signer, FeePath::Native))
            }
            TxOrigin::Native { signer: None } => None,
        };

        let breakdown = match charged {
            Some((breakdown, payer, path)) => {
                let (before, after) = futures::try_join!(
                    self.client.account_balance(payer, self.previous_hash),
                    self.client.account_balance(payer, details.hash()),
                )
                .map_err(fetch_err(number))?;
                check_payer_balance(
                    number,
                    tx,
                    breakdown.fees,
                    before.free,
                    after.free,
                    self.expected_balance_diff,
                )?;

                block_fees.push(ExtrinsicFee {
                    index,
                    call: tx.extrinsic.call_name(),
                    path,
                    payer,
                    tx_fees: breakdown.fees,
                    tx_burnt: breakdown.burnt,
                })?;
                breakdown
            }
            None => FeeBreakdown::default(),
        };

        if self.config.is_deposit_check_excluded(&tx.extrinsic.section) {
            debug!(
                block = number,
                extrinsic = index,
                section = %tx.extrinsic.section,
                "deposit check skipped"
            );
            return Ok(());
        }
        check_treasury_deposit(number, tx, breakdown.fees, breakdown.burnt)?;
        Ok(())
    }
}

fn fetch_err(number: BlockNumber) -> impl Fn(ClientError) -> AuditError {
    move |source| AuditError::fetch(BlockId::Number(number), source)
}

#[async_trait]
impl<'a, C> BlockVisitor for Reconciler<'a, C>
where
    C: ChainClient + ?Sized,
{
    async fn visit(&mut self, details: BlockDetails) -> AuditResult<()> {
        let number = details.number();
        let mut block_fees = BlockFees::new(number, details.hash());
        let mut base_fee_per_gas = None;

        for tx in &details.extrinsics {
            let classification = match classify(tx) {
                Ok(classification) => classification,
                Err(gap) => {
                    warn!(block = number, extrinsic = gap.index, call = %gap.call, "{gap}");
                    self.gaps.push(GapEntry { block: number, gap });
                    continue;
                }
            };
            let result = self
                .reconcile_extrinsic(
                    &details,
                    tx,
                    classification,
                    &mut base_fee_per_gas,
                    &mut block_fees,
                )
                .await;
            if let Err(err) = result {
                if let Some(mismatch) = err.mismatch() {
                    warn!(block = number, extrinsic = tx.extrinsic.index, "\n{mismatch}");
                }
                return Err(err);
            }
        }

        self.totals.fold(&block_fees)?;
        debug!(
            block = number,
            fees = block_fees.block_fees,
            burnt = block_fees.block_burnt,
            extrinsics = block_fees.extrinsics.len(),
            "block reconciled"
        );
        self.previous_hash = details.hash();
        self.blocks.push(block_fees);
        Ok(())
    }
}

/// Audits blocks `from..=to`.
///
/// `expected_balance_diff` is the amount every fee payer is expected to have
/// spent on top of fees (for example a transfer value).
pub async fn verify_block_fees<C>(
    client: &C,
    config: &AuditConfig,
    from: BlockNumber,
    to: BlockNumber,
    expected_balance_diff: Balance,
) -> AuditResult<AuditReport>
where
    C: ChainClient + ?Sized,
{
    config.validate()?;
    if from == 0 {
        return Err(AuditError::InvalidRange(
            "the range must start after genesis".into(),
        ));
    }
    let range = BlockRange::new(from, to, config.concurrency)?;
    debug!(from, to, "checking blocks");

    let pre_hash = block_hash_of(client, from - 1).await?;
    let to_hash = block_hash_of(client, to).await?;
    let (issuance_before, issuance_after) = futures::try_join!(
        client.total_issuance(pre_hash),
        client.total_issuance(to_hash),
    )
    .map_err(|source| AuditError::fetch(BlockId::Number(to), source))?;

    let mut reconciler = Reconciler::new(client, config, pre_hash, expected_balance_diff);
    explore_block_range(client, range, &mut reconciler).await?;
    let (totals, blocks, gaps) = reconciler.into_parts();

    check_issuance(to, issuance_before, issuance_after, totals.sum_block_burnt).map_err(
        |mismatch| {
            warn!(from, to, "\n{mismatch}");
            AuditError::from(mismatch)
        },
    )?;

    info!(
        from,
        to,
        fees = totals.sum_block_fees,
        burnt = totals.sum_block_burnt,
        gaps = gaps.len(),
        "block range reconciled"
    );
    Ok(AuditReport {
        from,
        to,
        totals,
        issuance_before,
        issuance_after,
        blocks,
        gaps,
    })
}

/// Audits the current best block on its own.
pub async fn verify_latest_block_fees<C>(
    client: &C,
    config: &AuditConfig,
    expected_balance_diff: Balance,
) -> AuditResult<AuditReport>
where
    C: ChainClient + ?Sized,
{
    let best = client.best_block().await?;
    verify_block_fees(client, config, best.number, best.number, expected_balance_diff).await
}
