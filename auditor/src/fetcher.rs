//! Chain access used by the auditor and the block detail fetcher built on it.

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use crate::classifier::map_extrinsics;
use crate::error::{AuditError, AuditResult, ClientResult};
use crate::types::{
    AccountBalance, AccountId, Balance, Block, BlockDetails, BlockHash, BlockId, BlockNumber,
    EventRecord, FeeQuote, Header, RawExtrinsic, Weight,
};

/// Read access to a running node. State queries take the block whose
/// post-state is inspected.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_hash(&self, number: BlockNumber) -> ClientResult<BlockHash>;

    async fn header(&self, hash: BlockHash) -> ClientResult<Header>;

    async fn block(&self, hash: BlockHash) -> ClientResult<Block>;

    /// Header of the current best block.
    async fn best_block(&self) -> ClientResult<Header>;

    async fn finalized_head(&self) -> ClientResult<BlockHash>;

    async fn events(&self, hash: BlockHash) -> ClientResult<Vec<EventRecord>>;

    /// `TransactionPaymentApi::query_info` evaluated at `at`.
    async fn query_fee_info(&self, extrinsic: &RawExtrinsic, at: BlockHash)
        -> ClientResult<FeeQuote>;

    async fn query_length_to_fee(&self, len: u32, at: BlockHash) -> ClientResult<Balance>;

    async fn query_weight_to_fee(&self, weight: Weight, at: BlockHash) -> ClientResult<Balance>;

    async fn account_balance(&self, who: AccountId, at: BlockHash)
        -> ClientResult<AccountBalance>;

    async fn total_issuance(&self, at: BlockHash) -> ClientResult<Balance>;

    /// `TransactionPayment::NextFeeMultiplier`, scaled by 10^18.
    async fn next_fee_multiplier(&self, at: BlockHash) -> ClientResult<u128>;

    /// EVM base fee per gas of block `number`.
    async fn base_fee_per_gas(&self, number: BlockNumber) -> ClientResult<u128>;

    async fn spec_version(&self, at: BlockHash) -> ClientResult<u32>;
}

/// Fetches the block body and its events, then the fee quotes of its signed
/// extrinsics evaluated at the parent block.
pub async fn get_block_details<C>(client: &C, hash: BlockHash) -> AuditResult<BlockDetails>
where
    C: ChainClient + ?Sized,
{
    let fetch_err = |source| AuditError::fetch(BlockId::Hash(hash), source);
    debug!(block = ?hash, "querying block");

    let (block, records) = futures::try_join!(client.block(hash), client.events(hash))
        .map_err(fetch_err)?;
    let parent = block.header.parent_hash;

    let quotes = try_join_all(block.extrinsics.iter().map(|extrinsic| async move {
        if extrinsic.is_signed() {
            client.query_fee_info(extrinsic, parent).await.map(Some)
        } else {
            Ok(None)
        }
    }))
    .await
    .map_err(fetch_err)?;

    let extrinsics = map_extrinsics(block.extrinsics.clone(), &records, quotes);
    Ok(BlockDetails { block, extrinsics })
}

/// Resolves `number` to a hash, failing with the number in the error.
pub async fn block_hash_of<C>(client: &C, number: BlockNumber) -> AuditResult<BlockHash>
where
    C: ChainClient + ?Sized,
{
    client
        .block_hash(number)
        .await
        .map_err(|source| AuditError::fetch(BlockId::Number(number), source))
}
