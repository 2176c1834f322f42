use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use crate::error::AuditResult;
use crate::fetcher::{block_hash_of, get_block_details, ChainClient};
use crate::types::{BlockDetails, BlockNumber, BlockRange};

/// Receives fetched blocks in strictly ascending order.
#[async_trait]
pub trait BlockVisitor: Send {
    async fn visit(&mut self, details: BlockDetails) -> AuditResult<()>;
}

/// Fetches `range` in batches of `range.concurrency()` blocks and hands every
/// block to `visitor` in ascending order. The first error aborts the walk.
pub async fn explore_block_range<C, V>(
    client: &C,
    range: BlockRange,
    visitor: &mut V,
) -> AuditResult<()>
where
    C: ChainClient + ?Sized,
    V: BlockVisitor + ?Sized,
{
    for batch in range.batches() {
        debug!(
            first = batch.first().copied().unwrap_or_default(),
            size = batch.len(),
            "fetching batch"
        );
        let details = try_join_all(batch.iter().map(|number| fetch(client, *number))).await?;
        for block in details {
            visitor.visit(block).await?;
        }
    }
    Ok(())
}

async fn fetch<C>(client: &C, number: BlockNumber) -> AuditResult<BlockDetails>
where
    C: ChainClient + ?Sized,
{
    let hash = block_hash_of(client, number).await?;
    get_block_details(client, hash).await
}
