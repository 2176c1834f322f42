//! Locating past blocks by wall-clock time.

use serde::Serialize;
use tracing::debug;

use crate::error::{AuditError, AuditResult};
use crate::fetcher::{block_hash_of, ChainClient};
use crate::types::{BlockId, BlockNumber};

/// Step sizing for [`fetch_historic_block_num`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoricSearch {
    /// Assumed time between blocks.
    pub step_ms: u64,
    pub max_steps: u32,
}

impl Default for HistoricSearch {
    fn default() -> Self {
        Self {
            step_ms: 30_000,
            max_steps: 64,
        }
    }
}

async fn block_time<C>(client: &C, number: BlockNumber) -> AuditResult<u64>
where
    C: ChainClient + ?Sized,
{
    let hash = block_hash_of(client, number).await?;
    let block = client
        .block(hash)
        .await
        .map_err(|source| AuditError::fetch(BlockId::Number(number), source))?;
    block.timestamp.ok_or(AuditError::MissingTimestamp(number))
}

/// Walks back from `start` until it finds a block produced at or before
/// `target_time` (milliseconds). Never returns less than block 1.
pub async fn fetch_historic_block_num<C>(
    client: &C,
    start: BlockNumber,
    target_time: u64,
    search: HistoricSearch,
) -> AuditResult<BlockNumber>
where
    C: ChainClient + ?Sized,
{
    let mut number = start;
    for _ in 0..search.max_steps {
        if number <= 1 {
            return Ok(1);
        }
        let time = block_time(client, number).await?;
        if time <= target_time {
            return Ok(number);
        }
        let behind = (time - target_time).div_ceil(search.step_ms.max(1));
        let step = BlockNumber::try_from(behind).unwrap_or(BlockNumber::MAX);
        debug!(block = number, time, target_time, step, "stepping back");
        number = number.saturating_sub(step);
    }
    Err(AuditError::SearchExhausted(search.max_steps))
}

/// Block numbers produced in the last `period_ms` milliseconds before the
/// finalized head, oldest first. The head itself is not included.
pub async fn get_block_array<C>(
    client: &C,
    period_ms: u64,
    search: HistoricSearch,
) -> AuditResult<Vec<BlockNumber>>
where
    C: ChainClient + ?Sized,
{
    let finalized = client.finalized_head().await?;
    let block = client
        .block(finalized)
        .await
        .map_err(|source| AuditError::fetch(BlockId::Hash(finalized), source))?;
    let last = block.number();
    let last_time = block.timestamp.ok_or(AuditError::MissingTimestamp(last))?;

    let first_time = last_time.saturating_sub(period_ms);
    let first = fetch_historic_block_num(client, last, first_time, search).await?;
    debug!(first, last, period_ms, "resolved block window");
    Ok((first..last).collect())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UpgradeCheck {
    /// The window starts on a different runtime than `current_version`.
    pub crosses_upgrade: bool,
    pub spec_version: u32,
}

/// Compares the runtime at the start of `block_numbers` with `current_version`.
pub async fn check_time_slice_for_upgrades<C>(
    client: &C,
    block_numbers: &[BlockNumber],
    current_version: u32,
) -> AuditResult<UpgradeCheck>
where
    C: ChainClient + ?Sized,
{
    let Some(first) = block_numbers.first() else {
        return Ok(UpgradeCheck {
            crosses_upgrade: false,
            spec_version: current_version,
        });
    };
    let hash = block_hash_of(client, *first).await?;
    let spec_version = client.spec_version(hash).await?;
    Ok(UpgradeCheck {
        crosses_upgrade: spec_version != current_version,
        spec_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChain;

    fn chain_with(blocks: u32) -> MockChain {
        let chain = MockChain::dev().with_block_time(12_000);
        chain.produce_empty(blocks);
        chain
    }

    #[tokio::test]
    async fn window_ends_before_finalized_head() {
        let chain = chain_with(20);
        let numbers = get_block_array(&chain, 60_000, HistoricSearch::default())
            .await
            .unwrap();
        assert_eq!(numbers, vec![15, 16, 17, 18, 19]);
    }

    #[tokio::test]
    async fn window_follows_finality_lag() {
        let chain = chain_with(20).with_finality_lag(4);
        let numbers = get_block_array(&chain, 24_000, HistoricSearch::default())
            .await
            .unwrap();
        assert_eq!(numbers, vec![14, 15]);
    }

    #[tokio::test]
    async fn search_stops_at_block_one() {
        let chain = chain_with(5);
        let found = fetch_historic_block_num(&chain, 5, 0, HistoricSearch::default())
            .await
            .unwrap();
        assert_eq!(found, 1);
    }

    #[tokio::test]
    async fn search_gives_up_after_step_budget() {
        let chain = chain_with(20);
        let search = HistoricSearch {
            step_ms: 1_000_000,
            max_steps: 3,
        };
        let tenth = chain.block(chain.hash_of(10).unwrap()).await.unwrap();
        let target = tenth.timestamp.unwrap();
        let err = fetch_historic_block_num(&chain, 20, target, search)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::SearchExhausted(3)));
    }

    #[tokio::test]
    async fn upgrade_inside_window_is_detected() {
        let chain = chain_with(10);
        chain.upgrade_runtime(3500);
        chain.produce_empty(5);
        let head = chain.hash_of(15).unwrap();
        let current = chain.spec_version(head).await.unwrap();
        assert_eq!(current, 3500);

        let check = check_time_slice_for_upgrades(&chain, &[5, 6, 7], current)
            .await
            .unwrap();
        assert!(check.crosses_upgrade);
        assert_eq!(check.spec_version, 3400);

        let check = check_time_slice_for_upgrades(&chain, &[12, 13], current)
            .await
            .unwrap();
        assert!(!check.crosses_upgrade);
    }
}
