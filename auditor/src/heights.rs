//! Futures that resolve once the chain reaches a given height.

use std::ops::RangeInclusive;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{AuditError, AuditResult};
use crate::types::BlockNumber;

/// Registry of pending `(target_height, completion)` pairs.
///
/// Whoever follows new heads calls [`HeightWaiters::notify`] for every head;
/// all waiters whose target has been reached are completed at once.
#[derive(Debug, Default)]
pub struct HeightWaiters {
    state: Mutex<WaiterState>,
}

#[derive(Debug, Default)]
struct WaiterState {
    current: BlockNumber,
    waiters: Vec<(BlockNumber, oneshot::Sender<BlockNumber>)>,
}

impl HeightWaiters {
    pub fn new(current: BlockNumber) -> Self {
        Self {
            state: Mutex::new(WaiterState {
                current,
                waiters: Vec::new(),
            }),
        }
    }

    pub fn current(&self) -> BlockNumber {
        self.state.lock().current
    }

    pub fn pending(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Records a new head and completes every waiter with `target <= height`.
    /// Returns how many waiters were completed.
    pub fn notify(&self, height: BlockNumber) -> usize {
        let ready = {
            let mut state = self.state.lock();
            state.current = state.current.max(height);
            let current = state.current;
            let (ready, pending): (Vec<_>, Vec<_>) = state
                .waiters
                .drain(..)
                .partition(|(target, _)| *target <= current);
            state.waiters = pending;
            ready
        };
        let completed = ready.len();
        for (_, sender) in ready {
            // The receiver may have given up waiting.
            let _ = sender.send(height);
        }
        trace!(height, completed, "height notification");
        completed
    }

    /// Resolves once a head at or above `target` has been notified.
    pub async fn wait_for(&self, target: BlockNumber) -> AuditResult<BlockNumber> {
        let receiver = {
            let mut state = self.state.lock();
            if state.current >= target {
                return Ok(state.current);
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push((target, sender));
            receiver
        };
        receiver.await.map_err(|_| AuditError::HeadsClosed(target))
    }

    /// Resolves `count` blocks after the current height.
    pub async fn wait_blocks(&self, count: u32) -> AuditResult<BlockNumber> {
        let target = self.current().saturating_add(count);
        self.wait_for(target).await
    }

    /// Waits for a head above `last_seen`, then returns every height notified
    /// since `last_seen`, including heads that arrived before the call.
    pub async fn wait_past(
        &self,
        last_seen: BlockNumber,
    ) -> AuditResult<RangeInclusive<BlockNumber>> {
        let next = last_seen.saturating_add(1);
        self.wait_for(next).await?;
        Ok(next..=self.current())
    }

    /// Drops every pending waiter, failing their futures.
    pub fn close(&self) {
        self.state.lock().waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn reached_height_resolves_immediately() {
        let waiters = HeightWaiters::new(10);
        assert_eq!(waiters.wait_for(9).await.unwrap(), 10);
        assert_eq!(waiters.pending(), 0);
    }

    #[tokio::test]
    async fn notify_drains_only_reached_targets() {
        let waiters = Arc::new(HeightWaiters::new(1));
        let near = tokio::spawn({
            let waiters = waiters.clone();
            async move { waiters.wait_for(2).await }
        });
        let far = tokio::spawn({
            let waiters = waiters.clone();
            async move { waiters.wait_for(5).await }
        });
        while waiters.pending() < 2 {
            tokio::task::yield_now().await;
        }

        assert_eq!(waiters.notify(3), 1);
        assert_eq!(near.await.unwrap().unwrap(), 3);
        assert_eq!(waiters.pending(), 1);

        assert_eq!(waiters.notify(5), 1);
        assert_eq!(far.await.unwrap().unwrap(), 5);
    }

    #[tokio::test]
    async fn wait_blocks_counts_from_current_height() {
        let waiters = Arc::new(HeightWaiters::new(100));
        let task = tokio::spawn({
            let waiters = waiters.clone();
            async move { waiters.wait_blocks(2).await }
        });
        while waiters.pending() < 1 {
            tokio::task::yield_now().await;
        }
        waiters.notify(101);
        assert_eq!(waiters.pending(), 1);
        waiters.notify(102);
        assert_eq!(task.await.unwrap().unwrap(), 102);
    }

    #[tokio::test]
    async fn heads_seen_while_busy_are_returned_not_skipped() {
        let waiters = Arc::new(HeightWaiters::new(100));
        let task = tokio::spawn({
            let waiters = waiters.clone();
            async move { waiters.wait_past(100).await }
        });
        while waiters.pending() < 1 {
            tokio::task::yield_now().await;
        }
        waiters.notify(101);
        assert_eq!(task.await.unwrap().unwrap(), 101..=101);

        // 102 and 103 arrive while block 101 is being audited.
        waiters.notify(102);
        waiters.notify(103);
        assert_eq!(waiters.wait_past(101).await.unwrap(), 102..=103);
        assert_eq!(waiters.pending(), 0);
    }

    #[tokio::test]
    async fn closing_fails_pending_waiters() {
        let waiters = Arc::new(HeightWaiters::new(0));
        let task = tokio::spawn({
            let waiters = waiters.clone();
            async move { waiters.wait_for(1).await }
        });
        while waiters.pending() < 1 {
            tokio::task::yield_now().await;
        }
        waiters.close();
        assert!(matches!(
            task.await.unwrap(),
            Err(AuditError::HeadsClosed(1))
        ));
    }
}
