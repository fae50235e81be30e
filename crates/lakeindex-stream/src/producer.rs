//! Batch producer — turns listing results into pending block fetches.
//!
//! Each step lists up to `pool_size` heights from the cursor, yields one
//! pending fetch per height, and moves the cursor past the highest height.
//! When the lake has nothing new the producer sleeps `throttle` and lists
//! again.

use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};

use lakeindex_core::config::LakeConfig;
use lakeindex_core::error::LakeError;
use lakeindex_core::retry::RetryPolicy;
use lakeindex_core::types::{BlockHeight, StreamerMessage};

use crate::fetcher::LakeFetcher;

/// A fetch that has not been polled yet. It starts its I/O when the
/// read-ahead window first polls it.
pub type PendingMessage = BoxFuture<'static, Result<StreamerMessage, LakeError>>;

/// Heights found by one listing call, with a pending fetch for each.
pub struct Batch {
    pub heights: Vec<BlockHeight>,
    pub pending: Vec<PendingMessage>,
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch").field("heights", &self.heights).finish()
    }
}

/// Producer tunables.
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// Heights per listing call.
    pub pool_size: usize,
    /// Pause when no new heights exist.
    pub throttle: Duration,
    /// Backoff for failed listing calls.
    pub list_retry: RetryPolicy,
}

impl From<&LakeConfig> for ProducerSettings {
    fn from(config: &LakeConfig) -> Self {
        Self {
            pool_size: config.blocks_preload_pool_size,
            throttle: config.no_new_blocks_throttle,
            list_retry: config.list_retry.clone(),
        }
    }
}

struct Producer {
    fetcher: LakeFetcher,
    settings: ProducerSettings,
    cursor: BlockHeight,
}

impl Producer {
    async fn next_batch(&mut self) -> Result<Batch, LakeError> {
        let mut failures = 0u32;
        loop {
            let heights = match self
                .fetcher
                .list_blocks(self.cursor, self.settings.pool_size)
                .await
            {
                Ok(heights) => heights,
                Err(e) if e.is_fatal() => {
                    tracing::error!(cursor = self.cursor, error = %e, "Fatal error listing blocks");
                    return Err(e.into());
                }
                Err(e) => {
                    failures += 1;
                    let Some(delay) = self.settings.list_retry.next_delay(failures) else {
                        return Err(e.into());
                    };
                    tracing::warn!(
                        cursor = self.cursor,
                        failures,
                        ?delay,
                        error = %e,
                        "Failed to list blocks, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let Some(&max) = heights.iter().max() else {
                tokio::time::sleep(self.settings.throttle).await;
                continue;
            };

            tracing::debug!(
                cursor = self.cursor,
                count = heights.len(),
                last = max,
                "Listed block batch"
            );
            self.cursor = max + 1;

            let pending = heights
                .iter()
                .map(|&height| {
                    let fetcher = self.fetcher.clone();
                    async move { fetcher.fetch_message(height).await }.boxed()
                })
                .collect();
            return Ok(Batch { heights, pending });
        }
    }
}

/// Unbounded stream of batches starting at `start`.
///
/// Ends after yielding an error: fatal listing errors always, other listing
/// errors once a bounded `list_retry` policy gives up.
pub fn batch_stream(
    fetcher: LakeFetcher,
    settings: ProducerSettings,
    start: BlockHeight,
) -> BoxStream<'static, Result<Batch, LakeError>> {
    let producer = Producer {
        fetcher,
        settings,
        cursor: start,
    };
    stream::unfold(Some(producer), |state| async move {
        let mut producer = state?;
        match producer.next_batch().await {
            Ok(batch) => Some((Ok(batch), Some(producer))),
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

/// Flatten batches into individual pending fetches, in height order.
///
/// A producer error becomes an already-failed fetch at its position.
pub fn pending_messages(
    batches: BoxStream<'static, Result<Batch, LakeError>>,
) -> BoxStream<'static, PendingMessage> {
    batches
        .flat_map(|batch| match batch {
            Ok(batch) => stream::iter(batch.pending),
            Err(e) => stream::iter(vec![future::ready(Err::<StreamerMessage, _>(e)).boxed()]),
        })
        .boxed()
}
