//! Block lister and message fetcher.
//!
//! Lists `<height>/` prefixes in the lake bucket and assembles a
//! [`StreamerMessage`] from `block.json` and its `shard_N.json` siblings.

use std::sync::Arc;

use futures::future::try_join_all;
use serde::de::DeserializeOwned;

use lakeindex_core::codec::parse_body;
use lakeindex_core::error::{LakeError, StorageError};
use lakeindex_core::retry::RetryPolicy;
use lakeindex_core::storage::LakeStorage;
use lakeindex_core::types::{
    block_key, normalize_block_height, parse_height_prefix, shard_key, BlockHeight, BlockView,
    Shard, StreamerMessage,
};

/// Fetches lake objects for one bucket.
///
/// Cheap to clone: the storage handle is shared.
///
/// # Liveness
/// With the default (unbounded) retry policy a height whose objects never
/// appear is retried forever and stalls the stream at that height. The lake
/// is expected to be eventually consistent, not lossy.
#[derive(Clone)]
pub struct LakeFetcher {
    storage: Arc<dyn LakeStorage>,
    bucket: String,
    retry: RetryPolicy,
}

impl LakeFetcher {
    pub fn new(storage: Arc<dyn LakeStorage>, bucket: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            retry,
        }
    }

    /// Identifier of the underlying storage backend.
    pub fn storage_name(&self) -> &str {
        self.storage.name()
    }

    /// List up to `limit` heights available from `start_from` on.
    ///
    /// Prefixes are compared as zero-padded strings, so `start_from` itself
    /// is included when it exists. The result is ascending and free of
    /// duplicates whatever order the storage lists in. No retries here.
    pub async fn list_blocks(
        &self,
        start_from: BlockHeight,
        limit: usize,
    ) -> Result<Vec<BlockHeight>, StorageError> {
        let prefixes = self
            .storage
            .list_common_prefixes(&self.bucket, &normalize_block_height(start_from), "/", limit)
            .await?;

        let mut heights = Vec::with_capacity(prefixes.len());
        for prefix in &prefixes {
            match parse_height_prefix(prefix) {
                Some(h) if h >= start_from => heights.push(h),
                Some(h) => tracing::warn!(height = h, start_from, "Listed height before cursor, skipping"),
                None => tracing::warn!(%prefix, "Unexpected prefix in lake bucket, skipping"),
            }
        }
        heights.sort_unstable();
        heights.dedup();
        Ok(heights)
    }

    /// Fetch `block.json` and every `shard_N.json` for `height`.
    ///
    /// Shards are fetched concurrently. A block without chunks issues no
    /// shard fetches.
    pub async fn fetch_message(&self, height: BlockHeight) -> Result<StreamerMessage, LakeError> {
        let block: BlockView = self.fetch_object(block_key(height)).await?;

        let shards: Vec<Shard> = if block.chunks.is_empty() {
            Vec::new()
        } else {
            try_join_all(
                (0..block.chunks.len() as u64).map(|shard| self.fetch_object(shard_key(height, shard))),
            )
            .await?
        };

        Ok(StreamerMessage { block, shards })
    }

    /// Get and deserialize one object, retrying according to the policy.
    ///
    /// Fatal storage errors are returned immediately. The first failure is
    /// only logged at debug level: a single retry is the common case while
    /// an object is still being written.
    async fn fetch_object<T: DeserializeOwned>(&self, key: String) -> Result<T, LakeError> {
        let mut failures = 0u32;
        loop {
            let result = match self.storage.get_object(&self.bucket, &key).await {
                Ok(body) => parse_body::<T>(&body).map_err(|source| LakeError::Deserialize {
                    key: key.clone(),
                    source,
                }),
                Err(e) => Err(LakeError::from(e)),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => e,
            };

            failures += 1;
            let Some(delay) = self.retry.next_delay(failures) else {
                tracing::warn!(%key, failures, error = %err, "Giving up on object");
                return Err(err);
            };
            if failures > 1 {
                tracing::warn!(%key, failures, error = %err, ?delay, "Failed to fetch object, retrying");
            } else {
                tracing::debug!(%key, error = %err, ?delay, "Failed to fetch object, retrying");
            }
            tokio::time::sleep(delay).await;
        }
    }
}
