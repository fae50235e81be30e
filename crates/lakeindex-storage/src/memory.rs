//! In-memory lake backend.
//!
//! Holds objects in a sorted map and implements the listing semantics of S3
//! (`StartAfter` + `Delimiter` → common prefixes). Useful for tests, local
//! replays, and for injecting storage faults.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use lakeindex_core::error::StorageError;
use lakeindex_core::storage::LakeStorage;
use lakeindex_core::types::{block_key, shard_key, BlockHeight};

/// In-memory object store.
///
/// Bucket names are accepted but ignored: there is one namespace.
#[derive(Default)]
pub struct InMemoryLake {
    objects: Mutex<BTreeMap<String, Bytes>>,
    list_failures: Mutex<VecDeque<StorageError>>,
    get_failures: Mutex<HashMap<String, VecDeque<StorageError>>>,
    list_calls: Mutex<Vec<String>>,
    get_calls: Mutex<Vec<String>>,
    get_latency: Option<Duration>,
    gets_in_flight: AtomicUsize,
    max_gets_in_flight: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryLake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `get_object` take `latency` (tokio time).
    pub fn with_get_latency(mut self, latency: Duration) -> Self {
        self.get_latency = Some(latency);
        self
    }

    /// Store (or overwrite) an object.
    pub fn put_object(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        lock(&self.objects).insert(key.into(), body.into());
    }

    /// Delete an object.
    pub fn remove_object(&self, key: &str) {
        lock(&self.objects).remove(key);
    }

    /// Write a block with `shard_count` empty shards, in the lake's
    /// snake_case wire format.
    pub fn insert_block(&self, height: BlockHeight, hash: &str, prev_hash: &str, shard_count: u64) {
        let chunks: Vec<_> = (0..shard_count)
            .map(|shard_id| {
                json!({
                    "chunk_hash": format!("{hash}-chunk-{shard_id}"),
                    "shard_id": shard_id,
                    "height_included": height,
                })
            })
            .collect();
        let block = json!({
            "author": "test.near",
            "header": {
                "height": height,
                "hash": hash,
                "prev_hash": prev_hash,
                "timestamp": height * 1_000_000_000,
                "timestamp_nanosec": (height * 1_000_000_000).to_string(),
                "gas_price": "100000000",
            },
            "chunks": chunks,
        });
        self.put_object(block_key(height), block.to_string());

        for shard_id in 0..shard_count {
            let shard = json!({
                "shard_id": shard_id,
                "chunk": null,
                "receipt_execution_outcomes": [],
                "state_changes": [],
            });
            self.put_object(shard_key(height, shard_id), shard.to_string());
        }
    }

    /// The next `list_common_prefixes` calls fail with these errors, in order.
    pub fn fail_lists(&self, errors: impl IntoIterator<Item = StorageError>) {
        lock(&self.list_failures).extend(errors);
    }

    /// The next `get_object` calls for `key` fail with these errors, in order.
    pub fn fail_gets(&self, key: impl Into<String>, errors: impl IntoIterator<Item = StorageError>) {
        lock(&self.get_failures)
            .entry(key.into())
            .or_default()
            .extend(errors);
    }

    /// `start_after` of every listing call so far.
    pub fn list_calls(&self) -> Vec<String> {
        lock(&self.list_calls).clone()
    }

    /// Key of every `get_object` call so far.
    pub fn get_calls(&self) -> Vec<String> {
        lock(&self.get_calls).clone()
    }

    /// Highest number of `get_object` calls that were running at once.
    pub fn max_gets_in_flight(&self) -> usize {
        self.max_gets_in_flight.load(Ordering::SeqCst)
    }

    fn read(&self, key: &str) -> Result<Bytes, StorageError> {
        if let Some(err) = lock(&self.get_failures).get_mut(key).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }
}

/// Decrements the in-flight counter when a get finishes or is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LakeStorage for InMemoryLake {
    async fn list_common_prefixes(
        &self,
        _bucket: &str,
        start_after: &str,
        delimiter: &str,
        max_keys: usize,
    ) -> Result<Vec<String>, StorageError> {
        lock(&self.list_calls).push(start_after.to_string());
        if let Some(err) = lock(&self.list_failures).pop_front() {
            return Err(err);
        }

        let objects = lock(&self.objects);
        let range = objects.range::<str, _>((Bound::Excluded(start_after), Bound::Unbounded));
        let mut prefixes: Vec<String> = Vec::new();
        for key in range.map(|(k, _)| k) {
            let Some(end) = key.find(delimiter) else {
                continue;
            };
            let prefix = &key[..end + delimiter.len()];
            if prefixes.last().map(String::as_str) == Some(prefix) {
                continue;
            }
            if prefixes.len() == max_keys {
                break;
            }
            prefixes.push(prefix.to_string());
        }
        Ok(prefixes)
    }

    async fn get_object(&self, _bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        lock(&self.get_calls).push(key.to_string());
        let now = self.gets_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_gets_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.gets_in_flight);

        if let Some(latency) = self.get_latency {
            tokio::time::sleep(latency).await;
        }
        self.read(key)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
