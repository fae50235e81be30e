//! Shared types for the streaming pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Height of a block. Also the stream cursor.
pub type BlockHeight = u64;

/// Width of the zero-padded height prefix used in lake object keys.
pub const BLOCK_HEIGHT_KEY_WIDTH: usize = 12;

// ─── Object keys ──────────────────────────────────────────────────────────────

/// Pad a block height so that lexicographic key order equals numeric order.
///
/// `normalize_block_height(879765) == "000000879765"`
pub fn normalize_block_height(height: BlockHeight) -> String {
    format!("{height:0width$}", width = BLOCK_HEIGHT_KEY_WIDTH)
}

/// Key of the block descriptor object: `<height>/block.json`.
pub fn block_key(height: BlockHeight) -> String {
    format!("{}/block.json", normalize_block_height(height))
}

/// Key of a shard descriptor object: `<height>/shard_<n>.json`.
pub fn shard_key(height: BlockHeight, shard: u64) -> String {
    format!("{}/shard_{shard}.json", normalize_block_height(height))
}

/// Parse a listing common prefix (`"000000879765/"`) back into a height.
pub fn parse_height_prefix(prefix: &str) -> Option<BlockHeight> {
    prefix.split('/').next()?.parse().ok()
}

// ─── StreamerMessage ──────────────────────────────────────────────────────────

/// One block descriptor plus the shard descriptors active at that height.
///
/// The unit of delivery. Moved to the consumer by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamerMessage {
    pub block: BlockView,
    pub shards: Vec<Shard>,
}

impl StreamerMessage {
    pub fn height(&self) -> BlockHeight {
        self.block.header.height
    }

    pub fn hash(&self) -> &str {
        &self.block.header.hash
    }

    pub fn prev_hash(&self) -> &str {
        &self.block.header.prev_hash
    }
}

/// Contents of `block.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub author: String,
    pub header: BlockHeaderView,
    /// One header per chunk; the number of chunks is the number of shard
    /// objects stored next to the block.
    pub chunks: Vec<ChunkHeaderView>,
}

/// Block header. Fields the pipeline does not need stay untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeaderView {
    pub height: BlockHeight,
    pub hash: String,
    pub prev_hash: String,
    /// Nanoseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub timestamp_nanosec: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BlockHeaderView {
    /// Block timestamp as a UTC datetime.
    pub fn timestamp_utc(&self) -> DateTime<Utc> {
        let nanos = self
            .timestamp_nanosec
            .parse::<u64>()
            .unwrap_or(self.timestamp);
        DateTime::from_timestamp_nanos(nanos.min(i64::MAX as u64) as i64)
    }
}

/// Chunk header as embedded in `block.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkHeaderView {
    pub chunk_hash: String,
    pub shard_id: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Contents of `shard_<n>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shard {
    pub shard_id: u64,
    #[serde(default)]
    pub chunk: Option<Value>,
    #[serde(default)]
    pub receipt_execution_outcomes: Vec<Value>,
    #[serde(default)]
    pub state_changes: Vec<Value>,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
