//! lakeindex-stream — block lister, read-ahead fetcher, continuity stream and
//! delivery loop.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lakeindex_core::{LakeError, StreamerMessage};
//! use lakeindex_storage::InMemoryLake;
//! use lakeindex_stream::{start_stream, LakeConfigBuilder};
//!
//! # async fn run() -> Result<(), LakeError> {
//! let config = LakeConfigBuilder::new().testnet().start_block_height(0).build()?;
//! let storage = Arc::new(InMemoryLake::new());
//! start_stream(storage, config, |message: StreamerMessage| async move {
//!     println!("block {}", message.height());
//!     Ok::<(), LakeError>(())
//! })
//! .await
//! # }
//! ```

pub mod builder;
pub mod continuity;
pub mod delivery;
pub mod fetcher;
pub mod producer;
pub mod read_ahead;

pub use builder::LakeConfigBuilder;
pub use continuity::{stream, ContinuityStream};
pub use delivery::{start_stream, streamer};
pub use fetcher::LakeFetcher;
pub use producer::{batch_stream, pending_messages, Batch, PendingMessage, ProducerSettings};
pub use read_ahead::FetchAhead;

#[cfg(feature = "s3")]
pub use delivery::start_lake_stream;
