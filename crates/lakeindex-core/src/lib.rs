//! lakeindex-core — foundation for streaming block history out of a data lake.
//!
//! # Architecture
//!
//! ```text
//! LakeStorage (list / get)
//!     └── LakeFetcher      (block.json + shard_N.json → StreamerMessage)
//!          └── batch_stream (listing cursor, throttling)
//!               └── FetchAhead (bounded read-ahead window)
//!                    └── ContinuityStream (Cursor: parent-hash chain, restarts)
//!                         └── start_stream (bounded handler queue)
//! ```
//!
//! This crate holds the pieces that do not depend on a runtime pipeline:
//! types, errors, configuration, the retry policy, the cursor and the
//! storage/handler traits.

pub mod codec;
pub mod config;
pub mod cursor;
pub mod error;
pub mod handler;
pub mod retry;
pub mod storage;
pub mod types;

pub use config::{LakeConfig, LakeCredentials, StreamPhase};
pub use cursor::{ContinuityFault, Cursor};
pub use error::{LakeError, StorageError, StorageErrorKind};
pub use handler::StreamerMessageHandler;
pub use retry::RetryPolicy;
pub use storage::LakeStorage;
pub use types::{BlockHeight, BlockView, Shard, StreamerMessage};
