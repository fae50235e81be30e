//! lakeindex-storage — storage backends for LakeIndex.
//!
//! Backends:
//! - [`memory`] — in-memory (tests, local replay, fault injection)
//! - `s3` — AWS S3 and S3-compatible endpoints (feature: `s3`)

pub mod memory;

#[cfg(feature = "s3")]
pub mod s3;

pub use memory::InMemoryLake;

#[cfg(feature = "s3")]
pub use s3::S3Lake;
