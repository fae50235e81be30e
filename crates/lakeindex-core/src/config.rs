//! Lake stream configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LakeError;
use crate::retry::RetryPolicy;
use crate::types::BlockHeight;

/// Public NEAR mainnet lake bucket.
pub const MAINNET_BUCKET: &str = "near-lake-data-mainnet";
/// Public NEAR testnet lake bucket.
pub const TESTNET_BUCKET: &str = "near-lake-data-testnet";
/// Region hosting the public lake buckets.
pub const DEFAULT_REGION: &str = "eu-central-1";

/// Static credentials for the storage backend.
///
/// When absent, the backend's default provider chain is used.
#[derive(Clone, Serialize, Deserialize)]
pub struct LakeCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for LakeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LakeCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for one streaming session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LakeConfig {
    /// Bucket holding the lake objects.
    pub bucket_name: String,
    /// Region of the bucket.
    pub region: String,
    /// Endpoint override for non-AWS or local object stores.
    pub endpoint: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    pub force_path_style: bool,
    /// First height to stream.
    pub start_block_height: BlockHeight,
    /// Number of heights requested per listing call.
    pub blocks_preload_pool_size: usize,
    /// Explicit credentials; `None` = default provider chain.
    pub credentials: Option<LakeCredentials>,
    /// Maximum number of outstanding block fetches.
    pub read_ahead_window: usize,
    /// Maximum number of outstanding handler invocations.
    pub delivery_queue_depth: usize,
    /// Pause before listing again when no new blocks exist.
    pub no_new_blocks_throttle: Duration,
    /// Pause before rebuilding the pipeline after a continuity fault.
    pub recovery_delay: Duration,
    /// Retry policy for individual object fetches.
    pub fetch_retry: RetryPolicy,
    /// Retry policy for failed listing calls.
    pub list_retry: RetryPolicy,
}

impl LakeConfig {
    /// A config with default tunables; the three required fields are given.
    pub fn new(
        bucket_name: impl Into<String>,
        region: impl Into<String>,
        start_block_height: BlockHeight,
    ) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            region: region.into(),
            endpoint: None,
            force_path_style: false,
            start_block_height,
            blocks_preload_pool_size: 200,
            credentials: None,
            read_ahead_window: 10,
            delivery_queue_depth: 10,
            no_new_blocks_throttle: Duration::from_millis(700),
            recovery_delay: Duration::from_millis(200),
            fetch_retry: RetryPolicy::object_fetch(),
            list_retry: RetryPolicy::block_listing(),
        }
    }

    /// Public mainnet lake.
    pub fn mainnet(start_block_height: BlockHeight) -> Self {
        Self::new(MAINNET_BUCKET, DEFAULT_REGION, start_block_height)
    }

    /// Public testnet lake.
    pub fn testnet(start_block_height: BlockHeight) -> Self {
        Self::new(TESTNET_BUCKET, DEFAULT_REGION, start_block_height)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), LakeError> {
        if self.bucket_name.trim().is_empty() {
            return Err(LakeError::Config("bucket_name is required".into()));
        }
        if self.region.trim().is_empty() {
            return Err(LakeError::Config("region is required".into()));
        }
        if self.blocks_preload_pool_size == 0 {
            return Err(LakeError::Config("blocks_preload_pool_size must be > 0".into()));
        }
        if self.read_ahead_window == 0 {
            return Err(LakeError::Config("read_ahead_window must be > 0".into()));
        }
        if self.delivery_queue_depth == 0 {
            return Err(LakeError::Config("delivery_queue_depth must be > 0".into()));
        }
        Ok(())
    }
}

/// Runtime phase of the continuity stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamPhase {
    /// Fresh pipeline, waiting for its first message.
    Starting,
    /// Delivering hash-chained messages.
    Streaming,
    /// Tearing down and rebuilding the pipeline after a fault.
    Recovering,
    /// Terminated by a fatal error.
    Stopped,
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Recovering => write!(f, "recovering"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LakeConfig::mainnet(66_264_389);
        assert_eq!(cfg.bucket_name, "near-lake-data-mainnet");
        assert_eq!(cfg.region, "eu-central-1");
        assert_eq!(cfg.blocks_preload_pool_size, 200);
        assert_eq!(cfg.read_ahead_window, 10);
        assert_eq!(cfg.delivery_queue_depth, 10);
        assert_eq!(cfg.no_new_blocks_throttle, Duration::from_millis(700));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_bucket() {
        let cfg = LakeConfig::new("", "eu-central-1", 0);
        assert!(matches!(cfg.validate(), Err(LakeError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut cfg = LakeConfig::testnet(0);
        cfg.read_ahead_window = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn credentials_are_redacted() {
        let creds = LakeCredentials {
            access_key_id: "AKIA".into(),
            secret_access_key: "very-secret".into(),
            session_token: None,
        };
        let printed = format!("{creds:?}");
        assert!(printed.contains("AKIA"));
        assert!(!printed.contains("very-secret"));
    }
}
