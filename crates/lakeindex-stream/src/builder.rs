//! Fluent builder API for lake stream configurations.
//!
//! # Example
//!
//! ```rust,no_run
//! use lakeindex_stream::LakeConfigBuilder;
//!
//! let config = LakeConfigBuilder::new()
//!     .mainnet()
//!     .start_block_height(65_231_161)
//!     .blocks_preload_pool_size(100)
//!     .build()
//!     .unwrap();
//! ```

use std::time::Duration;

use lakeindex_core::config::{LakeConfig, LakeCredentials, DEFAULT_REGION, MAINNET_BUCKET, TESTNET_BUCKET};
use lakeindex_core::error::LakeError;
use lakeindex_core::retry::RetryPolicy;
use lakeindex_core::types::BlockHeight;

/// Fluent builder for `LakeConfig`.
///
/// Bucket, region and start height are required; everything else has a
/// default.
pub struct LakeConfigBuilder {
    config: LakeConfig,
    start_set: bool,
}

impl Default for LakeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LakeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LakeConfig::new("", "", 0),
            start_set: false,
        }
    }

    /// Use the public mainnet bucket and its region.
    pub fn mainnet(self) -> Self {
        self.bucket_name(MAINNET_BUCKET).region(DEFAULT_REGION)
    }

    /// Use the public testnet bucket and its region.
    pub fn testnet(self) -> Self {
        self.bucket_name(TESTNET_BUCKET).region(DEFAULT_REGION)
    }

    pub fn bucket_name(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket_name = bucket.into();
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    /// Point at a custom object store (MinIO, localstack, ...).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    pub fn force_path_style(mut self, enabled: bool) -> Self {
        self.config.force_path_style = enabled;
        self
    }

    /// First height to stream. Required.
    pub fn start_block_height(mut self, height: BlockHeight) -> Self {
        self.config.start_block_height = height;
        self.start_set = true;
        self
    }

    /// Heights requested per listing call (default 200).
    pub fn blocks_preload_pool_size(mut self, size: usize) -> Self {
        self.config.blocks_preload_pool_size = size;
        self
    }

    /// Static credentials instead of the default provider chain.
    pub fn credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.config.credentials = Some(LakeCredentials {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        });
        self
    }

    /// Outstanding block fetches (default 10).
    pub fn read_ahead_window(mut self, window: usize) -> Self {
        self.config.read_ahead_window = window;
        self
    }

    /// Outstanding handler invocations (default 10).
    pub fn delivery_queue_depth(mut self, depth: usize) -> Self {
        self.config.delivery_queue_depth = depth;
        self
    }

    pub fn no_new_blocks_throttle(mut self, throttle: Duration) -> Self {
        self.config.no_new_blocks_throttle = throttle;
        self
    }

    pub fn recovery_delay(mut self, delay: Duration) -> Self {
        self.config.recovery_delay = delay;
        self
    }

    pub fn fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.fetch_retry = policy;
        self
    }

    pub fn list_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.list_retry = policy;
        self
    }

    /// Validate and build the `LakeConfig`.
    pub fn build(self) -> Result<LakeConfig, LakeError> {
        if !self.start_set {
            return Err(LakeError::Config("start_block_height is required".into()));
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
