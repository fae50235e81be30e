//! The `LakeStorage` trait — the object-storage capability the pipeline consumes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

/// Listing and reading primitives of an object store.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one instance is shared read-only by
/// every concurrent fetch of a session as `Arc<dyn LakeStorage>`.
///
/// Implementations perform no retries of their own beyond what their
/// transport does. Retry policy belongs to the caller.
#[async_trait]
pub trait LakeStorage: Send + Sync + 'static {
    /// List common prefixes of keys sorting strictly after `start_after`,
    /// grouped by `delimiter`, returning at most `max_keys` prefixes in key order.
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        start_after: &str,
        delimiter: &str,
        max_keys: usize,
    ) -> Result<Vec<String>, StorageError>;

    /// Read a whole object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Return the backend's identifier (endpoint or name).
    fn name(&self) -> &str;
}
