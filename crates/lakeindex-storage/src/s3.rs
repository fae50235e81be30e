//! AWS S3 backend.
//!
//! Lake buckets are requester-pays: every request carries
//! `RequestPayer::Requester`.

use std::error::Error as StdError;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    config::Credentials,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::RequestPayer,
    Client as S3Client,
};
use aws_credential_types::provider::error::CredentialsError;
use bytes::Bytes;
use tracing::debug;

use lakeindex_core::config::LakeConfig;
use lakeindex_core::error::{StorageError, StorageErrorKind};
use lakeindex_core::storage::LakeStorage;

/// [`LakeStorage`] over an S3 (or S3-compatible) endpoint.
pub struct S3Lake {
    client: S3Client,
    name: String,
}

impl S3Lake {
    /// Wrap an already configured client.
    pub fn new(client: S3Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    /// Build a client from the region, endpoint, addressing style and
    /// credentials in `config`.
    pub async fn from_config(config: &LakeConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(creds) = &config.credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                creds.session_token.clone(),
                None,
                "lakeindex",
            ));
        }
        let shared = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let name = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("s3:{}", config.region));
        debug!(backend = %name, bucket = %config.bucket_name, "created S3 client");
        Self::new(S3Client::from_conf(builder.build()), name)
    }
}

#[async_trait]
impl LakeStorage for S3Lake {
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        start_after: &str,
        delimiter: &str,
        max_keys: usize,
    ) -> Result<Vec<String>, StorageError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .start_after(start_after)
            .delimiter(delimiter)
            .max_keys(max_keys.min(i32::MAX as usize) as i32)
            .request_payer(RequestPayer::Requester)
            .send()
            .await
            .map_err(classify)?;

        Ok(output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .request_payer(RequestPayer::Requester)
            .send()
            .await
            .map_err(classify)?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::transport(format!("reading {key}: {e}")))?;
        Ok(body.into_bytes())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Map an SDK error onto the storage taxonomy.
///
/// A credential provider that resolves nothing surfaces as a dispatch (or
/// construction) failure wrapping a `CredentialsError`; any such cause in the
/// source chain makes the error a credentials error.
fn classify<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: std::fmt::Debug + 'static,
{
    let kind = match &err {
        SdkError::ServiceError(service) => kind_from_code(service.err().code()),
        _ if caused_by_credentials(&err) => StorageErrorKind::Credentials,
        SdkError::ConstructionFailure(_) => StorageErrorKind::Credentials,
        SdkError::TimeoutError(_) => StorageErrorKind::Timeout,
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => StorageErrorKind::Transport,
        _ => StorageErrorKind::Other,
    };
    StorageError::new(kind, DisplayErrorContext(&err).to_string())
}

/// Returns `true` if `err` or any of its sources is a `CredentialsError`.
fn caused_by_credentials(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<CredentialsError>().is_some() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Classify an S3 error code.
fn kind_from_code(code: Option<&str>) -> StorageErrorKind {
    match code {
        Some("InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken" | "InvalidToken"
            | "TokenRefreshRequired" | "CredentialsProviderError") => StorageErrorKind::Credentials,
        Some("AccessDenied" | "AllAccessDisabled" | "AccountProblem") => StorageErrorKind::AccessDenied,
        Some("NoSuchKey" | "NoSuchBucket" | "NotFound") => StorageErrorKind::NotFound,
        Some("SlowDown" | "Throttling" | "RequestLimitExceeded") => StorageErrorKind::Throttled,
        Some("RequestTimeout") => StorageErrorKind::Timeout,
        Some("InternalError" | "ServiceUnavailable") => StorageErrorKind::Transport,
        _ => StorageErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::provider::{future, ProvideCredentials};
    use aws_sdk_s3::config::retry::RetryConfig;

    #[test]
    fn credential_codes_are_fatal() {
        for code in ["InvalidAccessKeyId", "ExpiredToken", "AccessDenied"] {
            let kind = kind_from_code(Some(code));
            assert!(StorageError::new(kind, code).is_fatal(), "{code} should be fatal");
        }
    }

    #[test]
    fn transient_codes_are_retryable() {
        for code in ["NoSuchKey", "SlowDown", "InternalError", "RequestTimeout"] {
            let kind = kind_from_code(Some(code));
            assert!(!StorageError::new(kind, code).is_fatal(), "{code} should be retryable");
        }
        assert_eq!(kind_from_code(None), StorageErrorKind::Other);
    }

    #[derive(Debug)]
    struct Wrapped(CredentialsError);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "other")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn credentials_error_is_found_in_source_chain() {
        let nested = Wrapped(CredentialsError::not_loaded("no credentials found in chain"));
        assert!(caused_by_credentials(&nested));

        let unrelated = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!caused_by_credentials(&unrelated));
    }

    #[derive(Debug)]
    struct NoCredentials;

    impl ProvideCredentials for NoCredentials {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            future::ProvideCredentials::ready(Err(CredentialsError::not_loaded(
                "no credentials found in chain",
            )))
        }
    }

    #[tokio::test]
    async fn missing_credentials_are_fatal() {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("eu-central-1"))
            .endpoint_url("http://127.0.0.1:9")
            .credentials_provider(NoCredentials)
            .retry_config(RetryConfig::disabled())
            .build();
        let lake = S3Lake::new(S3Client::from_conf(config), "unreachable");

        let err = lake
            .list_common_prefixes("near-lake-data-testnet", "000000000000", "/", 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::Credentials, "{err}");
        assert!(err.is_fatal());

        let err = lake
            .get_object("near-lake-data-testnet", "000000000000/block.json")
            .await
            .unwrap_err();
        assert!(err.is_fatal(), "{err}");
    }

    #[tokio::test]
    async fn from_config_names_backend_after_endpoint() {
        let mut cfg = LakeConfig::new("bucket", "us-east-1", 0);
        cfg.endpoint = Some("http://localhost:9000".into());
        cfg.force_path_style = true;
        let lake = S3Lake::from_config(&cfg).await;
        assert_eq!(lake.name(), "http://localhost:9000");
    }
}
