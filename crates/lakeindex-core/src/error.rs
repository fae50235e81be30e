//! Error types for the lakeindex pipeline.

use thiserror::Error;

use crate::cursor::ContinuityFault;
use crate::types::BlockHeight;

/// Classification of a storage failure.
///
/// The classification decides the retry policy: fatal kinds terminate the
/// stream, everything else is retried where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Credentials could not be resolved or were rejected.
    Credentials,
    /// The credentials are valid but not authorized for the bucket.
    AccessDenied,
    /// The object or bucket does not exist (yet).
    NotFound,
    /// The provider asked us to slow down.
    Throttled,
    /// The request timed out.
    Timeout,
    /// Connection-level failure (DNS, TLS, reset, 5xx).
    Transport,
    /// Anything else.
    Other,
}

impl std::fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credentials => write!(f, "credentials"),
            Self::AccessDenied => write!(f, "access denied"),
            Self::NotFound => write!(f, "not found"),
            Self::Throttled => write!(f, "throttled"),
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A failure reported by a [`LakeStorage`](crate::storage::LakeStorage) backend.
#[derive(Debug, Clone, Error)]
#[error("storage error ({kind}): {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn credentials(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Credentials, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Transport, message)
    }

    /// Returns `true` for the credential/authorization class.
    ///
    /// These cannot heal by retrying and terminate the whole stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            StorageErrorKind::Credentials | StorageErrorKind::AccessDenied
        )
    }
}

/// Errors that can occur while streaming from the lake.
#[derive(Debug, Error)]
pub enum LakeError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to deserialize {key}: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    ContinuityFault(#[from] ContinuityFault),

    #[error("Handler failed at block {height}: {reason}")]
    Handler { height: BlockHeight, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LakeError {
    /// Returns `true` if the error must terminate the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_fatal())
    }

    /// Returns `true` if the error is a broken parent-hash chain (recoverable).
    pub fn is_continuity_fault(&self) -> bool {
        matches!(self, Self::ContinuityFault(_))
    }
}
