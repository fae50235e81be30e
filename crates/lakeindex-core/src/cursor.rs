//! Stream cursor — tracks the next height to request and the hash chain.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BlockHeight, StreamerMessage};

/// A break in the parent-hash chain between two consecutive messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Continuity fault at block {height} ({hash}): expected parent {expected}, got {actual}"
)]
pub struct ContinuityFault {
    /// Height of the message that failed the check.
    pub height: BlockHeight,
    /// Hash of the message that failed the check.
    pub hash: String,
    /// Hash of the last delivered message.
    pub expected: String,
    /// `prev_hash` carried by the failing message.
    pub actual: String,
}

/// The stream's position in the chain.
///
/// The cursor knows:
/// - Which height to request next (`last delivered + 1`)
/// - The hash of the last delivered message, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Next height to request.
    pub next_height: BlockHeight,
    /// Hash of the most recently delivered message.
    pub last_hash: Option<String>,
    /// Height of the most recently delivered message.
    pub last_height: Option<BlockHeight>,
}

impl Cursor {
    /// Create a cursor that starts streaming at `start_height`.
    pub fn new(start_height: BlockHeight) -> Self {
        Self {
            next_height: start_height,
            last_hash: None,
            last_height: None,
        }
    }

    /// Check that `message` may be delivered after the last delivered one.
    ///
    /// The hash check is skipped until something has been delivered.
    pub fn check(&self, message: &StreamerMessage) -> Result<(), ContinuityFault> {
        let (Some(last_hash), Some(last_height)) = (&self.last_hash, self.last_height) else {
            return Ok(());
        };
        if message.prev_hash() != last_hash || message.height() <= last_height {
            return Err(ContinuityFault {
                height: message.height(),
                hash: message.hash().to_string(),
                expected: last_hash.clone(),
                actual: message.prev_hash().to_string(),
            });
        }
        Ok(())
    }

    /// Record `message` as delivered.
    pub fn advance(&mut self, message: &StreamerMessage) {
        self.next_height = message.height() + 1;
        self.last_height = Some(message.height());
        self.last_hash = Some(message.hash().to_string());
    }

    /// Returns `true` if nothing has been delivered yet.
    pub fn is_fresh(&self) -> bool {
        self.last_hash.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockHeaderView, BlockView};

    fn msg(height: BlockHeight, hash: &str, prev: &str) -> StreamerMessage {
        StreamerMessage {
            block: BlockView {
                author: "test.near".into(),
                header: BlockHeaderView {
                    height,
                    hash: hash.into(),
                    prev_hash: prev.into(),
                    timestamp: 0,
                    timestamp_nanosec: "0".into(),
                    extra: Default::default(),
                },
                chunks: vec![],
            },
            shards: vec![],
        }
    }

    #[test]
    fn fresh_cursor_accepts_anything() {
        let cursor = Cursor::new(100);
        assert!(cursor.is_fresh());
        assert!(cursor.check(&msg(105, "h105", "whatever")).is_ok());
    }

    #[test]
    fn advance_moves_to_next_height() {
        let mut cursor = Cursor::new(100);
        cursor.advance(&msg(100, "h100", "h99"));
        assert_eq!(cursor.next_height, 101);
        assert_eq!(cursor.last_hash.as_deref(), Some("h100"));
        // gaps in height are fine as long as the hash chain holds
        assert!(cursor.check(&msg(103, "h103", "h100")).is_ok());
    }

    #[test]
    fn detects_parent_hash_mismatch() {
        let mut cursor = Cursor::new(10);
        cursor.advance(&msg(11, "h11", "h10"));
        let fault = cursor.check(&msg(15, "h15", "h14")).unwrap_err();
        assert_eq!(fault.height, 15);
        assert_eq!(fault.expected, "h11");
        assert_eq!(fault.actual, "h14");
    }

    #[test]
    fn rejects_non_increasing_height() {
        let mut cursor = Cursor::new(10);
        cursor.advance(&msg(11, "h11", "h10"));
        // same hash linkage but a replayed height
        assert!(cursor.check(&msg(11, "h11b", "h11")).is_err());
    }
}
