//! Chain-continuity stream — delivers hash-chained messages in height order.
//!
//! # STARTING
//! A fresh producer + read-ahead pipeline is built from the cursor.
//!
//! # STREAMING
//! Every message from the read-ahead buffer is checked against the cursor:
//!   - `prev_hash` must equal the hash of the last delivered message
//!   - the height must be above the last delivered height
//!
//! A passing message is delivered and the cursor moves to `height + 1`.
//!
//! # RECOVERING
//! On a continuity fault or a non-fatal pipeline error, the whole pipeline
//! is dropped, the stream waits `recovery_delay`, and a new pipeline is built
//! from the last good cursor. The recorded hash is kept, so the first message
//! after a restart is still checked.
//!
//! Fatal storage errors are yielded once and end the stream.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};

use lakeindex_core::config::{LakeConfig, StreamPhase};
use lakeindex_core::cursor::Cursor;
use lakeindex_core::error::LakeError;
use lakeindex_core::storage::LakeStorage;
use lakeindex_core::types::StreamerMessage;

use crate::fetcher::LakeFetcher;
use crate::producer::{batch_stream, pending_messages, PendingMessage, ProducerSettings};
use crate::read_ahead::FetchAhead;

type Pipeline = FetchAhead<BoxStream<'static, PendingMessage>>;

/// Owns the cursor and the current producer pipeline of one session.
pub struct ContinuityStream {
    fetcher: LakeFetcher,
    settings: ProducerSettings,
    window: usize,
    recovery_delay: Duration,
    cursor: Cursor,
    phase: StreamPhase,
    pipeline: Option<Pipeline>,
    restarts: u64,
}

impl ContinuityStream {
    pub fn new(storage: Arc<dyn LakeStorage>, config: &LakeConfig) -> Result<Self, LakeError> {
        config.validate()?;
        Ok(Self {
            fetcher: LakeFetcher::new(storage, config.bucket_name.clone(), config.fetch_retry.clone()),
            settings: ProducerSettings::from(config),
            window: config.read_ahead_window,
            recovery_delay: config.recovery_delay,
            cursor: Cursor::new(config.start_block_height),
            phase: StreamPhase::Starting,
            pipeline: None,
            restarts: 0,
        })
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Number of times the pipeline was rebuilt.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    fn build_pipeline(&self) -> Pipeline {
        let batches = batch_stream(
            self.fetcher.clone(),
            self.settings.clone(),
            self.cursor.next_height,
        );
        FetchAhead::new(pending_messages(batches), self.window)
    }

    /// Next message in chain order.
    ///
    /// Returns `None` only after a fatal error has been returned.
    pub async fn next_message(&mut self) -> Option<Result<StreamerMessage, LakeError>> {
        loop {
            match self.phase {
                StreamPhase::Stopped => return None,
                StreamPhase::Recovering => {
                    self.pipeline = None;
                    tokio::time::sleep(self.recovery_delay).await;
                    self.restarts += 1;
                    tracing::info!(
                        from = self.cursor.next_height,
                        restarts = self.restarts,
                        "Rebuilding lake pipeline"
                    );
                    self.phase = StreamPhase::Starting;
                    continue;
                }
                StreamPhase::Starting | StreamPhase::Streaming => {}
            }

            if self.pipeline.is_none() {
                if self.restarts == 0 {
                    tracing::info!(
                        from = self.cursor.next_height,
                        storage = self.fetcher.storage_name(),
                        "Starting lake stream"
                    );
                }
                self.pipeline = Some(self.build_pipeline());
            }
            let Some(pipeline) = self.pipeline.as_mut() else {
                continue;
            };

            let message = match pipeline.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) if e.is_fatal() => {
                    tracing::error!(error = %e, cursor = self.cursor.next_height, "Fatal lake error, stopping");
                    self.pipeline = None;
                    self.phase = StreamPhase::Stopped;
                    return Some(Err(e));
                }
                Some(Err(e)) => {
                    self.begin_recovery(e);
                    continue;
                }
                None => {
                    tracing::warn!(resume_from = self.cursor.next_height, "Lake pipeline ended, recovering");
                    self.phase = StreamPhase::Recovering;
                    continue;
                }
            };

            if let Err(fault) = self.cursor.check(&message) {
                self.begin_recovery(fault.into());
                continue;
            }

            self.cursor.advance(&message);
            self.phase = StreamPhase::Streaming;
            return Some(Ok(message));
        }
    }

    /// Drop into `Recovering` after a non-fatal error or a continuity fault.
    fn begin_recovery(&mut self, err: LakeError) {
        if err.is_continuity_fault() {
            tracing::warn!(error = %err, resume_from = self.cursor.next_height, "Continuity fault, refetching");
        } else {
            tracing::warn!(error = %err, resume_from = self.cursor.next_height, "Lake pipeline failed, recovering");
        }
        self.phase = StreamPhase::Recovering;
    }

    /// Turn the session into a `Stream`.
    pub fn into_stream(self) -> BoxStream<'static, Result<StreamerMessage, LakeError>> {
        stream::unfold(self, |mut this| async move {
            let item = this.next_message().await?;
            Some((item, this))
        })
        .boxed()
    }
}

/// Stream hash-chained messages from `config.start_block_height` on.
pub fn stream(
    storage: Arc<dyn LakeStorage>,
    config: &LakeConfig,
) -> Result<BoxStream<'static, Result<StreamerMessage, LakeError>>, LakeError> {
    Ok(ContinuityStream::new(storage, config)?.into_stream())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeindex_core::error::StorageError;
    use lakeindex_core::retry::RetryPolicy;
    use lakeindex_core::types::{block_key, BlockHeight};
    use lakeindex_storage::InMemoryLake;

    fn config(start: BlockHeight) -> LakeConfig {
        LakeConfig::new("bucket", "eu-central-1", start)
    }

    fn chain(lake: &InMemoryLake, heights: &[BlockHeight]) {
        let mut prev = "genesis".to_string();
        for &h in heights {
            let hash = format!("h{h}");
            lake.insert_block(h, &hash, &prev, 1);
            prev = hash;
        }
    }

    async fn take(stream: &mut ContinuityStream, n: usize) -> Vec<StreamerMessage> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(stream.next_message().await.unwrap().unwrap());
        }
        out
    }

    #[tokio::test]
    async fn delivers_chain_in_order() {
        let lake = Arc::new(InMemoryLake::new());
        chain(&lake, &[100, 101, 102, 105, 106]);

        let mut stream = ContinuityStream::new(lake.clone(), &config(101)).unwrap();
        assert_eq!(stream.phase(), StreamPhase::Starting);

        let heights: Vec<_> = take(&mut stream, 4).await.iter().map(|m| m.height()).collect();
        assert_eq!(heights, vec![101, 102, 105, 106]);
        assert_eq!(stream.phase(), StreamPhase::Streaming);
        assert_eq!(stream.cursor().next_height, 107);
        assert_eq!(stream.restarts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_listed_block_is_not_skipped() {
        let lake = Arc::new(InMemoryLake::new());
        // 12 is missing from the listing while 13 (child of 12) is already there
        lake.insert_block(10, "h10", "h9", 1);
        lake.insert_block(11, "h11", "h10", 1);
        lake.insert_block(13, "h13", "h12", 1);

        let writer = lake.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.insert_block(12, "h12", "h11", 1);
        });

        let mut stream = ContinuityStream::new(lake.clone(), &config(10)).unwrap();
        let delivered = take(&mut stream, 4).await;
        let heights: Vec<_> = delivered.iter().map(|m| m.height()).collect();

        assert_eq!(heights, vec![10, 11, 12, 13]);
        assert_eq!(stream.restarts(), 1);
        assert!(lake.list_calls().contains(&"000000000012".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn republished_block_is_delivered_once_corrected() {
        let lake = Arc::new(InMemoryLake::new());
        lake.insert_block(10, "h10", "h9", 1);
        lake.insert_block(11, "h11", "h10", 1);
        // 15 points at an orphaned parent until the lake republishes it
        lake.insert_block(15, "h15-orphan", "h14-orphan", 1);

        let writer = lake.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.insert_block(15, "h15", "h11", 1);
        });

        let mut stream = ContinuityStream::new(lake.clone(), &config(10)).unwrap();
        let delivered = take(&mut stream, 3).await;

        let heights: Vec<_> = delivered.iter().map(|m| m.height()).collect();
        assert_eq!(heights, vec![10, 11, 15]);
        assert_eq!(delivered[2].hash(), "h15");
        assert_eq!(delivered[2].prev_hash(), "h11");
        assert_eq!(stream.cursor().last_hash.as_deref(), Some("h15"));
    }

    #[tokio::test]
    async fn fatal_list_error_terminates() {
        let lake = Arc::new(InMemoryLake::new());
        chain(&lake, &[1, 2, 3]);
        lake.fail_lists([StorageError::credentials("CredentialsProviderError")]);

        let mut stream = ContinuityStream::new(lake.clone(), &config(1)).unwrap();
        let err = stream.next_message().await.unwrap().unwrap_err();

        assert!(err.is_fatal());
        assert!(stream.next_message().await.is_none());
        assert_eq!(stream.phase(), StreamPhase::Stopped);
        assert_eq!(lake.list_calls().len(), 1);
        assert!(lake.get_calls().is_empty());
    }

    #[tokio::test]
    async fn fatal_fetch_error_terminates_after_good_blocks() {
        let lake = Arc::new(InMemoryLake::new());
        chain(&lake, &[1, 2, 3]);
        lake.fail_gets(block_key(3), [StorageError::credentials("ExpiredToken")]);

        let mut stream = ContinuityStream::new(lake.clone(), &config(1)).unwrap();
        let first = take(&mut stream, 2).await;
        assert_eq!(first[1].height(), 2);

        assert!(stream.next_message().await.unwrap().unwrap_err().is_fatal());
        assert!(stream.next_message().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_fetch_retries_restart_from_cursor() {
        let lake = Arc::new(InMemoryLake::new());
        chain(&lake, &[1, 2, 3]);
        lake.fail_gets(
            block_key(2),
            [
                StorageError::transport("reset"),
                StorageError::transport("reset"),
                StorageError::transport("reset"),
            ],
        );

        let mut cfg = config(1);
        cfg.fetch_retry = RetryPolicy::fixed(Duration::from_millis(10)).with_max_retries(1);
        let mut stream = ContinuityStream::new(lake.clone(), &cfg).unwrap();

        let heights: Vec<_> = take(&mut stream, 3).await.iter().map(|m| m.height()).collect();
        assert_eq!(heights, vec![1, 2, 3]);
        assert_eq!(stream.restarts(), 1);
        assert!(lake.list_calls().contains(&"000000000002".to_string()));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let lake = Arc::new(InMemoryLake::new());
        let mut cfg = config(0);
        cfg.bucket_name.clear();
        assert!(matches!(
            ContinuityStream::new(lake, &cfg),
            Err(LakeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn into_stream_yields_messages() {
        let lake = Arc::new(InMemoryLake::new());
        chain(&lake, &[7, 8]);
        let mut messages = stream(lake, &config(7)).unwrap();
        assert_eq!(messages.next().await.unwrap().unwrap().height(), 7);
        assert_eq!(messages.next().await.unwrap().unwrap().height(), 8);
    }
}
