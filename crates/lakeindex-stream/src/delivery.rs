//! Delivery loop — hands messages to the consumer.
//!
//! [`start_stream`] spawns one handler invocation per message and keeps at
//! most `delivery_queue_depth` of them outstanding. [`streamer`] pushes
//! messages into a bounded channel instead.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use lakeindex_core::config::LakeConfig;
use lakeindex_core::error::LakeError;
use lakeindex_core::handler::StreamerMessageHandler;
use lakeindex_core::storage::LakeStorage;
use lakeindex_core::types::{BlockHeight, StreamerMessage};

use crate::continuity::ContinuityStream;

/// Outstanding handler invocations, oldest first.
///
/// Dropping the queue aborts whatever is still running.
struct DeliveryQueue {
    pending: VecDeque<(BlockHeight, JoinHandle<Result<(), LakeError>>)>,
    depth: usize,
}

impl DeliveryQueue {
    fn new(depth: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(depth),
            depth: depth.max(1),
        }
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for the oldest invocation. Cancel-safe: the handle stays queued
    /// until it has completed.
    async fn wait_oldest(&mut self) -> Result<(), LakeError> {
        let Some((height, handle)) = self.pending.front_mut() else {
            return Ok(());
        };
        let height = *height;
        let joined = handle.await;
        self.pending.pop_front();
        flatten(height, joined)
    }

    /// Spawn a handler invocation, first waiting for room in the queue.
    async fn push<H: StreamerMessageHandler>(
        &mut self,
        message: StreamerMessage,
        handler: Arc<H>,
    ) -> Result<(), LakeError> {
        while self.pending.len() >= self.depth {
            self.wait_oldest().await?;
        }
        let height = message.height();
        let handle = tokio::spawn(async move { handler.handle(message).await });
        self.pending.push_back((height, handle));
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), LakeError> {
        while !self.is_empty() {
            self.wait_oldest().await?;
        }
        Ok(())
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain(..) {
            handle.abort();
        }
    }
}

fn flatten(height: BlockHeight, joined: Result<Result<(), LakeError>, JoinError>) -> Result<(), LakeError> {
    let result = joined.unwrap_or_else(|e| {
        Err(LakeError::Handler {
            height,
            reason: format!("handler panicked: {e}"),
        })
    });
    if let Err(e) = &result {
        tracing::error!(height, error = %e, "Handler failed, stopping stream");
    }
    result
}

enum Step {
    Delivered(Result<(), LakeError>),
    Next(Option<Result<StreamerMessage, LakeError>>),
}

/// Stream messages from `config.start_block_height` into `handler`.
///
/// Runs until an error:
///   - a handler error (or panic) stops the stream and aborts the
///     invocations still queued behind it
///   - a fatal storage error is returned after the queued invocations finish
///
/// Dropping the returned future cancels the stream and aborts outstanding
/// invocations.
pub async fn start_stream<H>(
    storage: Arc<dyn LakeStorage>,
    config: LakeConfig,
    handler: H,
) -> Result<(), LakeError>
where
    H: StreamerMessageHandler,
{
    let mut stream = ContinuityStream::new(storage, &config)?;
    let handler = Arc::new(handler);
    let mut queue = DeliveryQueue::new(config.delivery_queue_depth);

    loop {
        let step = tokio::select! {
            biased;
            done = queue.wait_oldest(), if !queue.is_empty() => Step::Delivered(done),
            next = stream.next_message() => Step::Next(next),
        };

        match step {
            Step::Delivered(done) => done?,
            Step::Next(Some(Ok(message))) => queue.push(message, handler.clone()).await?,
            Step::Next(Some(Err(e))) => {
                queue.drain().await?;
                return Err(e);
            }
            Step::Next(None) => {
                queue.drain().await?;
                return Ok(());
            }
        }
    }
}

/// Start streaming into a bounded channel.
///
/// The channel holds up to `delivery_queue_depth` messages. The background
/// task ends with `Ok(())` once the receiver is dropped, or with the fatal
/// error that stopped the stream.
pub fn streamer(
    storage: Arc<dyn LakeStorage>,
    config: LakeConfig,
) -> Result<(JoinHandle<Result<(), LakeError>>, mpsc::Receiver<StreamerMessage>), LakeError> {
    let mut stream = ContinuityStream::new(storage, &config)?;
    let (tx, rx) = mpsc::channel(config.delivery_queue_depth);

    let handle = tokio::spawn(async move {
        while let Some(next) = stream.next_message().await {
            let message = next?;
            if tx.send(message).await.is_err() {
                tracing::info!(cursor = stream.cursor().next_height, "Receiver dropped, stopping stream");
                break;
            }
        }
        Ok(())
    });

    Ok((handle, rx))
}

/// [`start_stream`] against the S3 bucket named in `config`.
#[cfg(feature = "s3")]
pub async fn start_lake_stream<H>(config: LakeConfig, handler: H) -> Result<(), LakeError>
where
    H: StreamerMessageHandler,
{
    config.validate()?;
    let storage = Arc::new(lakeindex_storage::S3Lake::from_config(&config).await);
    start_stream(storage, config, handler).await
}
