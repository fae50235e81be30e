//! Consumer callback trait.

use std::fmt::Display;
use std::future::Future;

use async_trait::async_trait;

use crate::error::LakeError;
use crate::types::StreamerMessage;

/// Trait for user-provided message handlers.
///
/// Called once per delivered message, in delivery order. Up to
/// `delivery_queue_depth` invocations may be running at the same time, so
/// implementations must not assume the previous call has finished.
///
/// Any async closure `Fn(StreamerMessage) -> Future<Output = Result<(), E>>`
/// with `E: Display` is a handler.
#[async_trait]
pub trait StreamerMessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: StreamerMessage) -> Result<(), LakeError>;
}

#[async_trait]
impl<F, Fut, E> StreamerMessageHandler for F
where
    F: Fn(StreamerMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async fn handle(&self, message: StreamerMessage) -> Result<(), LakeError> {
        let height = message.height();
        (self)(message).await.map_err(|e| LakeError::Handler {
            height,
            reason: e.to_string(),
        })
    }
}
