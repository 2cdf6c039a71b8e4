//! Caller-facing iteration over response envelopes.
//!
//! One protocol implementation backs two thin faces: the async
//! [`TaskResponseStream`] and the blocking [`BlockingTaskResponses`] adapter.
//! Both are lazy, single-pass, and non-restartable; dropping either closes
//! the task's socket.

use crate::error::Error;
use crate::types::DashScopeResponse;
use crate::{BoxStream, Result};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;

/// Lazy stream of response envelopes for one task.
///
/// Iteration past the terminal envelope (finished or error) yields nothing.
/// Dropping the stream early releases the socket without any protocol
/// message; [`TaskResponseStream::stop`] performs the cooperative variant,
/// sending a `finished`-intent frame first.
pub struct TaskResponseStream {
    inner: BoxStream<'static, DashScopeResponse>,
    stop: watch::Sender<bool>,
}

impl TaskResponseStream {
    pub(crate) fn new(
        inner: BoxStream<'static, DashScopeResponse>,
        stop: watch::Sender<bool>,
    ) -> Self {
        Self { inner, stop }
    }

    /// Request a cooperative stop: the send-loop stops producing input, the
    /// `finished`-intent marker goes out, and the session winds down.
    pub fn stop(&mut self) {
        let _ = self.stop.send(true);
    }

    /// Collapse the stream into a single batch response: the last envelope
    /// produced before the task ended (a data-bearing success or the
    /// terminal error).
    pub async fn batch(mut self) -> Result<DashScopeResponse> {
        let mut last = None;
        while let Some(envelope) = self.next().await {
            last = Some(envelope);
        }
        last.ok_or_else(|| Error::disconnected("task ended without producing a response"))
    }
}

impl std::fmt::Debug for TaskResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskResponseStream")
            .field("stopped", &*self.stop.borrow())
            .finish_non_exhaustive()
    }
}

impl Stream for TaskResponseStream {
    type Item = DashScopeResponse;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Blocking iterator adapter over [`TaskResponseStream`].
///
/// Drives a dedicated current-thread runtime; the protocol logic is not
/// duplicated per concurrency flavor.
pub struct BlockingTaskResponses {
    // Declared before the runtime so the session's socket is released while
    // the runtime still exists.
    stream: TaskResponseStream,
    runtime: tokio::runtime::Runtime,
}

impl BlockingTaskResponses {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, stream: TaskResponseStream) -> Self {
        Self { stream, runtime }
    }

    /// See [`TaskResponseStream::stop`].
    pub fn stop(&mut self) {
        self.stream.stop();
    }

    /// See [`TaskResponseStream::batch`].
    pub fn batch(self) -> Result<DashScopeResponse> {
        let BlockingTaskResponses { stream, runtime } = self;
        runtime.block_on(stream.batch())
    }
}

impl Iterator for BlockingTaskResponses {
    type Item = DashScopeResponse;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}
