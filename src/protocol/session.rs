//! Task session: lifecycle state machine and streaming-mode dispatch.
//!
//! One session exclusively owns one socket for one task. The session drives
//! `start` → `started`, then dispatches by streaming mode:
//!
//! | Mode   | Input delivery                      | Output delivery             |
//! |--------|-------------------------------------|-----------------------------|
//! | NONE   | embedded in start (or one binary)   | single result               |
//! | IN     | `continue` frames, then end marker  | single result               |
//! | OUT    | embedded in start (or one binary)   | streamed until `finished`   |
//! | DUPLEX | streamed concurrently with          | streamed concurrently       |
//!
//! DUPLEX is the only mode with true concurrency: the send-loop and the
//! receive-loop run as two tokio tasks over the split socket and both are
//! joined before the task is declared done. All other modes are sequential.

use crate::error::Error;
use crate::protocol::assembler::{Assembled, ResponseAssembler};
use crate::protocol::frame::{Action, ControlFrame, Event, Frame};
use crate::stream::TaskResponseStream;
use crate::transport::ws::{WsConnection, WsSink};
use crate::types::input::InputChunks;
use crate::types::{StreamingMode, TaskInput};
use crate::Result;
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle states of a task session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Starting,
    Running,
    Finishing,
    Finished,
    Errored,
}

/// Identity and shape of one task execution.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Opaque task identifier; client-generated unless the caller supplies one.
    pub task_id: String,
    pub model: String,
    pub task_group: String,
    pub task: String,
    pub function: Option<String>,
    pub streaming: StreamingMode,
    pub parameters: serde_json::Value,
}

impl TaskRequest {
    fn start_payload(&self, input: serde_json::Value) -> serde_json::Value {
        let mut payload = json!({
            "model": self.model,
            "task_group": self.task_group,
            "task": self.task,
            "input": input,
        });
        if let Some(function) = &self.function {
            payload["function"] = json!(function);
        }
        if !self.parameters.is_null() {
            payload["parameters"] = self.parameters.clone();
        }
        payload
    }
}

/// One task's session over one dedicated socket.
pub struct TaskSession {
    conn: WsConnection,
    request: TaskRequest,
    frame_timeout: Duration,
    state: SessionState,
}

impl TaskSession {
    pub fn new(conn: WsConnection, request: TaskRequest, frame_timeout: Duration) -> Self {
        Self {
            conn,
            request,
            frame_timeout,
            state: SessionState::Created,
        }
    }

    /// Drive the start handshake, then hand off to the mode's loops.
    ///
    /// Errors before the task is running (handshake rejection, transport
    /// failure, input/mode mismatch) are returned here; once this returns
    /// `Ok`, all further failures arrive as a terminal error envelope on the
    /// stream.
    pub async fn run(mut self, input: TaskInput) -> Result<TaskResponseStream> {
        let (embedded, plan) = plan_input(self.request.streaming, input)?;

        // The start frame is the first thing on the wire, before any read.
        self.state = SessionState::Starting;
        let start = ControlFrame::action(
            &self.request.task_id,
            Action::Start,
            self.request.streaming,
            self.request.start_payload(embedded),
        );
        if let Err(e) = self.conn.sink.send_control(&start).await {
            return Err(self.errored(e).await);
        }

        match self.conn.source.receive(self.frame_timeout).await {
            Ok(Frame::Control(frame)) => match frame.event() {
                Some(Event::Started) => {
                    self.state = SessionState::Running;
                    debug!(task_id = %self.request.task_id, "task started");
                }
                Some(Event::Failed) => {
                    let code = frame
                        .header
                        .code
                        .unwrap_or_else(|| "UnknownError".to_string());
                    let message = frame.header.message.unwrap_or_default();
                    return Err(self.errored(Error::TaskFailed { code, message }).await);
                }
                other => {
                    let e = Error::UnexpectedMessageReceived(format!(
                        "expected started event, got {other:?}"
                    ));
                    return Err(self.errored(e).await);
                }
            },
            Ok(Frame::Binary(_)) => {
                let e = Error::UnexpectedMessageReceived(
                    "binary frame during start handshake".to_string(),
                );
                return Err(self.errored(e).await);
            }
            // Malformed frames are fatal during the handshake; transport
            // disconnects here are retryable at the caller's discretion.
            Err(e) => return Err(self.errored(e).await),
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let stream = run_loops(
            self.conn,
            self.request.task_id,
            self.request.streaming,
            self.frame_timeout,
            plan,
            stop_rx,
        );
        Ok(TaskResponseStream::new(Box::pin(stream), stop_tx))
    }

    /// Errored sessions always release the socket.
    async fn errored(mut self, error: Error) -> Error {
        self.state = SessionState::Errored;
        warn!(task_id = %self.request.task_id, %error, "session errored before running");
        self.conn.sink.close().await;
        error
    }
}

enum Chunk {
    Text(String),
    Binary(Vec<u8>),
}

enum ChunkSource {
    Text(InputChunks<String>),
    Binary(InputChunks<Vec<u8>>),
}

impl ChunkSource {
    async fn next_chunk(&mut self) -> Option<Chunk> {
        match self {
            ChunkSource::Text(s) => s.next().await.map(Chunk::Text),
            ChunkSource::Binary(s) => s.next().await.map(Chunk::Binary),
        }
    }
}

/// Input delivery strategy, resolved from the mode/input pair up front.
enum InputPlan {
    /// Everything was embedded in the start frame.
    Embedded,
    /// One binary frame follows the handshake (NONE/OUT binary input).
    BatchBinary(Vec<u8>),
    /// IN: all chunks go out, then the end-of-input marker, then results.
    Sequential(ChunkSource),
    /// DUPLEX: chunks go out concurrently with result delivery.
    Concurrent(ChunkSource),
}

fn plan_input(mode: StreamingMode, input: TaskInput) -> Result<(serde_json::Value, InputPlan)> {
    match (mode, input) {
        (StreamingMode::None | StreamingMode::Out, TaskInput::Embedded(v)) => {
            Ok((v, InputPlan::Embedded))
        }
        (StreamingMode::None | StreamingMode::Out, TaskInput::Binary(data)) => {
            Ok((json!({}), InputPlan::BatchBinary(data)))
        }
        (StreamingMode::None | StreamingMode::Out, _) => Err(Error::invalid_input(format!(
            "{mode:?} mode takes embedded or single binary input, not a chunk stream"
        ))),
        (StreamingMode::In, TaskInput::TextStream(s)) => {
            Ok((json!({}), InputPlan::Sequential(ChunkSource::Text(s))))
        }
        (StreamingMode::In, TaskInput::BinaryStream(s)) => {
            Ok((json!({}), InputPlan::Sequential(ChunkSource::Binary(s))))
        }
        (StreamingMode::Duplex, TaskInput::TextStream(s)) => {
            Ok((json!({}), InputPlan::Concurrent(ChunkSource::Text(s))))
        }
        (StreamingMode::Duplex, TaskInput::BinaryStream(s)) => {
            Ok((json!({}), InputPlan::Concurrent(ChunkSource::Binary(s))))
        }
        (StreamingMode::In | StreamingMode::Duplex, _) => Err(Error::invalid_input(format!(
            "{mode:?} mode requires a chunk stream input"
        ))),
    }
}

/// Write half owner during the receive phase.
enum SinkSlot {
    /// Sink stays local; `bool` records whether the end-of-input marker has
    /// already been sent.
    Local(WsSink, bool),
    /// Sink is owned by the spawned duplex send-loop.
    Sending(JoinHandle<(WsSink, Result<()>)>),
}

fn run_loops(
    conn: WsConnection,
    task_id: String,
    streaming: StreamingMode,
    frame_timeout: Duration,
    plan: InputPlan,
    mut stop_rx: watch::Receiver<bool>,
) -> impl Stream<Item = crate::types::DashScopeResponse> + Send {
    let (sink, mut source) = conn.into_halves();

    stream! {
        let mut assembler = ResponseAssembler::new(&task_id);

        // Input delivery.
        let mut slot = match plan {
            InputPlan::Embedded => SinkSlot::Local(sink, false),
            InputPlan::BatchBinary(data) => {
                let mut sink = sink;
                if let Err(e) = sink.send_binary(data).await {
                    if let Assembled::Final(Some(envelope)) = assembler.on_error(e) {
                        yield envelope;
                    }
                    sink.close().await;
                    return;
                }
                SinkSlot::Local(sink, false)
            }
            InputPlan::Sequential(chunks) => {
                let (mut sink, result) = send_chunks(
                    sink,
                    chunks,
                    task_id.clone(),
                    streaming,
                    frame_timeout,
                    stop_rx.clone(),
                )
                .await;
                if let Err(e) = result {
                    if let Assembled::Final(Some(envelope)) = assembler.on_error(e) {
                        yield envelope;
                    }
                    sink.close().await;
                    return;
                }
                debug!(%task_id, state = ?SessionState::Finishing, "input fully delivered");
                SinkSlot::Local(sink, true)
            }
            InputPlan::Concurrent(chunks) => SinkSlot::Sending(tokio::spawn(send_chunks(
                sink,
                chunks,
                task_id.clone(),
                streaming,
                frame_timeout,
                stop_rx.clone(),
            ))),
        };

        // Receive loop.
        loop {
            let received = match &mut slot {
                SinkSlot::Local(sink, finish_sent) => {
                    tokio::select! {
                        // The watch guard must not live across the arm body's
                        // awaits, so it is dropped inside the arm's future.
                        _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => {
                            // Cooperative stop: finished-intent frame, then
                            // release the socket.
                            debug!(%task_id, "stop requested");
                            if !*finish_sent {
                                let marker = ControlFrame::action(
                                    &task_id,
                                    Action::Finished,
                                    streaming,
                                    json!({}),
                                );
                                let _ = sink.send_control(&marker).await;
                            }
                            sink.close().await;
                            return;
                        }
                        received = source.receive(frame_timeout) => received,
                    }
                }
                // Duplex: the send-loop reacts to stop on its own.
                SinkSlot::Sending(_) => source.receive(frame_timeout).await,
            };

            let assembled = match received {
                Ok(frame) => assembler.on_frame(frame),
                Err(e) => assembler.on_error(e),
            };

            match assembled {
                Assembled::Nothing => continue,
                Assembled::Envelope(envelope) => yield envelope,
                Assembled::Final(envelope) => {
                    let state = if envelope.as_ref().is_some_and(|e| !e.is_success()) {
                        SessionState::Errored
                    } else {
                        SessionState::Finished
                    };
                    // Join the send-loop and release the socket before the
                    // terminal envelope is delivered.
                    wind_down(slot, frame_timeout, &task_id).await;
                    debug!(%task_id, ?state, "session closed");
                    if let Some(envelope) = envelope {
                        yield envelope;
                    }
                    return;
                }
            }
        }
    }
}

/// Send-loop: pulls chunks from the caller's source and streams them out,
/// then sends the end-of-input marker even if the receive side is still
/// active. Never assumes the source is materialized; a slow source only slows
/// this loop. Each send is bounded by the inter-frame timeout, so a peer that
/// stops reading (TCP backpressure) surfaces as a disconnect instead of
/// stalling the caller indefinitely.
async fn send_chunks(
    mut sink: WsSink,
    mut chunks: ChunkSource,
    task_id: String,
    streaming: StreamingMode,
    frame_timeout: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> (WsSink, Result<()>) {
    loop {
        let next = tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => {
                debug!(%task_id, "send-loop stopping on request");
                None
            }
            chunk = chunks.next_chunk() => chunk,
        };
        let sent = match next {
            Some(Chunk::Text(text)) => {
                let frame = ControlFrame::action(
                    &task_id,
                    Action::Continue,
                    streaming,
                    serde_json::Value::String(text),
                );
                bounded(frame_timeout, sink.send_control(&frame)).await
            }
            Some(Chunk::Binary(data)) => bounded(frame_timeout, sink.send_binary(data)).await,
            None => break,
        };
        if let Err(e) = sent {
            return (sink, Err(e));
        }
    }
    let marker = ControlFrame::action(&task_id, Action::Finished, streaming, json!({}));
    let result = bounded(frame_timeout, sink.send_control(&marker)).await;
    debug!(%task_id, "end-of-input marker sent");
    (sink, result)
}

async fn bounded<F>(limit: Duration, send: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    match tokio::time::timeout(limit, send).await {
        Ok(result) => result,
        Err(_) => Err(Error::disconnected(format!("send stalled for {limit:?}"))),
    }
}

/// Release the socket. For duplex, join the send-loop first; after the grace
/// period the task is aborted as a last resort and the socket closes on drop.
async fn wind_down(slot: SinkSlot, grace: Duration, task_id: &str) {
    match slot {
        SinkSlot::Local(mut sink, _) => sink.close().await,
        SinkSlot::Sending(mut handle) => {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok((mut sink, result))) => {
                    if let Err(e) = result {
                        warn!(task_id, error = %e, "send-loop finished with error");
                    }
                    sink.close().await;
                }
                Ok(Err(join_error)) => {
                    warn!(task_id, error = %join_error, "send-loop panicked");
                }
                Err(_) => {
                    warn!(task_id, "send-loop still running after grace period, aborting");
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn rejects_chunk_stream_for_batch_modes() {
        let input = TaskInput::text_stream(stream::iter(vec!["a".to_string()]));
        let Err(err) = plan_input(StreamingMode::None, input) else {
            panic!("expected a rejection");
        };
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rejects_embedded_input_for_streaming_in() {
        let Err(err) = plan_input(StreamingMode::In, TaskInput::prompt("hi")) else {
            panic!("expected a rejection");
        };
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn binary_batch_input_leaves_start_input_empty() {
        let (embedded, plan) =
            plan_input(StreamingMode::Out, TaskInput::Binary(vec![1, 2, 3])).unwrap();
        assert_eq!(embedded, json!({}));
        assert!(matches!(plan, InputPlan::BatchBinary(data) if data == vec![1, 2, 3]));
    }

    #[test]
    fn start_payload_shape() {
        let request = TaskRequest {
            task_id: "t-1".into(),
            model: "qwen-turbo".into(),
            task_group: "aigc".into(),
            task: "text-generation".into(),
            function: Some("generation".into()),
            streaming: StreamingMode::None,
            parameters: json!({"max_tokens": 1024}),
        };
        let payload = request.start_payload(json!({"prompt": "hello"}));
        assert_eq!(payload["model"], "qwen-turbo");
        assert_eq!(payload["task_group"], "aigc");
        assert_eq!(payload["task"], "text-generation");
        assert_eq!(payload["function"], "generation");
        assert_eq!(payload["input"]["prompt"], "hello");
        assert_eq!(payload["parameters"]["max_tokens"], 1024);
    }
}
