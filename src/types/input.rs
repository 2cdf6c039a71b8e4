//! Task input and streaming-mode declarations.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A finite, caller-supplied sequence of input chunks. Never assumed to be
/// materialized in memory; the send-loop pulls from it lazily.
pub type InputChunks<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Which direction(s) of a task's data transfer are chunked.
///
/// Serialized lowercase into the `streaming` field of the control-frame
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    /// Single input embedded in the start frame, single result.
    None,
    /// Input chunks streamed after start, single result once consumed.
    In,
    /// Input embedded in start (or absent), result chunks streamed.
    Out,
    /// Input and result chunks streamed concurrently.
    Duplex,
}

impl StreamingMode {
    /// Modes that stream input chunks after the start frame.
    pub fn has_streaming_input(self) -> bool {
        matches!(self, StreamingMode::In | StreamingMode::Duplex)
    }
}

/// Input handed to a WebSocket task.
///
/// `Embedded` and `Binary` fit the NONE/OUT modes; the chunk-stream variants
/// fit IN/DUPLEX. The session rejects mismatches up front rather than
/// guessing.
pub enum TaskInput {
    /// JSON input placed verbatim into the start frame's `payload.input`.
    Embedded(serde_json::Value),
    /// A single binary payload, sent as one native binary frame after the
    /// task has started.
    Binary(Vec<u8>),
    /// Text chunks, each wrapped in a `continue` control frame.
    TextStream(InputChunks<String>),
    /// Binary chunks, each sent as a native binary frame.
    BinaryStream(InputChunks<Vec<u8>>),
}

impl TaskInput {
    /// Conventional single-prompt input: `{"prompt": <text>}`.
    pub fn prompt(text: impl Into<String>) -> Self {
        TaskInput::Embedded(serde_json::json!({ "prompt": text.into() }))
    }

    pub fn text_stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = String> + Send + 'static,
    {
        TaskInput::TextStream(Box::pin(chunks))
    }

    pub fn binary_stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = Vec<u8>> + Send + 'static,
    {
        TaskInput::BinaryStream(Box::pin(chunks))
    }

    /// Whether the input travels as native binary frames.
    pub fn is_binary(&self) -> bool {
        matches!(self, TaskInput::Binary(_) | TaskInput::BinaryStream(_))
    }
}

impl std::fmt::Debug for TaskInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskInput::Embedded(v) => f.debug_tuple("Embedded").field(v).finish(),
            TaskInput::Binary(b) => f.debug_tuple("Binary").field(&b.len()).finish(),
            TaskInput::TextStream(_) => f.write_str("TextStream(..)"),
            TaskInput::BinaryStream(_) => f.write_str("BinaryStream(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&StreamingMode::Duplex).unwrap(),
            "\"duplex\""
        );
        assert_eq!(
            serde_json::from_str::<StreamingMode>("\"none\"").unwrap(),
            StreamingMode::None
        );
    }

    #[test]
    fn prompt_input_wraps_text() {
        let TaskInput::Embedded(v) = TaskInput::prompt("hello") else {
            panic!("expected embedded input");
        };
        assert_eq!(v["prompt"], "hello");
    }
}
