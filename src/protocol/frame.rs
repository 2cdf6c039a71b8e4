//! Frame codec for the WebSocket task protocol.
//!
//! Two frame kinds travel over one socket: JSON control frames (WebSocket
//! text frames) and raw data (WebSocket binary frames). Discrimination is by
//! the transport's native frame type, never by sniffing content.
//!
//! Control frame wire shape, reproduced exactly for compatibility:
//!
//! ```json
//! { "header": { "task_id": "...", "action"|"event": "...", "streaming": "..." },
//!   "payload": { ... } }
//! ```

use crate::error::Error;
use crate::types::StreamingMode;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Outbound actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Continue,
    Finished,
}

/// Inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Event {
    Started,
    ResultGenerated,
    Finished,
    Failed,
}

/// Control-frame header. Outbound frames carry `action`; inbound frames carry
/// `event`. A `failed` event additionally carries `code` and `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<StreamingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A JSON control frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFrame {
    pub header: Header,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ControlFrame {
    /// Build an outbound action frame.
    pub fn action(
        task_id: impl Into<String>,
        action: Action,
        streaming: StreamingMode,
        payload: serde_json::Value,
    ) -> Self {
        ControlFrame {
            header: Header {
                task_id: Some(task_id.into()),
                action: Some(action),
                event: None,
                streaming: Some(streaming),
                code: None,
                message: None,
            },
            payload,
        }
    }

    /// Encode to wire text. Pure and deterministic.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an inbound text frame. Fails with [`Error::MalformedFrame`]
    /// when the text is not valid JSON or lacks a `header` object.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str::<ControlFrame>(text).map_err(|e| Error::MalformedFrame {
            reason: e.to_string(),
            raw: text.to_string(),
        })
    }

    pub fn event(&self) -> Option<Event> {
        self.header.event
    }
}

/// A decoded inbound frame: the discriminated union over the two wire kinds.
#[derive(Debug)]
pub enum Frame {
    Control(ControlFrame),
    Binary(Vec<u8>),
}
