//! Maps inbound frames to response envelopes.
//!
//! Each frame produces zero or one envelope. `started` produces none; a
//! `failed` event produces exactly one terminal error envelope and ends the
//! stream. Exactly one terminal envelope is ever produced per task; late
//! terminal frames are logged and discarded.

use crate::error::Error;
use crate::protocol::frame::{ControlFrame, Event, Frame};
use crate::types::{DashScopeResponse, Output};
use tracing::warn;

/// What a frame assembled into.
pub(crate) enum Assembled {
    /// No caller-visible envelope.
    Nothing,
    /// A non-terminal success envelope.
    Envelope(DashScopeResponse),
    /// End of stream, with the terminal envelope if the frame carried one.
    Final(Option<DashScopeResponse>),
}

pub(crate) struct ResponseAssembler {
    request_id: String,
    terminal_seen: bool,
}

impl ResponseAssembler {
    pub(crate) fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            terminal_seen: false,
        }
    }

    pub(crate) fn on_frame(&mut self, frame: Frame) -> Assembled {
        if self.terminal_seen {
            warn!(request_id = %self.request_id, "frame received after terminal event, discarding");
            return Assembled::Nothing;
        }
        match frame {
            Frame::Binary(data) => Assembled::Envelope(DashScopeResponse::success(
                &self.request_id,
                Output::Binary(data),
                None,
            )),
            Frame::Control(control) => self.on_control(control),
        }
    }

    fn on_control(&mut self, control: ControlFrame) -> Assembled {
        match control.event() {
            Some(Event::Started) => {
                warn!(request_id = %self.request_id, "duplicate started event, ignoring");
                Assembled::Nothing
            }
            Some(Event::ResultGenerated) => match self.success_envelope(&control) {
                Some(envelope) => Assembled::Envelope(envelope),
                None => Assembled::Nothing,
            },
            Some(Event::Finished) => {
                self.terminal_seen = true;
                Assembled::Final(self.success_envelope(&control))
            }
            Some(Event::Failed) => {
                self.terminal_seen = true;
                let code = control
                    .header
                    .code
                    .clone()
                    .or_else(|| pick_string(&control.payload, "code"))
                    .unwrap_or_else(|| "UnknownError".to_string());
                let message = control
                    .header
                    .message
                    .clone()
                    .or_else(|| pick_string(&control.payload, "message"))
                    .unwrap_or_default();
                Assembled::Final(Some(DashScopeResponse::failure(
                    400,
                    &self.request_id,
                    code,
                    message,
                )))
            }
            None => {
                // A control frame without an event is invalid mid-task.
                self.terminal_seen = true;
                Assembled::Final(Some(DashScopeResponse::failure(
                    500,
                    &self.request_id,
                    "UnexpectedMessageReceived",
                    "control frame carries no event",
                )))
            }
        }
    }

    /// Flatten an error that occurred while the task was running into its
    /// terminal envelope. Malformed frames become the synthetic `Unknown`
    /// envelope carrying the raw frame text.
    pub(crate) fn on_error(&mut self, error: Error) -> Assembled {
        if self.terminal_seen {
            warn!(request_id = %self.request_id, %error, "error after terminal event, discarding");
            return Assembled::Nothing;
        }
        self.terminal_seen = true;
        let envelope = match error {
            Error::MalformedFrame { raw, .. } => {
                DashScopeResponse::failure(400, &self.request_id, "Unknown", raw)
            }
            other => {
                DashScopeResponse::failure(500, &self.request_id, other.code(), other.to_string())
            }
        };
        Assembled::Final(Some(envelope))
    }

    fn success_envelope(&self, control: &ControlFrame) -> Option<DashScopeResponse> {
        let output = Output::from_payload(control.payload.get("output")?)?;
        let usage = control.payload.get("usage").filter(|u| !u.is_null()).cloned();
        Some(DashScopeResponse::success(&self.request_id, output, usage))
    }
}

fn pick_string(payload: &serde_json::Value, key: &str) -> Option<String> {
    payload.get(key)?.as_str().map(|s| s.to_string())
}
