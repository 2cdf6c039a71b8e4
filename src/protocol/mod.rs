//! The WebSocket task protocol: frame codec, task session state machine, and
//! response assembly.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`frame`] | JSON control frames and binary frames over one socket |
//! | [`session`] | Task lifecycle and streaming-mode dispatch |
//! | `assembler` | Inbound frame to response-envelope mapping |

pub(crate) mod assembler;
pub mod frame;
pub mod session;

pub use frame::{Action, ControlFrame, Event, Frame};
pub use session::{SessionState, TaskRequest, TaskSession};
