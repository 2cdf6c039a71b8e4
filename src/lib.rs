//! # dashscope-sdk
//!
//! Rust client for the DashScope model service platform.
//!
//! ## Overview
//!
//! This library exposes DashScope model services over two transports: REST
//! for text generation (batch or Server-Sent Events streaming) and the
//! WebSocket task protocol for everything that streams input, output, or
//! both. The WebSocket surface is the core: a task is started with a `start`
//! frame, fed with `continue` frames or binary frames depending on its
//! streaming mode, and produces `result-generated` envelopes until a
//! terminal `finished` or `failed` event.
//!
//! ## Key Features
//!
//! - **Unified Client**: [`Client`] is the single entry point for REST and
//!   WebSocket calls
//! - **Streaming Modes**: [`StreamingMode`] selects none/in/out/duplex task
//!   wiring, including fully concurrent duplex send and receive
//! - **Batch or Stream**: every task can be consumed envelope-by-envelope or
//!   collapsed to its final envelope
//! - **Sync and Async**: the async surface is primary; blocking adapters run
//!   it on a private current-thread runtime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dashscope::{Client, StreamingMode, TaskInput};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> dashscope::Result<()> {
//!     let client = Client::from_env()?;
//!
//!     // Batch generation over REST.
//!     let response = client
//!         .generation("qwen-turbo")
//!         .prompt("Tell me a joke.")
//!         .call()
//!         .await?;
//!     println!("{:?}", response.text());
//!
//!     // Streaming synthesis over the WebSocket task protocol.
//!     let mut stream = client
//!         .task("sambert-zhichu-v1", "audio", "tts")
//!         .function("SpeechSynthesizer")
//!         .streaming_mode(StreamingMode::Out)
//!         .stream(TaskInput::prompt("Hello"))
//!         .await?;
//!     while let Some(envelope) = stream.next().await {
//!         // Binary audio arrives as Output::Binary envelopes.
//!         let _ = envelope.output;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client, builders, and endpoint configuration |
//! | [`protocol`] | WebSocket task protocol: frames, session state machine, assembler |
//! | [`transport`] | WebSocket connection and pooled HTTP transport |
//! | [`generation`] | REST text generation, batch and SSE streaming |
//! | [`stream`] | Caller-facing response streams and blocking adapters |
//! | [`types`] | Core type definitions (inputs, streaming modes, envelopes) |
//! | [`error`] | Error types |

pub mod client;
pub mod error;
pub mod generation;
pub mod protocol;
pub mod stream;
pub mod transport;
pub mod types;

use futures::Stream;
use std::pin::Pin;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, error::Error>;

/// A pinned, boxed, sendable stream.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

// Re-export main types for convenience
pub use client::{Client, ClientBuilder, WsTaskBuilder};
pub use error::Error;
pub use generation::GenerationBuilder;
pub use stream::{BlockingTaskResponses, TaskResponseStream};
pub use types::{DashScopeResponse, Output, StreamingMode, TaskInput};
