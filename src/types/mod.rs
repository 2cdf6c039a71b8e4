//! Core type definitions: streaming modes, task input, response envelopes.

pub mod input;
pub mod response;

pub use input::{StreamingMode, TaskInput};
pub use response::{DashScopeResponse, Output};
