//! Transport boundary: HTTP (REST + SSE) and WebSocket clients are consumed
//! here, not reimplemented.

pub mod http;
pub mod ws;

pub use http::{HttpPool, HttpTransport, PoolConfig};
pub use ws::WsConnection;
