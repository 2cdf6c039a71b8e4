//! WebSocket transport: connection handshake plus typed send/receive halves.
//!
//! The socket is split into a sink half and a stream half so that duplex
//! tasks can run their send-loop and receive-loop as independently scheduled
//! tasks. Non-duplex modes use the same halves sequentially.

use crate::error::Error;
use crate::protocol::frame::{ControlFrame, Frame};
use crate::Result;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One physical socket, exclusively owned by one task session.
pub struct WsConnection {
    pub(crate) sink: WsSink,
    pub(crate) source: WsSource,
}

impl WsConnection {
    /// Open a socket with the bearer-auth handshake.
    pub async fn connect(
        url: &str,
        api_key: &str,
        user_agent: &str,
        extra_headers: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::configuration(format!("invalid WebSocket URL {url}: {e}")))?;

        let headers = request.headers_mut();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("bearer {api_key}"))
                .map_err(|_| Error::configuration("API key contains invalid header characters"))?,
        );
        if let Ok(ua) = HeaderValue::from_str(user_agent) {
            headers.insert("user-agent", ua);
        }
        for (k, v) in extra_headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|_| Error::configuration(format!("invalid header name: {k}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|_| Error::configuration(format!("invalid header value for {k}")))?;
            headers.insert(name, value);
        }

        let (ws, _resp) = connect_async(request).await?;
        debug!(url, "WebSocket connected");

        let (sink, stream) = ws.split();
        Ok(WsConnection {
            sink: WsSink {
                inner: sink,
                closed: false,
            },
            source: WsSource { inner: stream },
        })
    }

    pub fn into_halves(self) -> (WsSink, WsSource) {
        (self.sink, self.source)
    }
}

/// Write half. All protocol writes go through here; nothing else may touch
/// the socket.
pub struct WsSink {
    inner: SplitSink<WsStream, Message>,
    closed: bool,
}

impl WsSink {
    pub async fn send_control(&mut self, frame: &ControlFrame) -> Result<()> {
        let text = frame.encode()?;
        debug!(frame = %text, "sending control frame");
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::disconnected(format!("send failed: {e}")))
    }

    pub async fn send_binary(&mut self, data: Vec<u8>) -> Result<()> {
        debug!(len = data.len(), "sending binary frame");
        self.inner
            .send(Message::Binary(data.into()))
            .await
            .map_err(|e| Error::disconnected(format!("send failed: {e}")))
    }

    /// Close the write half. Idempotent; never fails.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.close().await {
            debug!(error = %e, "socket already closed");
        }
    }
}

/// Read half.
pub struct WsSource {
    inner: SplitStream<WsStream>,
}

impl WsSource {
    /// Receive the next frame, bounded by the inter-frame timeout.
    ///
    /// A timeout, a close frame, or a transport error all surface as
    /// [`Error::TransportDisconnected`]; a text frame that fails to decode
    /// surfaces as [`Error::MalformedFrame`].
    pub async fn receive(&mut self, timeout: Duration) -> Result<Frame> {
        loop {
            let msg = tokio::time::timeout(timeout, self.inner.next())
                .await
                .map_err(|_| {
                    Error::disconnected(format!("no frame received within {timeout:?}"))
                })?;

            let msg = match msg {
                Some(Ok(m)) => m,
                Some(Err(e)) => return Err(Error::disconnected(format!("receive failed: {e}"))),
                None => return Err(Error::disconnected("socket closed by peer")),
            };

            match msg {
                Message::Text(text) => {
                    debug!(frame = %text, "received control frame");
                    return Ok(Frame::Control(ControlFrame::decode(text.as_str())?));
                }
                Message::Binary(data) => {
                    debug!(len = data.len(), "received binary frame");
                    return Ok(Frame::Binary(data.to_vec()));
                }
                // Keepalive traffic; the pong reply is queued by the
                // underlying protocol layer.
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(reason) => {
                    warn!(?reason, "received close frame");
                    return Err(Error::disconnected("socket closed by peer"));
                }
                Message::Frame(_) => continue,
            }
        }
    }
}
