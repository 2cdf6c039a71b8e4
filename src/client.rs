//! Client entry point and request builders.

use crate::error::Error;
use crate::generation::GenerationBuilder;
use crate::protocol::session::{TaskRequest, TaskSession};
use crate::stream::{BlockingTaskResponses, TaskResponseStream};
use crate::transport::http::{HttpPool, HttpTransport, PoolConfig};
use crate::transport::ws::WsConnection;
use crate::types::{DashScopeResponse, StreamingMode, TaskInput};
use crate::Result;
use std::collections::HashMap;
use std::time::Duration;

/// Default REST endpoint.
pub const BASE_HTTP_API_URL: &str = "https://dashscope.aliyuncs.com/api/v1";
/// Default WebSocket task endpoint.
pub const BASE_WEBSOCKET_API_URL: &str = "wss://dashscope.aliyuncs.com/api-ws/v1/inference";

const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(60);

/// DashScope API client.
///
/// Holds the credentials, endpoints, and the injected HTTP connection pool.
/// WebSocket tasks never share connections: each task opens its own socket.
#[derive(Debug, Clone)]
pub struct Client {
    api_key: String,
    base_http_url: String,
    base_websocket_url: String,
    frame_timeout: Duration,
    user_agent: String,
    pool: HttpPool,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client with defaults and the `DASHSCOPE_API_KEY` environment
    /// variable.
    pub fn from_env() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// Text generation over REST.
    pub fn generation(&self, model: impl Into<String>) -> GenerationBuilder<'_> {
        GenerationBuilder::new(self, model)
    }

    /// A model task over the WebSocket task protocol.
    pub fn task(
        &self,
        model: impl Into<String>,
        task_group: impl Into<String>,
        task: impl Into<String>,
    ) -> WsTaskBuilder<'_> {
        WsTaskBuilder::new(self, model, task_group, task)
    }

    pub(crate) fn http_transport(&self) -> HttpTransport {
        HttpTransport::new(
            self.pool.clone(),
            self.base_http_url.clone(),
            self.api_key.clone(),
            self.user_agent.clone(),
        )
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    api_key: Option<String>,
    base_http_url: String,
    base_websocket_url: String,
    frame_timeout: Duration,
    pool: Option<HttpPool>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_http_url: BASE_HTTP_API_URL.to_string(),
            base_websocket_url: BASE_WEBSOCKET_API_URL.to_string(),
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            pool: None,
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_http_url(mut self, url: impl Into<String>) -> Self {
        self.base_http_url = url.into();
        self
    }

    pub fn base_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.base_websocket_url = url.into();
        self
    }

    /// Bound on the time between consecutive frames, not on the whole task.
    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Share an existing HTTP connection pool across clients.
    pub fn http_pool(mut self, pool: HttpPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> Result<Client> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("DASHSCOPE_API_KEY").ok())
            .ok_or_else(|| {
                Error::configuration("API key required (set DASHSCOPE_API_KEY or use api_key())")
            })?;
        let pool = match self.pool {
            Some(pool) => pool,
            None => HttpPool::init(PoolConfig::default())?,
        };
        Ok(Client {
            api_key,
            base_http_url: self.base_http_url,
            base_websocket_url: self.base_websocket_url,
            frame_timeout: self.frame_timeout,
            user_agent: format!("dashscope-sdk/{} (rust)", env!("CARGO_PKG_VERSION")),
            pool,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one WebSocket task.
pub struct WsTaskBuilder<'a> {
    client: &'a Client,
    request: TaskRequest,
    headers: HashMap<String, String>,
}

impl<'a> WsTaskBuilder<'a> {
    fn new(
        client: &'a Client,
        model: impl Into<String>,
        task_group: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            client,
            request: TaskRequest {
                task_id: uuid::Uuid::new_v4().simple().to_string(),
                model: model.into(),
                task_group: task_group.into(),
                task: task.into(),
                function: None,
                streaming: StreamingMode::None,
                parameters: serde_json::Value::Null,
            },
            headers: HashMap::new(),
        }
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.request.task_id = task_id.into();
        self
    }

    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.request.function = Some(function.into());
        self
    }

    pub fn streaming_mode(mut self, mode: StreamingMode) -> Self {
        self.request.streaming = mode;
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if !self.request.parameters.is_object() {
            self.request.parameters = serde_json::Value::Object(Default::default());
        }
        self.request.parameters[key.into()] = value.into();
        self
    }

    /// Extra handshake header, e.g. a caller-supplied `request_id`.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Open the socket, run the start handshake, and return the envelope
    /// stream.
    pub async fn stream(self, input: TaskInput) -> Result<TaskResponseStream> {
        let conn = WsConnection::connect(
            &self.client.base_websocket_url,
            &self.client.api_key,
            &self.client.user_agent,
            &self.headers,
        )
        .await?;
        let session = TaskSession::new(conn, self.request, self.client.frame_timeout);
        session.run(input).await
    }

    /// Batch call: run the task to completion and return the final envelope.
    pub async fn call(self, input: TaskInput) -> Result<DashScopeResponse> {
        self.stream(input).await?.batch().await
    }

    /// Blocking variant of [`WsTaskBuilder::stream`].
    pub fn stream_blocking(self, input: TaskInput) -> Result<BlockingTaskResponses> {
        let runtime = blocking_runtime()?;
        let stream = runtime.block_on(self.stream(input))?;
        Ok(BlockingTaskResponses::new(runtime, stream))
    }

    /// Blocking variant of [`WsTaskBuilder::call`].
    pub fn call_blocking(self, input: TaskInput) -> Result<DashScopeResponse> {
        let runtime = blocking_runtime()?;
        runtime.block_on(self.call(input))
    }
}

fn blocking_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::configuration(format!("failed to build blocking runtime: {e}")))
}
