//! HTTP transport for the REST surface.
//!
//! Connection pooling is an explicit, constructor-injected object with an
//! `init`/`shutdown` lifecycle. Callers that want pooled connections share
//! one [`HttpPool`] across clients; nothing here is process-global.

use crate::error::Error;
use crate::Result;
use bytes::Bytes;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::time::Duration;

/// Pool sizing and timeout knobs, applied at [`HttpPool::init`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: Duration::from_secs(90),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// An explicit HTTP connection pool wrapping a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpPool {
    client: reqwest::Client,
}

impl HttpPool {
    /// Build the pool. Connections are established lazily on first use.
    pub fn init(config: PoolConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Some(config.idle_timeout))
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpPool { client })
    }

    /// Release the pool. Idle connections close once all clones are dropped.
    pub fn shutdown(self) {}

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// HTTP executor bound to one base URL and API key.
pub struct HttpTransport {
    pool: HttpPool,
    base_url: String,
    api_key: String,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(pool: HttpPool, base_url: String, api_key: String, user_agent: String) -> Self {
        Self {
            pool,
            base_url,
            api_key,
            user_agent,
        }
    }

    fn request(
        &self,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
    ) -> Result<reqwest::RequestBuilder> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let client = self.pool.client();
        let builder = match method.to_uppercase().as_str() {
            "GET" => client.get(&url),
            "POST" => client.post(&url),
            "PUT" => client.put(&url),
            "DELETE" => client.delete(&url),
            other => return Err(Error::UnsupportedHttpMethod(other.to_string())),
        };
        let mut builder = builder
            .bearer_auth(&self.api_key)
            .header("user-agent", &self.user_agent);
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        Ok(builder)
    }

    /// Execute a JSON request and return `(status, body)`. Non-2xx bodies are
    /// returned as-is; the caller maps them to envelopes or errors.
    pub async fn execute_json(
        &self,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
        body: Option<&serde_json::Value>,
    ) -> Result<(u16, serde_json::Value)> {
        let mut builder = self
            .request(method, path, headers)?
            .header("accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let value = response.json().await?;
        Ok((status, value))
    }

    /// Execute a request with server-sent events enabled and return the raw
    /// byte stream. SSE framing is parsed by the caller.
    pub async fn execute_sse(
        &self,
        path: &str,
        headers: &HashMap<String, String>,
        body: &serde_json::Value,
    ) -> Result<(
        u16,
        futures::stream::BoxStream<'static, Result<Bytes>>,
    )> {
        let response = self
            .request("POST", path, headers)?
            .header("accept", "text/event-stream")
            .header("X-DashScope-SSE", "enable")
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let stream = response.bytes_stream().map_err(Error::Http);
        Ok((status, Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_method() {
        let pool = HttpPool::init(PoolConfig::default()).unwrap();
        let transport = HttpTransport::new(
            pool,
            "http://localhost".into(),
            "k".into(),
            "ua".into(),
        );
        let err = transport
            .request("PATCH", "/x", &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedHttpMethod(m) if m == "PATCH"));
    }
}
