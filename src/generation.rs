//! REST text-generation surface: batch calls and SSE streaming.

use crate::client::Client;
use crate::error::Error;
use crate::types::{DashScopeResponse, Output};
use crate::{BoxStream, Result};
use async_stream::stream;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;

const GENERATION_PATH: &str = "/services/aigc/text-generation/generation";

/// Builder for one text-generation request.
pub struct GenerationBuilder<'a> {
    client: &'a Client,
    model: String,
    input: serde_json::Value,
    parameters: serde_json::Value,
    headers: HashMap<String, String>,
}

impl<'a> GenerationBuilder<'a> {
    pub(crate) fn new(client: &'a Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            input: serde_json::Value::Null,
            parameters: serde_json::Value::Null,
            headers: HashMap::new(),
        }
    }

    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.input = serde_json::json!({ "prompt": text.into() });
        self
    }

    /// Structured input, e.g. a `messages` array.
    pub fn input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if !self.parameters.is_object() {
            self.parameters = serde_json::Value::Object(Default::default());
        }
        self.parameters[key.into()] = value.into();
        self
    }

    /// Extra request header, e.g. a caller-supplied `request_id` for
    /// correlation.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    fn body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": self.input,
        });
        if !self.parameters.is_null() {
            body["parameters"] = self.parameters.clone();
        }
        body
    }

    /// Single request/response call.
    pub async fn call(self) -> Result<DashScopeResponse> {
        let (status, body) = self
            .client
            .http_transport()
            .execute_json("POST", GENERATION_PATH, &self.headers, Some(&self.body()))
            .await?;
        Ok(envelope_from_rest(status, &body))
    }

    /// Server-sent-events streaming call. The stream terminates after the
    /// first error envelope.
    pub async fn stream(self) -> Result<BoxStream<'static, DashScopeResponse>> {
        let (status, bytes) = self
            .client
            .http_transport()
            .execute_sse(GENERATION_PATH, &self.headers, &self.body())
            .await?;
        if status != 200 {
            return Err(drain_error(status, bytes).await);
        }
        Ok(Box::pin(sse_envelopes(bytes)))
    }
}

/// Map a REST body to the uniform envelope. A populated `code` marks failure
/// regardless of transport status.
fn envelope_from_rest(http_status: u16, body: &serde_json::Value) -> DashScopeResponse {
    let request_id = body
        .get("request_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let code = body
        .get("code")
        .and_then(|v| v.as_str())
        .filter(|c| !c.is_empty());

    if http_status == 200 && code.is_none() {
        DashScopeResponse {
            status_code: 200,
            request_id,
            output: body.get("output").and_then(Output::from_payload),
            usage: body.get("usage").filter(|u| !u.is_null()).cloned(),
            code: None,
            message: None,
        }
    } else {
        let status = if http_status == 200 { 400 } else { http_status };
        let message = body
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        DashScopeResponse::failure(
            status,
            request_id,
            code.unwrap_or("UnknownError"),
            message,
        )
    }
}

/// Read a failed response body off the wire and turn it into an API error.
async fn drain_error(status: u16, mut bytes: BoxStream<'static, Result<Bytes>>) -> Error {
    let mut buf = Vec::new();
    while let Some(Ok(chunk)) = bytes.next().await {
        buf.extend_from_slice(&chunk);
    }
    let body: serde_json::Value = serde_json::from_slice(&buf).unwrap_or_default();
    Error::Api {
        status,
        code: body
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("UnknownError")
            .to_string(),
        message: body
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        request_id: body
            .get("request_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    }
}

/// Decode an SSE byte stream into envelopes: split on blank lines, strip the
/// `data:` prefix, ignore comment lines, one JSON payload per event block.
fn sse_envelopes(
    mut bytes: BoxStream<'static, Result<Bytes>>,
) -> impl futures::Stream<Item = DashScopeResponse> + Send {
    stream! {
        let mut buf = String::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(b) => buf.push_str(&String::from_utf8_lossy(&b)),
                Err(e) => {
                    yield DashScopeResponse::failure(500, "", e.code(), e.to_string());
                    return;
                }
            }
            while let Some(idx) = buf.find("\n\n") {
                let block = buf[..idx].to_string();
                buf.drain(..idx + 2);
                if let Some(envelope) = parse_sse_block(&block) {
                    let failed = !envelope.is_success();
                    yield envelope;
                    if failed {
                        return;
                    }
                }
            }
        }
        if let Some(envelope) = parse_sse_block(&buf) {
            yield envelope;
        }
    }
}

fn parse_sse_block(block: &str) -> Option<DashScopeResponse> {
    for line in block.lines() {
        let line = line.trim();
        if line.starts_with(':') {
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            let body: serde_json::Value = serde_json::from_str(data.trim()).ok()?;
            return Some(envelope_from_rest(200, &body));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rest_body_maps_to_success_envelope() {
        let body = json!({
            "request_id": "r-1",
            "output": {"text": "hello"},
            "usage": {"output_tokens": 5}
        });
        let envelope = envelope_from_rest(200, &body);
        assert!(envelope.is_success());
        assert_eq!(envelope.request_id, "r-1");
        assert_eq!(envelope.text(), Some("hello"));
    }

    #[test]
    fn rest_body_with_code_maps_to_failure() {
        let body = json!({
            "request_id": "r-2",
            "code": "InvalidParameter",
            "message": "bad model"
        });
        let envelope = envelope_from_rest(200, &body);
        assert!(!envelope.is_success());
        assert_eq!(envelope.code.as_deref(), Some("InvalidParameter"));
    }

    #[test]
    fn sse_block_parsing_ignores_comments_and_ids() {
        let block = ": keepalive\nid: 1\nevent: result\ndata: {\"request_id\":\"r\",\"output\":{\"text\":\"hi\"}}";
        let envelope = parse_sse_block(block).unwrap();
        assert_eq!(envelope.text(), Some("hi"));
    }
}
