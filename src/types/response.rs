//! The uniform response envelope exposed to SDK callers.

use serde::Serialize;

/// Task output, resolved once at the API boundary into a tagged variant
/// instead of being re-probed at every access.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    /// Plain text result (`payload.output.text`).
    Text(String),
    /// Structured result, e.g. a `choices` message object.
    Structured(serde_json::Value),
    /// Raw bytes delivered as a native binary frame.
    #[serde(skip)]
    Binary(Vec<u8>),
}

impl Output {
    /// Text content of the output. Structured outputs that carry a string
    /// `text` field alongside other keys (the service pads `choices`,
    /// `finish_reason` and the like with nulls) still expose it here.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Output::Text(t) => Some(t),
            Output::Structured(v) => v.get("text").and_then(|t| t.as_str()),
            Output::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Output::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Output::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Resolve a `payload.output` JSON value into its variant. An object
    /// whose only content is a `text` string becomes [`Output::Text`].
    pub(crate) fn from_payload(output: &serde_json::Value) -> Option<Output> {
        if output.is_null() {
            return None;
        }
        if let Some(obj) = output.as_object() {
            if obj.len() == 1 {
                if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                    return Some(Output::Text(text.to_string()));
                }
            }
            if obj.is_empty() {
                return None;
            }
        }
        Some(Output::Structured(output.clone()))
    }
}

/// The uniform response envelope.
///
/// Exactly one of `code` (failure) or `output` (success) is meaningfully
/// populated, and `status_code == 200` iff the envelope is a success.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashScopeResponse {
    pub status_code: u16,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DashScopeResponse {
    pub fn success(
        request_id: impl Into<String>,
        output: Output,
        usage: Option<serde_json::Value>,
    ) -> Self {
        Self {
            status_code: 200,
            request_id: request_id.into(),
            output: Some(output),
            usage,
            code: None,
            message: None,
        }
    }

    pub fn failure(
        status_code: u16,
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            request_id: request_id.into(),
            output: None,
            usage: None,
            code: Some(code.into()),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// Shorthand for text output.
    pub fn text(&self) -> Option<&str> {
        self.output.as_ref().and_then(Output::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_resolves_text_variant() {
        let out = Output::from_payload(&json!({"text": "hello"})).unwrap();
        assert_eq!(out.as_text(), Some("hello"));
    }

    #[test]
    fn padded_service_output_keeps_text_access() {
        // The service pads text generation output with null siblings.
        let raw = json!({"text": "hello", "choices": null, "finish_reason": "stop"});
        let out = Output::from_payload(&raw).unwrap();
        assert_eq!(out.as_text(), Some("hello"));
        // The full structure stays reachable.
        assert_eq!(out.as_json().unwrap()["finish_reason"], "stop");
    }

    #[test]
    fn output_resolves_structured_variant() {
        let raw = json!({"choices": [{"message": {"content": "hi"}}]});
        let out = Output::from_payload(&raw).unwrap();
        assert_eq!(out.as_json(), Some(&raw));
    }

    #[test]
    fn empty_output_resolves_to_none() {
        assert_eq!(Output::from_payload(&json!({})), None);
        assert_eq!(Output::from_payload(&serde_json::Value::Null), None);
    }

    #[test]
    fn envelope_invariant() {
        let ok = DashScopeResponse::success("rid", Output::Text("x".into()), None);
        assert!(ok.is_success() && ok.code.is_none());

        let err = DashScopeResponse::failure(400, "rid", "X", "Y");
        assert!(!err.is_success() && err.output.is_none());
    }
}
