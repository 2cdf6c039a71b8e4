//! REST generation tests against a mock HTTP server.

use dashscope::Client;
use futures::StreamExt;
use mockito::Matcher;
use serde_json::json;

const GENERATION_PATH: &str = "/services/aigc/text-generation/generation";

fn test_client(base_url: String) -> Client {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Client::builder()
        .api_key("sk-test")
        .base_http_url(base_url)
        .build()
        .unwrap()
}

#[tokio::test]
async fn batch_call_maps_success_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", GENERATION_PATH)
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({
            "model": "qwen-turbo",
            "input": {"prompt": "Tell me a joke."}
        })))
        .with_status(200)
        .with_body(
            json!({
                "request_id": "r-batch",
                "output": {"text": "Why did the crab cross the road?"},
                "usage": {"input_tokens": 5, "output_tokens": 9}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = test_client(server.url());
    let response = client
        .generation("qwen-turbo")
        .prompt("Tell me a joke.")
        .call()
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(response.is_success());
    assert_eq!(response.request_id, "r-batch");
    assert_eq!(response.text(), Some("Why did the crab cross the road?"));
    assert_eq!(response.usage.unwrap()["output_tokens"], 9);
}

#[tokio::test]
async fn parameters_and_extra_headers_are_forwarded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", GENERATION_PATH)
        .match_header("x-request-id", "caller-supplied")
        .match_body(Matcher::PartialJson(json!({
            "parameters": {"max_tokens": 64, "temperature": 0.9}
        })))
        .with_status(200)
        .with_body(json!({"request_id": "r-p", "output": {"text": "ok"}}).to_string())
        .create_async()
        .await;

    let client = test_client(server.url());
    let response = client
        .generation("qwen-turbo")
        .prompt("hi")
        .parameter("max_tokens", 64)
        .parameter("temperature", 0.9)
        .header("x-request-id", "caller-supplied")
        .call()
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(response.is_success());
}

#[tokio::test]
async fn business_failure_in_ok_body_becomes_failure_envelope() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", GENERATION_PATH)
        .with_status(200)
        .with_body(
            json!({
                "request_id": "r-f",
                "code": "InvalidParameter",
                "message": "unknown model"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = test_client(server.url());
    let response = client
        .generation("not-a-model")
        .prompt("hi")
        .call()
        .await
        .unwrap();

    assert!(!response.is_success());
    assert_ne!(response.status_code, 200);
    assert_eq!(response.code.as_deref(), Some("InvalidParameter"));
    assert_eq!(response.message.as_deref(), Some("unknown model"));
}

#[tokio::test]
async fn transport_error_status_is_preserved() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", GENERATION_PATH)
        .with_status(401)
        .with_body(
            json!({
                "request_id": "r-401",
                "code": "InvalidApiKey",
                "message": "Invalid API-key provided."
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = test_client(server.url());
    let response = client
        .generation("qwen-turbo")
        .prompt("hi")
        .call()
        .await
        .unwrap();

    assert_eq!(response.status_code, 401);
    assert_eq!(response.code.as_deref(), Some("InvalidApiKey"));
}

#[tokio::test]
async fn sse_stream_yields_incremental_envelopes() {
    let body = concat!(
        "id:1\nevent:result\n",
        "data: {\"request_id\":\"r-s\",\"output\":{\"text\":\"He\"}}\n\n",
        ": keepalive\n\n",
        "id:2\nevent:result\n",
        "data: {\"request_id\":\"r-s\",\"output\":{\"text\":\"Hello\"},\"usage\":{\"output_tokens\":1}}\n\n",
    );
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", GENERATION_PATH)
        .match_header("x-dashscope-sse", "enable")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = test_client(server.url());
    let stream = client
        .generation("qwen-turbo")
        .prompt("Say hello")
        .stream()
        .await
        .unwrap();

    let envelopes: Vec<_> = stream.collect().await;
    mock.assert_async().await;
    assert_eq!(envelopes.len(), 2);
    assert_eq!(envelopes[0].text(), Some("He"));
    assert_eq!(envelopes[1].text(), Some("Hello"));
    assert_eq!(envelopes[1].usage.as_ref().unwrap()["output_tokens"], 1);
}

#[tokio::test]
async fn sse_stream_stops_after_error_event() {
    let body = concat!(
        "data: {\"request_id\":\"r-e\",\"output\":{\"text\":\"partial\"}}\n\n",
        "data: {\"request_id\":\"r-e\",\"code\":\"Throttling\",\"message\":\"slow down\"}\n\n",
        "data: {\"request_id\":\"r-e\",\"output\":{\"text\":\"never seen\"}}\n\n",
    );
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", GENERATION_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = test_client(server.url());
    let stream = client
        .generation("qwen-turbo")
        .prompt("hi")
        .stream()
        .await
        .unwrap();

    let envelopes: Vec<_> = stream.collect().await;
    assert_eq!(envelopes.len(), 2);
    assert!(envelopes[0].is_success());
    assert!(!envelopes[1].is_success());
    assert_eq!(envelopes[1].code.as_deref(), Some("Throttling"));
}

#[tokio::test]
async fn sse_rejected_request_is_a_hard_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", GENERATION_PATH)
        .with_status(429)
        .with_body(
            json!({
                "request_id": "r-429",
                "code": "Throttling.RateQuota",
                "message": "Requests throttling triggered."
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = test_client(server.url());
    let Err(err) = client.generation("qwen-turbo").prompt("hi").stream().await else {
        panic!("expected the stream call to be rejected");
    };

    match err {
        dashscope::Error::Api {
            status,
            code,
            request_id,
            ..
        } => {
            assert_eq!(status, 429);
            assert_eq!(code, "Throttling.RateQuota");
            assert_eq!(request_id, "r-429");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}
