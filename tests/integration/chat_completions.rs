//! Integration tests for blocking chat completions

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::body_partial_json;
use zhinao_client::prelude::*;
use zhinao_client::{ChatCompletionMessage, ChatCompletionRequest, FinishReason};

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "cmpl-integration-1",
        "object": "",
        "created": 1705312345,
        "model": "360gpt-pro",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
    })
}

#[tokio::test]
async fn test_chat_service_create_success() {
    let server = setup_mock_server().await;
    completions_mock()
        .and(body_partial_json(json!({"model": "360gpt-pro", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hi!")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = ChatCompletionRequest::new(vec![ChatCompletionMessage::user("Hello")], false);

    let completion = client.chat().create(&request).await.unwrap().unwrap();

    assert_eq!(completion.id.as_deref(), Some("cmpl-integration-1"));
    assert_eq!(completion.content(), Some("Hi!"));
    let choices = completion.choices.unwrap();
    assert_eq!(choices[0].finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn test_chat_model_call_maps_response() {
    let server = setup_mock_server().await;
    completions_mock()
        .and(body_partial_json(json!({
            "temperature": 0.7,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hi!")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let prompt = Prompt::new(vec![
        PromptMessage::system("Be brief."),
        PromptMessage::user("Hello"),
    ]);

    let response = client.chat_model().call(prompt).await.unwrap();

    assert_eq!(response.content(), Some("Hi!"));
    assert_eq!(response.metadata.id, "cmpl-integration-1");
    assert_eq!(response.metadata.model, "360gpt-pro");
    assert_eq!(response.metadata.created, 1705312345);
    assert_eq!(response.metadata.usage.total_tokens, 16);
}

#[tokio::test]
async fn test_empty_body_is_soft_failure() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client.chat_model().call(Prompt::user("Hello")).await.unwrap();

    assert!(response.generations.is_empty());
}

#[tokio::test]
async fn test_stream_flag_mismatch_is_rejected_locally() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let streaming = ChatCompletionRequest::new(vec![ChatCompletionMessage::user("Hi")], true);
    let err = client.chat().create(&streaming).await.unwrap_err();
    assert!(matches!(err, ZhinaoError::InvalidArgument { .. }));
    assert!(err.to_string().contains("stream property to false"));

    let blocking = ChatCompletionRequest::new(vec![ChatCompletionMessage::user("Hi")], false);
    let err = client.chat().create_stream(&blocking).await.unwrap_err();
    assert!(err.to_string().contains("stream property to true"));
}

#[tokio::test]
async fn test_authentication_error() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(error_response(401, "Invalid API key"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.chat_model().call(Prompt::user("Hi")).await.unwrap_err();

    match err {
        ZhinaoError::Authentication { message } => assert_eq!(message, "Invalid API key"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limit_error_carries_retry_after() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(error_response(429, "Too many requests").insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.chat_model().call(Prompt::user("Hi")).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_server_error_keeps_request_id() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(error_response(500, "boom").insert_header("x-request-id", "req-42"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.chat_model().call(Prompt::user("Hi")).await.unwrap_err();

    match err {
        ZhinaoError::Server {
            status_code,
            request_id,
            ..
        } => {
            assert_eq!(status_code, 500);
            assert_eq!(request_id.as_deref(), Some("req-42"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(error_response(503, "overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    completions_mock()
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Recovered")))
        .mount(&server)
        .await;

    let client = client_builder(&server)
        .retry_config(
            RetryConfig::new()
                .max_retries(2)
                .initial_delay(Duration::from_millis(5))
                .jitter(false),
        )
        .build()
        .unwrap();

    let response = client.chat_model().call(Prompt::user("Hi")).await.unwrap();
    assert_eq!(response.content(), Some("Recovered"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
