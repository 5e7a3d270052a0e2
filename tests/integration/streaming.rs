//! Integration tests for streamed chat completions

use super::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::body_partial_json;
use zhinao_client::prelude::*;
use zhinao_client::{ChatCompletionChunk, ChatCompletionMessage, ChatCompletionRequest, FinishReason};

fn text_chunk(content: &str) -> serde_json::Value {
    json!({
        "id": "stream-1",
        "model": "360gpt-pro",
        "choices": [{"index": 0, "delta": {"role": "assistant", "content": content}}]
    })
}

fn tool_fragment(call: serde_json::Value, finish: Option<&str>) -> serde_json::Value {
    json!({
        "id": "stream-1",
        "model": "360gpt-pro",
        "choices": [{"index": 0, "delta": {"tool_calls": [call]}, "finish_reason": finish}]
    })
}

async fn collect_chunks(client: &ZhinaoClient) -> Vec<ChatCompletionChunk> {
    let request = ChatCompletionRequest::new(vec![ChatCompletionMessage::user("Hi")], true);
    client
        .chat()
        .create_stream(&request)
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await
}

#[tokio::test]
async fn test_stream_text_until_done() {
    let server = setup_mock_server().await;
    completions_mock()
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse_response(&[text_chunk("Hel"), text_chunk("lo")]))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let chunks = collect_chunks(&client).await;

    let contents: Vec<&str> = chunks.iter().filter_map(ChatCompletionChunk::content).collect();
    assert_eq!(contents, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn test_stream_stops_at_done_sentinel() {
    let server = setup_mock_server().await;
    let body = format!(
        "data: {}\n\ndata: [DONE]\n\ndata: {}\n\n",
        text_chunk("before"),
        text_chunk("after")
    );
    completions_mock()
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let chunks = collect_chunks(&client).await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content(), Some("before"));
}

#[tokio::test]
async fn test_stream_merges_tool_call_fragments() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(sse_response(&[
            text_chunk("Let me check."),
            tool_fragment(
                json!({"id": "t1", "type": "function", "function": {"name": "getWeather", "arguments": "{\"loc\":"}}),
                None,
            ),
            tool_fragment(json!({"function": {"arguments": "\"Par"}}), None),
            tool_fragment(json!({"function": {"arguments": "is\"}"}}), Some("tool_calls")),
            text_chunk("done"),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let chunks = collect_chunks(&client).await;

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].content(), Some("Let me check."));

    let merged = &chunks[1];
    assert_eq!(merged.finish_reason(), Some(FinishReason::ToolCalls));
    let calls = merged.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id.as_deref(), Some("t1"));
    assert_eq!(calls[0].name(), Some("getWeather"));
    assert_eq!(calls[0].arguments(), Some("{\"loc\":\"Paris\"}"));

    assert_eq!(chunks[2].content(), Some("done"));
}

#[tokio::test]
async fn test_stream_rejects_fragment_with_two_tool_calls() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(sse_response(&[json!({
            "id": "stream-1",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"id": "a", "function": {"name": "f", "arguments": "{}"}},
                {"id": "b", "function": {"name": "g", "arguments": "{}"}}
            ]}}]
        })]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = ChatCompletionRequest::new(vec![ChatCompletionMessage::user("Hi")], true);
    let items: Vec<_> = client
        .chat()
        .create_stream(&request)
        .await
        .unwrap()
        .collect()
        .await;

    assert!(matches!(items.as_slice(), [Err(ZhinaoError::InvalidArgument { .. })]));
}

#[tokio::test]
async fn test_stream_error_status_is_mapped() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(error_response(404, "No such model"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = ChatCompletionRequest::new(vec![ChatCompletionMessage::user("Hi")], true);
    let err = client.chat().create_stream(&request).await.unwrap_err();

    assert!(matches!(err, ZhinaoError::NotFound { .. }));
}

#[tokio::test]
async fn test_chat_model_stream_aggregates() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(sse_response(&[
            text_chunk("Bon"),
            text_chunk("jour"),
            json!({
                "id": "stream-1",
                "choices": [{"index": 0, "delta": {"content": ""}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
            }),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = aggregate(client.chat_model().stream(Prompt::user("Hi")))
        .await
        .unwrap();

    assert_eq!(response.content(), Some("Bonjour"));
    assert_eq!(response.metadata.usage.total_tokens, 5);
    let generation = response.result().unwrap();
    assert_eq!(generation.metadata.finish_reason.as_deref(), Some("STOP"));
}
