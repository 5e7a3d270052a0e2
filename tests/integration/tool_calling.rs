//! Integration tests for the tool execution loop

use super::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zhinao_client::prelude::*;

fn tool_call_body() -> serde_json::Value {
    json!({
        "id": "cmpl-tool",
        "model": "360gpt-pro",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "id": "call-1",
                    "type": "function",
                    "function": {"name": "getWeather", "arguments": "{\"loc\":\"Beijing\"}"}
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 8, "total_tokens": 28}
    })
}

fn answer_body() -> serde_json::Value {
    json!({
        "id": "cmpl-answer",
        "model": "360gpt-pro",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Beijing is sunny."},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 40, "completion_tokens": 6, "total_tokens": 46}
    })
}

fn weather_tool(calls: Arc<AtomicUsize>) -> Arc<dyn ToolCallback> {
    Arc::new(FunctionToolCallback::new(
        ToolDefinition::new(
            "getWeather",
            "Current weather",
            json!({"type": "object", "properties": {"loc": {"type": "string"}}}),
        ),
        move |arguments: &str, context: &ToolContext| {
            calls.fetch_add(1, Ordering::SeqCst);
            let args: serde_json::Value = serde_json::from_str(arguments)?;
            let unit = context.get("unit").and_then(|u| u.as_str()).unwrap_or("C");
            Ok(format!("{}: 25{unit}", args["loc"].as_str().unwrap_or_default()))
        },
    ))
}

async fn sent_bodies(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.body_json().unwrap())
        .collect()
}

#[tokio::test]
async fn test_call_executes_tool_and_continues() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    completions_mock()
        .respond_with(ResponseTemplate::new(200).set_body_json(answer_body()))
        .mount(&server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let options = ZhinaoChatOptions::default()
        .tool_callbacks(vec![weather_tool(calls.clone())])
        .tool_context([("unit".to_string(), json!("F"))]);
    let client = client_for(&server);

    let response = client
        .chat_model()
        .call(Prompt::user("Weather in Beijing?").with_options(options))
        .await
        .unwrap();

    assert_eq!(response.content(), Some("Beijing is sunny."));
    assert_eq!(response.metadata.usage.prompt_tokens, 60);
    assert_eq!(response.metadata.usage.completion_tokens, 14);
    assert_eq!(response.metadata.usage.total_tokens, 74);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let bodies = sent_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["tools"][0]["function"]["name"], json!("getWeather"));

    let messages = bodies[1]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], json!("user"));
    assert_eq!(messages[1]["role"], json!("assistant"));
    assert_eq!(messages[1]["tool_calls"][0]["id"], json!("call-1"));
    assert_eq!(messages[2]["role"], json!("tool"));
    assert_eq!(messages[2]["tool_call_id"], json!("call-1"));
    assert_eq!(messages[2]["content"], json!("Beijing: 25F"));
}

#[tokio::test]
async fn test_stream_executes_tool_and_continues() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(sse_response(&[
            json!({"id": "s1", "choices": [{"index": 0, "delta": {"role": "assistant", "tool_calls": [
                {"id": "call-1", "type": "function", "function": {"name": "getWeather", "arguments": "{\"loc\":"}}
            ]}}]}),
            json!({"id": "s1", "choices": [{"index": 0, "delta": {"tool_calls": [
                {"function": {"arguments": "\"Beijing\"}"}}
            ]}, "finish_reason": "tool_calls"}]}),
        ]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    completions_mock()
        .respond_with(sse_response(&[
            json!({"id": "s2", "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Sunny"}}]}),
            json!({"id": "s2", "choices": [{"index": 0, "delta": {"content": "."}, "finish_reason": "stop"}]}),
        ]))
        .mount(&server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let client = client_builder(&server)
        .default_options(ZhinaoChatOptions::defaults().tool_callbacks(vec![weather_tool(calls.clone())]))
        .build()
        .unwrap();

    let contents: Vec<String> = client
        .chat_model()
        .stream(Prompt::user("Weather in Beijing?"))
        .map(|r| r.unwrap().content().unwrap_or_default().to_string())
        .collect()
        .await;

    assert_eq!(contents, vec!["Sunny".to_string(), ".".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let bodies = sent_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies[1]["messages"][1]["tool_calls"][0]["function"]["arguments"],
        json!("{\"loc\":\"Beijing\"}")
    );
    assert_eq!(bodies[1]["messages"][2]["content"], json!("Beijing: 25C"));
}

#[tokio::test]
async fn test_tool_calls_returned_when_execution_disabled() {
    let server = setup_mock_server().await;
    completions_mock()
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_body()))
        .expect(1)
        .mount(&server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let options = ZhinaoChatOptions::default()
        .tool_callbacks(vec![weather_tool(calls.clone())])
        .internal_tool_execution_enabled(false);
    let client = client_for(&server);

    let response = client
        .chat_model()
        .call(Prompt::user("Weather?").with_options(options))
        .await
        .unwrap();

    assert!(response.has_tool_calls());
    let call = &response.result().unwrap().output.tool_calls[0];
    assert_eq!(call.name, "getWeather");
    assert_eq!(call.arguments, "{\"loc\":\"Beijing\"}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
