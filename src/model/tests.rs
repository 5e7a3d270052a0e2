use super::*;
use crate::auth::ApiKeyAuth;
use crate::mocks::{fixtures, MockResponse, MockTransport};
use crate::resilience::RetryConfig;
use crate::types::chat::Usage;
use crate::types::tools::{FunctionDefinition, FunctionTool};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn chat_model(transport: &Arc<MockTransport>, options: ZhinaoChatOptions) -> ZhinaoChatModel {
    let service = ChatService::new(
        transport.clone(),
        Arc::new(ApiKeyAuth::from_string("test-key")),
        "/v1/chat/completions",
    );
    ZhinaoChatModel::new(Arc::new(service), options)
        .with_retry_policy(RetryPolicy::new(RetryConfig::no_retries()))
}

fn weather_tool(return_direct: bool) -> Arc<dyn ToolCallback> {
    let definition = ToolDefinition::new(
        "getWeather",
        "Current weather for a location",
        json!({"type": "object", "properties": {"loc": {"type": "string"}}}),
    );
    Arc::new(
        FunctionToolCallback::new(definition, |arguments: &str, _: &ToolContext| {
            let args: serde_json::Value = serde_json::from_str(arguments)?;
            Ok(format!("Sunny in {}", args["loc"].as_str().unwrap_or("nowhere")))
        })
        .return_direct(return_direct),
    )
}

fn sse_body(payloads: &[String]) -> MockResponse {
    let mut frames: Vec<&str> = payloads.iter().map(String::as_str).collect();
    frames.push("[DONE]");
    MockResponse::sse(&frames)
}

#[test]
fn test_create_request_maps_messages_in_order() {
    let transport = Arc::new(MockTransport::new());
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let prompt = model
        .build_request_prompt(Prompt::new(vec![
            PromptMessage::system("Be brief."),
            PromptMessage::user("Hi"),
            PromptMessage::assistant("Hello!"),
        ]))
        .unwrap();
    let request = model.create_request(&prompt, false).unwrap();

    let roles: Vec<Option<Role>> = request.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Some(Role::System), Some(Role::User), Some(Role::Assistant)]
    );
    assert_eq!(request.messages[2].content.as_deref(), Some("Hello!"));
    assert_eq!(request.messages[2].tool_calls, None);
    assert_eq!(request.model, "360gpt-pro");
    assert_eq!(request.temperature, Some(0.7));
    assert!(!request.stream);
}

#[test]
fn test_create_request_applies_runtime_options() {
    let transport = Arc::new(MockTransport::new());
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let options = ZhinaoChatOptions::default()
        .model("360gpt2-pro")
        .max_tokens(256)
        .top_k(5);
    let prompt = model
        .build_request_prompt(Prompt::user("Hi").with_options(options))
        .unwrap();
    let request = model.create_request(&prompt, true).unwrap();

    assert_eq!(request.model, "360gpt2-pro");
    assert_eq!(request.max_tokens, Some(256));
    assert_eq!(request.top_k, Some(5));
    assert_eq!(request.temperature, Some(0.7));
    assert!(request.stream);
}

#[test]
fn test_create_request_expands_tool_responses() {
    let transport = Arc::new(MockTransport::new());
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let assistant = AssistantMessage::with_tool_calls(
        "",
        vec![
            AssistantToolCall::function("t1", "getWeather", "{\"loc\":\"Paris\"}"),
            AssistantToolCall::function("t2", "getWeather", "{\"loc\":\"Rome\"}"),
        ],
    );
    let prompt = Prompt::new(vec![
        PromptMessage::user("Weather?"),
        PromptMessage::Assistant(assistant),
        PromptMessage::ToolResponse(vec![
            ToolResponse::new(Some("t1".to_string()), "getWeather", "Sunny"),
            ToolResponse::new(Some("t2".to_string()), "getWeather", "Rainy"),
        ]),
    ]);

    let request = model.create_request(&prompt, false).unwrap();

    assert_eq!(request.messages.len(), 4);
    assert_eq!(request.messages[1].tool_calls().len(), 2);
    assert_eq!(request.messages[2].role, Some(Role::Tool));
    assert_eq!(request.messages[2].tool_call_id.as_deref(), Some("t1"));
    assert_eq!(request.messages[3].tool_name.as_deref(), Some("getWeather"));
    assert_eq!(request.messages[3].content.as_deref(), Some("Rainy"));
}

#[test]
fn test_create_request_rejects_tool_response_without_id() {
    let transport = Arc::new(MockTransport::new());
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let prompt = Prompt::new(vec![PromptMessage::ToolResponse(vec![ToolResponse::new(
        None,
        "getWeather",
        "Sunny",
    )])]);

    let err = model.create_request(&prompt, false).unwrap_err();
    assert!(matches!(err, ZhinaoError::InvalidArgument { .. }));
    assert!(err.to_string().contains("must have an id"));
}

#[test]
fn test_create_request_rejects_unsupported_message() {
    let transport = Arc::new(MockTransport::new());
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let prompt = Prompt::new(vec![PromptMessage::Other {
        kind: "function".to_string(),
        text: "x".to_string(),
    }]);

    let err = model.create_request(&prompt, false).unwrap_err();
    assert!(err.to_string().contains("Unsupported message type: function"));
}

#[test]
fn test_create_request_adds_tool_definitions_by_name() {
    let transport = Arc::new(MockTransport::new());
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let stale = FunctionTool::new(FunctionDefinition::new(
        "getWeather",
        "stale description",
        json!({}),
    ));
    let other = FunctionTool::new(FunctionDefinition::new("getTime", "Current time", json!({})));
    let options = ZhinaoChatOptions::default()
        .tools(vec![stale, other])
        .tool_callbacks(vec![weather_tool(false)]);

    let prompt = model
        .build_request_prompt(Prompt::user("Hi").with_options(options))
        .unwrap();
    let request = model.create_request(&prompt, false).unwrap();

    let tools = request.tools.unwrap();
    let names: Vec<&str> = tools.iter().map(FunctionTool::name).collect();
    assert_eq!(names, vec!["getWeather", "getTime"]);
    assert_eq!(
        tools[0].function.description.as_deref(),
        Some("Current weather for a location")
    );
}

#[test]
fn test_build_request_prompt_rejects_duplicate_callbacks() {
    let transport = Arc::new(MockTransport::new());
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let options =
        ZhinaoChatOptions::default().tool_callbacks(vec![weather_tool(false), weather_tool(true)]);
    let err = model
        .build_request_prompt(Prompt::user("Hi").with_options(options))
        .unwrap_err();
    assert!(matches!(err, ZhinaoError::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_call_returns_completion() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_json(&fixtures::completion("Hello from Zhinao"));
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let response = model.call(Prompt::user("Hi")).await.unwrap();

    assert_eq!(response.content(), Some("Hello from Zhinao"));
    assert_eq!(response.metadata.id, "mock-completion");
    assert_eq!(response.metadata.usage, TokenUsage::new(10, 5, 15));
    let generation = response.result().unwrap();
    assert_eq!(generation.output.properties.role, "ASSISTANT");
    assert_eq!(generation.output.properties.finish_reason, "STOP");

    let body = transport.last_request().unwrap().json().unwrap();
    assert_eq!(body["stream"], json!(false));
    assert_eq!(body["messages"][0]["content"], json!("Hi"));
}

#[tokio::test]
async fn test_call_empty_body_yields_empty_response() {
    let transport = Arc::new(MockTransport::new());
    transport.queue(MockResponse::raw(200, Vec::new()));
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let response = model.call(Prompt::user("Hi")).await.unwrap();
    assert!(response.generations.is_empty());
}

#[tokio::test]
async fn test_call_retries_transient_errors() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_error(503, "overloaded");
    transport.queue_json(&fixtures::completion("after retry"));

    let service = ChatService::new(
        transport.clone(),
        Arc::new(ApiKeyAuth::from_string("test-key")),
        "/v1/chat/completions",
    );
    let retry = RetryConfig::new()
        .max_retries(2)
        .initial_delay(Duration::from_millis(1))
        .jitter(false);
    let model = ZhinaoChatModel::new(Arc::new(service), ZhinaoChatOptions::defaults())
        .with_retry_policy(RetryPolicy::new(retry));

    let response = model.call(Prompt::user("Hi")).await.unwrap();
    assert_eq!(response.content(), Some("after retry"));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn test_call_does_not_retry_client_errors() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_error(401, "bad key");
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let err = model.call(Prompt::user("Hi")).await.unwrap_err();
    assert!(matches!(err, ZhinaoError::Authentication { .. }));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_call_runs_tool_loop_with_cumulative_usage() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_json(&fixtures::tool_call_completion(
        "t1",
        "getWeather",
        "{\"loc\":\"Paris\"}",
    ));
    transport.queue_json(&fixtures::completion("It is sunny in Paris."));
    let options = ZhinaoChatOptions::defaults().tool_callbacks(vec![weather_tool(false)]);
    let model = chat_model(&transport, options);

    let response = model.call(Prompt::user("Weather in Paris?")).await.unwrap();

    assert_eq!(response.content(), Some("It is sunny in Paris."));
    assert_eq!(response.metadata.usage, TokenUsage::new(30, 13, 43));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let first = requests[0].json().unwrap();
    assert_eq!(first["tools"][0]["function"]["name"], json!("getWeather"));

    let second = requests[1].json().unwrap();
    let messages = second["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["tool_calls"][0]["id"], json!("t1"));
    assert_eq!(messages[2]["role"], json!("tool"));
    assert_eq!(messages[2]["tool_call_id"], json!("t1"));
    assert_eq!(messages[2]["content"], json!("Sunny in Paris"));
}

#[tokio::test]
async fn test_call_returns_tool_output_directly() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_json(&fixtures::tool_call_completion(
        "t1",
        "getWeather",
        "{\"loc\":\"Rome\"}",
    ));
    let options = ZhinaoChatOptions::defaults().tool_callbacks(vec![weather_tool(true)]);
    let model = chat_model(&transport, options);

    let response = model.call(Prompt::user("Weather in Rome?")).await.unwrap();

    assert_eq!(transport.request_count(), 1);
    assert_eq!(response.content(), Some("Sunny in Rome"));
    let metadata = &response.result().unwrap().metadata;
    assert_eq!(metadata.finish_reason.as_deref(), Some("returnDirect"));
    assert_eq!(metadata.tool_id.as_deref(), Some("t1"));
    assert_eq!(metadata.tool_name.as_deref(), Some("getWeather"));
}

#[tokio::test]
async fn test_call_skips_tools_when_internal_execution_disabled() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_json(&fixtures::tool_call_completion("t1", "getWeather", "{}"));
    let options = ZhinaoChatOptions::defaults()
        .tool_callbacks(vec![weather_tool(false)])
        .internal_tool_execution_enabled(false);
    let model = chat_model(&transport, options);

    let response = model.call(Prompt::user("Weather?")).await.unwrap();

    assert_eq!(transport.request_count(), 1);
    assert!(response.has_tool_calls());
}

#[tokio::test]
async fn test_call_fails_on_unknown_tool() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_json(&fixtures::tool_call_completion("t1", "getTime", "{}"));
    let options = ZhinaoChatOptions::defaults().tool_callbacks(vec![weather_tool(false)]);
    let model = chat_model(&transport, options);

    let err = model.call(Prompt::user("Time?")).await.unwrap_err();
    assert!(err.to_string().contains("getTime"));
}

#[tokio::test]
async fn test_stream_yields_text_chunks() {
    let transport = Arc::new(MockTransport::new());
    transport.queue(sse_body(&[
        fixtures::text_chunk("s1", "Hel"),
        fixtures::text_chunk("s1", "lo"),
        fixtures::stop_chunk("s1", Usage::new(4, 2, 6)),
    ]));
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let responses: Vec<ChatResponse> = model
        .stream(Prompt::user("Hi"))
        .map(Result::unwrap)
        .collect()
        .await;

    let contents: Vec<&str> = responses.iter().filter_map(ChatResponse::content).collect();
    assert_eq!(contents, vec!["Hel", "lo", ""]);
    assert_eq!(responses[2].metadata.usage, TokenUsage::new(4, 2, 6));
    assert!(responses
        .iter()
        .all(|r| r.result().unwrap().output.properties.role == "ASSISTANT"));

    let body = transport.last_request().unwrap();
    assert_eq!(body.json().unwrap()["stream"], json!(true));
    assert_eq!(
        body.headers.get("accept").map(String::as_str),
        Some("text/event-stream")
    );
}

#[tokio::test]
async fn test_stream_aggregates_to_one_response() {
    let transport = Arc::new(MockTransport::new());
    transport.queue(sse_body(&[
        fixtures::text_chunk("s1", "Bon"),
        fixtures::text_chunk("s1", "jour"),
        fixtures::stop_chunk("s1", Usage::new(4, 2, 6)),
    ]));
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let response = aggregate(model.stream(Prompt::user("Hi"))).await.unwrap();
    assert_eq!(response.content(), Some("Bonjour"));
    assert_eq!(response.metadata.id, "s1");
}

#[tokio::test]
async fn test_stream_runs_tool_loop() {
    let transport = Arc::new(MockTransport::new());
    transport.queue(sse_body(&fixtures::tool_call_chunks(
        "s1",
        "t1",
        "getWeather",
        "{\"loc\":",
        "\"Paris\"}",
    )));
    transport.queue(sse_body(&[
        fixtures::text_chunk("s2", "Sunny."),
        fixtures::stop_chunk("s2", Usage::new(30, 3, 33)),
    ]));
    let options = ZhinaoChatOptions::defaults().tool_callbacks(vec![weather_tool(false)]);
    let model = chat_model(&transport, options);

    let responses: Vec<ChatResponse> = model
        .stream(Prompt::user("Weather in Paris?"))
        .map(Result::unwrap)
        .collect()
        .await;

    let contents: Vec<&str> = responses.iter().filter_map(ChatResponse::content).collect();
    assert_eq!(contents, vec!["Sunny.", ""]);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let second = requests[1].json().unwrap();
    let messages = second["messages"].as_array().unwrap();
    assert_eq!(
        messages[1]["tool_calls"][0]["function"]["arguments"],
        json!("{\"loc\":\"Paris\"}")
    );
    assert_eq!(messages[2]["content"], json!("Sunny in Paris"));
}

#[tokio::test]
async fn test_stream_returns_tool_output_directly() {
    let transport = Arc::new(MockTransport::new());
    transport.queue(sse_body(&fixtures::tool_call_chunks(
        "s1",
        "t1",
        "getWeather",
        "{\"loc\":",
        "\"Oslo\"}",
    )));
    let options = ZhinaoChatOptions::defaults().tool_callbacks(vec![weather_tool(true)]);
    let model = chat_model(&transport, options);

    let responses: Vec<ChatResponse> = model
        .stream(Prompt::user("Weather in Oslo?"))
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].content(), Some("Sunny in Oslo"));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_stream_surfaces_usage_errors_as_items() {
    let transport = Arc::new(MockTransport::new());
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let prompt = Prompt::new(vec![PromptMessage::Other {
        kind: "function".to_string(),
        text: String::new(),
    }]);
    let items: Vec<ZhinaoResult<ChatResponse>> = model.stream(prompt).collect().await;

    assert_eq!(items.len(), 1);
    assert!(items[0].is_err());
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_stream_error_status() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_error(429, "slow down");
    let model = chat_model(&transport, ZhinaoChatOptions::defaults());

    let items: Vec<ZhinaoResult<ChatResponse>> = model.stream(Prompt::user("Hi")).collect().await;
    assert!(matches!(items.as_slice(), [Err(ZhinaoError::RateLimit { .. })]));
}
