mod harness;

use axum::http::StatusCode;
use conduit_llm::{
    AuditOutcome, CompletionRequest, CompletionResult, CompletionUpdate, Message, Prompt, ToolDeclaration,
};
use futures_util::StreamExt;
use harness::gateway::TestGateway;
use harness::mock_upstream::{MockUpstream, Reply};

fn request() -> CompletionRequest {
    CompletionRequest::new(
        "gemini-pro",
        Prompt::new(vec![Message::system("Be brief."), Message::user("Hello")]),
    )
}

fn text_frame(text: &str) -> String {
    serde_json::json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]}).to_string()
}

#[tokio::test]
async fn blocking_completion_returns_text() {
    let mock = MockUpstream::start(Reply::Json(
        StatusCode::OK,
        serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hi there"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2}
        }),
    ))
    .await
    .unwrap();
    let mut test = TestGateway::gemini(&mock);

    let result = test.gateway.complete(&request(), "gemini").await.unwrap();
    assert_eq!(result, CompletionResult::Text("Hi there".to_owned()));

    let captured = mock.only_request();
    assert_eq!(captured.path, "/v1beta/models/gemini-pro:generateContent");
    assert_eq!(captured.query.as_deref(), Some("key=test-key"));
    assert_eq!(captured.authorization, None);
    assert_eq!(
        captured.body,
        serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": "Hello"}]}],
            "systemInstruction": {"parts": [{"text": "Be brief."}]}
        })
    );

    let record = test.next_audit().await;
    assert_eq!(record.outcome, AuditOutcome::Success);
    assert_eq!(record.provider_tag, "gemini");
    assert_eq!(record.prompt_tokens, 4);
    assert_eq!(record.completion_tokens, 2);
    assert!(!record.streaming);
}

#[tokio::test]
async fn streaming_completion_yields_deltas_in_order() {
    let first = text_frame("Hello");
    let second = text_frame(" world");
    let mock = MockUpstream::start(Reply::Chunks(vec![
        "[".to_owned(),
        // split one element across two reads
        format!("{first},\r\n{}", &second[..10]),
        second[10..].to_owned(),
        "]".to_owned(),
    ]))
    .await
    .unwrap();
    let mut test = TestGateway::gemini(&mock);

    let updates: Vec<_> = test
        .gateway
        .complete_stream(&request(), "gemini")
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(
        updates,
        [
            CompletionUpdate::Text("Hello".to_owned()),
            CompletionUpdate::Text(" world".to_owned()),
            CompletionUpdate::Finished(CompletionResult::Text("Hello world".to_owned())),
        ]
    );
    assert_eq!(
        mock.only_request().path,
        "/v1beta/models/gemini-pro:streamGenerateContent"
    );

    let record = test.next_audit().await;
    assert_eq!(record.outcome, AuditOutcome::Success);
    assert!(record.streaming);
    assert!(record.response_bytes > 0);
}

#[tokio::test]
async fn streamed_function_call_is_accumulated() {
    let mock = MockUpstream::start(Reply::Chunks(vec![
        format!("[{}", text_frame("Checking.")),
        r#",{"candidates":[{"content":{"parts":[{"functionCall":{"name":"get_weather"}}]}}]}"#.to_owned(),
        r#",{"candidates":[{"content":{"parts":[{"functionCall":{"args":{"location":"Paris","days":3}}}]}}]}]"#
            .to_owned(),
    ]))
    .await
    .unwrap();
    let test = TestGateway::gemini(&mock);

    let prompt = Prompt::new(vec![Message::user("Weather in Paris?")]).with_tools(vec![ToolDeclaration {
        name: "get_weather".to_owned(),
        description: "Current weather".to_owned(),
        parameters: Some(serde_json::json!({"type": "object"})),
    }]);
    let request = CompletionRequest::new("gemini-1.5-pro", prompt).streaming(true);

    let result = test.gateway.complete(&request, "gemini").await.unwrap();
    let invocation = result.as_tool_invocation().expect("tool invocation");

    assert_eq!(invocation.tool_name, "get_weather");
    assert_eq!(invocation.parameter("location").as_deref(), Some("Paris"));
    assert_eq!(invocation.parameter("days").as_deref(), Some("3"));
    assert_eq!(
        invocation.to_json().unwrap(),
        r#"{"tool_name":"get_weather","tool_id":"get_weather","arguments":{"location":"Paris","days":3}}"#
    );

    let body = mock.only_request().body;
    assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "get_weather");
}

#[tokio::test]
async fn blocking_and_streaming_agree() {
    let blocking_mock = MockUpstream::start(Reply::Json(
        StatusCode::OK,
        serde_json::json!({"candidates": [{"content": {"parts": [{"text": "Same answer"}]}}]}),
    ))
    .await
    .unwrap();
    let streaming_mock = MockUpstream::start(Reply::Chunks(vec![
        "[".to_owned(),
        text_frame("Same"),
        ",".to_owned(),
        text_frame(" answer"),
        "]".to_owned(),
    ]))
    .await
    .unwrap();

    let blocking = TestGateway::gemini(&blocking_mock)
        .gateway
        .complete(&request(), "gemini")
        .await
        .unwrap();
    let streaming = TestGateway::gemini(&streaming_mock)
        .gateway
        .complete(&request().streaming(true), "gemini")
        .await
        .unwrap();

    assert_eq!(blocking, streaming);
}
