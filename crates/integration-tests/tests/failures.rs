mod harness;

use axum::http::StatusCode;
use conduit_llm::{AuditOutcome, CompletionRequest, CompletionUpdate, LlmError, Message, Prompt};
use futures_util::StreamExt;
use harness::gateway::TestGateway;
use harness::mock_upstream::{MockUpstream, Reply};

fn request() -> CompletionRequest {
    CompletionRequest::new("gemini-pro", Prompt::new(vec![Message::user("Hello")]))
}

const FRAME: &str = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#;

#[tokio::test]
async fn upstream_status_is_carried_in_error() {
    let mock = MockUpstream::start(Reply::Json(
        StatusCode::TOO_MANY_REQUESTS,
        serde_json::json!({"error": {"code": 429, "message": "quota exhausted"}}),
    ))
    .await
    .unwrap();
    let mut test = TestGateway::gemini(&mock);

    let err = test.gateway.complete(&request(), "gemini").await.unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("quota exhausted"));
    assert!(!err.to_string().contains("test-key"));

    assert_eq!(
        test.next_audit().await.outcome,
        AuditOutcome::Failure {
            kind: "completion_failed",
            status: Some(429)
        }
    );
}

#[tokio::test]
async fn error_object_in_success_body_fails_extraction() {
    let mock = MockUpstream::start(Reply::Json(
        StatusCode::OK,
        serde_json::json!({"error": {"code": 400, "message": "bad prompt", "status": "INVALID_ARGUMENT"}}),
    ))
    .await
    .unwrap();
    let test = TestGateway::gemini(&mock);

    let err = test.gateway.complete(&request(), "gemini").await.unwrap_err();

    assert!(matches!(
        err,
        LlmError::CompletionFailed { status: Some(400), ref message, .. } if message == "INVALID_ARGUMENT: bad prompt"
    ));
}

#[tokio::test]
async fn clean_close_before_array_end_is_truncated() {
    let mock = MockUpstream::start(Reply::Chunks(vec!["[".to_owned(), format!("{FRAME},")]))
        .await
        .unwrap();
    let mut test = TestGateway::gemini(&mock);

    let mut stream = test
        .gateway
        .complete_stream(&request().streaming(true), "gemini")
        .unwrap();

    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        CompletionUpdate::Text("Hel".to_owned())
    );
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, LlmError::TruncatedStream { received_bytes, .. } if received_bytes > 0));
    assert!(stream.next().await.is_none());

    assert_eq!(
        test.next_audit().await.outcome,
        AuditOutcome::Failure {
            kind: "truncated_stream",
            status: None
        }
    );
}

#[tokio::test]
async fn hugging_face_close_mid_frame_is_truncated() {
    let mock = MockUpstream::start(Reply::Chunks(vec![
        "data:{\"token\":{\"id\":1,\"text\":\"Hi\",\"special\":false}}\n\n".to_owned(),
        "data:{\"token\":{\"text\":\"the".to_owned(),
    ]))
    .await
    .unwrap();
    let mut test = TestGateway::hugging_face(&mock);
    let request = CompletionRequest::new("StableBeluga2", Prompt::new(vec![Message::user("Hello")])).streaming(true);

    let err = test.gateway.complete(&request, "tgi").await.unwrap_err();

    assert!(matches!(err, LlmError::TruncatedStream { received_bytes, .. } if received_bytes > 0), "got {err:?}");
    assert_eq!(
        test.next_audit().await.outcome,
        AuditOutcome::Failure {
            kind: "truncated_stream",
            status: None
        }
    );
}

#[tokio::test]
async fn stalled_error_body_is_bounded_by_timeout() {
    let mock = MockUpstream::start(Reply::StalledError(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"error":"#.to_owned(),
    ))
    .await
    .unwrap();
    let test = TestGateway::gemini(&mock);

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        test.gateway.complete(&request().streaming(true), "gemini"),
    )
    .await
    .expect("call gives up after the provider timeout");
    let err = outcome.unwrap_err();

    assert!(matches!(err, LlmError::CompletionFailed { status: Some(500), .. }), "got {err:?}");
}

#[tokio::test]
async fn aborted_body_is_truncated() {
    let mock = MockUpstream::start(Reply::Broken(vec!["[".to_owned(), FRAME.to_owned()]))
        .await
        .unwrap();
    let test = TestGateway::gemini(&mock);

    let err = test
        .gateway
        .complete(&request().streaming(true), "gemini")
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::TruncatedStream { .. }), "got {err:?}");
}

#[tokio::test]
async fn stalled_stream_hits_idle_timeout() {
    let mock = MockUpstream::start(Reply::Stall(vec!["[".to_owned()]))
        .await
        .unwrap();
    let test = TestGateway::gemini(&mock);

    let err = test
        .gateway
        .complete(&request().streaming(true), "gemini")
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::CompletionFailed { status: None, .. }), "got {err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn malformed_frame_is_reported() {
    let mock = MockUpstream::start(Reply::Chunks(vec![r#"[{"candidates": 7}]"#.to_owned()]))
        .await
        .unwrap();
    let test = TestGateway::gemini(&mock);

    let err = test
        .gateway
        .complete(&request().streaming(true), "gemini")
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::MalformedFrame { ref frame, .. } if frame.contains("candidates")));
}

#[tokio::test]
async fn stream_is_lazy_and_drop_is_audited() {
    let mock = MockUpstream::start(Reply::Chunks(vec![format!("[{FRAME}]")]))
        .await
        .unwrap();
    let mut test = TestGateway::gemini(&mock);

    let stream = test
        .gateway
        .complete_stream(&request().streaming(true), "gemini")
        .unwrap();
    assert!(mock.requests().is_empty());

    drop(stream);

    assert_eq!(test.next_audit().await.outcome, AuditOutcome::Cancelled);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn model_outside_allow_list_never_reaches_upstream() {
    let mock = MockUpstream::start(Reply::Json(StatusCode::OK, serde_json::json!({})))
        .await
        .unwrap();
    let test = TestGateway::from_toml(
        indoc::indoc! {r#"
            [llm.providers.gemini]
            type = "gemini"
            base_url = "{url}"

            [llm.providers.gemini.models]
            exclude = ["gemini-pro"]
        "#},
        &mock.gemini_base_url(),
    );

    let err = test.gateway.complete(&request(), "gemini").await.unwrap_err();

    assert!(matches!(err, LlmError::UnsupportedModel { .. }));
    assert!(mock.requests().is_empty());
}
