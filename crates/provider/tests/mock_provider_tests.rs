//! Mock Provider Tests
//!
//! The agent loop only sees `dyn Provider`, so the trait must stay mockable.

use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use warden_provider::{
    ChatParams, ChatResponse, Message, Provider, ProviderError, ToolCall, ToolSignature,
};

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

#[tokio::test]
async fn test_mock_provider_chat_returns_success() {
    let mut mock = MockProvider::new();
    mock.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("Hello from mock!")));

    let response = mock.chat(ChatParams::default()).await.unwrap();

    assert_eq!(response.content, Some("Hello from mock!".to_string()));
    assert!(!response.has_tool_calls());
}

#[tokio::test]
async fn test_mock_provider_chat_returns_error() {
    let mut mock = MockProvider::new();
    mock.expect_chat()
        .times(1)
        .returning(|_| Err(ProviderError::Api("Mock API error".to_string())));

    match mock.chat(ChatParams::default()).await {
        Err(ProviderError::Api(msg)) => assert_eq!(msg, "Mock API error"),
        other => panic!("Expected Api error, got {:?}", other.map(|r| r.content)),
    }
}

#[tokio::test]
async fn test_mock_provider_sees_tool_signatures() {
    let mut mock = MockProvider::new();
    mock.expect_chat()
        .times(1)
        .withf(|params| {
            params.messages.len() == 1
                && params.messages[0].role == "user"
                && params.tools.iter().any(|t| t.name == "echo")
        })
        .returning(|_| {
            Ok(ChatResponse::tool_calls(
                Some("I'll help you with that".to_string()),
                vec![ToolCall::new("mock_call_1", "echo", json!({"text": "hi"}))],
            ))
        });

    let params = ChatParams {
        messages: vec![Message::user("say hi")],
        tools: vec![ToolSignature::new(
            "echo",
            "Echo text back",
            json!({"type": "object", "properties": {"text": {"type": "string"}}}),
        )],
        ..Default::default()
    };
    let response = mock.chat(params).await.unwrap();

    assert!(response.has_tool_calls());
    assert_eq!(response.tool_calls[0].id, "mock_call_1");
    assert_eq!(response.tool_calls[0].arguments["text"], "hi");
}

#[tokio::test]
async fn test_mock_provider_sequence_of_turns() {
    let mut mock = MockProvider::new();
    let mut seq = mockall::Sequence::new();

    mock.expect_chat()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| {
            Ok(ChatResponse::tool_calls(
                None,
                vec![ToolCall::new("c1", "echo", json!({"text": "x"}))],
            ))
        });
    mock.expect_chat()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|params| params.messages.last().map(|m| m.role.as_str()) == Some("tool"))
        .returning(|_| Ok(ChatResponse::text("done")));

    let first = mock.chat(ChatParams::default()).await.unwrap();
    assert!(first.has_tool_calls());

    let params = ChatParams {
        messages: vec![Message::tool("c1", "echo", "x")],
        ..Default::default()
    };
    let second = mock.chat(params).await.unwrap();
    assert_eq!(second.content.as_deref(), Some("done"));
}

#[test]
fn test_mock_provider_metadata() {
    let mut mock = MockProvider::new();
    mock.expect_default_model()
        .returning(|| "mock-model".to_string());
    mock.expect_is_configured().returning(|| false);

    assert_eq!(mock.default_model(), "mock-model");
    assert!(!mock.is_configured());
}
