//! Tests for wire envelopes and the in-process transport

use serde_json::json;
use warden_bus::{
    ChatMessage, ClientMessage, ContextType, EventKind, ProtocolError, ServerMessage, Transport,
};

// ============================================================================
// Inbound parsing
// ============================================================================

#[test]
fn test_parse_chat_defaults() {
    let msg = ClientMessage::parse(r#"{"type":"chat","message_id":"m1","prompt":"hello"}"#)
        .expect("Should parse");

    match msg {
        ClientMessage::Chat(chat) => {
            assert_eq!(chat.message_id, "m1");
            assert_eq!(chat.prompt, "hello");
            assert!(chat.attachments.is_empty());
            assert_eq!(chat.context_type, ContextType::Normal);
            assert!(chat.task_mode.is_none());
        }
        other => panic!("Expected chat, got {:?}", other),
    }
}

#[test]
fn test_parse_chat_full() {
    let raw = json!({
        "type": "chat",
        "message_id": "m2",
        "prompt": "continue",
        "attachments": [{"path": "report.pdf"}],
        "context_type": "follow_up",
        "task_mode": "agent"
    })
    .to_string();

    let msg = ClientMessage::parse(&raw).unwrap();
    let ClientMessage::Chat(chat) = msg else {
        panic!("Expected chat");
    };
    assert_eq!(chat.context_type, ContextType::FollowUp);
    assert_eq!(chat.task_mode.as_deref(), Some("agent"));
    assert_eq!(chat.attachments, vec![json!({"path": "report.pdf"})]);
}

#[test]
fn test_parse_interrupt() {
    let msg = ClientMessage::parse(
        r#"{"type":"chat","message_id":"m3","context_type":"interrupt"}"#,
    )
    .unwrap();
    let ClientMessage::Chat(chat) = msg else {
        panic!("Expected chat");
    };
    assert_eq!(chat.context_type, ContextType::Interrupt);
    assert_eq!(chat.prompt, "");
}

#[test]
fn test_parse_init_keeps_extra_fields() {
    let msg = ClientMessage::parse(r#"{"type":"init","message_id":"i1","workspace":"/w"}"#)
        .unwrap();
    assert_eq!(msg.message_id(), "i1");
    let ClientMessage::Init(init) = msg else {
        panic!("Expected init");
    };
    assert_eq!(init.extra.get("workspace"), Some(&json!("/w")));
}

#[test]
fn test_parse_unknown_type() {
    let err = ClientMessage::parse(r#"{"type":"upload","message_id":"x"}"#).unwrap_err();
    match err {
        ProtocolError::UnknownType(kind) => assert_eq!(kind, "upload"),
        other => panic!("Expected UnknownType, got {:?}", other),
    }
}

#[test]
fn test_parse_missing_type() {
    let err = ClientMessage::parse(r#"{"message_id":"x"}"#).unwrap_err();
    assert!(matches!(err, ProtocolError::MissingType));
}

#[test]
fn test_parse_invalid_json() {
    let err = ClientMessage::parse("{not json").unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn test_parse_bad_context_type() {
    let err =
        ClientMessage::parse(r#"{"type":"chat","message_id":"x","context_type":"sideways"}"#)
            .unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn test_chat_builder() {
    let chat = ChatMessage::new("m", "hi")
        .follow_up()
        .with_task_mode("chat")
        .with_attachment(json!("a.txt"));
    assert_eq!(chat.context_type, ContextType::FollowUp);
    assert_eq!(chat.attachments.len(), 1);
    assert_eq!(ChatMessage::new("m", "").interrupt().context_type, ContextType::Interrupt);
}

// ============================================================================
// Outbound shapes
// ============================================================================

#[test]
fn test_server_message_shapes() {
    let ack = serde_json::to_value(ServerMessage::ack("m1")).unwrap();
    assert_eq!(ack, json!({"type": "ack", "message_id": "m1"}));

    let event = serde_json::to_value(ServerMessage::event(
        EventKind::TaskStarted,
        Some("m1".to_string()),
        Some(99),
        json!({}),
    ))
    .unwrap();
    assert_eq!(event["type"], "event");
    assert_eq!(event["event"], "task_started");
    assert_eq!(event["task_id"], 99);

    let error = serde_json::to_value(ServerMessage::error("service exception", None)).unwrap();
    assert_eq!(error, json!({"type": "error", "message": "service exception"}));
}

// ============================================================================
// Transport
// ============================================================================

#[tokio::test]
async fn test_transport_pair_roundtrip() {
    let (mut server, mut client) = Transport::pair();

    client
        .send(&ClientMessage::Chat(ChatMessage::new("m1", "hi")))
        .expect("Should send");
    let frame = server.inbound.recv().await.expect("Should receive frame");
    assert!(frame.contains("\"type\":\"chat\""));

    assert!(server.outbound.send(ServerMessage::ack("m1")));
    assert_eq!(client.recv().await, Some(ServerMessage::ack("m1")));
}

#[tokio::test]
async fn test_dropping_client_sender_disconnects() {
    let (mut server, client) = Transport::pair();
    let (sender, _receiver) = client.split();

    sender.send_raw("frame").unwrap();
    drop(sender);

    assert_eq!(server.inbound.recv().await.as_deref(), Some("frame"));
    assert!(server.inbound.recv().await.is_none());
}

#[tokio::test]
async fn test_outbound_reports_closed_client() {
    let (server, client) = Transport::pair();
    drop(client);

    assert!(server.outbound.is_closed());
    assert!(!server.outbound.send(ServerMessage::ack("late")));
}
