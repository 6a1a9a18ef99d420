use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

mod error;

pub use error::{StreamParseError, TransportError, UploadError, ValidationError};

pub type MessageId = Uuid;
pub type NotificationId = Uuid;
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send + 'static>>;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/csv",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UiLanguage {
    ZhCn,
    EnUs,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub is_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_v4(),
            text: text.into(),
            is_user: true,
            sources: None,
        }
    }

    /// Empty assistant entry that a streamed response fills in place.
    pub fn placeholder() -> Self {
        Self {
            id: MessageId::new_v4(),
            text: String::new(),
            is_user: false,
            sources: Some(Vec::new()),
        }
    }

    /// Terminal assistant entry appended when a response could not be obtained.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_v4(),
            text: text.into(),
            is_user: false,
            sources: None,
        }
    }

    pub fn role(&self) -> HistoryRole {
        if self.is_user {
            HistoryRole::User
        } else {
            HistoryRole::Assistant
        }
    }

    pub fn to_history_turn(&self) -> HistoryTurn {
        HistoryTurn {
            role: self.role(),
            content: self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct HistoryTurn {
    pub role: HistoryRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
}

/// One line of the `/query-stream` response body.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamFrame {
    Sources(Vec<String>),
    Token(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    #[default]
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct IngestResponse {
    pub message: String,
    pub document_id: String,
    pub chunks_processed: u64,
}

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// HTTP surface of the RAG backend. Each method maps to one endpoint and
/// surfaces failures without retrying.
#[async_trait]
pub trait RagTransport: Send + Sync {
    /// Starts a streamed answer. The returned stream yields raw body chunks
    /// with no alignment to frame boundaries.
    async fn query_stream(&self, request: QueryRequest) -> Result<ByteStream, TransportError>;

    async fn upload_file(&self, file: UploadFile) -> Result<IngestResponse, TransportError>;

    async fn stats(&self) -> Result<Value, TransportError>;

    async fn health(&self) -> Result<Value, TransportError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_sources_and_token_frames() {
        let sources: StreamFrame =
            serde_json::from_str(r#"{"type":"sources","data":["doc1","doc2"]}"#).expect("sources");
        assert_eq!(
            sources,
            StreamFrame::Sources(vec!["doc1".to_string(), "doc2".to_string()])
        );

        let token: StreamFrame =
            serde_json::from_str(r#"{"type":"token","data":"Hel"}"#).expect("token");
        assert_eq!(token, StreamFrame::Token("Hel".to_string()));
    }

    #[test]
    fn rejects_unknown_frame_type() {
        let parsed = serde_json::from_str::<StreamFrame>(r#"{"type":"usage","data":3}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn history_turn_uses_backend_role_names() {
        let turn = Message::user("hi").to_history_turn();
        assert_eq!(
            serde_json::to_value(&turn).expect("json"),
            json!({"role": "user", "content": "hi"})
        );
        let turn = Message::placeholder().to_history_turn();
        assert_eq!(turn.role, HistoryRole::Assistant);
    }

    #[test]
    fn query_request_serializes_snake_case_history() {
        let request = QueryRequest {
            question: "what?".to_string(),
            conversation_history: vec![Message::user("earlier").to_history_turn()],
        };
        let value = serde_json::to_value(&request).expect("json");
        assert_eq!(value["question"], "what?");
        assert_eq!(value["conversation_history"][0]["content"], "earlier");
    }

    #[test]
    fn placeholder_starts_empty_with_sources() {
        let message = Message::placeholder();
        assert!(!message.is_user);
        assert!(message.text.is_empty());
        assert_eq!(message.sources, Some(Vec::new()));
        assert_eq!(Message::error("x").sources, None);
    }
}
