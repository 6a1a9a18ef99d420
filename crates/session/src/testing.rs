use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use core_types::{
    ByteStream, IngestResponse, QueryRequest, RagTransport, TransportError, UploadFile,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Notify;

pub(crate) enum QueryReply {
    Chunks(Vec<Result<Vec<u8>, TransportError>>),
    /// Body chunks fed by the test while the stream is open.
    Live(mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>),
    Fail(TransportError),
}

/// In-memory backend that replays scripted replies and records every call.
/// With a gate, each call parks until the test releases it.
#[derive(Default)]
pub(crate) struct FakeTransport {
    gate: Option<Arc<Notify>>,
    replies: Mutex<VecDeque<QueryReply>>,
    upload_reply: Mutex<Option<Result<IngestResponse, TransportError>>>,
    pub(crate) requests: Mutex<Vec<QueryRequest>>,
    pub(crate) uploads: Mutex<Vec<UploadFile>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn push_chunks<I, C>(&self, chunks: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let chunks = chunks.into_iter().map(|chunk| Ok(chunk.into())).collect();
        self.replies.lock().push_back(QueryReply::Chunks(chunks));
    }

    pub(crate) fn push_reply(&self, reply: QueryReply) {
        self.replies.lock().push_back(reply);
    }

    pub(crate) fn set_upload_reply(&self, reply: Result<IngestResponse, TransportError>) {
        *self.upload_reply.lock() = Some(reply);
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

pub(crate) fn status_error(endpoint: &str, status: u16) -> TransportError {
    TransportError::Status {
        endpoint: endpoint.to_string(),
        status,
        body: "backend exploded".to_string(),
    }
}

pub(crate) fn ingest_ok(message: &str) -> IngestResponse {
    IngestResponse {
        message: message.to_string(),
        document_id: "doc-42".to_string(),
        chunks_processed: 7,
    }
}

/// Lets spawned tasks and fired timers run to their next suspension point.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[async_trait]
impl RagTransport for FakeTransport {
    async fn query_stream(&self, request: QueryRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().push(request);
        self.wait_for_gate().await;
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or(QueryReply::Chunks(Vec::new()));
        match reply {
            QueryReply::Chunks(chunks) => Ok(Box::pin(futures::stream::iter(chunks))),
            QueryReply::Live(receiver) => Ok(Box::pin(receiver)),
            QueryReply::Fail(err) => Err(err),
        }
    }

    async fn upload_file(&self, file: UploadFile) -> Result<IngestResponse, TransportError> {
        self.uploads.lock().push(file);
        self.wait_for_gate().await;
        self.upload_reply
            .lock()
            .take()
            .unwrap_or_else(|| Ok(ingest_ok("uploaded")))
    }

    async fn stats(&self) -> Result<Value, TransportError> {
        Ok(json!({"documents": 0}))
    }

    async fn health(&self) -> Result<Value, TransportError> {
        Ok(json!({"status": "ok"}))
    }
}
