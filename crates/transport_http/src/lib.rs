use anyhow::{Context, Result};
use async_trait::async_trait;
use config::BackendConfig;
use core_types::{
    ByteStream, IngestResponse, QueryRequest, RagTransport, TransportError, UploadFile,
};
use futures::StreamExt;
use reqwest::Response;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

const QUERY_STREAM_PATH: &str = "/query-stream";
const INGEST_PATH: &str = "/ingest";
const STATS_PATH: &str = "/stats";
const HEALTH_PATH: &str = "/";

/// reqwest-backed client for the RAG backend.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(backend: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(backend.connect_timeout())
            .build()
            .context("failed to build http client")?;
        Ok(Self::with_client(client, &backend.base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let endpoint = self.endpoint(path);
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|err| network_error(&endpoint, err))?;
        let response = ensure_success(&endpoint, response).await?;
        decode_json(&endpoint, response).await
    }
}

#[async_trait]
impl RagTransport for HttpTransport {
    async fn query_stream(&self, request: QueryRequest) -> Result<ByteStream, TransportError> {
        let endpoint = self.endpoint(QUERY_STREAM_PATH);
        debug!(
            history_turns = request.conversation_history.len(),
            "opening query stream"
        );
        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| network_error(&endpoint, err))?;
        let response = ensure_success(&endpoint, response).await?;

        let stream = response.bytes_stream().map(move |chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| network_error(&endpoint, err))
        });
        Ok(Box::pin(stream))
    }

    async fn upload_file(&self, file: UploadFile) -> Result<IngestResponse, TransportError> {
        let endpoint = self.endpoint(INGEST_PATH);
        debug!(
            file_name = %file.file_name,
            size = file.size(),
            mime_type = %file.mime_type,
            "uploading document"
        );
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.mime_type)
            .map_err(|err| network_error(&endpoint, err))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|err| network_error(&endpoint, err))?;
        let response = ensure_success(&endpoint, response).await?;
        decode_json(&endpoint, response).await
    }

    async fn stats(&self) -> Result<Value, TransportError> {
        self.get_json(STATS_PATH).await
    }

    async fn health(&self) -> Result<Value, TransportError> {
        self.get_json(HEALTH_PATH).await
    }
}

fn network_error(endpoint: &str, err: reqwest::Error) -> TransportError {
    TransportError::Network {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    }
}

async fn ensure_success(endpoint: &str, response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(%endpoint, %status, "backend request failed");
    Err(TransportError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn decode_json<T: DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<T, TransportError> {
    let decode_error = |message: String| TransportError::Decode {
        endpoint: endpoint.to_string(),
        message,
    };
    let body = response
        .bytes()
        .await
        .map_err(|err| decode_error(err.to_string()))?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(TransportError::MissingBody(endpoint.to_string()));
    }
    serde_json::from_slice(&body).map_err(|err| decode_error(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use core_types::{HistoryRole, HistoryTurn};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::*;

    /// Accepts one connection, records the raw request, then writes `chunks`
    /// back with a short pause between them.
    async fn serve_once(chunks: Vec<Vec<u8>>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let request = read_request(&mut socket).await;
            for chunk in chunks {
                socket.write_all(&chunk).await.expect("write");
                socket.flush().await.expect("flush");
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut tmp = [0_u8; 4096];
        loop {
            let n = socket.read(&mut tmp).await.expect("read");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&tmp[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn request_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let headers = text[..header_end].to_ascii_lowercase();
        let body_len = buf.len() - (header_end + 4);
        if let Some(length) = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
        {
            return body_len >= length;
        }
        if headers.contains("transfer-encoding: chunked") {
            return text.ends_with("0\r\n\r\n");
        }
        true
    }

    fn json_response(status_line: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    fn chunk(data: &str) -> Vec<u8> {
        format!("{:x}\r\n{data}\r\n", data.len()).into_bytes()
    }

    #[tokio::test]
    async fn health_returns_backend_json() {
        let (base_url, server) =
            serve_once(vec![json_response("200 OK", r#"{"status":"ok"}"#)]).await;
        let transport = HttpTransport::new(format!("{base_url}/"));

        let value = transport.health().await.expect("health");
        assert_eq!(value["status"], "ok");

        let request = server.await.expect("server");
        assert!(request.starts_with("GET / HTTP/1.1"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_error() {
        let (base_url, server) =
            serve_once(vec![json_response("503 Service Unavailable", "{}")]).await;
        let transport = HttpTransport::new(base_url);

        let err = transport.stats().await.expect_err("must fail");
        assert!(matches!(err, TransportError::Status { status: 503, .. }));

        let request = server.await.expect("server");
        assert!(request.starts_with("GET /stats HTTP/1.1"));
    }

    #[tokio::test]
    async fn empty_success_body_is_missing_body() {
        let (base_url, server) = serve_once(vec![json_response("200 OK", "")]).await;
        let transport = HttpTransport::new(base_url);

        let err = transport.stats().await.expect_err("must fail");
        assert!(matches!(err, TransportError::MissingBody(ref endpoint) if endpoint.ends_with("/stats")));
        server.await.expect("server");
    }

    #[tokio::test]
    async fn garbage_success_body_is_a_decode_error() {
        let (base_url, server) = serve_once(vec![json_response("200 OK", "<html>")]).await;
        let transport = HttpTransport::new(base_url);

        let err = transport.health().await.expect_err("must fail");
        assert!(matches!(err, TransportError::Decode { .. }));
        server.await.expect("server");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let transport = HttpTransport::new(format!("http://{addr}"));
        let err = transport.health().await.expect_err("must fail");
        assert!(matches!(err, TransportError::Network { .. }));
    }

    #[tokio::test]
    async fn query_stream_posts_history_and_yields_body_chunks() {
        let head = b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n".to_vec();
        let (base_url, server) = serve_once(vec![
            head,
            chunk("{\"type\":\"sources\",\"data\":[\"doc1\"]}\n{\"type\":\"to"),
            chunk("ken\",\"data\":\"Hi\"}\n"),
            b"0\r\n\r\n".to_vec(),
        ])
        .await;
        let transport = HttpTransport::new(base_url);

        let mut stream = transport
            .query_stream(QueryRequest {
                question: "what is in doc1?".to_string(),
                conversation_history: vec![HistoryTurn {
                    role: HistoryRole::User,
                    content: "hello".to_string(),
                }],
            })
            .await
            .expect("open stream");

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend(chunk.expect("chunk"));
        }
        assert_eq!(
            String::from_utf8(body).expect("utf8"),
            "{\"type\":\"sources\",\"data\":[\"doc1\"]}\n{\"type\":\"token\",\"data\":\"Hi\"}\n"
        );

        let request = server.await.expect("server");
        assert!(request.starts_with("POST /query-stream HTTP/1.1"));
        assert!(request.contains(r#""question":"what is in doc1?""#));
        assert!(request.contains(r#""conversation_history":[{"role":"user","content":"hello"}]"#));
    }

    #[tokio::test]
    async fn upload_sends_multipart_file_field() {
        let (base_url, server) = serve_once(vec![json_response(
            "200 OK",
            r#"{"message":"File notes.txt ingested","document_id":"d-1","chunks_processed":3}"#,
        )])
        .await;
        let transport = HttpTransport::new(base_url);

        let result = transport
            .upload_file(UploadFile::new("notes.txt", "text/plain", b"hello docs".to_vec()))
            .await
            .expect("upload");
        assert_eq!(result.document_id, "d-1");
        assert_eq!(result.chunks_processed, 3);

        let request = server.await.expect("server");
        assert!(request.starts_with("POST /ingest HTTP/1.1"));
        assert!(request.contains("multipart/form-data"));
        assert!(request.contains(r#"name="file"; filename="notes.txt""#));
        assert!(request.contains("hello docs"));
    }
}
