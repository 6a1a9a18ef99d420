use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("request to {endpoint} failed: {message}")]
    Network { endpoint: String, message: String },

    #[error("response from {0} has no body")]
    MissingBody(String),

    #[error("invalid response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

/// Rejection of an upload candidate before it reaches the network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported file type `{mime_type}`")]
    UnsupportedType { mime_type: String },

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

#[derive(Debug, Error)]
pub enum StreamParseError {
    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("frame is not a known stream event: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("an upload is already in progress")]
    Busy,
}
