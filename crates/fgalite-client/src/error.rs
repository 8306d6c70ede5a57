use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug)]
pub enum ClientError {
    Connection(String),
    InvalidArgument(String),
    NotFound(String),
    AlreadyExists(String),
    Internal(String),
    Timeout,
    Status { status: u16, message: String },
    Decode(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connection(msg) => write!(f, "connection error: {msg}"),
            ClientError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            ClientError::NotFound(msg) => write!(f, "not found: {msg}"),
            ClientError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            ClientError::Internal(msg) => write!(f, "internal error: {msg}"),
            ClientError::Timeout => write!(f, "request timed out"),
            ClientError::Status { status, message } => write!(f, "http status {status}: {message}"),
            ClientError::Decode(msg) => write!(f, "invalid response: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_connect() {
            ClientError::Connection(err.to_string())
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Connection(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl ClientError {
    /// Maps an unsuccessful response, preferring the server's `message` over
    /// the raw body.
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.message)
            .unwrap_or_else(|_| body.to_string());

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ClientError::InvalidArgument(message)
            }
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            StatusCode::CONFLICT => ClientError::AlreadyExists(message),
            StatusCode::INTERNAL_SERVER_ERROR => ClientError::Internal(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ClientError::Timeout,
            _ => ClientError::Status {
                status: status.as_u16(),
                message,
            },
        }
    }
}
