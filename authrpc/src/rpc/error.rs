use std::fmt;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::retry::RetryError;

pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// An error when making an RPC call. Servers send these back as the JSON body
/// of a non-2xx response, so clients see the same value the handler returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcError {
    /// A spurious error with an unstructured string message. These can
    /// generally be assumed to be recoverable.
    Spurious(String),

    /// A miscellaneous error with an unstructured string message. These should
    /// generally be assumed to be unrecoverable.
    Misc(String),

    /// The request could not be decoded by the server.
    BadRequest(String),

    /// The server has no service mounted under the requested label.
    NotFound(String),

    /// The caller's cookies do not grant access to the operation.
    Unauthorized(String),

    /// An error together with the label of the service that produced it. This
    /// variant is constructed automatically by `RpcClient` when making a call.
    /// Use `root_cause` to get the innermost `RpcError`.
    Downstream(String, Box<RpcError>),
}

impl RpcError {
    /// Unwrap layers of caused-by nesting to get the innermost error.
    pub fn root_cause(&self) -> &RpcError {
        match self {
            RpcError::Downstream(_, e) => e.root_cause(),
            _ => self,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.root_cause() {
            RpcError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RpcError::Spurious(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.root_cause(), RpcError::Unauthorized(_))
    }
}

impl RetryError for RpcError {
    fn should_retry(&self) -> bool {
        match self {
            RpcError::Spurious(_) => true,
            RpcError::Downstream(_, e) => e.should_retry(),
            _ => false,
        }
    }
}

impl axum::response::IntoResponse for RpcError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), axum::Json(self)).into_response()
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Spurious(s) => write!(f, "spurious: {s}"),
            RpcError::Misc(s) => write!(f, "rpc error: {s}"),
            RpcError::BadRequest(s) => write!(f, "bad request: {s}"),
            RpcError::NotFound(s) => write!(f, "not found: {s}"),
            RpcError::Unauthorized(s) => write!(f, "unauthorized: {s}"),
            RpcError::Downstream(at, e) => write!(f, "{at}: {e}"),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<String> for RpcError {
    fn from(s: String) -> Self {
        RpcError::Misc(s)
    }
}

impl From<&str> for RpcError {
    fn from(value: &str) -> Self {
        RpcError::Misc(value.to_owned())
    }
}

impl From<crate::error::Error> for RpcError {
    fn from(value: crate::error::Error) -> Self {
        RpcError::Misc(format!("authrpc error: {value}"))
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(value: reqwest::Error) -> Self {
        let origin = match value.url() {
            Some(u) => u.origin().ascii_serialization(),
            None => "(unknown)".to_owned(),
        };
        if value.is_timeout() {
            RpcError::Spurious(format!("http timeout at {origin}"))
        } else if value.is_connect() {
            RpcError::Spurious(format!("could not connect to {origin}"))
        } else {
            RpcError::Misc(format!("http error: {value}"))
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(value: serde_json::Error) -> Self {
        RpcError::Misc(format!("json error: {value}"))
    }
}

impl From<std::io::Error> for RpcError {
    fn from(value: std::io::Error) -> Self {
        RpcError::Misc(format!("io error: {value}"))
    }
}

impl From<tokio::task::JoinError> for RpcError {
    fn from(value: tokio::task::JoinError) -> Self {
        match value.try_into_panic() {
            Ok(e) => std::panic::resume_unwind(e),
            Err(e) => match e.is_cancelled() {
                true => RpcError::Misc("task cancelled".to_owned()),
                false => RpcError::Misc("tokio join error".to_owned()),
            },
        }
    }
}
