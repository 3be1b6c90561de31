use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// An error raised locally, outside of an RPC call: reading configuration,
/// writing bindings, binding a listener.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Config(String),
    Internal(String),
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Config(s) => write!(f, "config error: {s}"),
            Error::Internal(s) => write!(f, "internal error: {s}"),
            Error::Other(e) => write!(f, "other: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Internal(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Internal(value.to_owned())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        match value.try_into_panic() {
            Ok(e) => std::panic::resume_unwind(e),
            Err(_) => Error::Internal("server task cancelled".to_owned()),
        }
    }
}

impl From<crate::rpc::RpcError> for Error {
    fn from(value: crate::rpc::RpcError) -> Self {
        Error::Other(Box::new(value))
    }
}
