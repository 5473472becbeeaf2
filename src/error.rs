//! Errors returned by the client facade.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use hyper::StatusCode;
use thiserror::Error;

use crate::pool::PoolError;
use crate::transaction::TransactionError;

/// Every way a client call can fail.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not open a connection to the remote host.
    #[error("connection to {host}:{port} failed: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// No complete response before the deadline.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The server answered with a non-2xx status.
    #[error("server responded with {status}")]
    Server { status: StatusCode, body: Bytes },

    #[error("network error: {0}")]
    Network(#[source] hyper::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(#[source] hyper::Error),

    /// The response body was larger than the configured limit.
    #[error("response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// The path or query cannot form a request target.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("client is shut down")]
    Shutdown,
}

impl ClientError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Connection { .. } => "connection",
            ClientError::RequestTimeout(_) => "timeout",
            ClientError::Server { .. } => "server_error",
            ClientError::Network(_) => "network",
            ClientError::InvalidResponse(_) => "invalid_response",
            ClientError::ResponseTooLarge { .. } => "response_too_large",
            ClientError::InvalidRequest(_) => "invalid_request",
            ClientError::Shutdown => "shutdown",
        }
    }

    /// Status code, for server errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<TransactionError> for ClientError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::TimedOut(timeout) => ClientError::RequestTimeout(timeout),
            TransactionError::Server { status, body } => ClientError::Server { status, body },
            TransactionError::Network(e) => ClientError::Network(e),
            TransactionError::InvalidResponse(e) => ClientError::InvalidResponse(e),
            TransactionError::ResponseTooLarge { limit } => ClientError::ResponseTooLarge { limit },
        }
    }
}

impl From<PoolError> for ClientError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Connect { host, port, source } => ClientError::Connection { host, port, source },
            PoolError::ConnectTimeout { host, port, timeout } => ClientError::Connection {
                host,
                port,
                source: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {timeout:?}"),
                ),
            },
            PoolError::Shutdown => ClientError::Shutdown,
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
