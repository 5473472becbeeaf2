//! Endpoint identity and liveness.
//!
//! # Responsibilities
//! - Generate unique endpoint IDs for tracing
//! - Own one HTTP/1.1 client connection and the task that drives it
//! - Detect endpoints the peer has closed while they sat idle

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

/// Global atomic counter for endpoint IDs.
static ENDPOINT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Byte streams an endpoint can wrap.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Unique identifier for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(u64);

impl EndpointId {
    /// Generate a new unique endpoint ID.
    pub fn new() -> Self {
        Self(ENDPOINT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ep-{}", self.0)
    }
}

/// One open connection to the remote host.
///
/// Dropping an endpoint stops its connection task, which closes the stream.
pub struct Endpoint {
    id: EndpointId,
    sender: SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
    opened_at: Instant,
    transactions: u64,
}

impl Endpoint {
    /// Run the HTTP/1.1 handshake over a freshly connected stream and spawn
    /// the task that drives the connection.
    pub async fn handshake<S: Transport>(stream: S) -> Result<Self, hyper::Error> {
        let (sender, connection) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream)).await?;

        let id = EndpointId::new();
        let driver = tokio::spawn(async move {
            match connection.await {
                Ok(()) => tracing::trace!(endpoint_id = %id, "Connection task finished"),
                Err(error) => tracing::debug!(endpoint_id = %id, %error, "Connection task failed"),
            }
        });

        Ok(Self {
            id,
            sender,
            driver,
            opened_at: Instant::now(),
            transactions: 0,
        })
    }

    /// Check, without waiting, whether an idle endpoint is still usable.
    ///
    /// The connection task ends when the peer closes the stream or sends
    /// bytes nobody asked for; either way the sender reports closed.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed() && !self.driver.is_finished()
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Time since the connection was established.
    pub fn age(&self) -> std::time::Duration {
        self.opened_at.elapsed()
    }

    /// Number of transactions started on this endpoint.
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    pub(crate) fn begin_transaction(&mut self) {
        self.transactions += 1;
    }

    pub(crate) fn sender_mut(&mut self) -> &mut SendRequest<Full<Bytes>> {
        &mut self.sender
    }

    /// Close the endpoint.
    pub fn close(self, reason: &'static str) {
        tracing::debug!(
            endpoint_id = %self.id,
            transactions = self.transactions,
            age_ms = self.opened_at.elapsed().as_millis() as u64,
            reason,
            "Endpoint closed"
        );
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("transactions", &self.transactions)
            .field("open", &self.is_open())
            .finish()
    }
}
