//! The client facade.
//!
//! Every call takes exactly one endpoint from the pool and hands it back
//! through exactly one of `release` or `discard`, whatever the outcome.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use hyper::Method;

use crate::config::{ClientConfig, ConfigError};
use crate::error::{ClientError, ClientResult};
use crate::net::{Connector, TcpConnector};
use crate::observability::metrics;
use crate::pool::{EndpointPool, PoolStats};
use crate::transaction::{
    Disposition, RequestDescriptor, Response, TransactionError, TransactionExecutor,
};

/// Connection-pooled HTTP/1.1 client bound to one host.
///
/// Cloning is cheap; clones share one pool.
pub struct HttpClient<C: Connector = TcpConnector> {
    pool: EndpointPool<C>,
    executor: Arc<TransactionExecutor>,
    config: Arc<ClientConfig>,
}

impl HttpClient<TcpConnector> {
    /// Client over plain TCP.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::with_connector(config, TcpConnector::new())
    }
}

impl<C: Connector> HttpClient<C> {
    /// Client over a custom connector.
    pub fn with_connector(config: ClientConfig, connector: C) -> Result<Self, ConfigError> {
        let executor = TransactionExecutor::new(&config).map_err(ConfigError::Validation)?;
        let pool = EndpointPool::new(connector, &config);

        tracing::info!(
            host = %config.host,
            port = config.port,
            max_open_endpoints = config.max_open_endpoints,
            timeout_ms = config.timeout_ms,
            "HTTP client created"
        );

        Ok(Self {
            pool,
            executor: Arc::new(executor),
            config: Arc::new(config),
        })
    }

    /// Send a request and return the body of a 2xx response.
    pub async fn request(
        &self,
        path: &str,
        query: &str,
        method: Method,
        body: Option<Bytes>,
    ) -> ClientResult<Bytes> {
        let mut descriptor = RequestDescriptor::new(method, path, query)
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        if let Some(body) = body {
            descriptor = descriptor.with_body(body);
        }
        self.send(&descriptor).await.map(Response::into_body)
    }

    pub async fn get(&self, path: &str, query: &str) -> ClientResult<Bytes> {
        self.request(path, query, Method::GET, None).await
    }

    pub async fn post(&self, path: &str, query: &str, body: impl Into<Bytes>) -> ClientResult<Bytes> {
        self.request(path, query, Method::POST, Some(body.into())).await
    }

    /// Send a request and return the full 2xx response.
    pub async fn send(&self, descriptor: &RequestDescriptor) -> ClientResult<Response> {
        let start = Instant::now();
        let result = self.dispatch(descriptor).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_request(descriptor.method().as_str(), outcome, start);
        result
    }

    async fn dispatch(&self, descriptor: &RequestDescriptor) -> ClientResult<Response> {
        let mut lease = self.pool.acquire().await?;

        tracing::debug!(
            endpoint_id = %lease.endpoint_id(),
            method = %descriptor.method(),
            target = descriptor.target(),
            "Dispatching request"
        );

        let report = self.executor.execute(&mut lease, descriptor).await;
        let endpoint_id = lease.endpoint_id();
        match report.disposition {
            Disposition::Release => self.pool.release(lease),
            Disposition::Discard => self.pool.discard(lease),
        }

        report.outcome.map_err(|e| {
            match &e {
                TransactionError::TimedOut(timeout) => tracing::warn!(
                    %endpoint_id,
                    target = descriptor.target(),
                    ?timeout,
                    "Request timed out"
                ),
                TransactionError::Network(error) => tracing::warn!(
                    %endpoint_id,
                    target = descriptor.target(),
                    %error,
                    "Transport failure"
                ),
                TransactionError::InvalidResponse(error) => tracing::warn!(
                    %endpoint_id,
                    target = descriptor.target(),
                    %error,
                    "Malformed response"
                ),
                TransactionError::ResponseTooLarge { limit } => tracing::warn!(
                    %endpoint_id,
                    target = descriptor.target(),
                    limit,
                    "Response too large"
                ),
                TransactionError::Server { status, .. } => tracing::debug!(
                    %endpoint_id,
                    target = descriptor.target(),
                    status = status.as_u16(),
                    "Server error response"
                ),
            }
            ClientError::from(e)
        })
    }

    /// Close idle endpoints and refuse further requests.
    pub fn shutdown(&self) {
        tracing::info!(host = %self.config.host, port = self.config.port, "HTTP client shutting down");
        self.pool.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_shut_down()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn pool(&self) -> &EndpointPool<C> {
        &self.pool
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<C: Connector> Clone for HttpClient<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            executor: Arc::clone(&self.executor),
            config: Arc::clone(&self.config),
        }
    }
}

impl<C: Connector> std::fmt::Debug for HttpClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("pool", &self.pool)
            .field("timeout", &self.executor.timeout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// Each connect spawns a backend task that answers every request with
    /// the canned response.
    struct ScriptedConnector {
        response: &'static [u8],
        connects: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn new(response: &'static [u8]) -> Self {
            Self {
                response,
                connects: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Connector for ScriptedConnector {
        type Stream = DuplexStream;

        fn connect(&self, _host: &str, _port: u16) -> impl Future<Output = io::Result<DuplexStream>> + Send {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let response = self.response;
            async move {
                let (client, mut server) = tokio::io::duplex(16 * 1024);
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    let mut buf = [0u8; 1024];
                    loop {
                        match server.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => seen.extend_from_slice(&buf[..n]),
                        }
                        while let Some(end) = seen.windows(4).position(|w| w == b"\r\n\r\n") {
                            seen.drain(..end + 4);
                            if server.write_all(response).await.is_err() {
                                return;
                            }
                        }
                    }
                });
                Ok(client)
            }
        }
    }

    fn client_with(config: ClientConfig, response: &'static [u8]) -> HttpClient<ScriptedConnector> {
        HttpClient::with_connector(config, ScriptedConnector::new(response)).unwrap()
    }

    fn client(response: &'static [u8]) -> HttpClient<ScriptedConnector> {
        let config = ClientConfig::new("svc.local", 8080)
            .with_max_open_endpoints(1)
            .with_timeout(Duration::from_secs(5));
        client_with(config, response)
    }

    #[tokio::test]
    async fn sequential_requests_share_one_endpoint() {
        let client = client(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello");

        assert_eq!(client.get("/a", "").await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(client.get("/b", "").await.unwrap(), Bytes::from_static(b"hello"));

        assert_eq!(client.pool().connector().connects.load(Ordering::SeqCst), 1);
        let stats = client.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.leased, 0);
    }

    #[tokio::test]
    async fn not_found_maps_to_server_error() {
        let client = client(b"HTTP/1.1 404 Not Found\r\ncontent-length: 7\r\n\r\nmissing");

        match client.get("/nope", "").await {
            Err(ClientError::Server { status, body }) => {
                assert_eq!(status.as_u16(), 404);
                assert_eq!(body, Bytes::from_static(b"missing"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
        assert_eq!(client.stats().idle, 1);
    }

    #[tokio::test]
    async fn invalid_target_never_touches_pool() {
        let client = client(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");

        let result = client.get("/has space", "").await;
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
        assert_eq!(client.pool().connector().connects.load(Ordering::SeqCst), 0);
        assert_eq!(client.stats(), PoolStats::default());
    }

    #[tokio::test]
    async fn shutdown_rejects_requests() {
        let client = client(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");
        client.get("/", "").await.unwrap();

        client.shutdown();
        assert!(client.is_shut_down());
        assert_eq!(client.stats().idle, 0);
        assert!(matches!(client.get("/", "").await, Err(ClientError::Shutdown)));
    }

    #[tokio::test]
    async fn clones_share_pool() {
        let client = client(b"HTTP/1.1 204 No Content\r\n\r\n");
        let other = client.clone();

        client.get("/", "").await.unwrap();
        other.get("/", "").await.unwrap();

        assert_eq!(client.pool().connector().connects.load(Ordering::SeqCst), 1);
        assert_eq!(other.stats().idle, 1);
    }

    #[tokio::test]
    async fn oversized_response_discards_endpoint() {
        let config = ClientConfig::new("svc.local", 8080).with_max_response_bytes(8);
        let client = client_with(
            config,
            b"HTTP/1.1 200 OK\r\ncontent-length: 26\r\n\r\nabcdefghijklmnopqrstuvwxyz",
        );

        let result = client.get("/big", "").await;
        assert!(matches!(result, Err(ClientError::ResponseTooLarge { limit: 8 })));

        let stats = client.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.leased, 0);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = ClientConfig::new("svc.local", 0);
        assert!(matches!(
            HttpClient::with_connector(config, ScriptedConnector::new(b"")),
            Err(ConfigError::Validation(_))
        ));
    }
}
