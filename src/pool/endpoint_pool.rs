//! Bounded pool of idle endpoints.
//!
//! # Responsibilities
//! - Hand out an idle endpoint, or connect a new one when none is idle
//! - Take endpoints back while the idle set is below capacity
//! - Close excess, broken and stale endpoints
//!
//! # Design Decisions
//! - One mutex guards the idle set; the capacity check and the push happen
//!   under the same lock acquisition
//! - The lock is never held across an await (connect happens outside it)
//! - Most recently returned endpoint is reused first

use std::io;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::net::{Connector, Endpoint};
use crate::observability::metrics;
use crate::pool::lease::{Counters, Lease};

/// Errors produced while acquiring an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The connector failed to open a stream.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The connector did not finish within the connect timeout.
    #[error("connect to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// The pool has been shut down.
    #[error("pool is shut down")]
    Shutdown,
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Endpoints sitting in the idle set.
    pub idle: usize,
    /// Endpoints currently checked out.
    pub leased: usize,
    /// Endpoints ever connected.
    pub opened: u64,
    /// Endpoints ever closed.
    pub closed: u64,
}

#[derive(Debug)]
struct IdleSet {
    endpoints: Vec<Endpoint>,
    shut_down: bool,
}

#[derive(Debug)]
struct Shared {
    idle: Mutex<IdleSet>,
    max_idle: usize,
    counters: Arc<Counters>,
}

/// Pool of reusable endpoints to one host.
///
/// Cloning is cheap; clones share the same idle set.
pub struct EndpointPool<C: Connector> {
    connector: Arc<C>,
    shared: Arc<Shared>,
    host: Arc<str>,
    port: u16,
    connect_timeout: Option<Duration>,
}

impl<C: Connector> Clone for EndpointPool<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            shared: Arc::clone(&self.shared),
            host: Arc::clone(&self.host),
            port: self.port,
            connect_timeout: self.connect_timeout,
        }
    }
}

impl<C: Connector> std::fmt::Debug for EndpointPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointPool")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_idle", &self.shared.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<C: Connector> EndpointPool<C> {
    /// Create an empty pool. No connection is opened until the first acquire.
    pub fn new(connector: C, config: &ClientConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            shared: Arc::new(Shared {
                idle: Mutex::new(IdleSet {
                    endpoints: Vec::with_capacity(config.max_open_endpoints),
                    shut_down: false,
                }),
                max_idle: config.max_open_endpoints,
                counters: Arc::new(Counters::default()),
            }),
            host: Arc::from(config.host.as_str()),
            port: config.port,
            connect_timeout: config.connect_timeout(),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Configured idle capacity.
    pub fn max_idle(&self) -> usize {
        self.shared.max_idle
    }

    /// Check out an endpoint, connecting a new one if none is idle.
    pub async fn acquire(&self) -> Result<Lease, PoolError> {
        while let Some(endpoint) = self.pop_idle()? {
            if endpoint.is_open() {
                tracing::debug!(
                    endpoint_id = %endpoint.id(),
                    transactions = endpoint.transactions(),
                    "Reusing idle endpoint"
                );
                return Ok(Lease::new(endpoint, Arc::clone(&self.shared.counters)));
            }
            self.close(endpoint, "stale");
        }

        let endpoint = self.connect().await?;
        Ok(Lease::new(endpoint, Arc::clone(&self.shared.counters)))
    }

    /// Return a healthy endpoint for reuse.
    ///
    /// The endpoint is closed instead when the idle set is full or the pool
    /// has been shut down.
    pub fn release(&self, lease: Lease) {
        let endpoint = lease.settle();

        let mut idle = self.lock();
        let rejected = if idle.shut_down {
            Some("shutdown")
        } else if idle.endpoints.len() >= self.shared.max_idle {
            Some("over_capacity")
        } else {
            None
        };

        match rejected {
            Some(reason) => {
                drop(idle);
                self.close(endpoint, reason);
            }
            None => {
                debug_assert!(
                    idle.endpoints.iter().all(|e| e.id() != endpoint.id()),
                    "endpoint released twice"
                );
                tracing::trace!(endpoint_id = %endpoint.id(), "Endpoint returned to idle set");
                idle.endpoints.push(endpoint);
                metrics::record_idle_endpoints(idle.endpoints.len());
            }
        }
    }

    /// Close an endpoint that must not be reused.
    pub fn discard(&self, lease: Lease) {
        let endpoint = lease.settle();
        self.close(endpoint, "discarded");
    }

    /// Close every idle endpoint and refuse further acquires.
    ///
    /// Leased endpoints are closed when they are released.
    pub fn shutdown(&self) {
        let drained = {
            let mut idle = self.lock();
            idle.shut_down = true;
            std::mem::take(&mut idle.endpoints)
        };
        metrics::record_idle_endpoints(0);

        tracing::debug!(closing = drained.len(), "Pool shutting down");
        for endpoint in drained {
            self.close(endpoint, "shutdown");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        PoolStats {
            idle: self.lock().endpoints.len(),
            leased: counters.leased.load(Ordering::SeqCst),
            opened: counters.opened.load(Ordering::Relaxed),
            closed: counters.closed.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IdleSet> {
        self.shared.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop_idle(&self) -> Result<Option<Endpoint>, PoolError> {
        let mut idle = self.lock();
        if idle.shut_down {
            return Err(PoolError::Shutdown);
        }
        let endpoint = idle.endpoints.pop();
        metrics::record_idle_endpoints(idle.endpoints.len());
        Ok(endpoint)
    }

    async fn connect(&self) -> Result<Endpoint, PoolError> {
        let connecting = self.connector.connect(&self.host, self.port);
        let result = match self.connect_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, connecting).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(host = %self.host, port = self.port, ?timeout, "Connect timed out");
                    return Err(PoolError::ConnectTimeout {
                        host: self.host.to_string(),
                        port: self.port,
                        timeout,
                    });
                }
            },
            None => connecting.await,
        };

        let stream = result.map_err(|source| {
            tracing::warn!(host = %self.host, port = self.port, error = %source, "Connect failed");
            PoolError::Connect {
                host: self.host.to_string(),
                port: self.port,
                source,
            }
        })?;

        let endpoint = Endpoint::handshake(stream).await.map_err(|error| {
            tracing::warn!(host = %self.host, port = self.port, %error, "Handshake failed");
            PoolError::Connect {
                host: self.host.to_string(),
                port: self.port,
                source: io::Error::other(error),
            }
        })?;
        self.shared.counters.opened.fetch_add(1, Ordering::Relaxed);
        metrics::record_endpoint_opened();
        tracing::debug!(
            endpoint_id = %endpoint.id(),
            host = %self.host,
            port = self.port,
            "Endpoint connected"
        );
        Ok(endpoint)
    }

    fn close(&self, endpoint: Endpoint, reason: &'static str) {
        self.shared.counters.record_close(reason);
        endpoint.close(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::future::Future;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::DuplexStream;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Accept,
        Refuse,
        Hang,
    }

    /// Connector handing out in-memory pipes. Server halves are kept alive
    /// so endpoints look open until a test drops them.
    #[derive(Debug)]
    struct PipeConnector {
        mode: Mode,
        connects: AtomicUsize,
        peers: Mutex<Vec<DuplexStream>>,
    }

    impl PipeConnector {
        fn new(mode: Mode) -> Self {
            Self {
                mode,
                connects: AtomicUsize::new(0),
                peers: Mutex::new(Vec::new()),
            }
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn hang_up_all(&self) {
            self.peers.lock().unwrap().clear();
        }
    }

    impl Connector for PipeConnector {
        type Stream = DuplexStream;

        fn connect(&self, _host: &str, _port: u16) -> impl Future<Output = io::Result<DuplexStream>> + Send {
            async move {
                self.connects.fetch_add(1, Ordering::SeqCst);
                match self.mode {
                    Mode::Refuse => return Err(io::ErrorKind::ConnectionRefused.into()),
                    Mode::Hang => std::future::pending::<()>().await,
                    Mode::Accept => {}
                }
                let (client, server) = tokio::io::duplex(1024);
                self.peers.lock().unwrap().push(server);
                Ok(client)
            }
        }
    }

    fn pool(max: usize) -> EndpointPool<PipeConnector> {
        let config = ClientConfig::new("pipe", 1).with_max_open_endpoints(max);
        EndpointPool::new(PipeConnector::new(Mode::Accept), &config)
    }

    #[tokio::test]
    async fn released_endpoint_is_reused() {
        let pool = pool(1);

        let lease = pool.acquire().await.unwrap();
        let first = lease.endpoint_id();
        pool.release(lease);

        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.endpoint_id(), first);
        pool.release(lease);

        assert_eq!(pool.connector().connects(), 1);
        assert_eq!(
            pool.stats(),
            PoolStats {
                idle: 1,
                leased: 0,
                opened: 1,
                closed: 0
            }
        );
    }

    #[tokio::test]
    async fn release_over_capacity_closes() {
        let pool = pool(1);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_ne!(a.endpoint_id(), b.endpoint_id());
        assert_eq!(pool.stats().leased, 2);

        pool.release(a);
        pool.release(b);

        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.leased, 0);
    }

    #[tokio::test]
    async fn zero_capacity_never_keeps_endpoints() {
        let pool = pool(0);
        let lease = pool.acquire().await.unwrap();
        pool.release(lease);
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().closed, 1);
    }

    #[tokio::test]
    async fn discarded_endpoint_is_replaced() {
        let pool = pool(4);

        let lease = pool.acquire().await.unwrap();
        let first = lease.endpoint_id();
        pool.discard(lease);
        assert_eq!(pool.stats().idle, 0);

        let lease = pool.acquire().await.unwrap();
        assert_ne!(lease.endpoint_id(), first);
        assert_eq!(pool.connector().connects(), 2);
        pool.release(lease);
    }

    #[tokio::test]
    async fn stale_idle_endpoint_is_skipped() {
        let pool = pool(2);

        let lease = pool.acquire().await.unwrap();
        let first = lease.endpoint_id();
        pool.release(lease);

        pool.connector().hang_up_all();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let lease = pool.acquire().await.unwrap();
        assert_ne!(lease.endpoint_id(), first);
        assert_eq!(pool.stats().closed, 1);
        pool.release(lease);
    }

    #[tokio::test]
    async fn abandoned_lease_is_accounted() {
        let pool = pool(2);
        let lease = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().leased, 1);

        drop(lease);

        let stats = pool.stats();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.closed, 1);
    }

    #[tokio::test]
    async fn shutdown_closes_idle_and_late_releases() {
        let pool = pool(4);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        pool.release(a);

        pool.shutdown();
        assert!(pool.is_shut_down());
        assert_eq!(pool.stats().idle, 0);
        assert!(matches!(pool.acquire().await, Err(PoolError::Shutdown)));

        pool.release(b);
        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.closed, 2);
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let config = ClientConfig::new("pipe", 1);
        let pool = EndpointPool::new(PipeConnector::new(Mode::Refuse), &config);

        match pool.acquire().await {
            Err(PoolError::Connect { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused)
            }
            other => panic!("expected connect error, got {other:?}"),
        }
        assert_eq!(pool.stats().leased, 0);
    }

    #[tokio::test]
    async fn connect_timeout_is_enforced() {
        let config = ClientConfig::new("pipe", 1).with_connect_timeout(Duration::from_millis(20));
        let pool = EndpointPool::new(PipeConnector::new(Mode::Hang), &config);

        assert!(matches!(
            pool.acquire().await,
            Err(PoolError::ConnectTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_use_respects_capacity_and_exclusivity() {
        let pool = pool(3);
        let in_use = Arc::new(Mutex::new(HashSet::new()));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            let in_use = Arc::clone(&in_use);
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    let lease = pool.acquire().await.unwrap();
                    assert!(
                        in_use.lock().unwrap().insert(lease.endpoint_id()),
                        "endpoint handed out twice"
                    );
                    tokio::task::yield_now().await;
                    in_use.lock().unwrap().remove(&lease.endpoint_id());
                    pool.release(lease);
                    assert!(pool.stats().idle <= 3);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stats = pool.stats();
        assert!(stats.idle <= 3);
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.opened, stats.closed + stats.idle as u64);
    }
}
