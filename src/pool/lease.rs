//! Endpoint ownership tokens.
//!
//! # Responsibilities
//! - Carry an endpoint from `acquire` to exactly one of `release`/`discard`
//! - Keep the pool's leased count accurate even if a caller abandons a lease
//!
//! # Design Decisions
//! - `release` and `discard` take the lease by value, so a lease cannot be
//!   returned twice
//! - A lease dropped without being returned closes its endpoint

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::net::{Endpoint, EndpointId};
use crate::observability::metrics;

/// Pool counters shared with every outstanding lease.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) leased: AtomicUsize,
    pub(crate) opened: AtomicU64,
    pub(crate) closed: AtomicU64,
}

impl Counters {
    pub(crate) fn record_close(&self, reason: &'static str) {
        self.closed.fetch_add(1, Ordering::Relaxed);
        metrics::record_endpoint_closed(reason);
    }
}

/// An endpoint checked out of the pool.
#[derive(Debug)]
pub struct Lease {
    pub(crate) endpoint: Endpoint,
    pub(crate) guard: LeaseGuard,
}

impl Lease {
    pub(crate) fn new(endpoint: Endpoint, counters: Arc<Counters>) -> Self {
        counters.leased.fetch_add(1, Ordering::SeqCst);
        let guard = LeaseGuard {
            counters,
            endpoint_id: endpoint.id(),
            settled: false,
        };
        Self { endpoint, guard }
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.guard.endpoint_id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    /// Split into the endpoint and a guard already marked as returned.
    pub(crate) fn settle(self) -> Endpoint {
        let Lease { endpoint, mut guard } = self;
        guard.settled = true;
        endpoint
    }
}

/// Decrements the leased count when the lease ends.
#[derive(Debug)]
pub(crate) struct LeaseGuard {
    counters: Arc<Counters>,
    endpoint_id: EndpointId,
    settled: bool,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.counters.leased.fetch_sub(1, Ordering::SeqCst);
        if !self.settled {
            self.counters.record_close("abandoned");
            tracing::trace!(endpoint_id = %self.endpoint_id, "Lease dropped without release, endpoint closed");
        }
    }
}
