//! Connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! Client call
//!     → endpoint_pool.rs (pop idle endpoint, check liveness)
//!         → none idle: connector opens a new endpoint
//!     → lease.rs (ownership token handed to the transaction)
//!     → transaction finishes
//!     → release (back to idle set, or closed if full) | discard (closed)
//! ```
//!
//! # Design Decisions
//! - Idle count never exceeds `max_open_endpoints`; the number of leased
//!   endpoints is unbounded, extra ones are closed on return
//! - An endpoint is either idle or leased, never both
//! - Stale endpoints are detected lazily on acquire

pub mod endpoint_pool;
pub mod lease;

pub use endpoint_pool::{EndpointPool, PoolError, PoolStats};
pub use lease::Lease;
