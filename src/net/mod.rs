//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Pool needs a new endpoint
//!     → connector.rs (TCP connect, socket options)
//!     → endpoint.rs (HTTP/1.1 handshake, connection task, liveness check)
//!     → Hand off to the pool as an idle or leased endpoint
//!
//! Endpoint States:
//!     Connecting → Leased ⇄ Idle → Closed
//! ```
//!
//! # Design Decisions
//! - Connectors are generic so tests can swap TCP for in-memory pipes
//! - Closing an endpoint is dropping it, which stops its connection task
//! - Liveness is checked without blocking when an idle endpoint is reused

pub mod connector;
pub mod endpoint;

pub use connector::{Connector, TcpConnector};
pub use endpoint::{Endpoint, EndpointId, Transport};
