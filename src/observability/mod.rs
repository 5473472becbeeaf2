//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pool, executor and client produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Transaction ID flows through all events of one request
//! - The library never installs a subscriber or recorder itself

pub mod logging;
pub mod metrics;
