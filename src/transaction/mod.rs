//! Transaction subsystem.
//!
//! # Data Flow
//! ```text
//! RequestDescriptor (method, path, query, body)
//!     → executor.rs (send over the leased endpoint's HTTP/1.1 connection)
//!     → collect the body into response.rs
//!     → state.rs (first of completion, failure, timeout wins)
//!     → TransactionReport (outcome + release/discard)
//! ```
//!
//! # Design Decisions
//! - One transaction at a time per endpoint, no pipelining
//! - The executor never returns endpoints itself; the caller applies the
//!   reported disposition to the pool

pub mod executor;
pub mod request;
pub mod response;
pub mod state;

pub use executor::{Disposition, TransactionError, TransactionExecutor, TransactionReport};
pub use request::{request_target, InvalidTarget, RequestDescriptor};
pub use response::Response;
pub use state::{Resolution, Transaction, TransactionState};
