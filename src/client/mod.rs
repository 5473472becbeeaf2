//! Client facade.
//!
//! # Data Flow
//! ```text
//! caller
//!     → http_client.rs (validate target)
//!     → pool::EndpointPool::acquire
//!     → transaction::TransactionExecutor::execute
//!     → pool release | discard (per the report's disposition)
//!     → caller gets body or ClientError
//! ```

pub mod http_client;

pub use http_client::HttpClient;
