//! Connection-pooled HTTP/1.1 client library

pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod observability;
pub mod pool;
pub mod transaction;

pub use client::HttpClient;
pub use config::schema::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use transaction::{RequestDescriptor, Response};
