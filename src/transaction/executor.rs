//! Runs one request/response exchange on a leased endpoint.
//!
//! # Responsibilities
//! - Send the request over the endpoint's HTTP/1.1 connection
//! - Collect the response body to end-of-message, up to a size limit
//! - Race the exchange against a deadline armed at transaction start
//! - Tell the caller whether the endpoint can be reused
//!
//! # Design Decisions
//! - The watchdog is polled first, so a response that lands at the deadline
//!   counts as timed out
//! - Non-2xx bodies are read to end-of-message before the error is reported,
//!   so the endpoint stays in sync and can be reused
//! - Anything short of a clean, fully read, keep-alive response discards

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING,
    USER_AGENT,
};
use hyper::{Method, StatusCode, Version};
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::{validate_client, ClientConfig, ValidationError};
use crate::net::Endpoint;
use crate::pool::Lease;
use crate::transaction::{RequestDescriptor, Resolution, Response, Transaction};

/// Why a transaction did not produce a successful response.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("no response within {0:?}")]
    TimedOut(Duration),

    #[error("server responded with {status}")]
    Server { status: StatusCode, body: Bytes },

    #[error("network error: {0}")]
    Network(#[source] hyper::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(#[source] hyper::Error),

    #[error("response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

impl From<hyper::Error> for TransactionError {
    fn from(err: hyper::Error) -> Self {
        if err.is_parse() {
            TransactionError::InvalidResponse(err)
        } else {
            TransactionError::Network(err)
        }
    }
}

/// What the pool should do with the endpoint afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Release,
    Discard,
}

/// Outcome of one transaction plus the endpoint's fate.
#[derive(Debug)]
pub struct TransactionReport {
    pub outcome: Result<Response, TransactionError>,
    pub disposition: Disposition,
}

/// A response read to end-of-message.
#[derive(Debug)]
struct Exchange {
    response: Response,
    reusable: bool,
}

/// Executes transactions with a fixed timeout and client headers.
#[derive(Debug, Clone)]
pub struct TransactionExecutor {
    timeout: Duration,
    max_response_bytes: usize,
    client_headers: HeaderMap,
}

impl TransactionExecutor {
    pub fn new(config: &ClientConfig) -> Result<Self, Vec<ValidationError>> {
        validate_client(config)?;

        let host = if config.port == 80 {
            config.host.clone()
        } else {
            format!("{}:{}", config.host, config.port)
        };

        let mut client_headers = HeaderMap::with_capacity(3);
        for (name, value) in [
            (HOST, host.as_str()),
            (USER_AGENT, config.user_agent.as_str()),
            (ACCEPT, config.accept.as_str()),
        ] {
            // Validated above.
            if let Ok(value) = HeaderValue::from_str(value) {
                client_headers.insert(name, value);
            }
        }

        Ok(Self {
            timeout: config.timeout(),
            max_response_bytes: config.max_response_bytes,
            client_headers,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Largest response body accepted.
    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    /// Headers sent with every request.
    pub fn client_headers(&self) -> &HeaderMap {
        &self.client_headers
    }

    /// Run one transaction on `lease`.
    pub async fn execute(&self, lease: &mut Lease, descriptor: &RequestDescriptor) -> TransactionReport {
        let deadline = Instant::now() + self.timeout;
        let mut txn = Transaction::new();
        let endpoint = lease.endpoint_mut();
        endpoint.begin_transaction();

        let span = tracing::debug_span!(
            "transaction",
            transaction_id = %txn.id(),
            endpoint_id = %endpoint.id(),
            method = %descriptor.method(),
            target = descriptor.target(),
        );

        {
            let watchdog = async {
                if Instant::now() < deadline {
                    tokio::time::sleep_until(deadline).await;
                }
            };
            let exchange = exchange(endpoint, descriptor, &self.client_headers, self.max_response_bytes)
                .instrument(span.clone());
            tokio::pin!(watchdog);
            tokio::pin!(exchange);

            let resolution = tokio::select! {
                biased;
                _ = &mut watchdog => Resolution::TimedOut,
                result = &mut exchange => match result {
                    Ok(exchange) => Resolution::Completed(exchange),
                    Err(e) => Resolution::Failed(e),
                },
            };
            txn.resolve(resolution);
        }

        let elapsed_ms = txn.started_at().elapsed().as_millis() as u64;
        let state = txn.state();
        let report = match txn.into_resolution() {
            Some(Resolution::Completed(Exchange { response, reusable })) => {
                let disposition = if reusable {
                    Disposition::Release
                } else {
                    Disposition::Discard
                };
                let outcome = if response.status().is_success() {
                    Ok(response)
                } else {
                    Err(TransactionError::Server {
                        status: response.status(),
                        body: response.into_body(),
                    })
                };
                TransactionReport { outcome, disposition }
            }
            Some(Resolution::Failed(e)) => TransactionReport {
                outcome: Err(e),
                disposition: Disposition::Discard,
            },
            Some(Resolution::TimedOut) | None => TransactionReport {
                outcome: Err(TransactionError::TimedOut(self.timeout)),
                disposition: Disposition::Discard,
            },
        };

        span.in_scope(|| match &report.outcome {
            Ok(response) => tracing::debug!(
                status = response.status().as_u16(),
                elapsed_ms,
                disposition = ?report.disposition,
                "Transaction completed"
            ),
            Err(e) => tracing::debug!(
                state = state.as_str(),
                error = %e,
                elapsed_ms,
                disposition = ?report.disposition,
                "Transaction unsuccessful"
            ),
        });

        report
    }
}

async fn exchange(
    endpoint: &mut Endpoint,
    descriptor: &RequestDescriptor,
    client_headers: &HeaderMap,
    max_response_bytes: usize,
) -> Result<Exchange, TransactionError> {
    let sender = endpoint.sender_mut();
    sender.ready().await?;

    let response = sender.send_request(descriptor.to_request(client_headers)).await?;
    let (parts, body) = response.into_parts();
    tracing::trace!(status = parts.status.as_u16(), "Response head received");

    let persistent = is_persistent(
        *descriptor.method() == Method::HEAD,
        parts.status,
        parts.version,
        &parts.headers,
    );

    let body = Limited::new(body, max_response_bytes)
        .collect()
        .await
        .map_err(|error| match error.downcast::<hyper::Error>() {
            Ok(error) => TransactionError::from(*error),
            Err(_) => TransactionError::ResponseTooLarge {
                limit: max_response_bytes,
            },
        })?
        .to_bytes();

    let reusable = persistent && !sender.is_closed();
    Ok(Exchange {
        response: Response::new(parts.status, parts.version, parts.headers, body),
        reusable,
    })
}

/// Whether the connection may carry another request after this response.
///
/// The peer must ask for keep-alive, and the body must have a length known
/// from the head. A body that runs until the peer closes ends the connection.
fn is_persistent(head_request: bool, status: StatusCode, version: Version, headers: &HeaderMap) -> bool {
    let keep_alive = if version == Version::HTTP_10 {
        has_token(headers, CONNECTION, "keep-alive")
    } else {
        !has_token(headers, CONNECTION, "close")
    };
    if !keep_alive {
        return false;
    }

    let bodiless = head_request
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;
    if bodiless {
        return true;
    }

    match tokens(headers, TRANSFER_ENCODING).last() {
        Some(coding) => coding.eq_ignore_ascii_case("chunked"),
        None => headers.contains_key(CONTENT_LENGTH),
    }
}

fn tokens(headers: &HeaderMap, name: HeaderName) -> impl Iterator<Item = &str> {
    headers
        .get_all(name)
        .into_iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn has_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    tokens(headers, name).any(|t| t.eq_ignore_ascii_case(token))
}
