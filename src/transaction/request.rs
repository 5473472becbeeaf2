//! Request descriptors.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};
use hyper::{Method, Request, Uri};

/// Path or query that cannot be placed in a request line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid request target {0:?}")]
pub struct InvalidTarget(pub String);

/// Build the origin-form target from a path and a raw query string.
///
/// An empty path becomes `/`, a relative path gets a leading `/`, and an
/// empty query adds no `?`.
pub fn request_target(path: &str, query: &str) -> Result<String, InvalidTarget> {
    let query = query.strip_prefix('?').unwrap_or(query);

    let mut target = String::with_capacity(path.len() + query.len() + 2);
    if !path.starts_with('/') {
        target.push('/');
    }
    target.push_str(path);
    if !query.is_empty() {
        target.push('?');
        target.push_str(query);
    }

    if target.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(InvalidTarget(target));
    }
    Ok(target)
}

/// Immutable description of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: String,
    target: String,
    uri: Uri,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    /// Describe a request for `path` with a raw `query` string (may be empty).
    pub fn new(
        method: Method,
        path: impl Into<String>,
        query: impl Into<String>,
    ) -> Result<Self, InvalidTarget> {
        let path = path.into();
        let query = query.into();
        let target = request_target(&path, &query)?;
        let uri = target
            .parse::<Uri>()
            .map_err(|_| InvalidTarget(target.clone()))?;
        Ok(Self {
            method,
            path,
            query,
            target,
            uri,
            body: None,
        })
    }

    /// Attach a body. It is sent with a `content-length` header.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Origin-form request target, `path[?query]`.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Build the outgoing request: client headers, plus `content-length`
    /// when a body is present.
    pub(crate) fn to_request(&self, client_headers: &HeaderMap) -> Request<Full<Bytes>> {
        let body = self.body.clone().unwrap_or_default();
        let mut request = Request::new(Full::new(body));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();

        let headers = request.headers_mut();
        headers.clone_from(client_headers);
        if let Some(body) = &self.body {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        request
    }
}
