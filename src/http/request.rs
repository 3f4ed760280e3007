//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;
use url::form_urlencoded;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A parsed HTTP/1.1 request.
///
/// Besides the split path and query, the request keeps the request target
/// exactly as the client sent it; [`original_url`](Self::original_url) is what
/// the response cache keys on.
///
/// # Examples
///
/// ```
/// use marquee::http::request::Request;
///
/// let raw = b"GET /movies?sort=title HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/movies");
/// assert_eq!(request.original_url(), "/movies?sort=title");
/// assert_eq!(request.query_param("sort"), Some("title"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    target: String,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Builds a request in memory, without a socket.
    ///
    /// Used to dispatch through a [`Router`](crate::router::Router) directly,
    /// e.g. from tests or an embedding application.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, query) = split_target(&target);
        let params = query.as_deref().map(parse_query_string).unwrap_or_default();
        Self {
            method,
            target,
            path,
            version: 1,
            headers: Headers::new(),
            query,
            body: Bytes::new(),
            params,
        }
    }

    /// Adds a header to an in-memory request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attaches a body to an in-memory request.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the offset of the first body byte in `buf`.
    /// The body is whatever follows the header block; callers that honour
    /// `Content-Length` wait until `offset + content_length` bytes are buffered.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the header block has not fully arrived.
    /// - [`RequestError::Parse`] — the data is malformed.
    /// - [`RequestError::MissingField`] — method, path or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req.method {
            Some(m) => m.parse().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?
            .to_owned();

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let (path, query) = split_target(&target);
        let params = query.as_deref().map(parse_query_string).unwrap_or_default();
        let body = Bytes::copy_from_slice(&buf[body_offset..]);

        Ok((
            Self {
                method,
                target,
                path,
                version,
                headers: header_map,
                query,
                body,
                params,
            },
            body_offset,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path component, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request target verbatim: path plus `?query` when one was sent.
    pub fn original_url(&self) -> &str {
        &self.target
    }

    /// HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should stay open after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 needs an explicit
    /// `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// `Content-Length` parsed as a `usize`, if present and well-formed.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }

    /// Drops any body bytes past `len`; the server calls this once it knows the
    /// declared length so pipelined bytes never leak into the handler.
    pub(crate) fn truncate_body(&mut self, len: usize) {
        if self.body.len() > len {
            self.body.truncate(len);
        }
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
        None => (target.to_owned(), None),
    }
}

// Decodes `+` and percent-escapes in keys and values. For a repeated key the
// last value wins.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.original_url(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn original_url_keeps_query_verbatim() {
        let raw = b"GET /movies?page=2&q=star+wars HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/movies");
        assert_eq!(req.original_url(), "/movies?page=2&q=star+wars");
        assert_eq!(req.query_string(), Some("page=2&q=star+wars"));
        assert_eq!(req.query_param("q"), Some("star wars"));
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let req = Request::new(Method::Get, "/cache-stats?secret=a%26b%3Dc%25d%2B&q=caf%C3%A9+au+lait&flag");
        assert_eq!(req.query_param("secret"), Some("a&b=c%d+"));
        assert_eq!(req.query_param("q"), Some("café au lait"));
        assert_eq!(req.query_param("flag"), Some(""));
        // The cache key still sees the target as sent.
        assert_eq!(
            req.original_url(),
            "/cache-stats?secret=a%26b%3Dc%25d%2B&q=caf%C3%A9+au+lait&flag"
        );
    }

    #[test]
    fn empty_query_is_distinct_from_none() {
        let bare = Request::new(Method::Get, "/movies");
        let empty = Request::new(Method::Get, "/movies?");
        assert_eq!(bare.query_string(), None);
        assert_eq!(empty.query_string(), Some(""));
        assert_ne!(bare.original_url(), empty.original_url());
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn connection_close() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn content_length_and_truncation() {
        let raw = b"POST /movies/create HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET";
        let (mut req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..body_offset + 5], b"hello");
        req.truncate_body(5);
        assert_eq!(req.body().as_ref(), b"hello");
    }

    #[test]
    fn in_memory_builder() {
        let req = Request::new(Method::Post, "/categories/create")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"name":"Drama"}"#);
        assert_eq!(req.path(), "/categories/create");
        assert_eq!(req.headers().get("content-type"), Some("application/json"));
        assert_eq!(req.body().as_ref(), br#"{"name":"Drama"}"#);
    }
}
