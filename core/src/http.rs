//! Plain-data HTTP types shared by the call builder, invoker and dispatcher.
//!
//! # Design
//! `HttpRequest` is the fully rendered form of a call and `ResponseEnvelope`
//! the fully drained form of a response. Neither holds a connection, so both
//! can be built and inspected in tests without touching the network. The
//! invoker is the only place that turns one into the other.

use bytes::Bytes;
use url::Url;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
///
/// Produced by `CallBuilder::into_request`. Header names are lower-case.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Coarse categorization of an HTTP outcome, used to pick a decoding path.
///
/// A failed exchange never yields a status class: it is reported as
/// `Error::Transport` before any envelope exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 200, 201, 204 and every other 2xx except 202.
    Completed,
    /// 202: the server accepted the work and finishes it asynchronously.
    Started,
    /// 409 on a request that carried an idempotency key.
    StateConflict,
    /// 4xx, including 409 without an idempotency key.
    ClientError,
    /// 5xx, and anything outside 2xx/4xx the transport let through.
    ServerError,
}

impl StatusClass {
    pub fn classify(status_code: u16, carried_idempotency_key: bool) -> Self {
        match status_code {
            202 => StatusClass::Started,
            200..=299 => StatusClass::Completed,
            409 if carried_idempotency_key => StatusClass::StateConflict,
            400..=499 => StatusClass::ClientError,
            _ => StatusClass::ServerError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusClass::Completed | StatusClass::Started)
    }
}

/// A fully read HTTP response paired with its derived status class.
///
/// Consumed by exactly one dispatcher entry point. Error values that stem
/// from a response keep the envelope so callers can inspect the raw body.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status: StatusClass,
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// The `X-Idempotency-Key` the originating request carried, if any.
    pub idempotency_key: Option<String>,
}

impl ResponseEnvelope {
    pub fn new(
        status_code: u16,
        headers: Vec<(String, String)>,
        body: impl Into<Bytes>,
        idempotency_key: Option<String>,
    ) -> Self {
        Self {
            status: StatusClass::classify(status_code, idempotency_key.is_some()),
            status_code,
            headers,
            body: body.into(),
            idempotency_key,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body as text, with invalid UTF-8 replaced. Meant for diagnostics.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
