//! Error types for the Moov client.
//!
//! # Design
//! Every public operation returns a single `Error` value. Variants that stem
//! from an HTTP response keep the full `ResponseEnvelope`, so a caller
//! deciding whether to retry can look at the status code, the server message
//! and the raw body. Nothing in this crate retries on its own; `is_transient`
//! is the hint a higher-level retry policy keys on.

use thiserror::Error;

use crate::http::ResponseEnvelope;

/// Coarse error category, stable across variants' payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    AuthenticationFailed,
    IdempotencyReplay,
    ClientRequest,
    Server,
    Transport,
    Decode,
    Encode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The caller's cancellation token fired before the exchange finished.
    Cancelled,
    /// The configured request timeout elapsed.
    Timeout,
    /// The connection could not be established.
    Connect,
    Other,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed credentials or client configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The token endpoint rejected the key pair.
    #[error("authentication failed with HTTP {status}{}", fmt_message(.message))]
    AuthenticationFailed {
        status: u16,
        message: Option<String>,
        response: Box<ResponseEnvelope>,
    },

    /// The server already saw this idempotency key.
    #[error("idempotency key replayed (HTTP {})", .response.status_code)]
    IdempotencyReplay { response: Box<ResponseEnvelope> },

    /// Validation, not-found or permission errors.
    #[error("request rejected with HTTP {status}{}", fmt_message(.message))]
    ClientRequest {
        status: u16,
        message: Option<String>,
        response: Box<ResponseEnvelope>,
    },

    #[error("server error HTTP {status}{}", fmt_message(.message))]
    Server {
        status: u16,
        message: Option<String>,
        response: Box<ResponseEnvelope>,
    },

    #[error("transport error ({kind:?}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode HTTP {} response: {message}", .response.status_code)]
    Decode {
        message: String,
        response: Box<ResponseEnvelope>,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
}

fn fmt_message(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            Error::IdempotencyReplay { .. } => ErrorKind::IdempotencyReplay,
            Error::ClientRequest { .. } => ErrorKind::ClientRequest,
            Error::Server { .. } => ErrorKind::Server,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Encode(_) => ErrorKind::Encode,
        }
    }

    /// The response this error was derived from, if there was one.
    pub fn response(&self) -> Option<&ResponseEnvelope> {
        match self {
            Error::AuthenticationFailed { response, .. }
            | Error::IdempotencyReplay { response }
            | Error::ClientRequest { response, .. }
            | Error::Server { response, .. }
            | Error::Decode { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response().map(|response| response.status_code)
    }

    /// Message the server put in its error body, when it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Error::AuthenticationFailed { message, .. }
            | Error::ClientRequest { message, .. }
            | Error::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Server-side and network failures a caller may retry. Cancellation is
    /// the caller's own decision and is never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Server { .. } => true,
            Error::Transport { kind, .. } => *kind != TransportErrorKind::Cancelled,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Transport {
                kind: TransportErrorKind::Cancelled,
                ..
            }
        )
    }

    pub(crate) fn cancelled() -> Self {
        Error::Transport {
            kind: TransportErrorKind::Cancelled,
            message: "operation cancelled".to_string(),
            source: None,
        }
    }

    pub(crate) fn transport(source: reqwest::Error) -> Self {
        let kind = if source.is_timeout() {
            TransportErrorKind::Timeout
        } else if source.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        };
        Error::Transport {
            kind,
            message: source.to_string(),
            source: Some(source),
        }
    }
}
