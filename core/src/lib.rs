//! Async client core for the Moov payments API.
//!
//! # Overview
//! A single request/response pipeline sits under every endpoint:
//!
//! 1. `credentials` holds the key pair and a cached bearer token, acquired
//!    through the OAuth2 client-credentials grant and refreshed on demand.
//! 2. `call` assembles a request from an `Endpoint` and composable `CallArg`s
//!    (headers, query parameters, JSON body, idempotency key, wait-for hint).
//! 3. The invoker renders the call, executes it with `reqwest` under the
//!    caller's `CancellationToken` and drains the body into a
//!    `ResponseEnvelope` classified by status.
//! 4. `dispatch` turns the envelope into a typed object, list, started
//!    handle or `Error`.
//!
//! `transfers` holds the endpoint façades built on top of that pipeline.
//!
//! # Design
//! - Nothing retries. Errors carry the status code, server message and raw
//!   envelope so a wrapper can decide; `Error::is_transient` is its hint.
//! - No background work. All I/O runs inline in the caller's task.
//! - Unsafe creates (transfer, refund, reversal) carry a fresh UUIDv4
//!   `X-Idempotency-Key` unless the caller supplies one.
//!
//! ```no_run
//! use moov_core::{Client, ClientConfig, CancellationToken};
//! use moov_core::transfers::with_transfer_status;
//!
//! # async fn run() -> Result<(), moov_core::Error> {
//! let client = Client::new(ClientConfig::new("public-key", "secret-key"))?;
//! let cancel = CancellationToken::new();
//! let pending = client
//!     .list_transfers(&cancel, [with_transfer_status("pending")])
//!     .await?;
//! println!("{} pending transfers", pending.len());
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod client;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod http;
mod invoker;
pub mod paths;
pub mod transfers;
pub mod types;

pub use call::{CallArg, CallBuilder, Endpoint};
pub use client::{Client, ClientConfig, DEFAULT_DOMAIN};
pub use credentials::{CredentialStore, Credentials, Token, DEFAULT_SCOPE};
pub use dispatch::Outcome;
pub use error::{Error, ErrorKind, TransportErrorKind};
pub use http::{HttpMethod, HttpRequest, ResponseEnvelope, StatusClass};
pub use tokio_util::sync::CancellationToken;
pub use transfers::CreateTransferBuilder;
pub use types::*;
