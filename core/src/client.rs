//! The `Client` and its configuration.
//!
//! # Design
//! `Client` owns the credential store and the HTTP invoker and exposes one
//! generic pipeline, `call_http`: assemble a call from arguments, attach a
//! fresh bearer token, execute, hand back the envelope. Endpoint façades are
//! thin wrappers that pick an `Endpoint`, put their defaults in front of the
//! caller's arguments and choose a dispatcher entry point.
//!
//! The client spawns no background work. Every operation runs inline in the
//! caller's task and takes a `CancellationToken` that is honoured down to the
//! socket.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use url::Url;

use crate::call::{self, CallArg, CallBuilder, Endpoint};
use crate::credentials::{CredentialStore, Credentials, Token, DEFAULT_SCOPE};
use crate::dispatch;
use crate::error::Error;
use crate::http::{HttpMethod, HttpRequest, ResponseEnvelope};
use crate::invoker::HttpInvoker;
use crate::paths;

pub const DEFAULT_DOMAIN: &str = "api.moov.io";

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

/// Client construction parameters. Deserializable so callers can source them
/// from any configuration format; the crate itself reads no environment.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub public_key: String,
    pub secret_key: String,
    /// Host name (`api.moov.io`) or full origin (`http://127.0.0.1:8080`).
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Per-request deadline in milliseconds, covering connect through body read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn new(public_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            domain: default_domain(),
            scope: default_scope(),
            timeout_ms: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sub-millisecond precision is dropped; a non-zero timeout never rounds to zero.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.timeout_ms = Some(if timeout.is_zero() { 0 } else { millis.max(1) });
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// `https://{domain}` unless the domain already names a scheme.
    pub fn base_url(&self) -> Result<Url, Error> {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.is_empty() {
            return Err(Error::Configuration("domain is empty".to_string()));
        }
        let origin = if domain.contains("://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        let url = Url::parse(&origin)
            .map_err(|e| Error::Configuration(format!("invalid domain {domain:?}: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Configuration(format!(
                "unsupported scheme {other:?} in domain {domain:?}"
            ))),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .field("domain", &self.domain)
            .field("scope", &self.scope)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Typed access to the Moov API.
///
/// Not `Clone`: the client exclusively owns its credentials and token cache.
/// Share it behind an `Arc` to use it from several tasks.
#[derive(Debug)]
pub struct Client {
    invoker: HttpInvoker,
    credentials: CredentialStore,
}

impl Client {
    /// Builds a client. Missing keys are not rejected here; they surface as
    /// `Error::Configuration` from the first authenticated call.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let invoker = HttpInvoker::new(config.base_url()?, config.timeout())?;
        let credentials = CredentialStore::new(
            Credentials::new(config.public_key, config.secret_key),
            config.scope,
        );
        Ok(Self {
            invoker,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        self.invoker.base_url()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// A fresh bearer token, acquiring one if needed.
    pub async fn bearer_token(&self, cancel: &CancellationToken) -> Result<Arc<Token>, Error> {
        self.credentials.bearer_token(&self.invoker, cancel).await
    }

    /// Revokes the cached token via `POST /oauth2/revoke`.
    #[instrument(name = "moov.revoke_token", skip_all)]
    pub async fn revoke_token(&self, cancel: &CancellationToken) -> Result<(), Error> {
        self.credentials.revoke(&self.invoker, cancel).await
    }

    /// Renders a call without sending it. No token is attached.
    pub fn prepare<I>(&self, endpoint: Endpoint, args: I) -> Result<HttpRequest, Error>
    where
        I: IntoIterator<Item = CallArg>,
    {
        CallBuilder::assemble(endpoint, args)?.into_request(self.invoker.base_url(), None)
    }

    /// Sends an authenticated call and returns the drained response.
    ///
    /// Arguments apply in order; put defaults first so callers can override them.
    pub async fn call_http<I>(
        &self,
        cancel: &CancellationToken,
        endpoint: Endpoint,
        args: I,
    ) -> Result<ResponseEnvelope, Error>
    where
        I: IntoIterator<Item = CallArg>,
    {
        let call = CallBuilder::assemble(endpoint, args)?;
        self.send(cancel, call).await
    }

    /// Sends an already assembled call with a fresh bearer token.
    pub(crate) async fn send(
        &self,
        cancel: &CancellationToken,
        call: CallBuilder,
    ) -> Result<ResponseEnvelope, Error> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        let token = self.bearer_token(cancel).await?;
        let request = call.into_request(self.invoker.base_url(), Some(&token.access_token))?;
        self.invoker.execute(cancel, request).await
    }

    /// `GET /ping`: checks connectivity and credentials.
    #[instrument(name = "moov.ping", skip_all)]
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<(), Error> {
        let response = self
            .call_http(
                cancel,
                Endpoint::new(HttpMethod::Get, paths::PING),
                [call::accept_json()],
            )
            .await?;
        dispatch::completed_empty(response)
    }
}
