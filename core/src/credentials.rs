//! OAuth2 client-credentials token acquisition and caching.
//!
//! # Design
//! The store owns the key pair and the current bearer token. The token sits
//! behind an async mutex that is held for the whole exchange, so N callers
//! racing on a cold or stale cache perform exactly one exchange and the rest
//! observe its result. Readers always get an `Arc<Token>` snapshot; a
//! refresh swaps the `Arc` and never mutates a token in place.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::call::{self, CallBuilder, Endpoint, FORM_CONTENT_TYPE};
use crate::dispatch;
use crate::error::Error;
use crate::http::{HttpMethod, StatusClass};
use crate::invoker::HttpInvoker;
use crate::paths;

pub const DEFAULT_SCOPE: &str = "/accounts.write";

/// A token is reacquired this long before the server says it expires.
pub const FRESHNESS_MARGIN_SECS: i64 = 30;

/// Bearer token returned by `POST /oauth2/token`.
///
/// Only the five wire fields are serialized; `acquired_at` is local state.
#[derive(Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i32,
    #[serde(default)]
    pub scope: String,
    #[serde(skip, default = "Utc::now")]
    pub acquired_at: DateTime<Utc>,
}

impl Token {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.acquired_at + Duration::seconds(i64::from(self.expires_in))
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let usable = Duration::seconds(i64::from(self.expires_in) - FRESHNESS_MARGIN_SECS);
        now.signed_duration_since(self.acquired_at) < usable
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// Public/secret key pair issued by the platform.
#[derive(Clone)]
pub struct Credentials {
    public_key: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(public_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Both keys must be present before any authenticated call.
    pub fn validate(&self) -> Result<(), Error> {
        if self.public_key.trim().is_empty() {
            return Err(Error::Configuration("public key is not set".to_string()));
        }
        if self.secret_key.trim().is_empty() {
            return Err(Error::Configuration("secret key is not set".to_string()));
        }
        Ok(())
    }

    /// `Basic base64(public:secret)`.
    pub fn basic_authorization(&self) -> String {
        let pair = format!("{}:{}", self.public_key, self.secret_key);
        format!("Basic {}", STANDARD.encode(pair))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct RevokeRequest<'a> {
    token: &'a str,
    token_type_hint: &'static str,
}

#[derive(Debug)]
pub struct CredentialStore {
    credentials: Credentials,
    scope: String,
    current: Mutex<Option<Arc<Token>>>,
}

impl CredentialStore {
    pub fn new(credentials: Credentials, scope: impl Into<String>) -> Self {
        Self {
            credentials,
            scope: scope.into(),
            current: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The cached token, fresh or not, without touching the network.
    pub async fn cached_token(&self) -> Option<Arc<Token>> {
        self.current.lock().await.clone()
    }

    /// Returns a fresh bearer token, running the client-credentials grant
    /// when the cache is empty or stale.
    pub(crate) async fn bearer_token(
        &self,
        invoker: &HttpInvoker,
        cancel: &CancellationToken,
    ) -> Result<Arc<Token>, Error> {
        self.credentials.validate()?;

        let mut current = self.lock(cancel).await?;
        if let Some(token) = current.as_ref().filter(|token| token.is_fresh()) {
            return Ok(Arc::clone(token));
        }

        let token = Arc::new(self.acquire(invoker, cancel).await?);
        *current = Some(Arc::clone(&token));
        Ok(token)
    }

    /// Revokes the cached access token and clears the cache. A no-op when
    /// nothing is cached.
    pub(crate) async fn revoke(
        &self,
        invoker: &HttpInvoker,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        self.credentials.validate()?;

        let mut current = self.lock(cancel).await?;
        let Some(token) = current.clone() else {
            debug!("no cached token to revoke");
            return Ok(());
        };

        let call = CallBuilder::assemble(
            Endpoint::new(HttpMethod::Post, paths::OAUTH2_REVOKE),
            vec![
                call::accept_json(),
                call::header("authorization", self.credentials.basic_authorization()),
                call::json_body(&RevokeRequest {
                    token: &token.access_token,
                    token_type_hint: "access_token",
                }),
            ],
        )?;
        let response = invoker
            .execute(cancel, call.into_request(invoker.base_url(), None)?)
            .await?;
        if response.status == StatusClass::ClientError {
            return Err(authentication_failed(response));
        }
        dispatch::completed_empty(response)?;

        *current = None;
        info!("bearer token revoked");
        Ok(())
    }

    async fn lock(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MutexGuard<'_, Option<Arc<Token>>>, Error> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled()),
            guard = self.current.lock() => Ok(guard),
        }
    }

    async fn acquire(&self, invoker: &HttpInvoker, cancel: &CancellationToken) -> Result<Token, Error> {
        let call = CallBuilder::assemble(
            Endpoint::new(HttpMethod::Post, paths::OAUTH2_TOKEN),
            vec![
                call::accept_json(),
                call::header("content-type", FORM_CONTENT_TYPE),
                call::header("authorization", self.credentials.basic_authorization()),
                call::param("grant_type", "client_credentials"),
                call::param("scope", self.scope.clone()),
            ],
        )?;
        let response = invoker
            .execute(cancel, call.into_request(invoker.base_url(), None)?)
            .await?;

        if response.status == StatusClass::ClientError {
            let err = authentication_failed(response);
            warn!(error = %err, "token exchange rejected");
            return Err(err);
        }

        let mut token: Token = dispatch::completed_object(response)?;
        token.acquired_at = Utc::now();
        info!(
            scope = %token.scope,
            expires_in = token.expires_in,
            "acquired bearer token"
        );
        Ok(token)
    }
}

fn authentication_failed(response: crate::http::ResponseEnvelope) -> Error {
    Error::AuthenticationFailed {
        status: response.status_code,
        message: dispatch::server_message(&response),
        response: Box::new(response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in: i32, acquired_at: DateTime<Utc>) -> Token {
        Token {
            access_token: "abc".to_string(),
            refresh_token: "r".to_string(),
            token_type: "Bearer".to_string(),
            expires_in,
            scope: DEFAULT_SCOPE.to_string(),
            acquired_at,
        }
    }

    #[test]
    fn token_json_preserves_wire_fields() {
        let raw = r#"{"access_token":"abc","refresh_token":"r","token_type":"Bearer","expires_in":3600,"scope":"/accounts.write"}"#;
        let parsed: Token = serde_json::from_str(raw).unwrap();
        let back: Token = serde_json::from_str(&serde_json::to_string(&parsed).unwrap()).unwrap();
        assert_eq!(back.access_token, "abc");
        assert_eq!(back.refresh_token, "r");
        assert_eq!(back.token_type, "Bearer");
        assert_eq!(back.expires_in, 3600);
        assert_eq!(back.scope, "/accounts.write");

        let json = serde_json::to_value(&parsed).unwrap();
        assert!(json.get("acquired_at").is_none());
    }

    #[test]
    fn token_tolerates_missing_optional_fields() {
        let parsed: Token =
            serde_json::from_str(r#"{"access_token":"abc","token_type":"Bearer","expires_in":60}"#)
                .unwrap();
        assert!(parsed.refresh_token.is_empty());
        assert!(parsed.scope.is_empty());
    }

    #[test]
    fn freshness_honours_margin() {
        let acquired = Utc::now();
        let t = token(3600, acquired);
        assert!(t.is_fresh_at(acquired));
        assert!(t.is_fresh_at(acquired + Duration::seconds(3569)));
        assert!(!t.is_fresh_at(acquired + Duration::seconds(3570)));
        assert_eq!(t.expires_at(), acquired + Duration::seconds(3600));
    }

    #[test]
    fn short_lived_token_is_never_fresh() {
        let acquired = Utc::now();
        assert!(!token(30, acquired).is_fresh_at(acquired));
        assert!(!token(10, acquired).is_fresh_at(acquired));
    }

    #[test]
    fn debug_redacts_secrets() {
        let printed = format!("{:?}", token(60, Utc::now()));
        assert!(!printed.contains("abc"));
        let printed = format!("{:?}", Credentials::new("pk_1", "sk_secret"));
        assert!(printed.contains("pk_1"));
        assert!(!printed.contains("sk_secret"));
    }

    #[test]
    fn validate_requires_both_keys() {
        assert!(Credentials::new("pk", "sk").validate().is_ok());
        assert!(matches!(
            Credentials::new("pk", "").validate(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Credentials::new(" ", "sk").validate(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn basic_authorization_encodes_pair() {
        let header = Credentials::new("public", "secret").basic_authorization();
        assert_eq!(header, format!("Basic {}", STANDARD.encode("public:secret")));
    }
}
