//! Executes rendered requests over reqwest.
//!
//! The whole exchange, body read included, races the caller's cancellation
//! token. Losing the race drops the reqwest future, which closes the
//! connection, so cancellation reaches the socket rather than only the code
//! that runs after the response. Bodies are read in full before an envelope
//! is returned.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::call::IDEMPOTENCY_KEY_HEADER;
use crate::error::Error;
use crate::http::{HttpMethod, HttpRequest, ResponseEnvelope};

const USER_AGENT: &str = concat!("moov-core/", env!("CARGO_PKG_VERSION"));

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug)]
pub(crate) struct HttpInvoker {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpInvoker {
    pub(crate) fn new(base_url: Url, timeout: Option<Duration>) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    pub(crate) fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) async fn execute(
        &self,
        cancel: &CancellationToken,
        request: HttpRequest,
    ) -> Result<ResponseEnvelope, Error> {
        let idempotency_key = request.header(IDEMPOTENCY_KEY_HEADER).map(str::to_owned);
        debug!(
            method = request.method.as_str(),
            url = %request.url,
            idempotency_key = idempotency_key.as_deref(),
            "sending request"
        );

        let mut builder = self.http.request(request.method.into(), request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let exchange = async move {
            let response = builder.send().await.map_err(Error::transport)?;
            let status_code = response.status().as_u16();
            let headers = header_pairs(response.headers());
            let body = response.bytes().await.map_err(Error::transport)?;
            Ok::<_, Error>(ResponseEnvelope::new(status_code, headers, body, idempotency_key))
        };

        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("request cancelled");
                return Err(Error::cancelled());
            }
            result = exchange => result?,
        };

        debug!(
            status = envelope.status_code,
            class = ?envelope.status,
            "received response"
        );
        Ok(envelope)
    }
}

/// Every received header, with non-UTF-8 values decoded lossily.
fn header_pairs(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
