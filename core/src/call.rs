//! Composable request construction.
//!
//! # Design
//! A call is assembled from an `Endpoint` (method, path template, positional
//! path parameters) and a list of `CallArg`s. Each argument is a one-shot
//! mutator over the `CallBuilder`; they are applied in order, so a later
//! argument overwrites an earlier one for headers, scalar query parameters
//! and the body. Multi-valued query parameters accumulate instead.
//!
//! Façades put their defaults (`Accept`, a fresh idempotency key) first and
//! the caller's arguments after them, which is what lets a caller override
//! any default.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use url::Url;

use crate::error::Error;
use crate::http::{HttpMethod, HttpRequest};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";
pub const WAIT_FOR_HEADER: &str = "x-wait-for";
pub const WAIT_FOR_RAIL_RESPONSE: &str = "rail-response";

/// Method plus path template with `%s` placeholders, filled positionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    method: HttpMethod,
    path_template: &'static str,
    path_params: Vec<String>,
}

impl Endpoint {
    pub fn new(method: HttpMethod, path_template: &'static str) -> Self {
        Self {
            method,
            path_template,
            path_params: Vec::new(),
        }
    }

    /// Appends the next positional path parameter.
    pub fn path_param(mut self, value: impl Into<String>) -> Self {
        self.path_params.push(value.into());
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path_template(&self) -> &'static str {
        self.path_template
    }

    /// Substitutes the percent-encoded path parameters into the template.
    pub fn render_path(&self) -> Result<String, Error> {
        let segments: Vec<&str> = self.path_template.split("%s").collect();
        let expected = segments.len() - 1;
        if expected != self.path_params.len() {
            return Err(Error::Configuration(format!(
                "path {} expects {expected} parameter(s), got {}",
                self.path_template,
                self.path_params.len()
            )));
        }

        let mut path = String::with_capacity(self.path_template.len());
        for (i, segment) in segments.iter().enumerate() {
            path.push_str(segment);
            if let Some(param) = self.path_params.get(i) {
                if param.is_empty() {
                    return Err(Error::Configuration(format!(
                        "path {} parameter {} is empty",
                        self.path_template,
                        i + 1
                    )));
                }
                path.push_str(&urlencoding::encode(param));
            }
        }
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum QueryValue {
    Single(String),
    Multi(Vec<String>),
}

impl QueryValue {
    fn render(&self) -> String {
        match self {
            QueryValue::Single(value) => value.clone(),
            QueryValue::Multi(values) => values.join(","),
        }
    }
}

#[derive(Debug, Clone)]
struct Body {
    content_type: String,
    bytes: Bytes,
}

/// Accumulated state of a single outbound request.
#[derive(Debug, Clone)]
pub struct CallBuilder {
    endpoint: Endpoint,
    headers: BTreeMap<String, String>,
    params: BTreeMap<String, QueryValue>,
    body: Option<Body>,
}

impl CallBuilder {
    pub fn new(endpoint: Endpoint) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), JSON_CONTENT_TYPE.to_string());
        Self {
            endpoint,
            headers,
            params: BTreeMap::new(),
            body: None,
        }
    }

    /// Builds a call by applying `args` in order.
    pub fn assemble<I>(endpoint: Endpoint, args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = CallArg>,
    {
        let mut call = Self::new(endpoint);
        for arg in args {
            arg.apply(&mut call)?;
        }
        Ok(call)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params
            .insert(name.into(), QueryValue::Single(value.into()));
    }

    /// Adds values to a multi-valued parameter, skipping ones already present.
    /// A scalar value previously set under the same name becomes the first element.
    pub fn extend_param_list<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self
            .params
            .entry(name.into())
            .or_insert_with(|| QueryValue::Multi(Vec::new()));
        if let QueryValue::Single(existing) = entry {
            let existing = std::mem::take(existing);
            *entry = QueryValue::Multi(vec![existing]);
        }
        if let QueryValue::Multi(list) = entry {
            for value in values {
                let value = value.into();
                if !list.contains(&value) {
                    list.push(value);
                }
            }
        }
    }

    /// Query parameter as it will appear on the wire (before URL encoding).
    pub fn param(&self, name: &str) -> Option<String> {
        self.params.get(name).map(QueryValue::render)
    }

    pub fn set_body(&mut self, content_type: impl Into<String>, bytes: impl Into<Bytes>) {
        self.body = Some(Body {
            content_type: content_type.into(),
            bytes: bytes.into(),
        });
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.header(IDEMPOTENCY_KEY_HEADER)
    }

    /// Renders the final request against `base_url`. A `bearer` token, when
    /// given, takes precedence over any `Authorization` header argument.
    pub fn into_request(self, base_url: &Url, bearer: Option<&str>) -> Result<HttpRequest, Error> {
        let path = self.endpoint.render_path()?;

        let mut url = base_url.clone();
        let prefix = base_url.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}{path}"));
        url.set_query(None);
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.params {
                pairs.append_pair(name, &value.render());
            }
        }

        let mut headers = self.headers;
        if let Some(body) = &self.body {
            headers.insert("content-type".to_string(), body.content_type.clone());
        }
        if let Some(token) = bearer {
            headers.insert("authorization".to_string(), format!("Bearer {token}"));
        }

        Ok(HttpRequest {
            method: self.endpoint.method,
            url,
            headers: headers.into_iter().collect(),
            body: self.body.map(|body| body.bytes),
        })
    }
}

type ApplyFn = Box<dyn FnOnce(&mut CallBuilder) -> Result<(), Error> + Send>;

/// A one-shot mutation of a `CallBuilder`.
pub struct CallArg(ApplyFn);

impl CallArg {
    pub fn new<F>(apply: F) -> Self
    where
        F: FnOnce(&mut CallBuilder) -> Result<(), Error> + Send + 'static,
    {
        Self(Box::new(apply))
    }

    pub fn apply(self, call: &mut CallBuilder) -> Result<(), Error> {
        (self.0)(call)
    }
}

impl fmt::Debug for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallArg(..)")
    }
}

pub fn accept_json() -> CallArg {
    header("accept", JSON_CONTENT_TYPE)
}

/// Sets a JSON body. Encoding happens eagerly; an encoder failure surfaces
/// when the call is assembled.
pub fn json_body<T: Serialize + ?Sized>(body: &T) -> CallArg {
    let encoded = serde_json::to_vec(body);
    CallArg::new(move |call| {
        let bytes = encoded.map_err(Error::Encode)?;
        call.set_body(JSON_CONTENT_TYPE, bytes);
        Ok(())
    })
}

pub fn idempotency_key(key: impl Into<String>) -> CallArg {
    header(IDEMPOTENCY_KEY_HEADER, key)
}

pub fn wait_for(mode: impl Into<String>) -> CallArg {
    header(WAIT_FOR_HEADER, mode)
}

pub fn skip(skip: u32) -> CallArg {
    param("skip", skip.to_string())
}

pub fn count(count: u32) -> CallArg {
    param("count", count.to_string())
}

pub fn param(name: impl Into<String>, value: impl Into<String>) -> CallArg {
    let (name, value) = (name.into(), value.into());
    CallArg::new(move |call| {
        call.set_param(name, value);
        Ok(())
    })
}

/// Multi-valued query parameter, sent comma-joined.
pub fn param_list<I, S>(name: impl Into<String>, values: I) -> CallArg
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let name = name.into();
    let values: Vec<String> = values.into_iter().map(Into::into).collect();
    CallArg::new(move |call| {
        call.extend_param_list(name, values);
        Ok(())
    })
}

pub fn header(name: impl Into<String>, value: impl Into<String>) -> CallArg {
    let (name, value) = (name.into(), value.into());
    CallArg::new(move |call| {
        call.set_header(&name, value);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths;

    fn base() -> Url {
        Url::parse("https://api.moov.io").unwrap()
    }

    #[test]
    fn render_path_substitutes_in_order() {
        let endpoint = Endpoint::new(HttpMethod::Get, paths::REFUND)
            .path_param("tr-1")
            .path_param("rf-2");
        assert_eq!(endpoint.render_path().unwrap(), "/transfers/tr-1/refunds/rf-2");
    }

    #[test]
    fn render_path_encodes_params() {
        let endpoint = Endpoint::new(HttpMethod::Get, paths::TRANSFER).path_param("a/b c");
        assert_eq!(endpoint.render_path().unwrap(), "/transfers/a%2Fb%20c");
    }

    #[test]
    fn render_path_rejects_param_count_mismatch() {
        let err = Endpoint::new(HttpMethod::Get, paths::TRANSFER)
            .render_path()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = Endpoint::new(HttpMethod::Get, paths::TRANSFERS)
            .path_param("extra")
            .render_path()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn render_path_rejects_empty_param() {
        let err = Endpoint::new(HttpMethod::Get, paths::TRANSFER)
            .path_param("")
            .render_path()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn defaults_to_accept_json() {
        let call = CallBuilder::new(Endpoint::new(HttpMethod::Get, paths::TRANSFERS));
        assert_eq!(call.header("Accept"), Some(JSON_CONTENT_TYPE));
    }

    #[test]
    fn later_arguments_win() {
        let call = CallBuilder::assemble(
            Endpoint::new(HttpMethod::Post, paths::TRANSFERS),
            vec![
                idempotency_key("first"),
                skip(10),
                json_body(&serde_json::json!({"n": 1})),
                idempotency_key("second"),
                skip(20),
                json_body(&serde_json::json!({"n": 2})),
            ],
        )
        .unwrap();
        assert_eq!(call.idempotency_key(), Some("second"));
        assert_eq!(call.param("skip").as_deref(), Some("20"));

        let request = call.into_request(&base(), None).unwrap();
        let body: serde_json::Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["n"], 2);
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let call = CallBuilder::assemble(
            Endpoint::new(HttpMethod::Get, paths::TRANSFERS),
            vec![header("X-Custom", "a"), header("x-custom", "b")],
        )
        .unwrap();
        assert_eq!(call.header("X-CUSTOM"), Some("b"));
    }

    #[test]
    fn multi_valued_params_union() {
        let call = CallBuilder::assemble(
            Endpoint::new(HttpMethod::Get, paths::TRANSFERS),
            vec![
                param_list("accountIDs", ["a", "b"]),
                param_list("accountIDs", ["b", "c"]),
            ],
        )
        .unwrap();
        assert_eq!(call.param("accountIDs").as_deref(), Some("a,b,c"));
    }

    #[test]
    fn scalar_then_list_keeps_scalar_value() {
        let mut call = CallBuilder::new(Endpoint::new(HttpMethod::Get, paths::TRANSFERS));
        call.set_param("status", "pending");
        call.extend_param_list("status", ["completed"]);
        assert_eq!(call.param("status").as_deref(), Some("pending,completed"));
    }

    #[test]
    fn into_request_renders_url_and_headers() {
        let call = CallBuilder::assemble(
            Endpoint::new(HttpMethod::Get, paths::TRANSFER).path_param("tr-1"),
            vec![param("status", "pending"), wait_for(WAIT_FOR_RAIL_RESPONSE)],
        )
        .unwrap();
        let request = call.into_request(&base(), Some("tok")).unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(
            request.url.as_str(),
            "https://api.moov.io/transfers/tr-1?status=pending"
        );
        assert_eq!(request.header("authorization"), Some("Bearer tok"));
        assert_eq!(request.header("x-wait-for"), Some("rail-response"));
        assert!(request.body.is_none());
        assert!(request.header("content-type").is_none());
    }

    #[test]
    fn into_request_without_params_has_no_query() {
        let call = CallBuilder::new(Endpoint::new(HttpMethod::Get, paths::PING));
        let request = call.into_request(&base(), None).unwrap();
        assert_eq!(request.url.as_str(), "https://api.moov.io/ping");
        assert!(request.header("authorization").is_none());
    }

    #[test]
    fn into_request_keeps_base_path_prefix() {
        let base = Url::parse("http://127.0.0.1:8080/sandbox/").unwrap();
        let call = CallBuilder::new(Endpoint::new(HttpMethod::Get, paths::TRANSFERS));
        let request = call.into_request(&base, None).unwrap();
        assert_eq!(request.url.as_str(), "http://127.0.0.1:8080/sandbox/transfers");
    }

    #[test]
    fn json_body_sets_content_type() {
        let call = CallBuilder::assemble(
            Endpoint::new(HttpMethod::Post, paths::TRANSFER_OPTIONS),
            vec![json_body(&serde_json::json!({"amount": 5}))],
        )
        .unwrap();
        let request = call.into_request(&base(), Some("tok")).unwrap();
        assert_eq!(request.header("content-type"), Some(JSON_CONTENT_TYPE));
    }

    #[test]
    fn bearer_overrides_authorization_argument() {
        let call = CallBuilder::assemble(
            Endpoint::new(HttpMethod::Get, paths::TRANSFERS),
            vec![header("Authorization", "Basic abc")],
        )
        .unwrap();
        let request = call.into_request(&base(), Some("tok")).unwrap();
        assert_eq!(request.header("authorization"), Some("Bearer tok"));
    }

    #[test]
    fn json_body_encoding_failure_surfaces_on_assemble() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "non-string key");
        let err = CallBuilder::assemble(
            Endpoint::new(HttpMethod::Post, paths::TRANSFERS),
            vec![json_body(&map)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }
}
