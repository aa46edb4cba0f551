use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub currency: String,
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodRef {
    #[serde(rename = "paymentMethodID")]
    pub payment_method_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub created_on: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_on: Option<DateTime<Utc>>,
    pub status: String,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub source: PaymentMethodRef,
    pub destination: PaymentMethodRef,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStarted {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct CreateTransfer {
    pub source: PaymentMethodRef,
    pub destination: PaymentMethodRef,
    pub amount: Amount,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
pub struct PatchTransfer {
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    #[serde(rename = "refundID")]
    pub refund_id: String,
    pub created_on: DateTime<Utc>,
    pub status: String,
    pub amount: Amount,
}

#[derive(Deserialize)]
pub struct CreateRefund {
    pub amount: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    #[serde(rename = "cancellationID")]
    pub cancellation_id: String,
    pub status: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreatedReversal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund: Option<Refund>,
}

#[derive(Deserialize)]
pub struct OptionsTarget {
    #[serde(rename = "paymentMethodID")]
    pub payment_method_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateTransferOptions {
    pub source: OptionsTarget,
    pub destination: OptionsTarget,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i32,
    pub scope: String,
}

/// Knobs for a stub instance.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub public_key: String,
    pub secret_key: String,
    /// `expires_in` of issued tokens.
    pub token_lifetime_secs: i32,
    /// Delay applied to every request before it is handled.
    pub latency: Option<Duration>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            public_key: "pk_test".to_string(),
            secret_key: "sk_test".to_string(),
            token_lifetime_secs: 3600,
            latency: None,
        }
    }
}

/// A request as seen by the stub, recorded before routing.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    fn capture(request: &Request) -> Self {
        let query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
            .map(|Query(q)| q)
            .unwrap_or_default();
        let headers = request
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        Self {
            method: request.method().as_str().to_string(),
            path: request.uri().path().to_string(),
            query,
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")?.strip_prefix("Bearer ")
    }
}

#[derive(Clone, Debug)]
struct ScriptedResponse {
    status: u16,
    body: String,
}

impl IntoResponse for ScriptedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, "application/json")], self.body).into_response()
    }
}

struct Inner {
    config: MockConfig,
    transfers: RwLock<HashMap<String, Transfer>>,
    refunds: RwLock<HashMap<String, Vec<Refund>>>,
    idempotency_keys: Mutex<HashSet<String>>,
    issued_tokens: Mutex<HashSet<String>>,
    recorded: Mutex<Vec<RecordedRequest>>,
    scripted: Mutex<HashMap<(String, String), ScriptedResponse>>,
    token_requests: AtomicUsize,
}

/// Shared state of a stub instance. Cloning shares the same state.
#[derive(Clone)]
pub struct MockState(Arc<Inner>);

impl Default for MockState {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl MockState {
    pub fn new(config: MockConfig) -> Self {
        Self(Arc::new(Inner {
            config,
            transfers: RwLock::new(HashMap::new()),
            refunds: RwLock::new(HashMap::new()),
            idempotency_keys: Mutex::new(HashSet::new()),
            issued_tokens: Mutex::new(HashSet::new()),
            recorded: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            token_requests: AtomicUsize::new(0),
        }))
    }

    pub fn config(&self) -> &MockConfig {
        &self.0.config
    }

    /// Number of successful `POST /oauth2/token` exchanges.
    pub fn token_requests(&self) -> usize {
        self.0.token_requests.load(Ordering::SeqCst)
    }

    pub async fn recorded(&self) -> Vec<RecordedRequest> {
        self.0.recorded.lock().await.clone()
    }

    pub async fn last_request(&self, method: &str, path: &str) -> Option<RecordedRequest> {
        self.0
            .recorded
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
            .cloned()
    }

    /// Answers every `method path` request with `status` and `body` until cleared.
    pub async fn script(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        self.0.scripted.lock().await.insert(
            (method.to_string(), path.to_string()),
            ScriptedResponse {
                status,
                body: body.into(),
            },
        );
    }

    pub async fn clear_script(&self, method: &str, path: &str) {
        self.0
            .scripted
            .lock()
            .await
            .remove(&(method.to_string(), path.to_string()));
    }

    pub async fn is_token_active(&self, token: &str) -> bool {
        self.0.issued_tokens.lock().await.contains(token)
    }

    fn basic_auth_matches(&self, headers: &HeaderMap) -> bool {
        let Some(encoded) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded) else {
            return false;
        };
        let expected = format!("{}:{}", self.0.config.public_key, self.0.config.secret_key);
        decoded == expected.as_bytes()
    }

    /// Records the idempotency key; false when it was seen before.
    async fn claim_idempotency_key(&self, key: &str) -> bool {
        self.0.idempotency_keys.lock().await.insert(key.to_string())
    }
}

pub fn app(state: MockState) -> Router {
    Router::new()
        .route("/oauth2/token", post(issue_token))
        .route("/oauth2/revoke", post(revoke_token))
        .route("/ping", get(ping))
        .route("/transfers", get(list_transfers).post(create_transfer))
        .route(
            "/transfers/{transfer_id}",
            get(get_transfer).patch(patch_transfer),
        )
        .route(
            "/transfers/{transfer_id}/refunds",
            get(list_refunds).post(create_refund),
        )
        .route(
            "/transfers/{transfer_id}/refunds/{refund_id}",
            get(get_refund),
        )
        .route("/transfers/{transfer_id}/reversals", post(create_reversal))
        .route("/transfer-options", post(transfer_options))
        .layer(middleware::from_fn_with_state(state.clone(), intercept))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

/// A stub bound to an ephemeral local port and served on a background task.
pub struct MockServer {
    pub addr: SocketAddr,
    pub state: MockState,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = MockState::new(config);
        let served = state.clone();
        tokio::spawn(async move {
            if let Err(e) = run(listener, served).await {
                tracing::error!(error = %e, "mock server stopped");
            }
        });
        Ok(Self { addr, state })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn waits_for_rail(headers: &HeaderMap) -> bool {
    header_value(headers, "x-wait-for") == Some("rail-response")
}

/// Records the request, applies latency and scripted responses, then
/// enforces bearer authentication outside `/oauth2/*`.
async fn intercept(State(state): State<MockState>, request: Request, next: Next) -> Response {
    let recorded = RecordedRequest::capture(&request);
    tracing::debug!(method = %recorded.method, path = %recorded.path, "mock request");
    state.0.recorded.lock().await.push(recorded.clone());

    if let Some(latency) = state.0.config.latency {
        tokio::time::sleep(latency).await;
    }

    let scripted = state
        .0
        .scripted
        .lock()
        .await
        .get(&(recorded.method.clone(), recorded.path.clone()))
        .cloned();
    if let Some(scripted) = scripted {
        return scripted.into_response();
    }

    if !is_oauth_path(request.uri()) {
        let authorized = match recorded.bearer_token() {
            Some(token) => state.is_token_active(token).await,
            None => false,
        };
        if !authorized {
            return error_response(StatusCode::UNAUTHORIZED, "missing or invalid bearer token");
        }
    }

    next.run(request).await
}

fn is_oauth_path(uri: &Uri) -> bool {
    uri.path().starts_with("/oauth2/")
}

#[derive(Deserialize)]
struct TokenQuery {
    grant_type: Option<String>,
    scope: Option<String>,
}

async fn issue_token(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Response {
    if !state.basic_auth_matches(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, "invalid client credentials");
    }
    if query.grant_type.as_deref() != Some("client_credentials") {
        return error_response(StatusCode::BAD_REQUEST, "unsupported grant_type");
    }

    state.0.token_requests.fetch_add(1, Ordering::SeqCst);
    let token = TokenResponse {
        access_token: Uuid::new_v4().simple().to_string(),
        refresh_token: Uuid::new_v4().simple().to_string(),
        token_type: "Bearer".to_string(),
        expires_in: state.0.config.token_lifetime_secs,
        scope: query.scope.unwrap_or_default(),
    };
    state
        .0
        .issued_tokens
        .lock()
        .await
        .insert(token.access_token.clone());
    (StatusCode::OK, Json(token)).into_response()
}

#[derive(Deserialize)]
struct RevokeRequest {
    token: String,
}

async fn revoke_token(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(input): Json<RevokeRequest>,
) -> Response {
    if !state.basic_auth_matches(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, "invalid client credentials");
    }
    state.0.issued_tokens.lock().await.remove(&input.token);
    StatusCode::NO_CONTENT.into_response()
}

async fn ping() -> StatusCode {
    StatusCode::OK
}

async fn create_transfer(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(input): Json<CreateTransfer>,
) -> Response {
    let Some(key) = header_value(&headers, "x-idempotency-key") else {
        return error_response(StatusCode::BAD_REQUEST, "missing X-Idempotency-Key header");
    };
    if !state.claim_idempotency_key(key).await {
        return error_response(StatusCode::CONFLICT, "idempotency key has already been used");
    }
    if input.amount.value <= 0 {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "amount: must be positive");
    }

    let now = Utc::now();
    let mut transfer = Transfer {
        transfer_id: Uuid::new_v4().to_string(),
        created_on: now,
        completed_on: None,
        status: "pending".to_string(),
        amount: input.amount,
        description: input.description,
        metadata: input.metadata,
        source: input.source,
        destination: input.destination,
    };

    if waits_for_rail(&headers) {
        transfer.status = "completed".to_string();
        transfer.completed_on = Some(now);
        state
            .0
            .transfers
            .write()
            .await
            .insert(transfer.transfer_id.clone(), transfer.clone());
        return (StatusCode::OK, Json(transfer)).into_response();
    }

    let started = TransferStarted {
        transfer_id: transfer.transfer_id.clone(),
        created_on: now,
    };
    state
        .0
        .transfers
        .write()
        .await
        .insert(transfer.transfer_id.clone(), transfer);
    (StatusCode::ACCEPTED, Json(started)).into_response()
}

#[derive(Deserialize)]
struct TransferFilter {
    status: Option<String>,
    skip: Option<usize>,
    count: Option<usize>,
}

async fn list_transfers(
    State(state): State<MockState>,
    Query(filter): Query<TransferFilter>,
) -> Json<Vec<Transfer>> {
    let transfers = state.0.transfers.read().await;
    let mut matching: Vec<Transfer> = transfers
        .values()
        .filter(|t| filter.status.as_deref().map_or(true, |s| t.status == s))
        .cloned()
        .collect();
    matching.sort_by_key(|t| t.created_on);
    Json(
        matching
            .into_iter()
            .skip(filter.skip.unwrap_or(0))
            .take(filter.count.unwrap_or(200))
            .collect(),
    )
}

async fn get_transfer(
    State(state): State<MockState>,
    Path(transfer_id): Path<String>,
) -> Response {
    match state.0.transfers.read().await.get(&transfer_id) {
        Some(transfer) => Json(transfer.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "transfer not found"),
    }
}

async fn patch_transfer(
    State(state): State<MockState>,
    Path(transfer_id): Path<String>,
    Json(input): Json<PatchTransfer>,
) -> Response {
    let mut transfers = state.0.transfers.write().await;
    let Some(transfer) = transfers.get_mut(&transfer_id) else {
        return error_response(StatusCode::NOT_FOUND, "transfer not found");
    };
    if let Some(metadata) = input.metadata {
        transfer.metadata = metadata;
    }
    Json(transfer.clone()).into_response()
}

async fn create_refund(
    State(state): State<MockState>,
    Path(transfer_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<CreateRefund>,
) -> Response {
    let Some(key) = header_value(&headers, "x-idempotency-key") else {
        return error_response(StatusCode::BAD_REQUEST, "missing X-Idempotency-Key header");
    };
    let Some(transfer) = state.0.transfers.read().await.get(&transfer_id).cloned() else {
        return error_response(StatusCode::NOT_FOUND, "transfer not found");
    };
    if !state.claim_idempotency_key(key).await {
        return error_response(StatusCode::CONFLICT, "idempotency key has already been used");
    }
    if input.amount <= 0 || input.amount > transfer.amount.value {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "amount: out of range");
    }

    let completed = waits_for_rail(&headers);
    let refund = Refund {
        refund_id: Uuid::new_v4().to_string(),
        created_on: Utc::now(),
        status: if completed { "completed" } else { "pending" }.to_string(),
        amount: Amount {
            currency: transfer.amount.currency,
            value: input.amount,
        },
    };
    state
        .0
        .refunds
        .write()
        .await
        .entry(transfer_id)
        .or_default()
        .push(refund.clone());

    if completed {
        (StatusCode::OK, Json(refund)).into_response()
    } else {
        let started = serde_json::json!({
            "refundID": refund.refund_id,
            "createdOn": refund.created_on,
        });
        (StatusCode::ACCEPTED, Json(started)).into_response()
    }
}

async fn list_refunds(
    State(state): State<MockState>,
    Path(transfer_id): Path<String>,
) -> Response {
    if !state.0.transfers.read().await.contains_key(&transfer_id) {
        return error_response(StatusCode::NOT_FOUND, "transfer not found");
    }
    let refunds = state
        .0
        .refunds
        .read()
        .await
        .get(&transfer_id)
        .cloned()
        .unwrap_or_default();
    Json(refunds).into_response()
}

async fn get_refund(
    State(state): State<MockState>,
    Path((transfer_id, refund_id)): Path<(String, String)>,
) -> Response {
    let refunds = state.0.refunds.read().await;
    let found = refunds
        .get(&transfer_id)
        .and_then(|list| list.iter().find(|r| r.refund_id == refund_id));
    match found {
        Some(refund) => Json(refund.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "refund not found"),
    }
}

#[derive(Deserialize)]
struct CreateReversal {
    amount: i64,
}

async fn create_reversal(
    State(state): State<MockState>,
    Path(transfer_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<CreateReversal>,
) -> Response {
    let Some(key) = header_value(&headers, "x-idempotency-key") else {
        return error_response(StatusCode::BAD_REQUEST, "missing X-Idempotency-Key header");
    };
    if !state.claim_idempotency_key(key).await {
        return error_response(StatusCode::CONFLICT, "idempotency key has already been used");
    }
    let mut transfers = state.0.transfers.write().await;
    let Some(transfer) = transfers.get_mut(&transfer_id) else {
        return error_response(StatusCode::NOT_FOUND, "transfer not found");
    };

    let now = Utc::now();
    let reversal = if transfer.status == "completed" {
        CreatedReversal {
            cancellation: None,
            refund: Some(Refund {
                refund_id: Uuid::new_v4().to_string(),
                created_on: now,
                status: "pending".to_string(),
                amount: Amount {
                    currency: transfer.amount.currency.clone(),
                    value: input.amount,
                },
            }),
        }
    } else {
        transfer.status = "canceled".to_string();
        CreatedReversal {
            cancellation: Some(Cancellation {
                cancellation_id: Uuid::new_v4().to_string(),
                status: "completed".to_string(),
                created_on: now,
            }),
            refund: None,
        }
    };
    Json(reversal).into_response()
}

async fn transfer_options(Json(input): Json<CreateTransferOptions>) -> Response {
    if input.amount.value <= 0 {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "amount: must be positive");
    }
    let option = |id: Option<String>, kind: &str| {
        serde_json::json!({
            "paymentMethodID": id.unwrap_or_else(|| format!("pm-{kind}")),
            "paymentMethodType": kind,
        })
    };
    Json(serde_json::json!({
        "sourceOptions": [option(input.source.payment_method_id, "ach-debit-fund")],
        "destinationOptions": [option(input.destination.payment_method_id, "ach-credit-standard")],
    }))
    .into_response()
}
