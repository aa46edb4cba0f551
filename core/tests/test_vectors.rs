//! Check classification, dispatch and request rendering against the JSON
//! vectors stored in `test-vectors/`.
//!
//! Bodies are compared as parsed JSON so field order never matters.

use moov_core::call::{self, CallArg};
use moov_core::{
    dispatch, paths, Client, ClientConfig, Endpoint, Error, ErrorKind, HttpMethod, Outcome,
    ResponseEnvelope, StatusClass,
};
use serde_json::Value;

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PATCH" => HttpMethod::Patch,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn parse_class(s: &str) -> StatusClass {
    match s {
        "completed" => StatusClass::Completed,
        "started" => StatusClass::Started,
        "state_conflict" => StatusClass::StateConflict,
        "client_error" => StatusClass::ClientError,
        "server_error" => StatusClass::ServerError,
        other => panic!("unknown status class: {other}"),
    }
}

fn parse_kind(s: &str) -> ErrorKind {
    match s {
        "idempotency_replay" => ErrorKind::IdempotencyReplay,
        "client_request" => ErrorKind::ClientRequest,
        "server" => ErrorKind::Server,
        "decode" => ErrorKind::Decode,
        other => panic!("unknown error kind: {other}"),
    }
}

fn parse_path(s: &str) -> &'static str {
    match s {
        "ping" => paths::PING,
        "transfers" => paths::TRANSFERS,
        "transfer" => paths::TRANSFER,
        "refunds" => paths::REFUNDS,
        "refund" => paths::REFUND,
        "reversals" => paths::REVERSALS,
        "transfer_options" => paths::TRANSFER_OPTIONS,
        other => panic!("unknown path: {other}"),
    }
}

fn as_strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

fn parse_arg(arg: &Value) -> CallArg {
    let (name, value) = arg.as_object().unwrap().iter().next().unwrap();
    match name.as_str() {
        "param" => {
            let pair = as_strings(value);
            call::param(pair[0].clone(), pair[1].clone())
        }
        "param_list" => call::param_list(value[0].as_str().unwrap(), as_strings(&value[1])),
        "header" => {
            let pair = as_strings(value);
            call::header(pair[0].clone(), pair[1].clone())
        }
        "skip" => call::skip(value.as_u64().unwrap() as u32),
        "count" => call::count(value.as_u64().unwrap() as u32),
        "idempotency_key" => call::idempotency_key(value.as_str().unwrap()),
        "wait_for" => call::wait_for(value.as_str().unwrap()),
        "json_body" => call::json_body(value),
        other => panic!("unknown arg: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[test]
fn classification_vectors() {
    let raw = include_str!("../../test-vectors/classification.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let status = case["status"].as_u64().unwrap() as u16;
        let keyed = case["idempotency_key"].as_bool().unwrap();
        let expected = parse_class(case["class"].as_str().unwrap());
        assert_eq!(
            StatusClass::classify(status, keyed),
            expected,
            "status {status} keyed={keyed}"
        );
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

fn run_dispatch(entry: &str, response: ResponseEnvelope) -> Result<Value, Error> {
    match entry {
        "object" => dispatch::completed_object::<Value>(response),
        "list" => dispatch::completed_list::<Value>(response).map(Value::Array),
        "empty" => dispatch::completed_empty(response).map(|()| Value::Null),
        "started_or_completed" => {
            dispatch::started_or_completed::<Value, Value>(response).map(|outcome| match outcome {
                Outcome::Completed(v) => serde_json::json!({ "completed": v }),
                Outcome::Started(v) => serde_json::json!({ "started": v }),
            })
        }
        other => panic!("unknown entry: {other}"),
    }
}

#[test]
fn dispatch_vectors() {
    let raw = include_str!("../../test-vectors/dispatch.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let status = case["status"].as_u64().unwrap() as u16;
        let key = case["idempotency_key"].as_str().map(str::to_string);
        let body = case["body"].as_str().unwrap().as_bytes().to_vec();
        let response = ResponseEnvelope::new(status, Vec::new(), body.clone(), key);

        let result = run_dispatch(case["entry"].as_str().unwrap(), response);
        let expect = &case["expect"];

        if let Some(kind) = expect["error"].as_str() {
            let err = result.expect_err(name);
            assert_eq!(err.kind(), parse_kind(kind), "{name}: kind");
            assert_eq!(err.status_code(), Some(status), "{name}: status");
            assert_eq!(err.server_message(), expect["message"].as_str(), "{name}: message");
            assert_eq!(&err.response().unwrap().body[..], body.as_slice(), "{name}: body kept");
        } else if let Some(ok) = expect.get("ok") {
            assert_eq!(&result.unwrap(), ok, "{name}");
        } else {
            let value = result.unwrap();
            assert_eq!(&value, expect, "{name}");
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[test]
fn request_vectors() {
    let raw = include_str!("../../test-vectors/requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let client = Client::new(
        ClientConfig::new("pk", "sk").with_domain(vectors["base_url"].as_str().unwrap()),
    )
    .unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let method = parse_method(case["method"].as_str().unwrap());
        let mut endpoint = Endpoint::new(method, parse_path(case["path"].as_str().unwrap()));
        for param in as_strings(&case["path_params"]) {
            endpoint = endpoint.path_param(param);
        }
        let args: Vec<CallArg> = case["args"].as_array().unwrap().iter().map(parse_arg).collect();

        let request = client.prepare(endpoint, args).unwrap();
        let expected = &case["expected"];

        assert_eq!(request.method, method, "{name}: method");
        assert_eq!(request.url.as_str(), expected["url"].as_str().unwrap(), "{name}: url");

        let expected_headers = expected["headers"].as_object().unwrap();
        assert_eq!(request.headers.len(), expected_headers.len(), "{name}: header count");
        for (header, value) in expected_headers {
            assert_eq!(
                request.header(header),
                value.as_str(),
                "{name}: header {header}"
            );
        }

        match expected.get("body") {
            Some(body) => {
                let sent: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
                assert_eq!(&sent, body, "{name}: body");
            }
            None => assert!(request.body.is_none(), "{name}: no body"),
        }
    }
}
