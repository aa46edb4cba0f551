//! Decoding of response envelopes into typed results.
//!
//! # Design
//! The caller picks the entry point that matches what it expects back; the
//! envelope's status class decides whether that expectation holds. Anything
//! that is not the expected success class becomes an `Error` carrying the
//! envelope. An empty body where an object is expected is a decode error,
//! never a default value.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::Error;
use crate::http::{ResponseEnvelope, StatusClass};

/// Result of an operation that may finish synchronously or hand back an
/// asynchronous "started" handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, U> {
    Completed(T),
    Started(U),
}

impl<T, U> Outcome<T, U> {
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Started(_) => None,
        }
    }

    pub fn started(self) -> Option<U> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Started(value) => Some(value),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Outcome::Started(_))
    }
}

/// Decodes a single JSON object from a `Completed` response.
pub fn completed_object<T: DeserializeOwned>(response: ResponseEnvelope) -> Result<T, Error> {
    match response.status {
        StatusClass::Completed => decode(response),
        _ => Err(into_error(response)),
    }
}

/// Decodes a JSON array from a `Completed` response.
pub fn completed_list<T: DeserializeOwned>(response: ResponseEnvelope) -> Result<Vec<T>, Error> {
    completed_object(response)
}

/// Accepts a `Completed` response and ignores its body.
pub fn completed_empty(response: ResponseEnvelope) -> Result<(), Error> {
    match response.status {
        StatusClass::Completed => Ok(()),
        _ => Err(into_error(response)),
    }
}

/// `T` on `Completed`, `U` on `Started`.
pub fn started_or_completed<T, U>(response: ResponseEnvelope) -> Result<Outcome<T, U>, Error>
where
    T: DeserializeOwned,
    U: DeserializeOwned,
{
    match response.status {
        StatusClass::Completed => decode(response).map(Outcome::Completed),
        StatusClass::Started => decode(response).map(Outcome::Started),
        _ => Err(into_error(response)),
    }
}

/// Same decoding as [`started_or_completed`], named for create-then-await
/// operations where `Completed` means the resource was created in full.
pub fn created_or_started<T, U>(response: ResponseEnvelope) -> Result<Outcome<T, U>, Error>
where
    T: DeserializeOwned,
    U: DeserializeOwned,
{
    started_or_completed(response)
}

/// Maps a response the caller did not expect into an error.
pub fn into_error(response: ResponseEnvelope) -> Error {
    let status = response.status_code;
    match response.status {
        StatusClass::StateConflict => Error::IdempotencyReplay {
            response: Box::new(response),
        },
        StatusClass::ClientError => Error::ClientRequest {
            status,
            message: server_message(&response),
            response: Box::new(response),
        },
        StatusClass::ServerError => Error::Server {
            status,
            message: server_message(&response),
            response: Box::new(response),
        },
        class @ (StatusClass::Completed | StatusClass::Started) => Error::Decode {
            message: format!("unexpected status class {class:?}"),
            response: Box::new(response),
        },
    }
}

#[derive(Deserialize)]
struct ServerErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Extracts the `error` (or `message`) field of a JSON error body.
pub fn server_message(response: &ResponseEnvelope) -> Option<String> {
    let body: ServerErrorBody = serde_json::from_slice(&response.body).ok()?;
    body.error
        .or(body.message)
        .filter(|message| !message.trim().is_empty())
}

fn decode<T: DeserializeOwned>(response: ResponseEnvelope) -> Result<T, Error> {
    match serde_json::from_slice(&response.body) {
        Ok(value) => Ok(value),
        Err(e) => Err(Error::Decode {
            message: e.to_string(),
            response: Box::new(response),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Thing {
        id: String,
    }

    fn envelope(status: u16, body: &'static str) -> ResponseEnvelope {
        ResponseEnvelope::new(status, Vec::new(), body, None)
    }

    fn keyed(status: u16, body: &'static str) -> ResponseEnvelope {
        ResponseEnvelope::new(status, Vec::new(), body, Some("key-1".to_string()))
    }

    #[test]
    fn completed_object_decodes() {
        let thing: Thing = completed_object(envelope(200, r#"{"id":"a","extra":1}"#)).unwrap();
        assert_eq!(thing, Thing { id: "a".to_string() });
    }

    #[test]
    fn completed_object_empty_body_is_decode_error() {
        let err = completed_object::<Thing>(envelope(200, "")).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        let err = completed_object::<Thing>(envelope(204, "")).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn completed_object_rejects_started() {
        let err = completed_object::<Thing>(envelope(202, r#"{"id":"a"}"#)).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert_eq!(err.status_code(), Some(202));
    }

    #[test]
    fn completed_list_decodes() {
        let things: Vec<Thing> = completed_list(envelope(200, r#"[{"id":"a"},{"id":"b"}]"#)).unwrap();
        assert_eq!(things.len(), 2);
        let err = completed_list::<Thing>(envelope(200, r#"{"id":"a"}"#)).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn started_or_completed_picks_variant() {
        let outcome: Outcome<Thing, Thing> =
            started_or_completed(envelope(200, r#"{"id":"full"}"#)).unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.completed().unwrap().id, "full");

        let outcome: Outcome<Thing, Thing> =
            created_or_started(envelope(202, r#"{"id":"handle"}"#)).unwrap();
        assert!(outcome.is_started());
        assert_eq!(outcome.started().unwrap().id, "handle");
    }

    #[test]
    fn state_conflict_is_idempotency_replay() {
        let err = started_or_completed::<Thing, Thing>(keyed(409, r#"{"error":"duplicate"}"#))
            .unwrap_err();
        match err {
            Error::IdempotencyReplay { response } => {
                assert_eq!(response.status_code, 409);
                assert_eq!(response.idempotency_key.as_deref(), Some("key-1"));
            }
            other => panic!("expected IdempotencyReplay, got {other:?}"),
        }
    }

    #[test]
    fn conflict_without_key_is_client_error() {
        let err = completed_object::<Thing>(envelope(409, "{}")).unwrap_err();
        assert!(matches!(err, Error::ClientRequest { status: 409, .. }));
    }

    #[test]
    fn client_error_carries_server_message() {
        let err = completed_object::<Thing>(envelope(422, r#"{"error":"amount: must be positive"}"#))
            .unwrap_err();
        assert_eq!(err.server_message(), Some("amount: must be positive"));
        assert_eq!(err.status_code(), Some(422));
    }

    #[test]
    fn server_error_without_json_keeps_raw_body() {
        let err = completed_object::<Thing>(envelope(502, "<html>bad gateway</html>")).unwrap_err();
        match &err {
            Error::Server { status, message, response } => {
                assert_eq!(*status, 502);
                assert!(message.is_none());
                assert_eq!(response.body_text(), "<html>bad gateway</html>");
            }
            other => panic!("expected Server, got {other:?}"),
        }
    }

    #[test]
    fn server_message_falls_back_to_message_field() {
        let response = envelope(400, r#"{"message":"bad request"}"#);
        assert_eq!(server_message(&response).as_deref(), Some("bad request"));
        let response = envelope(400, r#"{"error":"  "}"#);
        assert!(server_message(&response).is_none());
    }

    #[test]
    fn completed_empty_ignores_body() {
        assert!(completed_empty(envelope(204, "")).is_ok());
        assert!(completed_empty(envelope(200, "not json")).is_ok());
        assert!(completed_empty(envelope(401, "")).is_err());
    }
}
