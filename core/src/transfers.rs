//! Transfer, refund and reversal endpoints.
//!
//! Each façade selects a method and path, puts its defaults ahead of the
//! caller's arguments and picks a dispatcher entry point. Creating a transfer
//! is staged: [`Client::create_transfer`] prepares the call and the returned
//! [`CreateTransferBuilder`] decides whether to wait for the rail.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::call::{self, CallArg, CallBuilder, Endpoint, WAIT_FOR_HEADER, WAIT_FOR_RAIL_RESPONSE};
use crate::client::Client;
use crate::dispatch::{self, Outcome};
use crate::error::Error;
use crate::http::HttpMethod;
use crate::paths;
use crate::types::{
    CreateRefund, CreateReversal, CreateTransfer, CreateTransferOptions, CreatedReversal, Refund,
    RefundStarted, Transfer, TransferOptions, TransferPatch, TransferStarted,
};

/// Argument accepted by [`Client::create_transfer`].
#[derive(Debug)]
pub struct CreateTransferArg(CallArg);

impl From<CallArg> for CreateTransferArg {
    fn from(arg: CallArg) -> Self {
        Self(arg)
    }
}

/// Replaces the randomly generated idempotency key.
pub fn with_transfer_idempotency_key(key: Uuid) -> CreateTransferArg {
    CreateTransferArg(call::idempotency_key(key.to_string()))
}

/// Filter accepted by [`Client::list_transfers`].
#[derive(Debug)]
pub struct ListTransferFilter(CallArg);

impl From<CallArg> for ListTransferFilter {
    fn from(arg: CallArg) -> Self {
        Self(arg)
    }
}

pub fn with_transfer_account_ids<I, S>(account_ids: I) -> ListTransferFilter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ListTransferFilter(call::param_list("accountIDs", account_ids))
}

pub fn with_transfer_status(status: impl Into<String>) -> ListTransferFilter {
    ListTransferFilter(call::param("status", status))
}

pub fn with_transfer_start_date(start: DateTime<Utc>) -> ListTransferFilter {
    ListTransferFilter(call::param("startDateTime", rfc3339(start)))
}

pub fn with_transfer_end_date(end: DateTime<Utc>) -> ListTransferFilter {
    ListTransferFilter(call::param("endDateTime", rfc3339(end)))
}

pub fn with_transfer_group(group_id: impl Into<String>) -> ListTransferFilter {
    ListTransferFilter(call::param("groupID", group_id))
}

pub fn with_transfer_refunded() -> ListTransferFilter {
    ListTransferFilter(call::param("refunded", "true"))
}

pub fn with_transfer_disputed() -> ListTransferFilter {
    ListTransferFilter(call::param("disputed", "true"))
}

pub fn with_transfer_skip(skip: u32) -> ListTransferFilter {
    ListTransferFilter(call::skip(skip))
}

pub fn with_transfer_count(count: u32) -> ListTransferFilter {
    ListTransferFilter(call::count(count))
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Change applied to the body of [`Client::patch_transfer`].
pub struct TransferPatcher(Box<dyn FnOnce(&mut TransferPatch) + Send>);

impl fmt::Debug for TransferPatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransferPatcher(..)")
    }
}

pub fn patch_transfer_metadata(metadata: HashMap<String, String>) -> TransferPatcher {
    TransferPatcher(Box::new(move |patch| patch.metadata = Some(metadata)))
}

/// Argument accepted by [`Client::refund_transfer`].
#[derive(Debug)]
pub struct CreateRefundArg(CallArg);

impl From<CallArg> for CreateRefundArg {
    fn from(arg: CallArg) -> Self {
        Self(arg)
    }
}

pub fn with_refund_wait_for_rail_response() -> CreateRefundArg {
    CreateRefundArg(call::wait_for(WAIT_FOR_RAIL_RESPONSE))
}

/// Replaces the randomly generated idempotency key.
pub fn with_refund_idempotency_key(key: Uuid) -> CreateRefundArg {
    CreateRefundArg(call::idempotency_key(key.to_string()))
}

/// Argument accepted by [`Client::reverse_transfer`].
#[derive(Debug)]
pub struct CreateReversalArg(CallArg);

impl From<CallArg> for CreateReversalArg {
    fn from(arg: CallArg) -> Self {
        Self(arg)
    }
}

/// Replaces the randomly generated idempotency key.
pub fn with_reversal_idempotency_key(key: Uuid) -> CreateReversalArg {
    CreateReversalArg(call::idempotency_key(key.to_string()))
}

/// A prepared `POST /transfers`, waiting for the caller to choose how long
/// to wait.
///
/// The call is assembled when the builder is created, so the idempotency key
/// reported here is the one that goes on the wire.
#[derive(Debug)]
pub struct CreateTransferBuilder<'a> {
    client: &'a Client,
    cancel: CancellationToken,
    call: Result<CallBuilder, Error>,
}

impl CreateTransferBuilder<'_> {
    /// The key this request will carry. Reuse it to retry the same transfer.
    /// `None` only when the arguments failed to assemble.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.call.as_ref().ok().and_then(CallBuilder::idempotency_key)
    }

    /// Creates the transfer and returns as soon as the server accepted it.
    #[instrument(name = "moov.create_transfer", skip_all, fields(idempotency_key = self.idempotency_key()))]
    pub async fn started(self) -> Result<TransferStarted, Error> {
        let response = self.client.send(&self.cancel, self.call?).await?;
        match dispatch::created_or_started::<TransferStarted, TransferStarted>(response)? {
            Outcome::Completed(started) | Outcome::Started(started) => Ok(started),
        }
    }

    /// Creates the transfer and asks the server to hold the response until
    /// the rail answers. `Started` means the server gave up waiting.
    #[instrument(
        name = "moov.create_transfer.wait_for_rail_response",
        skip_all,
        fields(idempotency_key = self.idempotency_key())
    )]
    pub async fn wait_for_rail_response(self) -> Result<Outcome<Transfer, TransferStarted>, Error> {
        let mut call = self.call?;
        call.set_header(WAIT_FOR_HEADER, WAIT_FOR_RAIL_RESPONSE);
        let response = self.client.send(&self.cancel, call).await?;
        dispatch::started_or_completed(response)
    }
}

impl Client {
    /// Prepares a transfer. A fresh UUIDv4 idempotency key goes first so
    /// `with_transfer_idempotency_key`, or any argument setting the header,
    /// can replace it.
    pub fn create_transfer<I>(
        &self,
        cancel: &CancellationToken,
        transfer: &CreateTransfer,
        options: I,
    ) -> CreateTransferBuilder<'_>
    where
        I: IntoIterator<Item = CreateTransferArg>,
    {
        let args = [
            call::accept_json(),
            call::json_body(transfer),
            call::idempotency_key(Uuid::new_v4().to_string()),
        ]
        .into_iter()
        .chain(options.into_iter().map(|o| o.0));

        CreateTransferBuilder {
            client: self,
            cancel: cancel.clone(),
            call: CallBuilder::assemble(Endpoint::new(HttpMethod::Post, paths::TRANSFERS), args),
        }
    }

    #[instrument(name = "moov.list_transfers", skip_all)]
    pub async fn list_transfers<I>(
        &self,
        cancel: &CancellationToken,
        filters: I,
    ) -> Result<Vec<Transfer>, Error>
    where
        I: IntoIterator<Item = ListTransferFilter>,
    {
        let args = std::iter::once(call::accept_json()).chain(filters.into_iter().map(|f| f.0));
        let response = self
            .call_http(cancel, Endpoint::new(HttpMethod::Get, paths::TRANSFERS), args)
            .await?;
        dispatch::completed_list(response)
    }

    #[instrument(name = "moov.get_transfer", skip(self, cancel))]
    pub async fn get_transfer(
        &self,
        cancel: &CancellationToken,
        transfer_id: &str,
    ) -> Result<Transfer, Error> {
        let response = self
            .call_http(
                cancel,
                Endpoint::new(HttpMethod::Get, paths::TRANSFER).path_param(transfer_id),
                [call::accept_json()],
            )
            .await?;
        dispatch::completed_object(response)
    }

    #[instrument(name = "moov.patch_transfer", skip(self, cancel, patches))]
    pub async fn patch_transfer<I>(
        &self,
        cancel: &CancellationToken,
        transfer_id: &str,
        patches: I,
    ) -> Result<Transfer, Error>
    where
        I: IntoIterator<Item = TransferPatcher>,
    {
        let mut patch = TransferPatch::default();
        for patcher in patches {
            (patcher.0)(&mut patch);
        }

        let response = self
            .call_http(
                cancel,
                Endpoint::new(HttpMethod::Patch, paths::TRANSFER).path_param(transfer_id),
                [call::accept_json(), call::json_body(&patch)],
            )
            .await?;
        dispatch::completed_object(response)
    }

    /// Refunds a transfer. Without `with_refund_wait_for_rail_response` the
    /// server usually answers with the started handle.
    #[instrument(name = "moov.refund_transfer", skip(self, cancel, refund, options))]
    pub async fn refund_transfer<I>(
        &self,
        cancel: &CancellationToken,
        transfer_id: &str,
        refund: &CreateRefund,
        options: I,
    ) -> Result<Outcome<Refund, RefundStarted>, Error>
    where
        I: IntoIterator<Item = CreateRefundArg>,
    {
        let args = [
            call::accept_json(),
            call::idempotency_key(Uuid::new_v4().to_string()),
            call::json_body(refund),
        ]
        .into_iter()
        .chain(options.into_iter().map(|o| o.0));

        let response = self
            .call_http(
                cancel,
                Endpoint::new(HttpMethod::Post, paths::REFUNDS).path_param(transfer_id),
                args,
            )
            .await?;
        dispatch::created_or_started(response)
    }

    #[instrument(name = "moov.list_refunds", skip(self, cancel))]
    pub async fn list_refunds(
        &self,
        cancel: &CancellationToken,
        transfer_id: &str,
    ) -> Result<Vec<Refund>, Error> {
        let response = self
            .call_http(
                cancel,
                Endpoint::new(HttpMethod::Get, paths::REFUNDS).path_param(transfer_id),
                [call::accept_json()],
            )
            .await?;
        dispatch::completed_list(response)
    }

    #[instrument(name = "moov.get_refund", skip(self, cancel))]
    pub async fn get_refund(
        &self,
        cancel: &CancellationToken,
        transfer_id: &str,
        refund_id: &str,
    ) -> Result<Refund, Error> {
        let response = self
            .call_http(
                cancel,
                Endpoint::new(HttpMethod::Get, paths::REFUND)
                    .path_param(transfer_id)
                    .path_param(refund_id),
                [call::accept_json()],
            )
            .await?;
        dispatch::completed_object(response)
    }

    #[instrument(name = "moov.reverse_transfer", skip(self, cancel, reversal, options))]
    pub async fn reverse_transfer<I>(
        &self,
        cancel: &CancellationToken,
        transfer_id: &str,
        reversal: &CreateReversal,
        options: I,
    ) -> Result<CreatedReversal, Error>
    where
        I: IntoIterator<Item = CreateReversalArg>,
    {
        let args = [
            call::accept_json(),
            call::idempotency_key(Uuid::new_v4().to_string()),
            call::json_body(reversal),
        ]
        .into_iter()
        .chain(options.into_iter().map(|o| o.0));

        let response = self
            .call_http(
                cancel,
                Endpoint::new(HttpMethod::Post, paths::REVERSALS).path_param(transfer_id),
                args,
            )
            .await?;
        dispatch::completed_object(response)
    }

    /// Payment method pairings available between a source and destination.
    #[instrument(name = "moov.transfer_options", skip_all)]
    pub async fn transfer_options(
        &self,
        cancel: &CancellationToken,
        payload: &CreateTransferOptions,
    ) -> Result<TransferOptions, Error> {
        let response = self
            .call_http(
                cancel,
                Endpoint::new(HttpMethod::Post, paths::TRANSFER_OPTIONS),
                [call::accept_json(), call::json_body(payload)],
            )
            .await?;
        dispatch::completed_object(response)
    }
}
