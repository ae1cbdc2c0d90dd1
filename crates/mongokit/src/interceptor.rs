//! Maps storage errors onto gRPC status codes.
//!
//! Service handlers return `anyhow`-compatible errors and are wrapped with
//! [`unary`] or [`stream`]; whatever they fail with reaches the client as one
//! of `NotFound`, `AlreadyExists`, `DeadlineExceeded` or `Internal`, unless it
//! already is a [`Status`].

use std::{error::Error as StdError, future::Future, pin::Pin};

use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::warn;

use crate::error::{self, Error};

pub type NormalizedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

pub fn normalize_error(err: impl Into<anyhow::Error>) -> Status {
    let err = match err.into().downcast::<Status>() {
        Ok(status) => return status,
        Err(err) => err,
    };

    if let Some(status) = err.chain().find_map(|cause| cause.downcast_ref::<Status>()) {
        return status.clone();
    }

    let message = err.to_string();

    if err.chain().any(is_no_documents) {
        Status::not_found(message)
    } else if err.chain().any(is_duplicate_key) {
        Status::already_exists(message)
    } else if err.chain().any(is_timeout) {
        Status::deadline_exceeded(message)
    } else {
        Status::internal(message)
    }
}

pub fn normalize_result<T, E>(res: Result<T, E>) -> Result<T, Status>
where
    E: Into<anyhow::Error>,
{
    res.map_err(normalize_error)
}

pub fn normalize_stream<S, T, E>(stream: S) -> NormalizedStream<T>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<anyhow::Error> + 'static,
{
    Box::pin(stream.map(normalize_result::<T, E>))
}

/// Runs a unary handler and normalizes the error it returns.
pub async fn unary<Req, Res, E, F, Fut>(request: Request<Req>, handler: F) -> Result<Response<Res>, Status>
where
    F: FnOnce(Request<Req>) -> Fut,
    Fut: Future<Output = Result<Response<Res>, E>>,
    E: Into<anyhow::Error>,
{
    normalize_result(handler(request).await).map_err(|status| {
        warn!(code = ?status.code(), message = status.message(), "unary request failed");
        status
    })
}

/// Runs a streaming handler, normalizing both its own error and every error
/// item of the stream it produces.
pub async fn stream<Req, S, T, E, HE, F, Fut>(
    request: Request<Req>,
    handler: F,
) -> Result<Response<NormalizedStream<T>>, Status>
where
    F: FnOnce(Request<Req>) -> Fut,
    Fut: Future<Output = Result<Response<S>, HE>>,
    HE: Into<anyhow::Error>,
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<anyhow::Error> + 'static,
{
    let response = normalize_result(handler(request).await).map_err(|status| {
        warn!(code = ?status.code(), message = status.message(), "stream request failed");
        status
    })?;

    let metadata = response.metadata().clone();
    let mut normalized = Response::new(normalize_stream(response.into_inner()));
    *normalized.metadata_mut() = metadata;

    Ok(normalized)
}

fn is_no_documents(cause: &(dyn StdError + 'static)) -> bool {
    cause
        .downcast_ref::<Error>()
        .map_or(false, Error::is_no_documents)
}

fn is_duplicate_key(cause: &(dyn StdError + 'static)) -> bool {
    if let Some(err) = cause.downcast_ref::<Error>() {
        return err.is_duplicate_key();
    }

    cause
        .downcast_ref::<mongodb::error::Error>()
        .map_or(false, error::is_duplicate_key)
}

fn is_timeout(cause: &(dyn StdError + 'static)) -> bool {
    if let Some(err) = cause.downcast_ref::<Error>() {
        return err.is_timeout();
    }
    if let Some(err) = cause.downcast_ref::<mongodb::error::Error>() {
        return error::is_timeout(err);
    }
    if cause.is::<tokio::time::error::Elapsed>() {
        return true;
    }

    cause
        .downcast_ref::<std::io::Error>()
        .map_or(false, |err| err.kind() == std::io::ErrorKind::TimedOut)
}
