use futures::future::BoxFuture;
use mongodb::{options::TransactionOptions, Client, ClientSession};
use tracing::{debug, error};

use crate::{
    client::default_transaction_options,
    error::{Error, Result},
};

/// Runs `f` inside a transaction on a fresh session.
///
/// The transaction is committed when `f` succeeds and aborted when it fails.
/// A failed abort is reported as [`Error::AbortTransaction`] together with the
/// error returned by `f`.
///
/// ```no_run
/// # async fn run(db: mongokit::Db) -> mongokit::Result<()> {
/// let cards = db.collection::<bson::Document>("cards");
///
/// mongokit::with_transaction(db.client(), None, |session| {
///     let cards = cards.clone();
///     Box::pin(async move {
///         cards.insert_one_with_session(bson::doc! { "title": "x" }, None, session).await?;
///         Ok(())
///     })
/// })
/// .await
/// # }
/// ```
pub async fn with_transaction<T, F>(
    client: &Client,
    options: impl Into<Option<TransactionOptions>>,
    f: F,
) -> Result<T>
where
    F: for<'s> FnOnce(&'s mut ClientSession) -> BoxFuture<'s, Result<T>>,
{
    let options = options.into().unwrap_or_else(default_transaction_options);

    let mut session = client.start_session(None).await.map_err(Error::Session)?;
    session
        .start_transaction(options)
        .await
        .map_err(Error::Session)?;

    match f(&mut session).await {
        Ok(value) => {
            session.commit_transaction().await.map_err(Error::Session)?;
            debug!("transaction committed");

            Ok(value)
        }
        Err(cause) => {
            if let Err(abort) = session.abort_transaction().await {
                error!(%abort, %cause, "failed to abort transaction");
                return Err(Error::AbortTransaction {
                    abort,
                    cause: Box::new(cause),
                });
            }
            debug!(%cause, "transaction aborted");

            Err(cause)
        }
    }
}
