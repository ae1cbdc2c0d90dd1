use std::{future::Future, time::Duration};

use bson::{doc, oid::ObjectId, Bson, Document};
use futures::{future::BoxFuture, TryStreamExt};
use mongodb::{
    options::{
        CountOptions, DeleteOptions, FindOneOptions, FindOptions, InsertManyOptions,
        InsertOneOptions, TransactionOptions, UpdateModifications, UpdateOptions,
    },
    Client, ClientSession, Cursor,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{
    error::{Error, Result},
    filter::{self, normalize_filter, Filter},
    session,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Typed accessor for a single collection.
///
/// Every operation normalizes its filter, runs under the configured timeout
/// and reports "matched nothing" as [`Error::NoDocuments`].
#[derive(Debug)]
pub struct Collection<T> {
    client: Client,
    inner: mongodb::Collection<T>,
    raw: mongodb::Collection<Document>,
    timeout: Duration,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            inner: self.inner.clone(),
            raw: self.raw.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T> Collection<T> {
    pub fn new(client: Client, inner: mongodb::Collection<T>, timeout: Duration) -> Self {
        let raw = inner.clone_with_type::<Document>();

        Self {
            client,
            inner,
            raw,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn inner(&self) -> &mongodb::Collection<T> {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn namespace(&self) -> String {
        self.inner.namespace().to_string()
    }

    pub fn object_id(&self, id: &str) -> Result<ObjectId> {
        filter::object_id(id)
    }

    /// Paging options skipping `index` documents and returning at most `size`.
    pub fn find_options(index: u64, size: u32) -> FindOptions {
        FindOptions::builder()
            .skip(index)
            .limit(i64::from(size))
            .build()
    }

    pub async fn with_transaction<R, F>(
        &self,
        options: impl Into<Option<TransactionOptions>>,
        f: F,
    ) -> Result<R>
    where
        F: for<'s> FnOnce(&'s mut ClientSession) -> BoxFuture<'s, Result<R>>,
    {
        session::with_transaction(&self.client, options, f).await
    }

    async fn timed<R>(&self, operation: &'static str, fut: impl Future<Output = R>) -> Result<R> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Timeout {
                operation,
                timeout: self.timeout,
            })
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub async fn insert_one(
        &self,
        doc: T,
        options: impl Into<Option<InsertOneOptions>>,
    ) -> Result<String> {
        debug!(namespace = %self.inner.namespace(), "document insert");
        let res = self
            .timed("insert_one", self.inner.insert_one(doc, options))
            .await?
            .map_err(|source| Error::Query {
                operation: "insert_one",
                source,
            })?;
        debug!(namespace = %self.inner.namespace(), result = ?res, "document inserted");

        Ok(render_id(res.inserted_id))
    }

    pub async fn insert_one_with_session(
        &self,
        doc: T,
        options: impl Into<Option<InsertOneOptions>>,
        session: &mut ClientSession,
    ) -> Result<String> {
        debug!(namespace = %self.inner.namespace(), "document insert in session");
        let res = self
            .timed(
                "insert_one",
                self.inner.insert_one_with_session(doc, options, session),
            )
            .await?
            .map_err(|source| Error::Query {
                operation: "insert_one",
                source,
            })?;
        debug!(namespace = %self.inner.namespace(), result = ?res, "document inserted");

        Ok(render_id(res.inserted_id))
    }

    /// Inserts `docs` and returns their ids in input order.
    pub async fn insert_many(
        &self,
        docs: Vec<T>,
        options: impl Into<Option<InsertManyOptions>>,
    ) -> Result<Vec<String>> {
        debug!(namespace = %self.inner.namespace(), count = docs.len(), "documents insert");
        let res = self
            .timed("insert_many", self.inner.insert_many(docs, options))
            .await?
            .map_err(|source| Error::Query {
                operation: "insert_many",
                source,
            })?;
        debug!(namespace = %self.inner.namespace(), result = ?res, "documents inserted");

        let mut ids: Vec<_> = res.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);

        Ok(ids.into_iter().map(|(_, id)| render_id(id)).collect())
    }

    pub async fn update_one(
        &self,
        filter: impl Into<Filter>,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> Result<()> {
        let query = normalize_filter(filter)?;

        debug!(namespace = %self.inner.namespace(), "document update");
        let res = self
            .timed("update_one", self.inner.update_one(query, update, options))
            .await?
            .map_err(|source| Error::Query {
                operation: "update_one",
                source,
            })?;
        ensure_matched(res.matched_count, res.upserted_id.is_some())?;
        debug!(namespace = %self.inner.namespace(), result = ?res, "document updated");

        Ok(())
    }

    pub async fn update_one_with_session(
        &self,
        filter: impl Into<Filter>,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
        session: &mut ClientSession,
    ) -> Result<()> {
        let query = normalize_filter(filter)?;

        debug!(namespace = %self.inner.namespace(), "document update in session");
        let res = self
            .timed(
                "update_one",
                self.inner
                    .update_one_with_session(query, update, options, session),
            )
            .await?
            .map_err(|source| Error::Query {
                operation: "update_one",
                source,
            })?;
        ensure_matched(res.matched_count, res.upserted_id.is_some())?;
        debug!(namespace = %self.inner.namespace(), result = ?res, "document updated");

        Ok(())
    }

    pub async fn delete_one(
        &self,
        filter: impl Into<Filter>,
        options: impl Into<Option<DeleteOptions>>,
    ) -> Result<()> {
        let query = normalize_filter(filter)?;

        debug!(namespace = %self.inner.namespace(), "document delete");
        let res = self
            .timed("delete_one", self.inner.delete_one(query, options))
            .await?
            .map_err(|source| Error::Query {
                operation: "delete_one",
                source,
            })?;
        ensure_deleted(res.deleted_count)?;
        debug!(namespace = %self.inner.namespace(), result = ?res, "document deleted");

        Ok(())
    }

    pub async fn delete_one_with_session(
        &self,
        filter: impl Into<Filter>,
        options: impl Into<Option<DeleteOptions>>,
        session: &mut ClientSession,
    ) -> Result<()> {
        let query = normalize_filter(filter)?;

        debug!(namespace = %self.inner.namespace(), "document delete in session");
        let res = self
            .timed(
                "delete_one",
                self.inner.delete_one_with_session(query, options, session),
            )
            .await?
            .map_err(|source| Error::Query {
                operation: "delete_one",
                source,
            })?;
        ensure_deleted(res.deleted_count)?;
        debug!(namespace = %self.inner.namespace(), result = ?res, "document deleted");

        Ok(())
    }

    pub async fn find_one(
        &self,
        filter: impl Into<Filter>,
        options: impl Into<Option<FindOneOptions>>,
    ) -> Result<T> {
        let query = normalize_filter(filter)?;

        let found = self
            .timed("find_one", self.raw.find_one(query, options))
            .await?
            .map_err(|source| Error::Query {
                operation: "find_one",
                source,
            })?;

        Self::decode(found)
    }

    pub async fn find_one_with_session(
        &self,
        filter: impl Into<Filter>,
        options: impl Into<Option<FindOneOptions>>,
        session: &mut ClientSession,
    ) -> Result<T> {
        let query = normalize_filter(filter)?;

        let found = self
            .timed(
                "find_one",
                self.raw.find_one_with_session(query, options, session),
            )
            .await?
            .map_err(|source| Error::Query {
                operation: "find_one",
                source,
            })?;

        Self::decode(found)
    }

    pub async fn find(
        &self,
        filter: impl Into<Filter>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<T>> {
        let query = normalize_filter(filter)?;
        let options = options.into();

        self.timed("find", async move {
            let cursor = self
                .raw
                .find(query, options)
                .await
                .map_err(|source| Error::Query {
                    operation: "find",
                    source,
                })?;

            Self::all(cursor).await
        })
        .await?
    }

    pub async fn count_documents(
        &self,
        filter: impl Into<Filter>,
        options: impl Into<Option<CountOptions>>,
    ) -> Result<u64> {
        let query = normalize_filter(filter)?;

        self.timed("count_documents", self.inner.count_documents(query, options))
            .await?
            .map_err(|source| Error::Query {
                operation: "count_documents",
                source,
            })
    }

    /// Decodes a single raw result, treating a missing document as
    /// [`Error::NoDocuments`].
    pub fn decode(found: Option<Document>) -> Result<T> {
        let found = found.ok_or(Error::NoDocuments)?;

        bson::from_document(found).map_err(Error::Decode)
    }

    /// Drains `cursor`, separating cursor failures from decode failures.
    pub async fn all(cursor: Cursor<Document>) -> Result<Vec<T>> {
        let found: Vec<Document> = cursor.try_collect().await.map_err(|source| Error::Query {
            operation: "find",
            source,
        })?;

        found
            .into_iter()
            .map(|doc| bson::from_document(doc).map_err(Error::Decode))
            .collect()
    }

    pub fn to_document(&self, doc: &T) -> Result<Document> {
        debug!("marshal document");
        bson::to_document(doc).map_err(Error::Encode)
    }

    /// `$set` update replacing every field of `doc`.
    pub fn set_document(&self, doc: &T) -> Result<Document> {
        let doc = self.to_document(doc)?;

        Ok(doc! {
            "$set": doc
        })
    }
}

fn render_id(id: Bson) -> String {
    match id {
        Bson::ObjectId(id) => id.to_hex(),
        Bson::String(id) => id,
        id => id.to_string(),
    }
}

fn ensure_matched(matched_count: u64, upserted: bool) -> Result<()> {
    if matched_count == 0 && !upserted {
        return Err(Error::NoDocuments);
    }

    Ok(())
}

fn ensure_deleted(deleted_count: u64) -> Result<()> {
    if deleted_count == 0 {
        return Err(Error::NoDocuments);
    }

    Ok(())
}
