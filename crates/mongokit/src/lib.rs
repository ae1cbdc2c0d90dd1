//! Typed MongoDB collection helpers for gRPC services.
//!
//! [`Collection`] wraps a driver collection with filter normalization and a
//! per-call timeout, [`client`] turns a connection string into a [`Db`], and
//! [`interceptor`] maps whatever a handler fails with onto a
//! [`tonic::Status`].

pub mod client;
pub mod collection;
pub mod error;
pub mod filter;
pub mod interceptor;
pub mod session;
pub mod settings;

pub use client::{connect, database, database_name, default_transaction_options, Db};
pub use collection::{Collection, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use filter::{normalize_filter, object_id, Filter};
pub use session::with_transaction;
pub use settings::MongoSettings;
