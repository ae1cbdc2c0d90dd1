use std::time::Duration;

use mongodb::error::{BulkWriteFailure, ErrorKind, WriteFailure};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load mongodb settings: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to parse connection string: {0}")]
    ConnectionString(#[source] mongodb::error::Error),

    #[error("database name not found in URI")]
    MissingDatabase,

    #[error("failed to create mongodb client due to error: {0}")]
    Connect(#[source] mongodb::error::Error),

    #[error("failed to execute {operation} due to error: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: mongodb::error::Error,
    },

    #[error("failed to decode document due to error: {0}")]
    Decode(#[source] bson::de::Error),

    #[error("failed to encode document due to error: {0}")]
    Encode(#[source] bson::ser::Error),

    #[error("failed to convert hex to object id due to error: {0}")]
    ObjectId(#[source] bson::oid::Error),

    #[error("couldn't normalize filter")]
    NormalizeFilter,

    #[error("no documents in result")]
    NoDocuments,

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("session failure: {0}")]
    Session(#[source] mongodb::error::Error),

    #[error("failed to abort transaction ({abort}) after error: {cause}")]
    AbortTransaction {
        abort: mongodb::error::Error,
        cause: Box<Error>,
    },
}

impl Error {
    /// Returns the driver error wrapped by this error, if any.
    pub fn driver_error(&self) -> Option<&mongodb::error::Error> {
        match self {
            Error::ConnectionString(err)
            | Error::Connect(err)
            | Error::Session(err)
            | Error::Query { source: err, .. } => Some(err),
            Error::AbortTransaction { cause, .. } => cause.driver_error(),
            _ => None,
        }
    }

    pub fn is_no_documents(&self) -> bool {
        match self {
            Error::NoDocuments => true,
            Error::AbortTransaction { cause, .. } => cause.is_no_documents(),
            _ => false,
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.driver_error().map_or(false, is_duplicate_key)
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::AbortTransaction { cause, .. } => cause.is_timeout(),
            _ => self.driver_error().map_or(false, is_timeout),
        }
    }
}

pub(crate) fn is_duplicate_key_error(code: i32, message: &str) -> bool {
    match code {
        11000 | 11001 | 12582 => true,
        16460 => message.contains("E11000"),
        _ => false,
    }
}

/// Reports whether the server rejected a write because of a unique index.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            is_duplicate_key_error(write_error.code, &write_error.message)
        }
        ErrorKind::BulkWrite(BulkWriteFailure {
            write_errors: Some(write_errors),
            ..
        }) => write_errors
            .iter()
            .any(|write_error| is_duplicate_key_error(write_error.code, &write_error.message)),
        ErrorKind::Command(command_error) => {
            is_duplicate_key_error(command_error.code, &command_error.message)
        }
        _ => false,
    }
}

const MAX_TIME_MS_EXPIRED: i32 = 50;

/// Reports whether the driver or the server gave up on an operation because
/// of a timeout: a network timeout, no server selected in time, or a
/// `maxTimeMS` limit hit on the server.
pub fn is_timeout(err: &mongodb::error::Error) -> bool {
    if err.contains_label("NetworkTimeoutError") {
        return true;
    }

    match err.kind.as_ref() {
        ErrorKind::Io(io_err) => io_err.kind() == std::io::ErrorKind::TimedOut,
        ErrorKind::ServerSelection { .. } => true,
        ErrorKind::Command(command_error) => command_error.code == MAX_TIME_MS_EXPIRED,
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == MAX_TIME_MS_EXPIRED,
        ErrorKind::Write(WriteFailure::WriteConcernError(wc_error)) => wc_error.code == MAX_TIME_MS_EXPIRED,
        _ => false,
    }
}
