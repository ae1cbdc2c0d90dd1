use std::{ops::Deref, time::Duration};

use bson::doc;
use mongodb::{
    options::{Acknowledgment, ClientOptions, DatabaseOptions, ReadConcern, TransactionOptions, WriteConcern},
    Client, Database,
};
use tracing::debug;

use crate::{
    collection::Collection,
    error::{Error, Result},
    settings::MongoSettings,
};

/// Database handle together with the client it was opened from.
#[derive(Clone, Debug)]
pub struct Db {
    client: Client,
    database: Database,
    timeout: Duration,
}

impl Db {
    pub fn new(client: Client, database: Database, timeout: Duration) -> Self {
        Self {
            client,
            database,
            timeout,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn collection<T>(&self, name: &str) -> Collection<T> {
        Collection::new(
            self.client.clone(),
            self.database.collection::<T>(name),
            self.timeout,
        )
    }
}

impl Deref for Db {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.database
    }
}

/// Creates a client for `settings.uri`, pinging the deployment first when
/// `settings.ping` is set.
pub async fn connect(settings: &MongoSettings) -> Result<Client> {
    let (client, ()) = open(settings, |_| Ok(())).await?;

    Ok(client)
}

/// Connects and returns the database named in the URI path, configured with
/// the read concern, write concern and read preference carried by the URI.
pub async fn database(settings: &MongoSettings) -> Result<Db> {
    let (client, (name, db_options)) = open(settings, |options| {
        let name = options
            .default_database
            .clone()
            .ok_or(Error::MissingDatabase)?;

        Ok((name, database_options(options)))
    })
    .await?;
    debug!(database = %name, "open database");

    let database = client.database_with_options(&name, db_options);

    Ok(Db::new(client, database, settings.timeout()))
}

/// Parses the URI and builds the client within the connect timeout. `inspect`
/// sees the parsed options before any client exists.
async fn open<R>(
    settings: &MongoSettings,
    inspect: impl FnOnce(&ClientOptions) -> Result<R>,
) -> Result<(Client, R)> {
    let timeout = settings.connect_timeout();

    tokio::time::timeout(timeout, async {
        let options = parse_options(&settings.uri).await?;
        let inspected = inspect(&options)?;
        let client = Client::with_options(options).map_err(Error::Connect)?;

        if settings.ping {
            debug!("ping mongodb deployment");
            client
                .database("admin")
                .run_command(doc! { "ping": 1 }, None)
                .await
                .map_err(Error::Connect)?;
        }

        Ok((client, inspected))
    })
    .await
    .map_err(|_| Error::Timeout {
        operation: "connect",
        timeout,
    })?
}

/// Extracts the database name from the path of a connection string.
pub async fn database_name(uri: &str) -> Result<String> {
    parse_options(uri)
        .await?
        .default_database
        .ok_or(Error::MissingDatabase)
}

pub fn database_options(options: &ClientOptions) -> DatabaseOptions {
    let mut db_options = DatabaseOptions::default();
    db_options.read_concern = options.read_concern.clone();
    db_options.write_concern = options.write_concern.clone();
    db_options.selection_criteria = options.selection_criteria.clone();

    db_options
}

/// Majority writes with snapshot reads.
pub fn default_transaction_options() -> TransactionOptions {
    let mut write_concern = WriteConcern::default();
    write_concern.w = Some(Acknowledgment::Majority);

    let mut options = TransactionOptions::default();
    options.write_concern = Some(write_concern);
    options.read_concern = Some(ReadConcern::snapshot());

    options
}

async fn parse_options(uri: &str) -> Result<ClientOptions> {
    ClientOptions::parse(uri)
        .await
        .map_err(Error::ConnectionString)
}
