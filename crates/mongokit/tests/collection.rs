//! Runs against a live deployment named by `MONGODB_TEST_URI`, e.g.
//! `mongodb://localhost:27017/mongokit_test`.
//!
//! `cargo test -- --ignored`

use bson::{doc, oid::ObjectId};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use mongokit::{interceptor, Collection, Error, MongoSettings};
use serde_derive::{Deserialize, Serialize};
use tonic::Code;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Card {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    title: String,
    position: i32,
}

impl Card {
    fn new(title: &str, position: i32) -> Self {
        Self {
            id: None,
            title: title.to_owned(),
            position,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Tag {
    #[serde(rename = "_id")]
    id: String,
    name: String,
}

async fn collection<T>(name: &str) -> Collection<T> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let uri = std::env::var("MONGODB_TEST_URI").expect("MONGODB_TEST_URI is not set");
    let mut settings = MongoSettings::new(uri);
    settings.ping = true;

    let db = mongokit::database(&settings).await.unwrap();
    let name = format!("{}_{}", name, ObjectId::new().to_hex());

    db.collection::<T>(&name)
}

#[tokio::test]
#[ignore]
async fn crud_round_trip() {
    let cards = collection::<Card>("cards").await;

    let id = cards.insert_one(Card::new("todo", 1), None).await.unwrap();
    assert_eq!(id.len(), 24);

    let found = cards.find_one(id.as_str(), None).await.unwrap();
    assert_eq!(found.title, "todo");

    cards
        .update_one(id.as_str(), doc! { "$set": { "position": 5 } }, None)
        .await
        .unwrap();
    let found = cards.find_one(("title", "todo"), None).await.unwrap();
    assert_eq!(found.position, 5);

    assert_eq!(cards.count_documents(doc! {}, None).await.unwrap(), 1);

    cards.delete_one(id.as_str(), None).await.unwrap();
    assert!(matches!(
        cards.find_one(id.as_str(), None).await,
        Err(Error::NoDocuments)
    ));

    cards.inner().drop(None).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn insert_many_keeps_order_and_pages() {
    let cards = collection::<Card>("cards").await;

    let docs = (0..5).map(|i| Card::new(&format!("card {}", i), i)).collect();
    let ids = cards.insert_many(docs, None).await.unwrap();
    assert_eq!(ids.len(), 5);

    let first = cards.find_one(ids[0].as_str(), None).await.unwrap();
    assert_eq!(first.position, 0);

    let mut options = Collection::<Card>::find_options(2, 2);
    options.sort = Some(doc! { "position": 1 });
    let page = cards.find(doc! {}, options).await.unwrap();
    assert_eq!(
        page.iter().map(|card| card.position).collect::<Vec<_>>(),
        vec![2, 3]
    );

    let some = cards
        .find(vec![doc! { "position": { "$gte": 1 } }, doc! { "position": { "$lt": 3 } }], None)
        .await
        .unwrap();
    assert_eq!(some.len(), 2);

    cards.inner().drop(None).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn zero_effect_writes_are_no_documents() {
    let cards = collection::<Card>("cards").await;
    let missing = ObjectId::new();

    let res = cards
        .update_one(missing, doc! { "$set": { "position": 1 } }, None)
        .await;
    assert!(matches!(res, Err(Error::NoDocuments)));

    let res = cards.delete_one(missing, None).await;
    assert_eq!(interceptor::normalize_error(res.unwrap_err()).code(), Code::NotFound);

    cards.inner().drop(None).await.ok();
}

#[tokio::test]
#[ignore]
async fn string_ids_and_duplicates() {
    let tags = collection::<Tag>("tags").await;

    let tag = Tag {
        id: "urgent".into(),
        name: "Urgent".into(),
    };
    assert_eq!(tags.insert_one(tag.clone(), None).await.unwrap(), "urgent");

    let err = tags.insert_one(tag, None).await.unwrap_err();
    assert!(err.is_duplicate_key());
    assert_eq!(interceptor::normalize_error(err).code(), Code::AlreadyExists);

    let found = tags.find_one(doc! { "_id": "urgent" }, None).await.unwrap();
    assert_eq!(found.name, "Urgent");

    tags.inner().drop(None).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn unique_index_violation_is_already_exists() {
    let cards = collection::<Card>("cards").await;
    cards
        .inner()
        .create_index(
            IndexModel::builder()
                .keys(doc! { "title": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            None,
        )
        .await
        .unwrap();

    cards.insert_one(Card::new("todo", 1), None).await.unwrap();
    let err = cards
        .insert_many(vec![Card::new("doing", 2), Card::new("todo", 3)], None)
        .await
        .unwrap_err();

    assert_eq!(interceptor::normalize_error(err).code(), Code::AlreadyExists);

    cards.inner().drop(None).await.unwrap();
}

// Transactions need a replica set or sharded deployment.
#[tokio::test]
#[ignore]
async fn failed_transaction_is_rolled_back() {
    let cards = collection::<Card>("cards").await;
    cards.insert_one(Card::new("seed", 0), None).await.unwrap();

    let res: mongokit::Result<()> = cards
        .with_transaction(None, |session| {
            let cards = cards.clone();
            Box::pin(async move {
                cards
                    .insert_one_with_session(Card::new("todo", 1), None, session)
                    .await?;
                cards
                    .delete_one_with_session(ObjectId::new(), None, session)
                    .await
            })
        })
        .await;
    assert!(matches!(res, Err(Error::NoDocuments)));
    assert_eq!(cards.count_documents(doc! {}, None).await.unwrap(), 1);

    let id = cards
        .with_transaction(None, |session| {
            let cards = cards.clone();
            Box::pin(async move {
                let id = cards
                    .insert_one_with_session(Card::new("todo", 1), None, session)
                    .await?;
                cards
                    .update_one_with_session(id.as_str(), doc! { "$set": { "position": 2 } }, None, session)
                    .await?;
                let card = cards.find_one_with_session(id.as_str(), None, session).await?;
                assert_eq!(card.position, 2);

                Ok(id)
            })
        })
        .await
        .unwrap();

    let card = cards.find_one(id.as_str(), None).await.unwrap();
    assert_eq!(card.position, 2);

    cards.inner().drop(None).await.unwrap();
}
