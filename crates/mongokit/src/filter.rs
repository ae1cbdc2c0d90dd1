use bson::{doc, oid::ObjectId, Bson, Document};
use tracing::debug;

use crate::error::{Error, Result};

/// Selection criterion accepted by [`crate::Collection`] operations.
///
/// Every variant is turned into a driver filter document by
/// [`normalize_filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Hex encoded object id.
    Id(String),
    ObjectId(ObjectId),
    /// Structured query, passed through as is.
    Query(Document),
    /// Single `field: value` clause.
    Element(String, Bson),
    /// Clauses combined with `$and`.
    Array(Vec<Bson>),
    /// Untyped value, dispatched on its BSON type.
    Value(Bson),
}

impl From<&str> for Filter {
    fn from(id: &str) -> Self {
        Filter::Id(id.to_owned())
    }
}

impl From<String> for Filter {
    fn from(id: String) -> Self {
        Filter::Id(id)
    }
}

impl From<&String> for Filter {
    fn from(id: &String) -> Self {
        Filter::Id(id.clone())
    }
}

impl From<ObjectId> for Filter {
    fn from(id: ObjectId) -> Self {
        Filter::ObjectId(id)
    }
}

impl From<&ObjectId> for Filter {
    fn from(id: &ObjectId) -> Self {
        Filter::ObjectId(*id)
    }
}

impl From<Document> for Filter {
    fn from(query: Document) -> Self {
        Filter::Query(query)
    }
}

impl<K, V> From<(K, V)> for Filter
where
    K: Into<String>,
    V: Into<Bson>,
{
    fn from((key, value): (K, V)) -> Self {
        Filter::Element(key.into(), value.into())
    }
}

impl From<Vec<Document>> for Filter {
    fn from(clauses: Vec<Document>) -> Self {
        Filter::Array(clauses.into_iter().map(Bson::Document).collect())
    }
}

impl From<Vec<Bson>> for Filter {
    fn from(clauses: Vec<Bson>) -> Self {
        Filter::Array(clauses)
    }
}

impl From<Bson> for Filter {
    fn from(value: Bson) -> Self {
        Filter::Value(value)
    }
}

impl From<i32> for Filter {
    fn from(value: i32) -> Self {
        Filter::Value(Bson::Int32(value))
    }
}

impl From<i64> for Filter {
    fn from(value: i64) -> Self {
        Filter::Value(Bson::Int64(value))
    }
}

pub fn object_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id).map_err(Error::ObjectId)
}

fn query_single_id(id: &ObjectId) -> Document {
    doc! {
        "_id": id
    }
}

/// Turns a [`Filter`] into a document the driver accepts.
///
/// Hex strings and object ids become an `_id` match, structured queries are
/// returned unchanged and arrays of clauses are combined with `$and`. Any other
/// shape fails with [`Error::NormalizeFilter`].
pub fn normalize_filter(filter: impl Into<Filter>) -> Result<Document> {
    let filter = filter.into();
    debug!(?filter, "normalize filter");

    match filter {
        Filter::Id(id) => Ok(query_single_id(&object_id(&id)?)),
        Filter::ObjectId(id) => Ok(query_single_id(&id)),
        Filter::Query(query) => Ok(query),
        Filter::Element(key, value) => {
            let mut query = Document::new();
            query.insert(key, value);
            Ok(query)
        }
        Filter::Array(clauses) => normalize_clauses(clauses),
        Filter::Value(value) => normalize_value(value),
    }
}

fn normalize_value(value: Bson) -> Result<Document> {
    match value {
        Bson::String(id) => normalize_filter(Filter::Id(id)),
        Bson::ObjectId(id) => normalize_filter(Filter::ObjectId(id)),
        Bson::Document(query) => Ok(query),
        Bson::Array(clauses) => normalize_clauses(clauses),
        _ => Err(Error::NormalizeFilter),
    }
}

fn normalize_clauses(clauses: Vec<Bson>) -> Result<Document> {
    if !clauses.iter().all(|clause| matches!(clause, Bson::Document(_))) {
        return Err(Error::NormalizeFilter);
    }

    Ok(doc! {
        "$and": clauses
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "507f1f77bcf86cd799439011";

    #[test]
    fn hex_string_becomes_id_filter() {
        let expected = doc! { "_id": ObjectId::parse_str(HEX).unwrap() };

        assert_eq!(normalize_filter(HEX).unwrap(), expected);
        assert_eq!(normalize_filter(HEX.to_string()).unwrap(), expected);
        assert_eq!(normalize_filter(Bson::String(HEX.into())).unwrap(), expected);
    }

    #[test]
    fn object_id_becomes_id_filter() {
        let id = ObjectId::new();

        assert_eq!(normalize_filter(id).unwrap(), doc! { "_id": id });
        assert_eq!(normalize_filter(&id).unwrap(), doc! { "_id": id });
        assert_eq!(normalize_filter(Bson::ObjectId(id)).unwrap(), doc! { "_id": id });
    }

    #[test]
    fn malformed_hex_is_a_parse_error() {
        assert!(matches!(normalize_filter("not-an-id"), Err(Error::ObjectId(_))));
        assert!(matches!(normalize_filter("507f1f77bcf86cd79943901"), Err(Error::ObjectId(_))));
        assert!(matches!(object_id("zz7f1f77bcf86cd799439011"), Err(Error::ObjectId(_))));
    }

    #[test]
    fn structured_query_is_unchanged() {
        let query = doc! { "name": "x" };

        assert_eq!(normalize_filter(query.clone()).unwrap(), query);
        assert_eq!(normalize_filter(Bson::Document(query.clone())).unwrap(), query);
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs: Vec<Filter> = vec![
            HEX.into(),
            ObjectId::new().into(),
            doc! { "name": "x", "age": { "$gt": 3 } }.into(),
            ("name", "x").into(),
            vec![doc! { "a": 1 }, doc! { "b": 2 }].into(),
        ];

        for input in inputs {
            let once = normalize_filter(input).unwrap();
            let twice = normalize_filter(once.clone()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn single_element_becomes_document() {
        assert_eq!(normalize_filter(("name", "x")).unwrap(), doc! { "name": "x" });
        assert_eq!(normalize_filter(("size", 3)).unwrap(), doc! { "size": 3 });
    }

    #[test]
    fn array_of_clauses_is_combined() {
        let clauses = vec![doc! { "a": 1 }, doc! { "b": 2 }];

        assert_eq!(
            normalize_filter(clauses).unwrap(),
            doc! { "$and": [{ "a": 1 }, { "b": 2 }] }
        );
    }

    #[test]
    fn array_with_scalars_is_rejected() {
        let clauses = vec![Bson::Document(doc! { "a": 1 }), Bson::Int32(2)];

        assert!(matches!(normalize_filter(clauses), Err(Error::NormalizeFilter)));
    }

    #[test]
    fn unsupported_shapes_are_rejected() {
        assert!(matches!(normalize_filter(42), Err(Error::NormalizeFilter)));
        assert!(matches!(normalize_filter(42_i64), Err(Error::NormalizeFilter)));
        assert!(matches!(normalize_filter(Bson::Boolean(true)), Err(Error::NormalizeFilter)));
        assert!(matches!(normalize_filter(Bson::Null), Err(Error::NormalizeFilter)));
    }
}
