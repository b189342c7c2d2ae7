//! End-to-end adapter scenarios against the in-memory driver.
//!
//! The same query documents reach the in-memory store as would reach a
//! MongoDB server, so these cover identifier handling, filter translation
//! and collection mapping through the full dispatch path.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson};
use ormbridge_mongodb::filter::OperatorKind;
use ormbridge_mongodb::{
    Adapter, AdapterError, CreateOptions, DocumentCollection, Driver, FilterDescriptor, MemoryDriver,
    ModelDefinition, PropertyType, Record, RelationResolver, Result, WhereClause,
};
use tokio_test::{assert_err, assert_ok};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn adapter() -> Adapter<MemoryDriver> {
    init_tracing();
    Adapter::new(MemoryDriver::new())
}

async fn seed(adapter: &Adapter<MemoryDriver>, model: &str, records: Vec<Record>) -> Vec<Bson> {
    let mut ids = Vec::new();
    for record in records {
        let id = adapter
            .create(model, record, CreateOptions::default())
            .await
            .unwrap()
            .unwrap();
        ids.push(id);
    }
    ids
}

fn names(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get_str("name").unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_create_then_find_round_trips_identifier() {
    let adapter = adapter();
    let id = adapter
        .create("User", doc! { "name": "A" }, CreateOptions::default())
        .await
        .unwrap()
        .unwrap();

    let oid = id.as_object_id().expect("generated ObjectId");
    let found = adapter.find("User", oid.to_hex()).await.unwrap().unwrap();
    assert_eq!(found.get_object_id("id").unwrap(), oid);
    assert_eq!(found.get_str("name").unwrap(), "A");
}

#[tokio::test]
async fn test_upsert_creates_then_updates_in_place() {
    let adapter = adapter();
    let fresh = ObjectId::new().to_hex();

    let created = adapter
        .update_or_create("User", doc! { "id": fresh.clone(), "email": "a@x.com" })
        .await
        .unwrap();
    assert_eq!(created.get_object_id("id").unwrap().to_hex(), fresh);

    adapter
        .update_or_create("User", doc! { "id": fresh.clone(), "email": "b@x.com" })
        .await
        .unwrap();

    let all = adapter.all("User", &FilterDescriptor::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].get_str("email").unwrap(), "b@x.com");
    assert_eq!(all[0].get_object_id("_id").unwrap().to_hex(), fresh);
}

#[tokio::test]
async fn test_upsert_without_id_generates_one() {
    let adapter = adapter();
    let created = adapter
        .update_or_create("User", doc! { "email": "c@x.com" })
        .await
        .unwrap();
    let id = created.get_object_id("id").unwrap();
    assert!(adapter.exists("User", id).await.unwrap());
}

#[tokio::test]
async fn test_invalid_identifier_strings_fail_without_writes() {
    let adapter = adapter();
    let err = adapter
        .create("User", doc! { "id": "not-a-hex-id", "name": "A" }, CreateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidIdentifier(_)));
    assert_eq!(adapter.count("User", &WhereClause::new()).await.unwrap(), 0);

    assert_err!(adapter.find("User", "123").await);
    assert_err!(adapter.destroy("User", "zzz").await);
}

#[tokio::test]
async fn test_inq_elements_are_normalized() {
    let adapter = adapter();
    let ids = seed(
        &adapter,
        "User",
        vec![doc! { "name": "a" }, doc! { "name": "b" }, doc! { "name": "c" }],
    )
    .await;

    let wanted: Vec<Bson> = ids[..2]
        .iter()
        .map(|id| Bson::String(ormbridge_mongodb::identifier::to_orm_string(id)))
        .collect();
    let descriptor = FilterDescriptor::new()
        .where_op("id", OperatorKind::Inq, wanted)
        .order("name");
    let found = adapter.all("User", &descriptor).await.unwrap();
    assert_eq!(names(&found), vec!["a", "b"]);

    // plain strings that are not identifiers are rejected, not matched
    let descriptor = FilterDescriptor::new().where_op("age", OperatorKind::Inq, vec!["1", "2"]);
    let err = adapter.all("User", &descriptor).await.unwrap_err();
    assert!(err.is_identifier_error());
}

#[tokio::test]
async fn test_table_setting_maps_collection() {
    let adapter = adapter();
    adapter.define(ModelDefinition::new("TestModel").table("test_collection"));

    seed(&adapter, "TestModel", vec![doc! { "name": "x" }]).await;
    assert_eq!(adapter.all("TestModel", &FilterDescriptor::new()).await.unwrap().len(), 1);

    assert_eq!(adapter.cached_collections(), vec!["test_collection".to_string()]);
    assert_eq!(adapter.driver().collection_names(), vec!["test_collection".to_string()]);
    assert_eq!(adapter.driver().collection("test_collection").len(), 1);
}

#[tokio::test]
async fn test_null_where_matches_missing_or_null_only() {
    let adapter = adapter();
    seed(
        &adapter,
        "Item",
        vec![
            doc! { "name": "missing" },
            doc! { "name": "null", "tag": Bson::Null },
            doc! { "name": "empty", "tag": "" },
            doc! { "name": "zero", "tag": 0 },
        ],
    )
    .await;

    let descriptor = FilterDescriptor::new().where_eq("tag", Bson::Null).order("name");
    let found = adapter.all("Item", &descriptor).await.unwrap();
    assert_eq!(names(&found), vec!["missing", "null"]);
}

#[tokio::test]
async fn test_between_is_inclusive() {
    let adapter = adapter();
    seed(
        &adapter,
        "Item",
        (1..=5).map(|n| doc! { "name": n.to_string(), "n": n }).collect(),
    )
    .await;

    let descriptor = FilterDescriptor::new()
        .where_op("n", OperatorKind::Between, vec![2, 4])
        .order("n");
    let found = adapter.all("Item", &descriptor).await.unwrap();
    assert_eq!(names(&found), vec!["2", "3", "4"]);
}

#[tokio::test]
async fn test_desc_reverses_asc() {
    let adapter = adapter();
    seed(
        &adapter,
        "User",
        vec![doc! { "name": "b" }, doc! { "name": "c" }, doc! { "name": "a" }],
    )
    .await;

    let asc = adapter
        .all("User", &FilterDescriptor::new().order("name"))
        .await
        .unwrap();
    let desc = adapter
        .all("User", &FilterDescriptor::new().order("name DESC"))
        .await
        .unwrap();

    let mut reversed = names(&desc);
    reversed.reverse();
    assert_eq!(names(&asc), vec!["a", "b", "c"]);
    assert_eq!(names(&asc), reversed);
}

#[tokio::test]
async fn test_pagination_with_offset_and_limit() {
    let adapter = adapter();
    seed(
        &adapter,
        "Item",
        (0..10).map(|n| doc! { "name": format!("{:02}", n) }).collect(),
    )
    .await;

    let descriptor = FilterDescriptor::new().order("name").offset(3).limit(2);
    assert_eq!(names(&adapter.all("Item", &descriptor).await.unwrap()), vec!["03", "04"]);

    let descriptor = FilterDescriptor::new().order("name").skip(8).offset(1).limit(0);
    assert_eq!(names(&adapter.all("Item", &descriptor).await.unwrap()), vec!["08", "09"]);
}

#[tokio::test]
async fn test_count_shares_translation_with_all() {
    let adapter = adapter();
    let ids = seed(
        &adapter,
        "User",
        vec![
            doc! { "name": "a", "age": 20 },
            doc! { "name": "b", "age": 30 },
            doc! { "name": "c" },
        ],
    )
    .await;

    let clause = WhereClause::new()
        .with("age", ormbridge_mongodb::Condition::operator(OperatorKind::Gte, 25));
    let descriptor = FilterDescriptor::new().where_clause(clause.clone());
    assert_eq!(adapter.count("User", &clause).await.unwrap(), 1);
    assert_eq!(adapter.all("User", &descriptor).await.unwrap().len(), 1);

    // `id` is renamed and normalized for counts too
    let by_id = WhereClause::new().with(
        "id",
        ormbridge_mongodb::Condition::literal(ormbridge_mongodb::identifier::to_orm_string(&ids[2])),
    );
    assert_eq!(adapter.count("User", &by_id).await.unwrap(), 1);

    let by_null = WhereClause::new().with("age", ormbridge_mongodb::Condition::literal(Bson::Null));
    assert_eq!(adapter.count("User", &by_null).await.unwrap(), 1);
}

#[tokio::test]
async fn test_foreign_keys_are_stored_as_object_ids() {
    let adapter = adapter();
    adapter.define(ModelDefinition::new("Post"));
    assert_eq!(adapter.define_foreign_key("Post", "authorId"), PropertyType::ObjectId);

    let author = ObjectId::new();
    seed(&adapter, "Post", vec![doc! { "title": "t", "authorId": author.to_hex() }]).await;

    let stored = adapter.driver().collection("Post").snapshot();
    assert_eq!(stored[0].get_object_id("authorId").unwrap(), author);

    let descriptor = FilterDescriptor::new().where_eq("authorId", author);
    assert_eq!(adapter.all("Post", &descriptor).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_like_and_nlike() {
    let adapter = adapter();
    seed(
        &adapter,
        "User",
        vec![doc! { "name": "alice" }, doc! { "name": "bob" }, doc! { "name": "alfred" }],
    )
    .await;

    let like = FilterDescriptor::new()
        .where_op("name", OperatorKind::Like, "^al")
        .order("name");
    assert_eq!(names(&adapter.all("User", &like).await.unwrap()), vec!["alfred", "alice"]);

    let nlike = FilterDescriptor::new().where_op("name", OperatorKind::Nlike, "^al");
    assert_eq!(names(&adapter.all("User", &nlike).await.unwrap()), vec!["bob"]);
}

#[tokio::test]
async fn test_json_descriptor_end_to_end() {
    let adapter = adapter();
    seed(
        &adapter,
        "User",
        vec![
            doc! { "name": "a", "age": 10 },
            doc! { "name": "b", "age": 20 },
            doc! { "name": "c", "age": 30 },
        ],
    )
    .await;

    let descriptor = FilterDescriptor::from_json(serde_json::json!({
        "where": { "age": { "gt": 10 } },
        "order": ["age DESC"],
        "limit": 1
    }))
    .unwrap();
    assert_eq!(names(&adapter.all("User", &descriptor).await.unwrap()), vec!["c"]);
}

#[tokio::test]
async fn test_unknown_operator_is_forwarded_to_the_store() {
    let adapter = adapter();
    seed(&adapter, "User", vec![doc! { "name": "a" }]).await;

    let forwarded = FilterDescriptor::new().where_op("name", OperatorKind::from_key("exists"), true);
    assert_eq!(adapter.all("User", &forwarded).await.unwrap().len(), 1);

    // the store rejects what it does not know, and the error surfaces unchanged
    let bogus = FilterDescriptor::new().where_op("name", OperatorKind::from_key("bogus"), 1);
    let err = adapter.all("User", &bogus).await.unwrap_err();
    assert!(err.is_driver_error());
}

#[tokio::test]
async fn test_destroy_all_empties_collection() {
    let adapter = adapter();
    seed(&adapter, "User", vec![doc! { "name": "a" }, doc! { "name": "b" }]).await;

    assert_eq!(assert_ok!(adapter.destroy_all("User").await), 2);
    assert_eq!(adapter.count("User", &WhereClause::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_identifier_surfaces_driver_error() {
    let adapter = adapter();
    let id = ObjectId::new().to_hex();
    seed(&adapter, "User", vec![doc! { "id": id.clone() }]).await;

    let err = adapter
        .create("User", doc! { "id": id }, CreateOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_driver_error());
}

struct AuthorResolver;

#[async_trait]
impl RelationResolver for AuthorResolver {
    async fn include(&self, records: Vec<Record>, include: &Bson) -> Result<Vec<Record>> {
        let relation = include.as_str().unwrap_or("related").to_string();
        Ok(records
            .into_iter()
            .map(|mut record| {
                record.insert(relation.clone(), doc! { "name": "author" });
                record
            })
            .collect())
    }
}

#[tokio::test]
async fn test_include_delegates_to_relation_resolver() {
    let adapter = adapter();
    adapter.define(ModelDefinition::new("Post").relations(Arc::new(AuthorResolver)));
    seed(&adapter, "Post", vec![doc! { "title": "t" }]).await;

    let descriptor = FilterDescriptor::new().include("author");
    let posts = adapter.all("Post", &descriptor).await.unwrap();
    assert_eq!(
        posts[0].get_document("author").unwrap().get_str("name").unwrap(),
        "author"
    );

    // models without a resolver return the records untouched
    seed(&adapter, "Tag", vec![doc! { "title": "t" }]).await;
    let tags = adapter.all("Tag", &descriptor).await.unwrap();
    assert!(tags[0].get("author").is_none());
}

#[tokio::test]
async fn test_unacknowledged_create_still_writes() {
    let adapter = adapter();
    let id = adapter
        .create("User", doc! { "name": "a" }, CreateOptions::unacknowledged())
        .await
        .unwrap();
    assert!(id.is_none());
    assert_eq!(adapter.driver().collection("User").len(), 1);
}

#[test]
fn test_collection_handle_is_shared() {
    tokio_test::block_on(async {
        let adapter = adapter();
        let first = adapter.collection("User");
        seed(&adapter, "User", vec![doc! { "name": "a" }]).await;
        assert_eq!(first.count(doc! {}).await.unwrap(), 1);
        assert_eq!(first.name(), "User");
    });
}
