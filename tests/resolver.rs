use async_trait::async_trait;
use scylla_sql_metadata::catalog::{
    CatalogSource, CollectionDescriptor, FieldDescriptor, MemoryCatalog, Nullability,
};
use scylla_sql_metadata::error::{MetadataError, MetadataResult};
use scylla_sql_metadata::like::LikePattern;
use scylla_sql_metadata::resolver::{MetadataResolver, ResolverOptions};
use scylla_sql_metadata::types::JdbcType;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn person_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("first_name", JdbcType::Varchar, "text", 1),
        FieldDescriptor::new("last_name", JdbcType::Varchar, "text", 2),
        FieldDescriptor::new("age", JdbcType::Integer, "int", 3)
            .with_nullability(Nullability::NoNulls),
    ]
}

fn catalog() -> MemoryCatalog {
    MemoryCatalog::new("test-cluster")
        .with_collection(CollectionDescriptor::new("opensearch_dummy"), person_fields())
        .with_collection(
            CollectionDescriptor::new("opensearch_other"),
            vec![FieldDescriptor::new("title", JdbcType::Varchar, "text", 1)],
        )
        .with_collection(CollectionDescriptor::new("accounts"), Vec::new())
}

fn resolver(source: impl CatalogSource + 'static) -> MetadataResolver {
    MetadataResolver::new(Arc::new(source), ResolverOptions::default())
}

fn like(pattern: &str) -> LikePattern {
    LikePattern::compile(pattern).unwrap()
}

fn names(collections: &[CollectionDescriptor]) -> Vec<&str> {
    collections.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn show_filters_by_pattern_in_source_order() {
    let r = resolver(catalog());
    let exact = r.resolve_show(&like("opensearch_dummy")).await.unwrap();
    assert_eq!(names(&exact), ["opensearch_dummy"]);

    let prefixed = r.resolve_show(&like("opensearch_%")).await.unwrap();
    assert_eq!(names(&prefixed), ["opensearch_dummy", "opensearch_other"]);

    let none = r.resolve_show(&like("missing%")).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn unordered_sources_are_sorted_by_name() {
    let source = MemoryCatalog::new("c")
        .with_collection(CollectionDescriptor::new("zeta"), Vec::new())
        .with_collection(CollectionDescriptor::new("alpha"), Vec::new())
        .with_collection(CollectionDescriptor::new("mid"), Vec::new())
        .with_unordered_listing();
    let found = resolver(source).resolve_show(&like("%")).await.unwrap();
    assert_eq!(names(&found), ["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn describe_pairs_follow_collection_then_ordinal_order() {
    let r = resolver(catalog());
    let pairs = r
        .resolve_describe(&like("opensearch_%"), &like("%"))
        .await
        .unwrap();
    let flat: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(c, f)| (c.name.as_str(), f.name.as_str()))
        .collect();
    assert_eq!(
        flat,
        [
            ("opensearch_dummy", "first_name"),
            ("opensearch_dummy", "last_name"),
            ("opensearch_dummy", "age"),
            ("opensearch_other", "title"),
        ]
    );
}

#[tokio::test]
async fn describe_sorts_fields_reported_out_of_order() {
    let source = MemoryCatalog::new("c").with_collection(
        CollectionDescriptor::new("t"),
        vec![
            FieldDescriptor::new("c", JdbcType::Varchar, "text", 3),
            FieldDescriptor::new("a", JdbcType::Varchar, "text", 1),
            FieldDescriptor::new("b", JdbcType::Varchar, "text", 2),
        ],
    );
    let pairs = resolver(source)
        .resolve_describe(&like("t"), &like("%"))
        .await
        .unwrap();
    let ordinals: Vec<i32> = pairs.iter().map(|(_, f)| f.ordinal_position).collect();
    assert_eq!(ordinals, [1, 2, 3]);
}

#[tokio::test]
async fn describe_applies_column_pattern() {
    let r = resolver(catalog());
    let pairs = r
        .resolve_describe(&like("opensearch_dummy"), &like("%na_e"))
        .await
        .unwrap();
    let fields: Vec<&str> = pairs.iter().map(|(_, f)| f.name.as_str()).collect();
    assert_eq!(fields, ["first_name", "last_name"]);
}

#[tokio::test]
async fn describe_of_fieldless_collection_is_empty() {
    let pairs = resolver(catalog())
        .resolve_describe(&like("accounts"), &like("%"))
        .await
        .unwrap();
    assert!(pairs.is_empty());
}

#[tokio::test]
async fn resolution_is_repeatable() {
    let r = resolver(catalog());
    let first = r.resolve_describe(&like("%"), &like("%")).await.unwrap();
    let second = r.resolve_describe(&like("%"), &like("%")).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn mutations_are_visible_to_later_lookups() {
    let source = Arc::new(catalog());
    let r = MetadataResolver::new(source.clone(), ResolverOptions::default());
    source
        .insert_collection(CollectionDescriptor::new("opensearch_new"), Vec::new())
        .await;
    assert!(source.remove_collection("opensearch_other").await);
    assert!(!source.remove_collection("opensearch_other").await);

    let found = r.resolve_show(&like("opensearch_%")).await.unwrap();
    assert_eq!(names(&found), ["opensearch_dummy", "opensearch_new"]);
}

struct SlowCatalog;

#[async_trait]
impl CatalogSource for SlowCatalog {
    async fn list_collections(
        &self,
        _name_pattern: Option<&str>,
    ) -> MetadataResult<Vec<CollectionDescriptor>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }

    async fn list_fields(&self, _collection: &str) -> MetadataResult<Vec<FieldDescriptor>> {
        Ok(Vec::new())
    }

    async fn cluster_name(&self) -> MetadataResult<String> {
        Ok("slow".into())
    }
}

#[tokio::test]
async fn slow_listing_times_out_as_lookup_error() {
    let r = MetadataResolver::new(
        Arc::new(SlowCatalog),
        ResolverOptions {
            lookup_timeout: Duration::from_millis(20),
            max_concurrent_lookups: 1,
        },
    );
    match r.resolve_show(&like("%")).await {
        Err(MetadataError::CollectionLookup { operation, message }) => {
            assert_eq!(operation, "list_collections");
            assert!(message.contains("timed out"), "{message}");
        }
        other => panic!("expected lookup error, got {other:?}"),
    }
}

/// Lists collections fine but fails field lookups for one of them.
struct FlakyCatalog {
    field_calls: AtomicUsize,
}

#[async_trait]
impl CatalogSource for FlakyCatalog {
    async fn list_collections(
        &self,
        _name_pattern: Option<&str>,
    ) -> MetadataResult<Vec<CollectionDescriptor>> {
        Ok(vec![
            CollectionDescriptor::new("good"),
            CollectionDescriptor::new("broken"),
        ])
    }

    async fn list_fields(&self, collection: &str) -> MetadataResult<Vec<FieldDescriptor>> {
        self.field_calls.fetch_add(1, Ordering::SeqCst);
        if collection == "broken" {
            return Err(MetadataError::lookup("list_fields", "connection reset"));
        }
        Ok(vec![FieldDescriptor::new("id", JdbcType::BigInt, "bigint", 1)])
    }

    async fn cluster_name(&self) -> MetadataResult<String> {
        Ok("flaky".into())
    }
}

#[tokio::test]
async fn failed_field_lookup_fails_the_whole_statement() {
    let source = Arc::new(FlakyCatalog {
        field_calls: AtomicUsize::new(0),
    });
    let r = MetadataResolver::new(source.clone(), ResolverOptions::default());
    let err = r
        .resolve_describe(&like("%"), &like("%"))
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::CollectionLookup { .. }));
    assert!(err.to_string().contains("connection reset"));
    assert!(source.field_calls.load(Ordering::SeqCst) >= 1);

    // show never touches field lookups
    let shown = r.resolve_show(&like("good")).await.unwrap();
    assert_eq!(names(&shown), ["good"]);
}

#[tokio::test]
async fn unknown_collection_fields_are_a_lookup_error() {
    let err = catalog().list_fields("nope").await.unwrap_err();
    assert!(matches!(err, MetadataError::CollectionLookup { .. }));
    assert!(err.to_string().contains("nope"));
}

/// Field lookups that finish in reverse order and record peak concurrency.
struct DelayedCatalog {
    collections: Vec<&'static str>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl DelayedCatalog {
    fn new(collections: Vec<&'static str>) -> Self {
        DelayedCatalog {
            collections,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CatalogSource for DelayedCatalog {
    async fn list_collections(
        &self,
        _name_pattern: Option<&str>,
    ) -> MetadataResult<Vec<CollectionDescriptor>> {
        Ok(self
            .collections
            .iter()
            .map(|n| CollectionDescriptor::new(*n))
            .collect())
    }

    async fn list_fields(&self, collection: &str) -> MetadataResult<Vec<FieldDescriptor>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let index = self
            .collections
            .iter()
            .position(|n| *n == collection)
            .unwrap_or(0);
        let delay = (self.collections.len() - index) as u64 * 15;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![FieldDescriptor::new(
            format!("{collection}_id"),
            JdbcType::BigInt,
            "bigint",
            1,
        )])
    }

    async fn cluster_name(&self) -> MetadataResult<String> {
        Ok("delayed".into())
    }
}

#[tokio::test]
async fn describe_order_ignores_lookup_completion_order() {
    let source = Arc::new(DelayedCatalog::new(vec!["first", "second", "third", "fourth"]));
    let r = MetadataResolver::new(source.clone(), ResolverOptions::default());
    let pairs = r.resolve_describe(&like("%"), &like("%")).await.unwrap();
    let flat: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(c, f)| (c.name.as_str(), f.name.as_str()))
        .collect();
    assert_eq!(
        flat,
        [
            ("first", "first_id"),
            ("second", "second_id"),
            ("third", "third_id"),
            ("fourth", "fourth_id"),
        ]
    );
    assert!(source.peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn field_lookups_respect_concurrency_cap() {
    let source = Arc::new(DelayedCatalog::new(vec!["a", "b", "c", "d", "e", "f"]));
    let r = MetadataResolver::new(
        source.clone(),
        ResolverOptions {
            lookup_timeout: Duration::from_secs(5),
            max_concurrent_lookups: 2,
        },
    );
    let pairs = r.resolve_describe(&like("%"), &like("%")).await.unwrap();
    assert_eq!(pairs.len(), 6);
    let peak = source.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak concurrency {peak}");
    assert!(peak >= 1);
}

struct SlowFieldsCatalog;

#[async_trait]
impl CatalogSource for SlowFieldsCatalog {
    async fn list_collections(
        &self,
        _name_pattern: Option<&str>,
    ) -> MetadataResult<Vec<CollectionDescriptor>> {
        Ok(vec![CollectionDescriptor::new("stuck")])
    }

    async fn list_fields(&self, _collection: &str) -> MetadataResult<Vec<FieldDescriptor>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }

    async fn cluster_name(&self) -> MetadataResult<String> {
        Ok("slow".into())
    }
}

#[tokio::test]
async fn slow_field_lookup_times_out_as_lookup_error() {
    let r = MetadataResolver::new(
        Arc::new(SlowFieldsCatalog),
        ResolverOptions {
            lookup_timeout: Duration::from_millis(20),
            max_concurrent_lookups: 4,
        },
    );
    match r.resolve_describe(&like("%"), &like("%")).await {
        Err(MetadataError::CollectionLookup { operation, message }) => {
            assert_eq!(operation, "list_fields");
            assert!(message.contains("timed out after 20 ms"), "{message}");
        }
        other => panic!("expected lookup error, got {other:?}"),
    }
}
