#![cfg(not(target_arch = "wasm32"))]

use std::sync::{Arc, Mutex};

use firestore_swr::firestore::cache::CacheSubscription;
use firestore_swr::firestore::model::{DocumentReference, Timestamp};
use firestore_swr::firestore::value::{FirestoreValue, MapValue};
use firestore_swr::firestore::{
    CacheKey, CacheValue, FilterOperator, FirestoreErrorCode, KeyedCache, MemoryCache,
    MutationOptions, OrderDirection, QueryDescriptor, ResolveOptions, SetOptions, SwrFirestore,
    WhereClause,
};

fn fields<const N: usize>(entries: [(&str, i64); N]) -> MapValue {
    entries.into_iter().collect()
}

fn ids(value: &CacheValue) -> Vec<String> {
    value
        .as_collection()
        .map(|records| records.iter().map(|record| record.id().to_string()).collect())
        .unwrap_or_default()
}

fn record_changes(cache: &MemoryCache, key: &CacheKey) -> (CacheSubscription, Arc<Mutex<usize>>) {
    let count = Arc::new(Mutex::new(0));
    let captured = count.clone();
    let subscription = cache.subscribe(key, move |_, _| {
        *captured.lock().unwrap() += 1;
    });
    (subscription, count)
}

#[tokio::test(flavor = "multi_thread")]
async fn local_writes_reach_every_cached_query_holding_the_document() {
    let (client, store, cache) = SwrFirestore::in_memory();
    store.seed("coll/x", fields([("v", 1)])).unwrap();
    store.seed("coll/y", fields([("v", 2)])).unwrap();

    let everything = QueryDescriptor::new();
    let ordered = QueryDescriptor::new().order_by("v", OrderDirection::Descending);
    for query in [&everything, &ordered] {
        client
            .get_collection("coll", query, &ResolveOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(client.membership().active_keys_for("coll").len(), 2);

    client
        .update("coll/x", fields([("v", 9)]), MutationOptions::default())
        .unwrap()
        .await
        .unwrap();

    for query in [&everything, &ordered] {
        let cached = cache.read(&client.query_key("coll", query)).unwrap();
        let x = cached
            .as_collection()
            .unwrap()
            .iter()
            .find(|record| record.id() == "x")
            .cloned()
            .unwrap();
        assert_eq!(x.get("v"), Some(&FirestoreValue::from_integer(9)));
    }
    let document = cache.read(&CacheKey::document("coll/x")).unwrap();
    assert_eq!(
        document.as_document().unwrap().get("v"),
        Some(&FirestoreValue::from_integer(9))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn writes_to_unlisted_documents_do_not_notify_query_subscribers() {
    let (client, store, cache) = SwrFirestore::in_memory();
    store.seed("coll/x", fields([("v", 1)])).unwrap();
    let query = QueryDescriptor::new();
    client
        .get_collection("coll", &query, &ResolveOptions::default())
        .await
        .unwrap();

    let key = client.query_key("coll", &query);
    let (_subscription, changes) = record_changes(&cache, &key);
    let before = cache.read(&key).unwrap();

    let pending = client
        .set(
            "coll/z",
            fields([("v", 3)]),
            SetOptions::merge(),
            MutationOptions::default(),
        )
        .unwrap();
    assert!(before.same_as(&cache.read(&key).unwrap()));
    assert_eq!(*changes.lock().unwrap(), 0);
    pending.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn optimistic_state_is_visible_before_the_remote_write_completes() {
    let (client, store, cache) = SwrFirestore::in_memory();
    store.seed("coll/x", fields([("v", 1)])).unwrap();
    store.seed("coll/y", fields([("v", 2)])).unwrap();
    let query = QueryDescriptor::new();
    client
        .get_collection("coll", &query, &ResolveOptions::default())
        .await
        .unwrap();

    let pending = client.delete("coll/x", MutationOptions::default()).unwrap();
    let key = client.query_key("coll", &query);
    assert_eq!(ids(&cache.read(&key).unwrap()), vec!["y"]);
    assert!(cache.read(&CacheKey::document("coll/x")).unwrap().is_absent());
    assert!(store.document("coll/x").is_some());

    pending.await.unwrap();
    assert!(store.document("coll/x").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_write_leaves_optimistic_state_in_place() {
    let (client, store, cache) = SwrFirestore::in_memory();
    store.seed("coll/x", fields([("v", 1)])).unwrap();
    client
        .get_document("coll/x", &ResolveOptions::default())
        .await
        .unwrap();

    store.fail_writes_with(Some(firestore_swr::firestore::error::remote_write_failure(
        "permission denied",
    )));
    let err = client
        .update("coll/x", fields([("v", 5)]), MutationOptions::default())
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err.code, FirestoreErrorCode::RemoteWriteFailure);

    let cached = cache.read(&CacheKey::document("coll/x")).unwrap();
    assert_eq!(
        cached.as_document().unwrap().get("v"),
        Some(&FirestoreValue::from_integer(5))
    );
    assert_eq!(
        store.document("coll/x").unwrap().get("v"),
        Some(&FirestoreValue::from_integer(1))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn document_operations_reject_collection_paths() {
    let (client, _store, cache) = SwrFirestore::in_memory();
    let options = MutationOptions::default();
    let errors = [
        client
            .set("users", MapValue::empty(), SetOptions::default(), options)
            .err()
            .unwrap(),
        client.update("users", MapValue::empty(), options).err().unwrap(),
        client.delete("users", options).err().unwrap(),
    ];
    for err in errors {
        assert_eq!(err.code, FirestoreErrorCode::InvalidPathKind);
    }
    assert!(cache.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn equivalent_descriptors_share_one_cache_entry() {
    let (client, store, cache) = SwrFirestore::in_memory();
    store.seed("users/a", fields([("age", 30)])).unwrap();

    let clause = WhereClause::new("age", FilterOperator::GreaterThan, 18);
    let single = QueryDescriptor::new()
        .with_where(clause.clone())
        .with_order_by("age");
    let sequence = QueryDescriptor::new()
        .with_where(vec![clause])
        .order_by("age", OrderDirection::Ascending);

    let first = client
        .get_collection("users", &single, &ResolveOptions::default())
        .await
        .unwrap();
    let second = client
        .get_collection("users", &sequence, &ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(first.key(), second.key());
    assert_eq!(client.membership().active_keys_for("users").len(), 1);
    assert_eq!(cache.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn date_and_reference_filters_survive_the_cache_key() {
    let (client, store, _cache) = SwrFirestore::in_memory();
    let joined = Timestamp::parse_iso("2020-01-01T00:00:00.000Z").unwrap();
    let mut ada = MapValue::empty();
    ada.insert("joinedAt", Timestamp::parse_iso("2021-06-01T00:00:00Z").unwrap());
    ada.insert("team", DocumentReference::from_path("teams/core").unwrap());
    store.seed("users/ada", ada).unwrap();

    let query = QueryDescriptor::new()
        .filter("joinedAt", FilterOperator::GreaterThan, joined)
        .filter(
            "team",
            FilterOperator::Equal,
            DocumentReference::from_path("teams/core").unwrap(),
        );
    let resolved = client
        .get_collection("users", &query, &ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(resolved.value().len(), 1);

    let CacheKey::Query { query: serialized, .. } = resolved.key() else {
        panic!("expected a query key");
    };
    assert!(serialized.contains(r#""2020-01-01T00:00:00.000Z",{"type":"date"}"#));
    assert!(serialized.contains(r#""teams/core",{"type":"ref"}"#));
    assert_eq!(client.serializer().deserialize(serialized).unwrap(), query);
}

#[tokio::test(flavor = "multi_thread")]
async fn parse_dates_and_snapshot_field_options() {
    let (client, store, _cache) = SwrFirestore::in_memory();
    let mut native = MapValue::empty();
    native.insert("seconds", 1_577_836_800i64);
    native.insert("nanoseconds", 0i64);
    let mut post = MapValue::empty();
    post.insert("publishedAt", native);
    store.seed("posts/p1", post).unwrap();

    let options = ResolveOptions::default()
        .with_parse_dates(["publishedAt"])
        .keep_snapshot();
    let resolved = client
        .get_collection("posts", &QueryDescriptor::new(), &options)
        .await
        .unwrap();
    let record = &resolved.value()[0];
    assert_eq!(
        record.get("publishedAt").and_then(FirestoreValue::as_timestamp),
        Some(Timestamp::new(1_577_836_800, 0))
    );
    assert_eq!(record.snapshot().map(|snapshot| snapshot.id()), Some("p1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn live_collection_reflects_local_adds_and_tears_down_once() {
    let (client, store, cache) = SwrFirestore::in_memory();
    let query = QueryDescriptor::new();
    let resolved = client
        .get_collection("notes", &query, &ResolveOptions::live())
        .await
        .unwrap();
    assert!(resolved.value().is_empty());

    let created = client
        .add("notes", &query, vec![fields([("n", 1)])], true)
        .await
        .unwrap();
    let cached = cache.read(resolved.key()).unwrap();
    assert_eq!(ids(&cached), created);

    let (_, _, subscription) = resolved.into_parts();
    let subscription = subscription.unwrap();
    assert_eq!(store.active_listener_count(), 1);
    subscription.unsubscribe();
    subscription.unsubscribe();
    drop(subscription);
    assert_eq!(store.active_listener_count(), 0);
}
