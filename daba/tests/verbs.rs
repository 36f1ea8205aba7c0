use daba::{memory::MemoryCluster, prelude::*};
use futures::StreamExt;

async fn registry() -> (ClientRegistry<MemoryCluster>, MemoryErrorLog) {
    let log = MemoryErrorLog::new();
    let registry = ClientRegistry::builder(MemoryCluster::new(), Settings::new("memory://primary", "app"))
        .error_log(log.clone())
        .build()
        .await
        .unwrap();

    (registry, log)
}

#[tokio::test]
async fn get_on_an_empty_collection_yields_nothing() {
    let (registry, _) = registry().await;

    let documents = registry
        .collection("users")
        .get(None, None)
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();

    assert!(documents.is_empty());
}

#[tokio::test]
async fn get_streams_matching_documents_lazily() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");
    users
        .put_many((1..=4).map(|n| doc! { "_id": n, "even": (n % 2 == 0) }).collect())
        .await
        .unwrap();

    let mut stream = users.get(Some(doc! { "even": true }), None).await.unwrap();
    let mut ids = Vec::new();
    while let Some(document) = stream.next().await {
        ids.push(document.unwrap().get_i32("_id").unwrap());
    }

    assert_eq!(ids, vec![2, 4]);
}

#[tokio::test]
async fn get_applies_projection_and_limit() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");
    users
        .put_many(vec![
            doc! { "_id": 1, "name": "Alice", "password": "x" },
            doc! { "_id": 2, "name": "Bob", "password": "y" },
        ])
        .await
        .unwrap();

    let documents = users
        .get(None, Some(Limiter::fields(doc! { "name": 1, "_id": 0 }).with_limit(1)))
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();

    assert_eq!(documents, vec![doc! { "name": "Alice" }]);
}

#[tokio::test]
async fn find_runs_an_aggregation_pipeline() {
    let (registry, _) = registry().await;
    let orders = registry.collection("orders");
    orders
        .put_many(vec![
            doc! { "item": "tea", "qty": 5 },
            doc! { "item": "coffee", "qty": 2 },
            doc! { "item": "milk", "qty": 9 },
        ])
        .await
        .unwrap();

    let documents = orders
        .find(vec![
            doc! { "$match": { "qty": { "$gte": 3 } } },
            doc! { "$sort": { "qty": -1 } },
            doc! { "$project": { "item": 1, "_id": 0 } },
        ])
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();

    assert_eq!(documents, vec![doc! { "item": "milk" }, doc! { "item": "tea" }]);
}

#[tokio::test]
async fn put_returns_the_assigned_id() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");

    let ack = users.put(doc! { "name": "Alice" }).await.unwrap();
    let stored = users.get_one(doc! { "_id": ack.inserted_id.clone() }, None).await.unwrap();

    assert!(matches!(ack.inserted_id, Bson::ObjectId(_)));
    assert_eq!(stored.unwrap().get_str("name").unwrap(), "Alice");
}

#[tokio::test]
async fn put_many_reports_ids_in_input_order() {
    let (registry, _) = registry().await;

    let ack = registry
        .collection("users")
        .put_many(vec![doc! { "_id": "a" }, doc! { "_id": "b" }, doc! { "_id": "c" }])
        .await
        .unwrap();

    assert_eq!(
        ack.ids_in_order(),
        vec![&Bson::from("a"), &Bson::from("b"), &Bson::from("c")]
    );
}

#[tokio::test]
async fn set_updates_one_document() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");
    users.put_many(vec![doc! { "_id": 1, "role": "user" }, doc! { "_id": 2, "role": "user" }])
        .await
        .unwrap();

    let ack = users.set(doc! { "_id": 1 }, doc! { "role": "admin" }).await.unwrap();

    assert_eq!((ack.matched_count, ack.modified_count), (1, 1));
    assert_eq!(users.count(Some(doc! { "role": "admin" })).await.unwrap(), 1);
}

#[tokio::test]
async fn set_without_a_match_changes_nothing() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");

    let ack = users.set(doc! { "_id": 1 }, doc! { "role": "admin" }).await.unwrap();

    assert_eq!((ack.matched_count, ack.modified_count, ack.upserted_id), (0, 0, None));
    assert_eq!(users.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn upsert_verbs_insert_when_nothing_matches() {
    let (registry, _) = registry().await;
    let stats = registry.collection("stats");

    let ack = stats.upsert_inc(doc! { "page": "/home" }, doc! { "views": 1 }).await.unwrap();
    assert!(ack.upserted_id.is_some());

    stats.upsert_inc(doc! { "page": "/home" }, doc! { "views": 1 }).await.unwrap();
    stats.upsert_set(doc! { "page": "/about" }, doc! { "title": "About" }).await.unwrap();

    let home = stats.get_one(doc! { "page": "/home" }, None).await.unwrap().unwrap();
    assert_eq!(home.get_i32("views").unwrap(), 2);
    assert_eq!(stats.count(None).await.unwrap(), 2);

    let ack = stats
        .upsert_set_many(doc! { "page": "/contact" }, doc! { "title": "Contact" })
        .await
        .unwrap();
    assert_eq!(ack.matched_count, 0);
    assert_eq!(stats.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn inc_adds_to_numeric_fields() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");
    users.put(doc! { "_id": 1, "logins": 2, "score": 1.5 }).await.unwrap();

    users.inc(doc! { "_id": 1 }, doc! { "logins": 3, "score": 1 }).await.unwrap();

    let user = users.get_one(doc! { "_id": 1 }, None).await.unwrap().unwrap();
    assert_eq!(user.get_i32("logins").unwrap(), 5);
    assert_eq!(user.get_f64("score").unwrap(), 2.5);
}

#[tokio::test]
async fn set_many_updates_every_match() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");
    users
        .put_many(vec![
            doc! { "team": "a", "active": false },
            doc! { "team": "a", "active": false },
            doc! { "team": "b", "active": false },
        ])
        .await
        .unwrap();

    let ack = users.set_many(doc! { "team": "a" }, doc! { "active": true }).await.unwrap();

    assert_eq!((ack.matched_count, ack.modified_count), (2, 2));
    assert_eq!(users.count(Some(doc! { "active": true })).await.unwrap(), 2);
}

#[tokio::test]
async fn get_one_returns_none_when_missing_and_honors_projection() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");
    users.put(doc! { "_id": 1, "name": "Alice", "password": "x" }).await.unwrap();

    assert_eq!(users.get_one(doc! { "_id": 2 }, None).await.unwrap(), None);

    let projected = users
        .get_one(doc! { "_id": 1 }, Some(Limiter::fields(doc! { "password": 0 })))
        .await
        .unwrap();
    assert_eq!(projected, Some(doc! { "_id": 1, "name": "Alice" }));
}

#[tokio::test]
async fn get_after_count_increments_and_returns_the_new_state() {
    let (registry, _) = registry().await;
    let links = registry.collection("links");
    links.put(doc! { "_id": "abc", "hits": 0 }).await.unwrap();

    let first = links.get_after_count(doc! { "_id": "abc" }, "hits").await.unwrap();
    let second = links.get_after_count(doc! { "_id": "abc" }, "hits").await.unwrap();

    assert_eq!(first, Some(doc! { "_id": "abc", "hits": 1 }));
    assert_eq!(second, Some(doc! { "_id": "abc", "hits": 2 }));
}

#[tokio::test]
async fn get_after_count_without_a_match_inserts_nothing() {
    let (registry, _) = registry().await;
    let links = registry.collection("links");

    assert_eq!(links.get_after_count(doc! { "_id": "zzz" }, "hits").await.unwrap(), None);
    assert_eq!(links.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_verbs_remove_one_or_all_matches() {
    let (registry, _) = registry().await;
    let sessions = registry.collection("sessions");
    sessions
        .put_many((0..5).map(|n| doc! { "user": "alice", "n": n }).collect())
        .await
        .unwrap();

    assert_eq!(sessions.delete_one(doc! { "user": "alice" }).await.unwrap().deleted_count, 1);
    assert_eq!(sessions.delete_many(doc! { "user": "alice" }).await.unwrap().deleted_count, 4);
    assert_eq!(sessions.delete_one(doc! { "user": "alice" }).await.unwrap().deleted_count, 0);
}

#[tokio::test]
async fn remove_element_unsets_fields_on_every_match() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");
    users
        .put_many(vec![
            doc! { "_id": 1, "token": "t1", "name": "a" },
            doc! { "_id": 2, "token": "t2", "name": "b" },
        ])
        .await
        .unwrap();

    let ack = users.remove_element(doc! {}, doc! { "token": "" }).await.unwrap();

    assert_eq!(ack.modified_count, 2);
    assert_eq!(users.count(Some(doc! { "token": { "$exists": true } })).await.unwrap(), 0);
    assert_eq!(users.count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn count_with_and_without_a_filter() {
    let (registry, _) = registry().await;
    let users = registry.collection("users");
    users
        .put_many((0..10).map(|n| doc! { "age": n * 10 }).collect())
        .await
        .unwrap();

    assert_eq!(users.count(None).await.unwrap(), 10);
    assert_eq!(users.count(Some(doc! { "age": { "$gte": 50 } })).await.unwrap(), 5);
}

#[tokio::test]
async fn create_index_is_idempotent_and_enforced() {
    let (registry, log) = registry().await;
    let users = registry.collection("users");

    assert_eq!(users.create_index("username", IndexOptions::unique()).await.unwrap(), "username_1");
    assert_eq!(users.create_index("username", IndexOptions::unique()).await.unwrap(), "username_1");

    users.put(doc! { "username": "alice" }).await.unwrap();
    let err = users.put(doc! { "username": "alice" }).await.unwrap_err();

    assert!(matches!(err, DabaError::Operation(_)));
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn compound_indexes_get_derived_names() {
    let (registry, _) = registry().await;

    let name = registry
        .collection("people")
        .create_index(
            vec![("last", IndexDirection::Ascending), ("first", IndexDirection::Descending)],
            IndexOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(name, "last_1_first_-1");
}

#[tokio::test]
async fn collections_in_other_databases_are_separate() {
    let (registry, _) = registry().await;

    registry.collection("users").put(doc! { "name": "a" }).await.unwrap();

    let archived = registry.collection_in("archive", "users");
    assert_eq!(archived.database(), "archive");
    assert_eq!(archived.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_updates_are_logged_and_returned() {
    let (registry, log) = registry().await;
    let users = registry.collection("users");
    users.put(doc! { "_id": 1, "name": "a" }).await.unwrap();

    let err = users.inc(doc! { "_id": 1 }, doc! { "name": 1 }).await.unwrap_err();

    assert!(matches!(err, DabaError::Operation(_)));
    let records = log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, "daba.app.users");
    assert_eq!(records[0].severity, Severity::Error);
}
