use std::fs;

use daba::{memory::MemoryCluster, prelude::*};
use tempfile::TempDir;

fn is_timestamp(value: &str) -> bool {
    // 2024-05-01 12:30:45,123
    let bytes = value.as_bytes();
    bytes.len() == 23
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            10 => *b == b' ',
            13 | 16 => *b == b':',
            19 => *b == b',',
            _ => b.is_ascii_digit(),
        })
}

#[tokio::test]
async fn failures_against_an_unreachable_host_are_written_to_the_log_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("logs").join("error.log");
    let cluster = MemoryCluster::new();
    let registry = ClientRegistry::initialize(
        cluster.clone(),
        Settings::new("memory://primary", "app").with_error_log_path(&path),
    )
    .await
    .unwrap();

    cluster.set_reachable("primary", false).unwrap();
    let err = registry
        .collection("users")
        .put(doc! { "name": "Alice" })
        .await
        .unwrap_err();

    assert!(matches!(err, DabaError::Connection(_)));

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);

    let fields: Vec<&str> = lines[0].splitn(4, " - ").collect();
    assert_eq!(fields.len(), 4);
    assert!(is_timestamp(fields[0]), "bad timestamp: {}", fields[0]);
    assert_eq!(fields[1], "daba.app.users");
    assert_eq!(fields[2], "ERROR");
    assert!(fields[3].starts_with("insert_one on app.users failed: Connection error:"));
}

#[tokio::test]
async fn each_failure_appends_one_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("error.log");
    let cluster = MemoryCluster::new();
    let registry = ClientRegistry::initialize(
        cluster.clone(),
        Settings::new("memory://primary", "app").with_error_log_path(&path),
    )
    .await
    .unwrap();
    let users = registry.collection("users");

    users.put(doc! { "_id": 1 }).await.unwrap();
    assert!(users.put(doc! { "_id": 1 }).await.is_err());
    assert!(users.set(doc! { "_id": 1 }, doc! { "_id": 2 }).await.is_err());
    assert!(users.find(vec![doc! { "$lookup": {} }]).await.is_err());

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("insert_one on app.users failed"));
    assert!(lines[1].contains("update_one on app.users failed"));
    assert!(lines[2].contains("aggregate on app.users failed"));
}

#[tokio::test]
async fn successful_calls_write_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("error.log");
    let registry = ClientRegistry::initialize(
        MemoryCluster::new(),
        Settings::new("memory://primary", "app").with_error_log_path(&path),
    )
    .await
    .unwrap();

    registry.collection("users").put(doc! { "a": 1 }).await.unwrap();
    registry.collection("users").count(None).await.unwrap();

    assert!(!path.exists());
}
