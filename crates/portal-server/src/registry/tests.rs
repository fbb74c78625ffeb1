use std::collections::BTreeMap;

use super::*;
use crate::storage::PortalDatabase;

async fn registry() -> SqliteNodeRegistry {
    SqliteNodeRegistry::new(PortalDatabase::open_in_memory().await.unwrap())
}

fn node(uuid: &str, name: &str, client_id: &str) -> Node {
    Node {
        uuid: uuid.into(),
        client_id: client_id.into(),
        secret_hash: "$argon2id$v=19$stub".into(),
        name: name.into(),
        role: NodeRole::Instance,
        labels: BTreeMap::from([("zone".to_string(), "eu-1".to_string())]),
        advertise_url: Some("http://web-1:2342".into()),
        site_url: None,
        database: Some(DatabaseRef {
            driver: "mysql".into(),
            host: "db".into(),
            port: 3306,
            name: "pp_web_1_abcdefghijkl".into(),
            user: "pp_web_1_mnopqrstuvwx".into(),
            rotated_at: Some(1_000),
        }),
        created_at: 1_000,
        updated_at: 1_000,
    }
}

#[tokio::test]
async fn put_then_find_by_every_key() {
    let reg = registry().await;
    let n = node("u1", "web-1", "cid_1");
    reg.put(&n).await.unwrap();

    assert_eq!(reg.get("u1").await.unwrap(), n);
    assert_eq!(reg.find_by_node_uuid("u1").await.unwrap(), n);
    assert_eq!(reg.find_by_name("web-1").await.unwrap(), n);
    assert_eq!(reg.find_by_client_id("cid_1").await.unwrap(), n);
}

#[tokio::test]
async fn lookups_return_typed_not_found() {
    let reg = registry().await;
    assert!(reg.find_by_name("nope").await.unwrap_err().is_not_found());
    assert!(reg.find_by_client_id("cid_x").await.unwrap_err().is_not_found());
    assert!(reg.find_by_node_uuid("u9").await.unwrap_err().is_not_found());
    assert!(reg.delete("u9").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn put_updates_in_place() {
    let reg = registry().await;
    let mut n = node("u1", "web-1", "cid_1");
    reg.put(&n).await.unwrap();

    n.role = NodeRole::Service;
    n.labels.insert("tier".into(), "gold".into());
    n.database = None;
    n.updated_at = 2_000;
    reg.put(&n).await.unwrap();

    let stored = reg.get("u1").await.unwrap();
    assert_eq!(stored, n);
    assert_eq!(reg.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_name_is_conflict() {
    let reg = registry().await;
    reg.put(&node("u1", "web-1", "cid_1")).await.unwrap();
    let err = reg.put(&node("u2", "web-1", "cid_2")).await.unwrap_err();
    assert!(matches!(err, RegistryError::Conflict(_)));
}

#[tokio::test]
async fn invalid_name_is_rejected_before_storage() {
    let reg = registry().await;
    let err = reg.put(&node("u1", "Web_1", "cid_1")).await.unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert!(reg.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_is_ordered_and_delete_removes() {
    let reg = registry().await;
    reg.put(&node("u2", "web-2", "cid_2")).await.unwrap();
    reg.put(&node("u1", "api", "cid_1")).await.unwrap();

    let names: Vec<_> = reg.list().await.unwrap().into_iter().map(|n| n.name).collect();
    assert_eq!(names, ["api", "web-2"]);

    reg.delete("u1").await.unwrap();
    assert_eq!(reg.list().await.unwrap().len(), 1);
}
