// tests/put_get_test.rs

//! End-to-end put/get protocol coverage against a single in-process node:
//! put then get, conflict on re-put, and delete then re-put.

use s4::client::ClusterClient;
use s4::test_support;

#[tokio::test]
async fn put_then_get_round_trips_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_support::spawn_node(dir.path()).await;
    let client = ClusterClient::new(vec![node.addr.to_string()]);

    let key = "s4://b/123_k";
    let body = b"hello, shard".to_vec();
    let server = client.server_for(key).unwrap().to_string();
    client.put_bytes(&server, key, body.clone()).await.unwrap();

    let fetched = client.get_bytes(&server, key).await.unwrap();
    assert_eq!(fetched, body);

    let listing = client.list(&server, "s4://b/", false).await.unwrap();
    assert_eq!(listing.len(), 1);
}

#[tokio::test]
async fn second_put_to_same_key_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_support::spawn_node(dir.path()).await;
    let client = ClusterClient::new(vec![node.addr.to_string()]);

    let key = "s4://b/123_k";
    let server = client.server_for(key).unwrap().to_string();
    client.put_bytes(&server, key, b"first".to_vec()).await.unwrap();

    let err = client
        .put_bytes(&server, key, b"second".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, s4::client::ClientError::Conflict(_)));
}

#[tokio::test]
async fn delete_then_re_put_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_support::spawn_node(dir.path()).await;
    let client = ClusterClient::new(vec![node.addr.to_string()]);

    let key = "s4://b/123_k";
    let server = client.server_for(key).unwrap().to_string();
    client.put_bytes(&server, key, b"first".to_vec()).await.unwrap();
    client.delete(&server, key, false).await.unwrap();

    client.put_bytes(&server, key, b"second".to_vec()).await.unwrap();
    let fetched = client.get_bytes(&server, key).await.unwrap();
    assert_eq!(fetched, b"second");
}

#[tokio::test]
async fn get_of_missing_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_support::spawn_node(dir.path()).await;
    let client = ClusterClient::new(vec![node.addr.to_string()]);
    let server = client.server_for("s4://b/nope").unwrap().to_string();

    let err = client.get_bytes(&server, "s4://b/nope").await.unwrap_err();
    assert!(matches!(err, s4::client::ClientError::Transport(_)));
}
