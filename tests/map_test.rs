// tests/map_test.rs

//! The map operator family's cluster-level scenarios: `map` over three
//! shards, and `map_to_n` fanning out into a `map_from_n` merge.

use s4::client::ClusterClient;
use s4::test_support;

async fn three_node_cluster() -> (Vec<tempfile::TempDir>, ClusterClient) {
    let dirs: Vec<_> = (0..3).map(|_| tempfile::tempdir().unwrap()).collect();
    let paths: Vec<_> = dirs.iter().map(|d| d.path()).collect();
    let nodes = test_support::spawn_cluster(&paths).await;
    let servers = nodes.iter().map(|n| n.addr.to_string()).collect();
    (dirs, ClusterClient::new(servers))
}

#[tokio::test]
async fn map_uppercases_each_input_on_its_own_shard() {
    let (_dirs, client) = three_node_cluster().await;

    for (prefix, byte) in [("000_a", b'a'), ("001_b", b'b'), ("002_c", b'c')] {
        let key = format!("s4://b/in/{prefix}");
        let server = client.server_for(&key).unwrap().to_string();
        client.put_bytes(&server, &key, vec![byte]).await.unwrap();
    }

    for server in client.servers().to_vec() {
        let body = serde_json::json!({
            "cmd": "tr a-z A-Z",
            "indir": "s4://b/in/",
            "outdir": "s4://b/out/",
        });
        let resp = reqwest::Client::new()
            .post(format!("http://{server}/map"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "map failed on {server}: {}", resp.status());
    }

    for (prefix, expected) in [("000_a", b'A'), ("001_b", b'B'), ("002_c", b'C')] {
        let key = format!("s4://b/out/{prefix}");
        let server = client.server_for(&key).unwrap().to_string();
        let bytes = client.get_bytes(&server, &key).await.unwrap();
        assert_eq!(bytes, vec![expected]);
    }
}

#[tokio::test]
async fn map_rerun_against_populated_outdir_is_500_not_409() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_support::spawn_node(dir.path()).await;
    let client = ClusterClient::new(vec![node.addr.to_string()]);
    let server = node.addr.to_string();

    let key = "s4://b/in/000_a";
    client.put_bytes(&server, key, vec![b'a']).await.unwrap();

    let body = serde_json::json!({
        "cmd": "tr a-z A-Z",
        "indir": "s4://b/in/",
        "outdir": "s4://b/out/",
    });
    let first = reqwest::Client::new()
        .post(format!("http://{server}/map"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(first.status().is_success(), "first map run failed: {}", first.status());

    // outdir is already populated; re-running must not surface the
    // underlying conflict as a bare 409.
    let second = reqwest::Client::new()
        .post(format!("http://{server}/map"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn map_to_n_then_map_from_n_merges_by_shared_prefix() {
    let (_dirs, client) = three_node_cluster().await;

    for prefix in ["0_in", "1_in", "2_in"] {
        let key = format!("s4://b/src/{prefix}");
        let server = client.server_for(&key).unwrap().to_string();
        client
            .put_bytes(&server, &key, prefix.as_bytes().to_vec())
            .await
            .unwrap();
    }

    // Each input fans out to a single file named "0" inside its tempdir.
    let fan_out = serde_json::json!({
        "cmd": "cp $filename 0",
        "indir": "s4://b/src/",
        "outdir": "s4://b/scattered/",
    });
    for server in client.servers().to_vec() {
        let resp = reqwest::Client::new()
            .post(format!("http://{server}/map_to_n"))
            .json(&fan_out)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "map_to_n failed on {server}: {}", resp.status());
    }

    // Re-key the fanned-out files back under the numeric prefix so
    // map_from_n can group them, then merge with cat.
    for prefix in ["0_in", "1_in", "2_in"] {
        let scattered_key = format!("s4://b/scattered/{prefix}/0");
        let server = client.server_for(&scattered_key).unwrap().to_string();
        let bytes = client.get_bytes(&server, &scattered_key).await.unwrap();

        let merge_key = format!("s4://b/merge_in/{prefix}");
        let merge_server = client.server_for(&merge_key).unwrap().to_string();
        client.put_bytes(&merge_server, &merge_key, bytes).await.unwrap();
    }

    let merge = serde_json::json!({
        "cmd": "cat",
        "indir": "s4://b/merge_in/",
        "outdir": "s4://b/merged/",
    });
    for server in client.servers().to_vec() {
        let resp = reqwest::Client::new()
            .post(format!("http://{server}/map_from_n"))
            .json(&merge)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "map_from_n failed on {server}: {}", resp.status());
    }
}
