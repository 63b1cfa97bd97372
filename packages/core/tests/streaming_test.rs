//! Integration tests for descendant streaming
//!
//! Tests cover:
//! - Streaming every descendant with its own height
//! - Empty streams for leaves and unknown ids
//! - Idempotent reads without intervening mutation
//! - Bounded-channel draining of large subtrees
//! - The incremental JSON-array sink

use canopy_core::db::DatabaseService;
use canopy_core::models::Node;
use canopy_core::services::NodeService;
use canopy_core::utils::write_json_array;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_stream::StreamExt;

async fn create_test_service() -> (Arc<NodeService>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(
        DatabaseService::new(temp_dir.path().join("tree.db"))
            .await
            .unwrap(),
    );
    (Arc::new(NodeService::new(db)), temp_dir)
}

fn child(id: &str, parent: &str, root: &str) -> Node {
    Node::new(id.to_string(), Some(parent.to_string()), root.to_string())
}

/// Drain a descendant stream into a vector, panicking on stream errors
async fn collect_descendants(service: &NodeService, id: &str) -> Vec<Node> {
    let mut stream = service.stream_descendants(id).await.unwrap();
    let mut nodes = Vec::new();
    while let Some(item) = stream.next().await {
        nodes.push(item.unwrap());
    }
    nodes
}

#[tokio::test]
async fn test_stream_returns_each_descendant_with_own_height() {
    let (service, _temp) = create_test_service().await;
    service.create_root("root").await.unwrap();
    service.create_node(child("a", "root", "root")).await.unwrap();
    service.create_node(child("c", "a", "root")).await.unwrap();
    service.create_node(child("d", "a", "root")).await.unwrap();
    service.create_node(child("e", "c", "root")).await.unwrap();

    let descendants = collect_descendants(&service, "a").await;
    let mut ids: Vec<&str> = descendants.iter().map(|n| n.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["c", "d", "e"]);

    for node in &descendants {
        let expected = match node.id.as_str() {
            "c" | "d" => 2,
            "e" => 3,
            other => panic!("unexpected descendant {}", other),
        };
        // Height is the distance from the node's own root, not from "a"
        assert_eq!(node.height, expected, "height of {}", node.id);
        assert_eq!(node.root_id, "root");
    }
}

#[tokio::test]
async fn test_stream_excludes_the_node_itself() {
    let (service, _temp) = create_test_service().await;
    service.create_root("root").await.unwrap();
    service.create_node(child("a", "root", "root")).await.unwrap();

    let descendants = collect_descendants(&service, "root").await;
    assert!(descendants.iter().all(|n| n.id != "root"));
    assert_eq!(descendants.len(), 1);
}

#[tokio::test]
async fn test_stream_is_empty_for_a_leaf() {
    let (service, _temp) = create_test_service().await;
    service.create_root("root").await.unwrap();
    service.create_node(child("a", "root", "root")).await.unwrap();

    let descendants = collect_descendants(&service, "a").await;
    assert!(descendants.is_empty());
}

#[tokio::test]
async fn test_stream_is_empty_for_an_unknown_id() {
    let (service, _temp) = create_test_service().await;
    service.create_root("root").await.unwrap();

    let descendants = collect_descendants(&service, "missing").await;
    assert!(descendants.is_empty());
}

#[tokio::test]
async fn test_stream_is_idempotent_without_mutation() {
    let (service, _temp) = create_test_service().await;
    service.create_root("root").await.unwrap();
    service.create_node(child("a", "root", "root")).await.unwrap();
    service.create_node(child("b", "a", "root")).await.unwrap();
    service.create_node(child("c", "a", "root")).await.unwrap();

    let first = collect_descendants(&service, "root").await;
    let second = collect_descendants(&service, "root").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_stream_reflects_committed_moves() {
    let (service, _temp) = create_test_service().await;
    service.create_root("root").await.unwrap();
    service.create_node(child("a", "root", "root")).await.unwrap();
    service.create_node(child("b", "root", "root")).await.unwrap();
    service.create_node(child("x", "a", "root")).await.unwrap();

    service.move_node("x", "b").await.unwrap();

    let under_a = collect_descendants(&service, "a").await;
    assert!(under_a.is_empty());

    let under_b = collect_descendants(&service, "b").await;
    assert_eq!(under_b.len(), 1);
    assert_eq!(under_b[0].id, "x");
    assert_eq!(under_b[0].parent_id.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_stream_drains_subtrees_larger_than_the_channel() {
    let (service, _temp) = create_test_service().await;
    service.create_root("root").await.unwrap();

    // Larger than the bounded channel capacity, so the reader must block
    // on the consumer instead of materializing the result set
    for i in 0..100 {
        service
            .create_node(child(&format!("n{}", i), "root", "root"))
            .await
            .unwrap();
    }

    let descendants = collect_descendants(&service, "root").await;
    assert_eq!(descendants.len(), 100);
    assert!(descendants.iter().all(|n| n.height == 1));
}

#[tokio::test]
async fn test_write_json_array_round_trip() {
    let (service, _temp) = create_test_service().await;
    service.create_root("root").await.unwrap();
    service.create_node(child("a", "root", "root")).await.unwrap();
    service.create_node(child("b", "a", "root")).await.unwrap();

    let stream = service.stream_descendants("root").await.unwrap();
    let mut out = Vec::new();
    write_json_array(stream, &mut out).await.unwrap();

    let parsed: Vec<Node> = serde_json::from_slice(&out).unwrap();
    let mut ids: Vec<&str> = parsed.iter().map(|n| n.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_write_json_array_empty_subtree() {
    let (service, _temp) = create_test_service().await;
    service.create_root("root").await.unwrap();

    let stream = service.stream_descendants("root").await.unwrap();
    let mut out = Vec::new();
    write_json_array(stream, &mut out).await.unwrap();
    assert_eq!(out, b"[]");
}
