mod common;

use common::*;
use ng_recorder_core::{
    node_id::ns0, BrowsePathResolver, BrowsePathStep, BrowseResponse, NodeHierarchyIndex,
    NodeIdentifier, PathResult, StatusCode, TranslateResponse,
};
use std::sync::Arc;

fn recordings_path() -> Vec<BrowsePathStep> {
    vec![
        BrowsePathStep::new(2, "Device", ns0::ORGANIZES),
        BrowsePathStep::new(2, "Recordings", ns0::HAS_COMPONENT),
    ]
}

#[tokio::test]
async fn identical_path_is_resolved_once() {
    init_tracing();
    let client = Arc::new(device_fixture());
    let mut resolver = BrowsePathResolver::new(client.clone());
    let objects = NodeIdentifier::from(ns0::OBJECTS_FOLDER);

    let first = resolver.resolve(&objects, &recordings_path()).await;
    let second = resolver.resolve(&objects, &recordings_path()).await;

    assert_eq!(first, ns2(RECORDINGS));
    assert_eq!(first, second);
    assert_eq!(MockClient::count(&client.translates), 1);
}

#[tokio::test]
async fn cache_ignores_starting_node() {
    init_tracing();
    let client = Arc::new(device_fixture());
    let mut resolver = BrowsePathResolver::new(client.clone());

    let from_objects = resolver
        .resolve(&NodeIdentifier::from(ns0::OBJECTS_FOLDER), &recordings_path())
        .await;
    let from_elsewhere = resolver.resolve(&ns2(42), &recordings_path()).await;

    assert_eq!(from_objects, from_elsewhere);
    assert_eq!(MockClient::count(&client.translates), 1);
}

#[tokio::test]
async fn empty_path_makes_no_call() {
    init_tracing();
    let client = Arc::new(MockClient::new());
    let mut resolver = BrowsePathResolver::new(client.clone());

    let id = resolver.resolve(&NodeIdentifier::from(ns0::OBJECTS_FOLDER), &[]).await;

    assert!(id.is_null());
    assert_eq!(MockClient::count(&client.translates), 0);
}

#[tokio::test]
async fn ambiguous_or_bad_results_are_cached_as_null() {
    init_tracing();
    let client = Arc::new(MockClient::new());
    client.translate_response(
        "2:Device",
        TranslateResponse {
            status: StatusCode::Good,
            results: vec![PathResult {
                status: StatusCode::Good,
                targets: vec![ns2(1), ns2(2)],
            }],
        },
    );
    client.translate_response(
        "2:Lookup",
        TranslateResponse {
            status: StatusCode::BadInternalError,
            results: vec![],
        },
    );
    let mut resolver = BrowsePathResolver::new(client.clone());
    let objects = NodeIdentifier::from(ns0::OBJECTS_FOLDER);
    let device = vec![BrowsePathStep::new(2, "Device", ns0::ORGANIZES)];
    let lookup = vec![BrowsePathStep::new(2, "Lookup", ns0::HAS_COMPONENT)];
    let missing = vec![BrowsePathStep::new(2, "Nowhere", ns0::HAS_COMPONENT)];

    assert!(resolver.resolve(&objects, &device).await.is_null());
    assert!(resolver.resolve(&objects, &lookup).await.is_null());
    assert!(resolver.resolve(&objects, &missing).await.is_null());
    assert!(resolver.resolve(&objects, &device).await.is_null());

    assert_eq!(MockClient::count(&client.translates), 3);
    assert_eq!(resolver.cached_paths(), 3);
}

#[tokio::test]
async fn unknown_path_is_translated_once() {
    init_tracing();
    let client = Arc::new(MockClient::new());
    let mut resolver = BrowsePathResolver::new(client.clone());
    let objects = NodeIdentifier::from(ns0::OBJECTS_FOLDER);
    let missing = vec![BrowsePathStep::new(2, "Nowhere", ns0::HAS_COMPONENT)];

    let first = resolver.resolve(&objects, &missing).await;
    let second = resolver.resolve(&objects, &missing).await;

    assert!(first.is_null());
    assert!(second.is_null());
    assert_eq!(MockClient::count(&client.translates), 1);
}

#[tokio::test]
async fn duplicate_child_names_keep_one_entry() {
    init_tracing();
    let client = Arc::new(MockClient::new());
    client.children(
        ns2(10),
        &[
            ("X", ns0::HAS_COMPONENT, ns2(11)),
            ("X", ns0::HAS_COMPONENT, ns2(12)),
        ],
    );
    let index = NodeHierarchyIndex::new(client.clone());

    let children = index.children(&ns2(10)).await;

    assert_eq!(children.len(), 1);
    assert_eq!(children["X"], ns2(12));
    assert_eq!(MockClient::count(&client.browse_count), 1);
}

#[tokio::test]
async fn bad_browse_status_yields_empty_children() {
    init_tracing();
    let client = Arc::new(MockClient::new());
    client.browse_response(
        ns2(10),
        BrowseResponse {
            status: StatusCode::Bad(0x8034_0000),
            references: vec![],
        },
    );
    let index = NodeHierarchyIndex::new(client.clone());

    assert!(index.children(&ns2(10)).await.is_empty());
    assert!(index.children(&ns2(99)).await.is_empty());
}
