// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Exercises [`ElasticLoader`] against a mocked `_bulk` endpoint, the way
//! `sui-indexer-alt-framework` tests its own HTTP client dependencies
//! against a `wiremock` server rather than a live remote.

use search_projector::loader::SearchIndex;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn bulk_index_reports_per_item_acceptance_and_rejection() {
    let server = MockServer::start().await;

    let accepted_id = Uuid::new_v4();
    let rejected_id = Uuid::new_v4();

    let response_body = json!({
        "took": 3,
        "errors": true,
        "items": [
            {"index": {"_id": accepted_id.to_string(), "status": 200}},
            {"index": {"_id": rejected_id.to_string(), "status": 409, "error": {"type": "version_conflict_engine_exception"}}},
        ]
    });

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .mount(&server)
        .await;

    let loader = search_projector::loader::ElasticLoader::new(&server.uri()).unwrap();
    let items = vec![
        (accepted_id, json!({"name": "Drama"})),
        (rejected_id, json!({"name": "Noir"})),
    ];

    let report = loader.bulk_index("genres", items).await.unwrap();
    assert_eq!(report.accepted, vec![accepted_id]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, rejected_id);
}

#[tokio::test]
async fn bulk_index_surfaces_connection_failure_as_load_unavailable() {
    // A server that is never started: the connection itself fails, which
    // must surface as `LoadUnavailable` rather than panic or hang.
    let loader = search_projector::loader::ElasticLoader::new("http://127.0.0.1:1").unwrap();
    let err = loader
        .bulk_index("genres", vec![(Uuid::new_v4(), json!({"name": "Drama"}))])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        search_projector::error::ProjectorError::LoadUnavailable(_)
    ));
}
