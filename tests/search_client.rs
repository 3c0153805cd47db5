use std::time::Duration;

use gva_hub::{
    config::SearchConfig,
    search::{query, SearchClient, SearchError, SearchRequest},
};
use serde_json::{json, Map, Value};
use wiremock::{
    matchers::{body_json, body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn client_for(server: &MockServer) -> SearchClient {
    SearchClient::new(&SearchConfig {
        addresses: vec![server.uri()],
        timeout: Duration::from_secs(5),
        ..SearchConfig::default()
    })
    .unwrap()
}

fn document(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[test]
fn refuses_an_empty_address_list() {
    let err = SearchClient::new(&SearchConfig::default()).unwrap_err();
    assert!(matches!(err, SearchError::NoAddresses));
}

#[tokio::test]
async fn indexes_with_refresh_and_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/logs/_doc/7"))
        .and(query_param("refresh", "true"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .and(body_json(json!({ "title": "hello" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "result": "created" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SearchClient::new(&SearchConfig {
        addresses: vec![format!("{}/", server.uri())],
        username: Some("user".to_owned()),
        password: Some("pass".to_owned()),
        ..SearchConfig::default()
    })
    .unwrap();
    client
        .index_document("logs", Some("7"), &json!({ "title": "hello" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_documents_are_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logs/_doc/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "found": false })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logs/_doc/here"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "here", "found": true, "_source": { "title": "kept" }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.get_document::<Value>("logs", "gone").await.unwrap_err();
    assert!(matches!(err, SearchError::NotFound { ref id, .. } if id == "gone"));

    let found: Value = client.get_document("logs", "here").await.unwrap();
    assert_eq!(found, json!({ "title": "kept" }));
}

#[tokio::test]
async fn search_reports_hits_and_total() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_search"))
        .and(query_param("track_total_hits", "true"))
        .and(body_string_contains("\"multi_match\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 3,
            "hits": {
                "total": { "value": 42, "relation": "eq" },
                "hits": [
                    { "_index": "articles", "_id": "1", "_score": 1.5, "_source": { "title": "rust" } }
                ]
            }
        })))
        .mount(&server)
        .await;

    let request = SearchRequest {
        size: Some(1),
        ..SearchRequest::new(query::multi_match("rust", &["title", "content"]))
    };
    let response = client_for(&server).search("articles", &request).await.unwrap();
    assert_eq!(response.total(), 42);
    assert_eq!(response.hits.hits[0].id, "1");
    assert_eq!(response.into_sources(), vec![json!({ "title": "rust" })]);
}

#[tokio::test]
async fn bulk_requires_ids_and_surfaces_item_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string_contains(r#"{"index":{"_index":"logs","_id":"a"}}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errors": true, "items": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .bulk_index("logs", vec![document(json!({ "title": "no id" }))])
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::MissingId));

    let err = client
        .bulk_index("logs", vec![document(json!({ "id": "a", "title": "x" }))])
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::BulkRejected));

    client.bulk_index("logs", Vec::new()).await.unwrap();
}

#[tokio::test]
async fn counts_and_checks_indices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs/_count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 12 })))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/absent"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.count("logs", Some(query::match_all())).await.unwrap(), 12);
    assert!(client.index_exists("logs").await.unwrap());
    assert!(!client.index_exists("absent").await.unwrap());
}

#[tokio::test]
async fn scroll_visits_every_page_then_clears() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs/_search"))
        .and(query_param("scroll", "2m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_scroll_id": "cursor-1",
            "hits": { "total": { "value": 3 }, "hits": [ { "_source": { "n": 1 } }, { "_source": { "n": 2 } } ] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_string_contains("cursor-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_scroll_id": "cursor-2",
            "hits": { "total": { "value": 3 }, "hits": [ { "_source": { "n": 3 } } ] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_string_contains("cursor-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_scroll_id": "cursor-2",
            "hits": { "total": { "value": 3 }, "hits": [] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll_id": "cursor-2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "succeeded": true })))
        .expect(1)
        .mount(&server)
        .await;

    let mut batches = Vec::new();
    client_for(&server)
        .scroll_search("logs", query::match_all(), 2, |batch| {
            batches.push(batch.len());
            Ok::<_, SearchError>(())
        })
        .await
        .unwrap();
    assert_eq!(batches, vec![2, 1]);
}

#[tokio::test]
async fn engine_errors_keep_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(400).set_body_string("resource_already_exists_exception"))
        .mount(&server)
        .await;

    let err = client_for(&server).create_index("broken", None).await.unwrap_err();
    match err {
        SearchError::Status { status, body } => {
            assert_eq!(status.as_u16(), 400);
            assert!(body.contains("already_exists"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn ids_stay_inside_their_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/user_action_logs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/user_action_logs/_doc/..%2F..%2Fuser_action_logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "deleted" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logs/_doc/a%3Fb%23c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_source": { "ok": true } })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .delete_document("user_action_logs", "../../user_action_logs")
        .await
        .unwrap();
    let found: Value = client.get_document("logs", "a?b#c").await.unwrap();
    assert_eq!(found, json!({ "ok": true }));
}

#[tokio::test]
async fn dot_and_empty_segments_are_refused() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    for id in ["..", ".", ""] {
        let err = client.delete_document("user_action_logs", id).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidSegment(ref segment) if segment == id), "{id:?}: {err}");
    }
    let err = client.delete_index("..").await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidSegment(_)));
}

#[test]
fn refuses_addresses_that_are_not_urls() {
    let err = SearchClient::new(&SearchConfig {
        addresses: vec!["not a url".to_owned()],
        ..SearchConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, SearchError::InvalidAddress(_)));
}

#[test]
fn paging_refuses_offsets_that_overflow() {
    let request = SearchRequest::paged(query::match_all(), 3, 20).unwrap();
    assert_eq!((request.from, request.size), (Some(40), Some(20)));

    let err = SearchRequest::paged(query::match_all(), i64::MAX, 10).unwrap_err();
    assert!(matches!(err, SearchError::PageOutOfRange { page: i64::MAX, page_size: 10 }));
}

#[tokio::test]
async fn connect_reads_the_version_and_creates_the_index() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": { "number": "8.11.0" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/logs"))
        .and(body_string_contains("@timestamp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = gva_hub::search::connect(&SearchConfig {
        addresses: vec![server.uri()],
        index: Some("logs".to_owned()),
        timeout: Duration::from_secs(5),
        ..SearchConfig::default()
    })
    .await;
    assert!(client.is_some());
}
