mod common;

use std::time::Duration;

use gva_hub::{
    config::{SearchConfig, SocketConfig},
    search::SearchClient,
};
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use common::spawn_server;

fn client_for(server: &MockServer) -> SearchClient {
    SearchClient::new(&SearchConfig {
        addresses: vec![server.uri()],
        timeout: Duration::from_secs(5),
        ..SearchConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn keyword_search_clamps_paging_and_defaults_fields() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_search"))
        .and(body_partial_json(json!({
            "from": 0,
            "size": 10,
            "query": { "multi_match": { "query": "rust", "fields": ["title", "content"] } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": { "total": { "value": 1 }, "hits": [ { "_source": { "title": "rust" } } ] }
        })))
        .expect(1)
        .mount(&engine)
        .await;

    let server = spawn_server(SocketConfig::default(), Some(client_for(&engine))).await;
    let reply: Value = reqwest::Client::new()
        .post(server.url("/elasticsearch/search"))
        .header("x-token", "user_1")
        .json(&json!({ "index": "articles", "keyword": "rust", "page": -3, "page_size": 500 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(reply["code"], 0);
    assert_eq!(reply["data"]["total"], 1);
    assert_eq!(reply["data"]["page"], 1);
    assert_eq!(reply["data"]["page_size"], 10);
    assert_eq!(reply["data"]["data"], json!([{ "title": "rust" }]));
}

#[tokio::test]
async fn missing_documents_map_to_404() {
    let engine = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/articles/_doc/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "found": false })))
        .mount(&engine)
        .await;

    let server = spawn_server(SocketConfig::default(), Some(client_for(&engine))).await;
    let reply = reqwest::Client::new()
        .post(server.url("/elasticsearch/get"))
        .header("x-token", "user_1")
        .json(&json!({ "index": "articles", "doc_id": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), 404);
}

#[tokio::test]
async fn routes_report_a_disabled_engine() {
    let server = spawn_server(SocketConfig::default(), None).await;
    let reply = reqwest::Client::new()
        .post(server.url("/elasticsearch/search"))
        .header("x-token", "user_1")
        .json(&json!({ "index": "articles", "keyword": "rust" }))
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), 503);
}

#[tokio::test]
async fn pages_past_the_offset_range_are_rejected() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": { "total": { "value": 0 }, "hits": [] } })))
        .expect(0)
        .mount(&engine)
        .await;

    let server = spawn_server(SocketConfig::default(), Some(client_for(&engine))).await;
    let reply = reqwest::Client::new()
        .post(server.url("/elasticsearch/search"))
        .header("x-token", "user_1")
        .json(&json!({ "index": "articles", "keyword": "rust", "page": i64::MAX, "page_size": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), 400);
    let body: Value = reply.json().await.unwrap();
    assert_eq!(body["code"], 7);
}
