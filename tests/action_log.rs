mod common;

use std::time::Duration;

use gva_hub::{
    action_log::{service, LogSearch, StatsQuery, INDEX},
    config::{SearchConfig, SocketConfig},
    search::SearchClient,
};
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_string_contains, method, path, path_regex},
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

fn log_source(id: &str) -> Value {
    json!({
        "id": id,
        "user_id": 1,
        "username": "alice",
        "action": "create",
        "module": "fansClub",
        "method": "POST",
        "path": "/fansClub/createFansClub",
        "user_agent": "curl/8.5.0",
        "status": 200,
        "latency": 12,
        "create_time": "2024-05-01T08:00:00Z"
    })
}

#[tokio::test]
async fn search_skips_undecodable_hits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{INDEX}/_search")))
        .and(body_string_contains("\"from\":10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": {
                "total": { "value": 2 },
                "hits": [ { "_source": log_source("a") }, { "_source": { "unexpected": true } } ]
            }
        })))
        .mount(&server)
        .await;

    let search = LogSearch {
        page: 2,
        page_size: 10,
        username: "alice".to_owned(),
        ..LogSearch::default()
    };
    let page = service::search_logs(&client_for(&server), search).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.list.len(), 1);
    assert_eq!(page.list[0].id, "a");
    assert_eq!(page.page, 2);
}

#[tokio::test]
async fn stats_survive_a_failed_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{INDEX}/_search")))
        .and(body_string_contains("\"field\":\"module\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "aggregations": {
                "group_stats": { "buckets": [ { "key": "fansClub", "doc_count": 4 }, { "key": "user", "doc_count": 1 } ] }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{INDEX}/_count")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let query = StatsQuery {
        start_time: "2024-05-01T00:00:00Z".to_owned(),
        end_time: "2024-05-31T00:00:00Z".to_owned(),
        group_by: "module".to_owned(),
    };
    let stats = service::get_stats(&client_for(&server), &query).await.unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.stats.len(), 2);
    assert_eq!(stats.stats[0]["key"], "fansClub");
}

#[tokio::test]
async fn routes_need_a_search_engine() {
    let server = spawn_server(SocketConfig::default(), None).await;
    let http = reqwest::Client::new();

    let anonymous = http.post(server.url("/userActionLog/initIndex")).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);

    let reply = http
        .post(server.url("/userActionLog/initIndex"))
        .header("x-token", "user_1")
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), 503);
    let body: Value = reply.json().await.unwrap();
    assert_eq!(body["code"], 7);
}

#[tokio::test]
async fn test_data_count_is_bounded() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errors": false, "items": [] })))
        .expect(1)
        .mount(&engine)
        .await;

    let server = spawn_server(SocketConfig::default(), Some(client_for(&engine))).await;
    let http = reqwest::Client::new();
    let batch = |count: &str| {
        http.post(server.url(&format!("/userActionLog/batchCreateTestData?count={count}")))
            .header("x-token", "admin_1")
            .send()
    };

    assert_eq!(batch("0").await.unwrap().status(), 400);
    assert_eq!(batch("1001").await.unwrap().status(), 400);
    assert_eq!(batch("many").await.unwrap().status(), 400);

    let reply: Value = batch("3").await.unwrap().json().await.unwrap();
    assert_eq!(reply["code"], 0);
    assert_eq!(reply["msg"], "created 3 test logs");
}

#[tokio::test]
async fn create_and_fetch_through_routes() {
    let engine = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(format!("^/{INDEX}/_doc/[0-9a-f-]+$")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "result": "created" })))
        .expect(1)
        .mount(&engine)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{INDEX}/_doc/missing")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "found": false })))
        .mount(&engine)
        .await;

    let server = spawn_server(SocketConfig::default(), Some(client_for(&engine))).await;
    let http = reqwest::Client::new();

    let rejected = http
        .post(server.url("/userActionLog/createLog"))
        .header("x-token", "user_1")
        .json(&json!({ "user_id": 1, "username": "", "action": "login", "module": "base" }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 400);

    let created: Value = http
        .post(server.url("/userActionLog/createLog"))
        .header("x-token", "user_1")
        .json(&json!({ "user_id": 1, "username": "alice", "action": "login", "module": "base" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["code"], 0);

    let missing = http
        .get(server.url("/userActionLog/getLog/missing"))
        .header("x-token", "user_1")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    let forbidden = http
        .delete(server.url("/userActionLog/deleteIndex"))
        .header("x-token", "user_1")
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);
}

#[tokio::test]
async fn delete_log_cannot_reach_the_index() {
    let engine = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/{INDEX}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&engine)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/{INDEX}/_doc/..%2F..%2F{INDEX}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "result": "not_found" })))
        .expect(1)
        .mount(&engine)
        .await;

    let server = spawn_server(SocketConfig::default(), Some(client_for(&engine))).await;
    let reply = reqwest::Client::new()
        .delete(server.url(&format!("/userActionLog/deleteLog/..%2F..%2F{INDEX}")))
        .header("x-token", "user_1")
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), 404);
}

#[tokio::test]
async fn search_bounds_paging() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{INDEX}/_search")))
        .and(body_string_contains("\"size\":100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": { "total": { "value": 0 }, "hits": [] } })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let wide = LogSearch {
        page_size: 5000,
        ..LogSearch::default()
    };
    let page = service::search_logs(&client, wide).await.unwrap();
    assert_eq!(page.page_size, 100);

    let far = LogSearch {
        page: i64::MAX,
        page_size: 10,
        ..LogSearch::default()
    };
    let err = service::search_logs(&client, far).await.unwrap_err();
    assert!(matches!(err, gva_hub::search::SearchError::PageOutOfRange { .. }));
}
