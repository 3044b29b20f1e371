//! Proxy mocks forwarding to a second in-process server

mod common;

use common::{add_mock, start_server};
use decoy_server::history::MockType;
use reqwest::redirect::Policy;
use reqwest::Client;
use serde_json::Value;

fn client() -> Client {
    Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_round_trip() {
    let upstream = start_server().await;
    add_mock(
        &upstream,
        r#"
request:
  method: POST
  path: /items
  query_params:
    page: "2"
response:
  status: 201
  headers:
    X-Test: "1"
  body: created
"#,
    );

    let server = start_server().await;
    add_mock(
        &server,
        &format!("request: {{path: /items}}\nproxy: {{host: '{}/'}}", upstream.url()),
    );

    let response = client()
        .post(format!("{}/items?page=2", server.url()))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["x-test"], "1");
    assert_eq!(response.text().await.unwrap(), "created");

    let store = upstream.store();
    let forwarded = store.get_history(&store.last_session_id()).unwrap();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].request.body_string, "payload");
    // The upstream sees its own authority unless keep_host is set.
    assert_eq!(
        forwarded[0].request.header("Host"),
        Some(upstream.local_addr().to_string().as_str())
    );

    let store = server.store();
    let history = store.get_history(&store.last_session_id()).unwrap();
    assert_eq!(history[0].context.mock_type, Some(MockType::Proxy));
    assert_eq!(history[0].response.status, 201);

    upstream.shutdown().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_injects_headers_and_keeps_host() {
    let upstream = start_server().await;
    add_mock(
        &upstream,
        r#"
request:
  path: /secure
  headers:
    Authorization: Bearer token
response:
  body: allowed
"#,
    );

    let server = start_server().await;
    add_mock(
        &server,
        &format!(
            "request: {{path: /secure}}\nproxy:\n  host: {}\n  keep_host: true\n  headers:\n    Authorization: Bearer token",
            upstream.url()
        ),
    );

    let response = client()
        .get(format!("{}/secure", server.url()))
        .header("Authorization", "Bearer other")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "allowed");

    let store = upstream.store();
    let forwarded = store.get_history(&store.last_session_id()).unwrap();
    assert_eq!(
        forwarded[0].request.header("Host"),
        Some(server.local_addr().to_string().as_str())
    );

    upstream.shutdown().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_redirects() {
    let upstream = start_server().await;
    add_mock(
        &upstream,
        "request: {path: /old}\nresponse: {status: 302, headers: {Location: /new}}",
    );
    add_mock(&upstream, "request: {path: /new}\nresponse: {body: moved}");

    let server = start_server().await;
    add_mock(
        &server,
        &format!(
            "request: {{path: /old, headers: {{X-Follow: 'yes'}}}}\nproxy: {{host: '{}', follow_redirect: true}}",
            upstream.url()
        ),
    );
    add_mock(
        &server,
        &format!("request: {{path: /old, headers: {{X-Follow: 'no'}}}}\nproxy: {{host: '{}'}}", upstream.url()),
    );

    let response = client()
        .get(format!("{}/old", server.url()))
        .header("X-Follow", "yes")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "moved");

    let response = client()
        .get(format!("{}/old", server.url()))
        .header("X-Follow", "no")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 302);
    assert_eq!(response.headers()["location"], "/new");

    upstream.shutdown().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_error_is_reported() {
    let server = start_server().await;
    let mock = add_mock(
        &server,
        "request: {path: /down}\nproxy: {host: 'http://127.0.0.1:1'}",
    );

    let response = client()
        .get(format!("{}/down", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 602);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Error during request redirection: "));

    let store = server.store();
    let stored = store
        .get_mock_by_id(&store.last_session_id(), mock.id())
        .unwrap();
    assert_eq!(stored.state.times_count, 0);

    server.shutdown().await;
}
