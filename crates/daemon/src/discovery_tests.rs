// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn probe_returns_server_on_healthy_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/global/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": server.uri(),
            "version": "0.3.0",
        })))
        .mount(&server)
        .await;

    let port: u16 = server.uri().rsplit(':').next().unwrap().parse().unwrap();
    let client = reqwest::Client::new();
    let found = probe(&client, port).await.unwrap();
    assert_eq!(found.version.as_deref(), Some("0.3.0"));
}

#[tokio::test]
async fn probe_returns_none_when_nothing_listens() {
    let client = reqwest::Client::new();
    // Port 1 requires privileges to bind and is never a live agent server.
    let found = probe(&client, 1).await;
    assert!(found.is_none());
}

#[tokio::test]
#[serial]
async fn discover_returns_none_with_no_server_reachable() {
    let client = reqwest::Client::new();
    assert!(discover(&client).await.is_none());
}

#[tokio::test]
#[serial]
async fn discover_picks_the_third_port_when_earlier_ones_reject() {
    use axum::routing::get;
    use axum::Router;

    // 4096 and 4097 left unbound so connections are refused outright.
    let app = Router::new().route(
        "/global/health",
        get(|| async {
            axum::Json(serde_json::json!({"url": "http://127.0.0.1:4098", "version": "0.3.0"}))
        }),
    );
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:4098").await {
        Ok(l) => l,
        Err(_) => return, // port unavailable in this sandbox; nothing to assert
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let client = reqwest::Client::new();
    let found = discover(&client).await;
    assert_eq!(found.and_then(|s| s.version).as_deref(), Some("0.3.0"));
}
