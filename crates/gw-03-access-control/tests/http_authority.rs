//! HTTP access authority against a local axum server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::put;
use axum::{Json, Router};
use gw_03_access_control::{AccessAuthority, AccessVerdict, Endpoint, HttpAccessAuthority, UpstreamError};
use parking_lot::Mutex;

type Seen = Arc<Mutex<Vec<(String, Option<String>, String)>>>;

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn decide(
    State(seen): State<Seen>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Json<AccessVerdict> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let granted = endpoint == "employee";
    seen.lock().push((endpoint, content_type, body));
    Json(AccessVerdict { granted })
}

fn authority(addr: SocketAddr, timeout: Duration) -> HttpAccessAuthority {
    HttpAccessAuthority::new(format!("http://{addr}/access-control/"), timeout).unwrap()
}

#[tokio::test]
async fn test_put_to_endpoint_with_raw_payload() {
    let seen: Seen = Arc::default();
    let router = Router::new()
        .route("/access-control/request/:endpoint", put(decide))
        .with_state(seen.clone());
    let addr = serve(router).await;
    let client = authority(addr, Duration::from_secs(2));
    assert_eq!(
        client.url_for(Endpoint::Visitor),
        format!("http://{addr}/access-control/request/visitor")
    );

    let payload = r#"{"UAT":{"RL":"Employee"}}"#;
    let verdict = client.request(Endpoint::Employee, payload).await.unwrap();
    assert!(verdict.granted);
    let verdict = client.request(Endpoint::Visitor, "").await.unwrap();
    assert!(!verdict.granted);

    let seen = seen.lock().clone();
    assert_eq!(
        seen[0],
        (
            "employee".to_string(),
            Some("application/json".to_string()),
            payload.to_string()
        )
    );
    assert_eq!(seen[1].0, "visitor");
}

#[tokio::test]
async fn test_error_status_is_upstream_error() {
    let router = Router::new().route(
        "/access-control/request/:endpoint",
        put(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let addr = serve(router).await;

    let err = authority(addr, Duration::from_secs(2))
        .request(Endpoint::Employee, "{}")
        .await
        .unwrap_err();
    assert_eq!(err, UpstreamError::Status(500));
}

#[tokio::test]
async fn test_undecodable_verdict() {
    let router = Router::new().route(
        "/access-control/request/:endpoint",
        put(|| async { "granted, probably" }),
    );
    let addr = serve(router).await;

    let err = authority(addr, Duration::from_secs(2))
        .request(Endpoint::Employee, "{}")
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let router = Router::new().route(
        "/access-control/request/:endpoint",
        put(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(AccessVerdict::granted())
        }),
    );
    let addr = serve(router).await;

    let err = authority(addr, Duration::from_millis(200))
        .request(Endpoint::Employee, "{}")
        .await
        .unwrap_err();
    assert_eq!(err, UpstreamError::Timeout);
}

#[tokio::test]
async fn test_unreachable_upstream() {
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let err = authority(addr, Duration::from_secs(2))
        .request(Endpoint::Visitor, "{}")
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Unreachable(_)), "{err:?}");
}
