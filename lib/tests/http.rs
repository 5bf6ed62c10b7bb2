//! Relay requests through the HTTP front door.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use relaygate::{server, Config, StickyKey};

#[allow(unused)]
mod common;

use common::{gateway, FakeDispatcher, FakeRelayer, TestGateway, ETH, LONG_LB};

const BODY: &str = r#"{"blockchainID":"eth-mainnet","rawData":{"method":"eth_blockNumber","id":1,"jsonrpc":"2.0"}}"#;

async fn send(test: &TestGateway, request: Request<Body>) -> anyhow::Result<(StatusCode, String)> {
    let response = server::router(test.gateway.relay.clone())
        .oneshot(request)
        .await?;
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await?;
    Ok((status, String::from_utf8(body.to_vec())?))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("origin", "https://dapp.example.org")
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

fn test_gateway(relayer: FakeRelayer) -> TestGateway {
    gateway(
        &Config::default(),
        FakeDispatcher::with_nodes(&["node-1", "node-2"]),
        relayer,
    )
}

#[tokio::test]
async fn application_relay_is_sent() -> anyhow::Result<()> {
    common::init_logging();
    let test = test_gateway(FakeRelayer::default());

    let (status, body) = send(&test, post("/v1/app-1", BODY)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "relay sent");

    let input = test.relayer.last();
    assert_eq!(input.blockchain, ETH);
    assert_eq!(input.aat.app_pub_key, "pub-app-1");
    assert_eq!(input.data, r#"{"id":1,"jsonrpc":"2.0","method":"eth_blockNumber"}"#);
    assert_eq!(input.path, "");
    Ok(())
}

#[tokio::test]
async fn load_balancer_relay_carries_embedded_path() -> anyhow::Result<()> {
    let test = test_gateway(FakeRelayer::default());

    let uri = format!("/v1/LB/{LONG_LB}~ext~v1");
    let (status, _) = send(&test, post(&uri, BODY)).await?;
    assert_eq!(status, StatusCode::OK);
    let input = test.relayer.last();
    assert_eq!(input.path, "/ext/v1");
    assert_eq!(input.aat.app_pub_key, "pub-app-2");
    Ok(())
}

#[tokio::test]
async fn load_balancer_callers_stay_sticky_across_rpc_ids() -> anyhow::Result<()> {
    let test = test_gateway(FakeRelayer::default());

    for id in [1, 2] {
        let body = format!(
            r#"{{"blockchainID":"eth-mainnet","rawData":{{"method":"eth_blockNumber","id":{id},"jsonrpc":"2.0"}}}}"#
        );
        let (status, _) = send(&test, post("/v1/lb/lb-sticky", &body)).await?;
        assert_eq!(status, StatusCode::OK);
    }

    let sticky = test.gateway.relay.sticky();
    assert_eq!(sticky.len(), 1);
    let key = StickyKey::new(0, "lb-sticky", "", ETH, "10.0.0.1");
    assert_eq!(sticky.get(&key).unwrap().relays.count, 2);

    let inputs = test.relayer.inputs();
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[0].aat.app_pub_key, inputs[1].aat.app_pub_key);
    assert_eq!(inputs[0].node.address, inputs[1].node.address);
    Ok(())
}

#[tokio::test]
async fn non_post_requests_are_rejected() -> anyhow::Result<()> {
    let test = test_gateway(FakeRelayer::default());

    let request = Request::builder()
        .method("GET")
        .uri("/v1/app-1")
        .body(Body::empty())?;
    let (status, body) = send(&test, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("expected: POST, got: GET"), "{body}");
    assert!(test.relayer.inputs().is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_path_and_body_are_rejected() -> anyhow::Result<()> {
    let test = test_gateway(FakeRelayer::default());

    let (status, body) = send(&test, post("/v2/app-1", BODY)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("/v2/app-1"), "{body}");

    let (status, _) = send(&test, post("/v1/app-1", "{")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(test.relayer.inputs().is_empty());
    Ok(())
}

#[tokio::test]
async fn relay_errors_are_reported() -> anyhow::Result<()> {
    let test = test_gateway(FakeRelayer::failing());

    let (status, body) = send(&test, post("/v1/app-1", BODY)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "relay failed: node node-1 unreachable");

    let (status, body) = send(&test, post("/v1/app-9", BODY)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("app-9"), "{body}");
    Ok(())
}

#[tokio::test]
async fn server_serves_until_cancelled() -> anyhow::Result<()> {
    let test = test_gateway(FakeRelayer::default());
    let cancel = CancellationToken::new();
    let handle = server::spawn(
        "127.0.0.1:0".parse()?,
        test.gateway.relay.clone(),
        cancel.clone(),
    )?;
    assert_ne!(handle.listener.port(), 0);

    let response = reqwest::Client::new()
        .post(format!("http://{}/v1/app-1", handle.listener))
        .body(BODY)
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await?, "relay sent");
    assert_eq!(test.relayer.inputs().len(), 1);

    cancel.cancel();
    handle.task.await?;
    Ok(())
}
