//! Integration tests for the gateway bridge.
//!
//! Bindings are built by hand and handed to [`UnionServer::with_bindings`]
//! so the bridge can be pointed at targets the mode resolver never would.

use std::time::Duration;

use tokio::net::TcpListener;

use opsx::UnionServer;
use opsx::config::ListenOptions;
use opsx::server::interceptor::default_chain;
use opsx::server::{
    Binding, BindingKind, CoreService, GatewayBridge, GrpcBinding, HttpBinding, MarshalOptions,
};

fn loopback() -> ListenOptions {
    ListenOptions::new("127.0.0.1:0", None).unwrap()
}

async fn gateway_to(bridge: GatewayBridge) -> HttpBinding {
    HttpBinding::bind(BindingKind::Gateway, &loopback(), bridge.router())
        .await
        .unwrap()
}

#[tokio::test]
async fn unreachable_upstream_maps_to_service_unavailable() {
    // Reserve a port, then free it so nothing answers there.
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let bridge = GatewayBridge::new(dead, Some(Duration::from_secs(2))).unwrap();
    let gateway = gateway_to(bridge).await;
    let http_addr = gateway.local_addr();

    let bindings: Vec<Box<dyn Binding>> = vec![Box::new(gateway)];
    let server = UnionServer::with_bindings(Duration::from_secs(2), bindings);
    let handle = server.handle();
    let run = tokio::spawn(server.run());

    let response = reqwest::get(format!("http://{http_addr}/healthz")).await.unwrap();
    assert_eq!(response.status(), 503);
    assert!(response.headers().contains_key("x-request-id"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], 14);
    assert_eq!(body["details"], serde_json::json!([]));

    // The failure stayed local to the request.
    let again = reqwest::get(format!("http://{http_addr}/healthz")).await.unwrap();
    assert_eq!(again.status(), 503);

    let report = handle.graceful_stop(Duration::from_secs(5)).await.unwrap();
    assert!(report.is_clean());
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn custom_marshal_policy_renders_symbolic_enums() {
    let grpc = GrpcBinding::bind(&loopback(), CoreService::new(), default_chain())
        .await
        .unwrap();
    let bridge = GatewayBridge::new(grpc.local_addr(), None)
        .unwrap()
        .with_marshal_options(MarshalOptions {
            use_enum_numbers: false,
            emit_unpopulated: false,
        });
    let gateway = gateway_to(bridge).await;
    let http_addr = gateway.local_addr();

    let server = UnionServer::with_bindings(
        Duration::from_secs(2),
        vec![Box::new(grpc) as Box<dyn Binding>, Box::new(gateway)],
    );
    let handle = server.handle();
    let run = tokio::spawn(server.run());

    let body: serde_json::Value = reqwest::get(format!("http://{http_addr}/healthz"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "HEALTHY");
    assert!(body.get("message").is_none(), "empty message should be omitted: {body}");
    assert!(body["timestamp"].is_string());

    handle.graceful_stop(Duration::from_secs(5)).await.unwrap();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn request_id_is_generated_when_absent() {
    let grpc = GrpcBinding::bind(&loopback(), CoreService::new(), default_chain())
        .await
        .unwrap();
    let gateway = gateway_to(GatewayBridge::new(grpc.local_addr(), None).unwrap()).await;
    let http_addr = gateway.local_addr();

    let server = UnionServer::with_bindings(
        Duration::from_secs(2),
        vec![Box::new(grpc) as Box<dyn Binding>, Box::new(gateway)],
    );
    let handle = server.handle();
    let run = tokio::spawn(server.run());

    let response = reqwest::get(format!("http://{http_addr}/healthz")).await.unwrap();
    assert_eq!(response.status(), 200);
    let id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(id.len(), 36, "expected a UUID, got {id}");

    handle.graceful_stop(Duration::from_secs(5)).await.unwrap();
    run.await.unwrap().unwrap();
}
