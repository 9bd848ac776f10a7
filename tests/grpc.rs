//! gRPC transport construction tests. No etcd server is needed.

#![cfg(feature = "grpc")]

mod common;

use lattice_client::core::config::ConnectionConfig;
use lattice_client::transport::GrpcTransport;
use lattice_client::{Client, ClientError};

fn connection(endpoint: &str) -> ConnectionConfig {
    ConnectionConfig {
        endpoint: endpoint.to_string(),
        connect_timeout_ms: 200,
        ..Default::default()
    }
}

#[tokio::test]
async fn invalid_endpoint_is_connect_error() {
    let err = GrpcTransport::connect(&connection("http://bad host:2379"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));
}

#[tokio::test]
async fn unreachable_endpoint_is_connect_error() {
    let err = GrpcTransport::connect(&connection("http://127.0.0.1:1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));
}

#[tokio::test]
async fn client_connect_surfaces_transport_failure() {
    let mut config = common::test_config("grpc-connect");
    config.connection = connection("http://127.0.0.1:1");
    assert!(matches!(
        Client::connect(&config).await,
        Err(ClientError::Connect { .. })
    ));
}
