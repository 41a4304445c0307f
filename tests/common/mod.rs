//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use rest_server::{ListenerKind, Server, ServerConfig, ServerError};
use tokio::task::JoinHandle;

/// Plaintext-only config on `127.0.0.1:port`.
pub fn local_config(port: u16) -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1".into(),
        port,
        ..Default::default()
    }
}

/// Spawn `run` and wait until the plaintext listener is bound.
pub async fn start(server: &Arc<Server>, app: Option<Router>) -> (JoinHandle<Result<(), ServerError>>, SocketAddr) {
    let runner = Arc::clone(server);
    let task = tokio::spawn(async move { runner.run(app).await });
    let addr = wait_for_listener(server, ListenerKind::Plaintext).await;
    (task, addr)
}

/// Poll until the given listener reports its bound address.
pub async fn wait_for_listener(server: &Server, kind: ListenerKind) -> SocketAddr {
    for _ in 0..200 {
        if let Some(addr) = server.local_addr(kind) {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{kind} listener did not start");
}

/// Client that ignores proxies and accepts self-signed certificates.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Write a self-signed certificate for `localhost` into `dir`.
pub fn write_self_signed(dir: &Path) -> (PathBuf, PathBuf) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

    let cert_path = dir.join("server.crt");
    let key_path = dir.join("server.key");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
    (cert_path, key_path)
}

/// Pipeline with a `/hang` route that outlives any test grace period.
pub fn hanging_pipeline() -> Router {
    Router::new().route(
        "/hang",
        axum::routing::get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "late"
        }),
    )
}

/// Pipeline with a `/slow` route answering "done" after `delay`.
pub fn slow_pipeline(delay: Duration) -> Router {
    Router::new().route(
        "/slow",
        axum::routing::get(move || async move {
            tokio::time::sleep(delay).await;
            "done"
        }),
    )
}

/// Poll until nothing accepts connections on `addr`.
pub async fn wait_until_closed(addr: &str) {
    for _ in 0..100 {
        if !is_listening(addr).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{addr} is still accepting connections");
}

/// True if something accepts TCP connections on `addr`.
pub async fn is_listening(addr: &str) -> bool {
    tokio::net::TcpStream::connect(addr).await.is_ok()
}
