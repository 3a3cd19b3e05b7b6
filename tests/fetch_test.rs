mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use presetsync::fetch::{self, FetchError, FetchErrorKind, HttpFetcher, RetryPolicy};

use common::{bytes, flaky, serve, slow, status};

fn policy(timeout: Duration, max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        timeout,
        max_retries,
        delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn downloads_body_to_destination() {
    let base = serve(Router::new().route("/pack.zip", bytes(b"archive bytes".to_vec()))).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pack.zip");
    let fetcher = HttpFetcher::direct().unwrap();

    fetch::fetch(
        &fetcher,
        &format!("{base}/pack.zip"),
        &dest,
        &policy(Duration::from_secs(5), 0),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), b"archive bytes");
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(Router::new().route(
        "/pack.zip",
        flaky(2, b"finally".to_vec(), hits.clone()),
    ))
    .await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pack.zip");

    fetch::fetch(
        &HttpFetcher::direct().unwrap(),
        &format!("{base}/pack.zip"),
        &dest,
        &policy(Duration::from_secs(5), 3),
    )
    .await
    .unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(std::fs::read(&dest).unwrap(), b"finally");
}

#[tokio::test]
async fn not_found_exhausts_retries_without_leaving_a_file() {
    let base = serve(Router::new().route("/gone.zip", status(StatusCode::NOT_FOUND))).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("gone.zip");

    let err = fetch::fetch(
        &HttpFetcher::direct().unwrap(),
        &format!("{base}/gone.zip"),
        &dest,
        &policy(Duration::from_secs(5), 1),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FetchError::Http { status: Some(404), .. }), "{err}");
    assert!(!dest.exists());
}

#[tokio::test]
async fn slow_server_times_out() {
    let base = serve(Router::new().route("/slow.zip", slow(Duration::from_secs(5)))).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("slow.zip");

    let err = fetch::fetch(
        &HttpFetcher::direct().unwrap(),
        &format!("{base}/slow.zip"),
        &dest,
        &policy(Duration::from_millis(200), 0),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), FetchErrorKind::Timeout, "{err}");
    assert!(!dest.exists());
}

#[tokio::test]
async fn unreachable_host_is_network_unavailable() {
    // bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pack.zip");

    let err = fetch::fetch(
        &HttpFetcher::direct().unwrap(),
        &format!("http://127.0.0.1:{port}/pack.zip"),
        &dest,
        &policy(Duration::from_secs(5), 0),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), FetchErrorKind::NetworkUnavailable, "{err}");
    assert!(!dest.exists());
}
