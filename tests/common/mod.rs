#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, get};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build a zip in memory. Names ending in `/` become directory entries.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    zip_archive_with(entries, CompressionMethod::Deflated, None)
}

pub fn zip_archive_with(
    entries: &[(&str, &[u8])],
    method: CompressionMethod,
    comment: Option<&str>,
) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(method);
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    if let Some(comment) = comment {
        writer.set_comment(comment);
    }
    writer.finish().unwrap().into_inner()
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn bytes(body: Vec<u8>) -> MethodRouter {
    get(move || {
        let body = body.clone();
        async move { body }
    })
}

pub fn status(code: StatusCode) -> MethodRouter {
    get(move || async move { (code, "nope") })
}

/// Answers 503 for the first `failures` requests, then `body`.
pub fn flaky(failures: usize, body: Vec<u8>, hits: Arc<AtomicUsize>) -> MethodRouter {
    get(move || {
        let body = body.clone();
        let hits = hits.clone();
        async move {
            let seen = hits.fetch_add(1, Ordering::SeqCst);
            if seen < failures {
                (StatusCode::SERVICE_UNAVAILABLE, Vec::new()).into_response()
            } else {
                body.into_response()
            }
        }
    })
}

pub fn slow(delay: Duration) -> MethodRouter {
    get(move || async move {
        tokio::time::sleep(delay).await;
        "late"
    })
}

/// File name → contents for every regular file directly in `dir`.
pub fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().unwrap().is_file())
        .map(|entry| {
            (
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read(entry.path()).unwrap(),
            )
        })
        .collect()
}

pub fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}
