#![allow(dead_code)]

use indexer_core::config::{AppConfig, ProjectConfig};
use indexer_core::store::Store;
use indexer_core::vocab::Subject;
use indexer_core::ProjectRegistry;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const A: &str = "http://example.org/archaeology";
pub const B: &str = "http://example.org/marine-biology";
pub const C: &str = "http://example.org/organic-chemistry";

pub fn subjects() -> Vec<Subject> {
    vec![
        Subject::new(A, "en", "Archaeology").with_label("fi", "Arkeologia"),
        Subject::new(B, "en", "Marine biology").with_notation("578.77"),
        Subject::new(C, "en", "Organic chemistry"),
    ]
}

pub fn project(backend: &str) -> ProjectConfig {
    ProjectConfig::new("en", backend, "yso")
}

pub async fn registry(config: AppConfig) -> ProjectRegistry {
    let store = Store::open("sqlite::memory:").await.unwrap();
    ProjectRegistry::new(config, store).unwrap()
}

/// A registry whose `yso` vocabulary is already loaded.
pub async fn loaded(config: AppConfig) -> ProjectRegistry {
    let registry = registry(config).await;
    registry.load_vocab("yso", subjects(), false).await.unwrap();
    registry
}

fn request_complete(buf: &[u8]) -> bool {
    let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
    let body_len = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    buf.len() >= end + 4 + body_len
}

/// Serves `body` as JSON to every request; returns the suggest endpoint.
pub async fn serve_json(body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = body.to_string();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if request_complete(&buf) {
                        break;
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}/v1/projects/remote/suggest")
}

/// Accepts connections and never answers.
pub async fn serve_silence() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });
    format!("http://{addr}/suggest")
}

/// An endpoint nothing listens on.
pub async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/suggest")
}

pub fn hits(pairs: &[(&str, f32)]) -> String {
    let results: Vec<serde_json::Value> = pairs
        .iter()
        .map(|(uri, score)| serde_json::json!({ "uri": uri, "label": "x", "score": score }))
        .collect();
    serde_json::json!({ "results": results }).to_string()
}

pub fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}
