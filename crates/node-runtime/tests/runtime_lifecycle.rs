//! Start and stop the fully wired runtime against an in-memory ledger.

use std::sync::Arc;
use std::time::Duration;

use node_runtime::{NodeRuntime, SyncConfig};
use shared_bus::{EventFilter, SyncEvent};
use sp_01_ledger_reader::InMemoryLedger;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const CONFIG: &str = r#"
[ledger]
program_id = "11111111111111111111111111111111"

[storage]
database_path = ":memory:"

[http]
bind_address = "127.0.0.1:0"
"#;

fn config() -> SyncConfig {
    SyncConfig::from_toml(CONFIG).unwrap()
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_start_serves_health_and_stops_cleanly() {
    let runtime = NodeRuntime::with_ledger(config(), Arc::new(InMemoryLedger::new())).unwrap();
    let mut events = runtime.bus().subscribe(EventFilter::all());

    let addr = runtime.start().await.unwrap();
    assert!(runtime.ingestion().is_running());

    let response = http_get(addr, "/health").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"ingestionRunning\":true"));

    tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
        .await
        .expect("shutdown timed out");
    assert!(!runtime.ingestion().is_running());

    let names: Vec<&str> = events.drain().iter().map(SyncEvent::name).collect();
    assert!(names.contains(&"started"));
    assert!(names.contains(&"stopped"));
}

#[tokio::test]
async fn test_file_store_creates_data_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("mirror.db");
    let mut config = config();
    config.storage.database_path = path.clone();

    let runtime = NodeRuntime::with_ledger(config, Arc::new(InMemoryLedger::new())).unwrap();
    runtime.start().await.unwrap();
    runtime.shutdown().await;

    assert!(path.exists());
}

#[test]
fn test_invalid_program_id_is_rejected() {
    let mut config = config();
    config.ledger.program_id = "not-base58!".into();
    let result = NodeRuntime::with_ledger(config, Arc::new(InMemoryLedger::new()));
    assert!(result.is_err());
}

#[test]
fn test_zero_threshold_is_rejected() {
    let mut config = config();
    config.tracker.settlement_threshold = 0;
    assert!(NodeRuntime::with_ledger(config, Arc::new(InMemoryLedger::new())).is_err());
}
