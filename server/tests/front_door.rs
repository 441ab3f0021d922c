//! End-to-end tests of the HTTP front door over a real socket.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use volsyncd::SyncOrchestrator;
use volsyncd_server::http;

/// Starts the front door on an ephemeral port, returns its address.
fn start_server(runtime: &tokio::runtime::Runtime) -> std::net::SocketAddr {
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let orchestrator = Arc::new(SyncOrchestrator::new(Duration::from_secs(5)));
        tokio::spawn(http::serve(listener, orchestrator));
        addr
    })
}

/// One blocking HTTP exchange; returns the raw response text.
fn exchange(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(request.as_bytes()).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

fn post_sync(addr: std::net::SocketAddr, body: &str) -> String {
    exchange(
        addr,
        &format!(
            "POST /sync HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    )
}

#[test]
fn health_reports_status_and_timestamp() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = start_server(&runtime);

    let response = exchange(addr, "GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("\"status\":\"healthy\""));
    assert!(response.contains("timestamp"));
}

#[test]
fn malformed_json_is_a_400() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = start_server(&runtime);

    let response = post_sync(addr, "{not json");
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
    assert!(response.contains("invalid request format"));
}

#[test]
fn validation_failure_is_a_400_with_details() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = start_server(&runtime);

    let response = post_sync(
        addr,
        r#"{"source":{"type":"ftp","details":{}},"target":{"path":"/mnt/volume"}}"#,
    );
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
    assert!(response.contains("unsupported source type"));
}

#[test]
fn contradictory_credentials_are_rejected_at_admission() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = start_server(&runtime);

    let response = post_sync(
        addr,
        r#"{"source":{"type":"git","details":{"url":"https://example.com/r.git","user":"u","password":"pw","privateKey":"QUJD"}},"target":{"path":"/mnt/volume"}}"#,
    );
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
}

#[test]
fn accepted_job_returns_201_immediately() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = start_server(&runtime);

    // Unreachable local port: admission succeeds, the job fails later,
    // asynchronously, which is exactly the contract.
    let target = tempfile::TempDir::new().unwrap();
    let body = format!(
        r#"{{"source":{{"type":"http","details":{{"url":"http://127.0.0.1:9/file.bin"}}}},"target":{{"path":"{}"}},"timeout":"1s"}}"#,
        target.path().display()
    );

    let response = post_sync(addr, &body);
    assert!(response.starts_with("HTTP/1.1 201 Created"));
    assert!(response.contains("sync started"));
}

#[test]
fn unknown_route_is_a_404() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = start_server(&runtime);

    let response = exchange(addr, "GET /nope HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
}
