//! Minimal HTTP/1.1 front door.
//!
//! Two routes and three outcomes; the only interaction with the core is
//! `request_sync` and the mapping of its result onto status codes. Requests
//! are size-capped and connections close after one response.

use std::io;
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use volsyncd::{Admission, SyncOrchestrator, SyncRequest};

const MAX_REQUEST_LINE_BYTES: usize = 8 * 1024;
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Accept loop; runs until the listener is torn down.
pub async fn serve(listener: TcpListener, orchestrator: Arc<SyncOrchestrator>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, orchestrator).await {
                tracing::debug!("connection from {} failed: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    orchestrator: Arc<SyncOrchestrator>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    if request_line.len() > MAX_REQUEST_LINE_BYTES {
        return write_response(reader.into_inner(), 400, "Bad Request", &json!({
            "error": "request line too long"
        }))
        .await;
    }

    let mut parts = request_line.split_whitespace();
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method.to_string(), path.to_string()),
        _ => {
            return write_response(reader.into_inner(), 400, "Bad Request", &json!({
                "error": "malformed request line"
            }))
            .await;
        }
    };

    // Headers: only Content-Length matters to this front door.
    let mut content_length: usize = 0;
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    if content_length > MAX_BODY_BYTES {
        return write_response(reader.into_inner(), 400, "Bad Request", &json!({
            "error": "request body too large"
        }))
        .await;
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let (status, reason, payload) = route(&method, &path, &body, &orchestrator);
    write_response(reader.into_inner(), status, reason, &payload).await
}

/// Maps one request onto a response triple.
fn route(
    method: &str,
    path: &str,
    body: &[u8],
    orchestrator: &SyncOrchestrator,
) -> (u16, &'static str, serde_json::Value) {
    match (method, path) {
        ("GET", "/health") => (
            200,
            "OK",
            json!({
                "status": "healthy",
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        ),
        ("POST", "/sync") => {
            let request: SyncRequest = match serde_json::from_slice(body) {
                Ok(request) => request,
                Err(e) => {
                    return (
                        400,
                        "Bad Request",
                        json!({
                            "error": "invalid request format",
                            "details": e.to_string(),
                        }),
                    );
                }
            };

            match orchestrator.request_sync(&request) {
                Ok(Admission::Accepted) => (
                    201,
                    "Created",
                    json!({
                        "status": "sync started",
                        "message": "synchronization process has been initiated",
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    }),
                ),
                Ok(Admission::Busy) => (
                    503,
                    "Service Unavailable",
                    json!({
                        "error": "syncing in progress already",
                        "status": "busy",
                    }),
                ),
                Err(e) => (
                    400,
                    "Bad Request",
                    json!({
                        "error": "invalid request",
                        "details": e.to_string(),
                    }),
                ),
            }
        }
        _ => (404, "Not Found", json!({"error": "not found"})),
    }
}

async fn write_response(
    mut stream: TcpStream,
    status: u16,
    reason: &str,
    payload: &serde_json::Value,
) -> io::Result<()> {
    let body = payload.to_string();
    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n\
         {}",
        status,
        reason,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}
