//! Metrics HTTP endpoint
//!
//! A deliberately small HTTP/1.1 server: each scrape is one connection, one
//! `GET /metrics`, one response. Anything else gets a 4xx and the connection
//! is closed either way.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::registry::MetricsRegistry;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Maximum request head size
const MAX_REQUEST_SIZE: usize = 8192;

/// Metrics scrape server
pub struct MetricsServer {
    registry: Arc<MetricsRegistry>,
}

impl MetricsServer {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    /// Accept loop; runs until the task is aborted.
    pub async fn run(&self, listener: TcpListener) -> std::io::Result<()> {
        log::info!("metrics endpoint listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_scrape(socket, registry).await {
                            log::debug!("scrape client {} error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single scrape connection
async fn handle_scrape(
    mut socket: TcpStream,
    registry: Arc<MetricsRegistry>,
) -> std::io::Result<()> {
    socket.set_nodelay(true)?;

    // Read up to the end of the request head; any body is ignored.
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(()); // Client went away
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buffer.len() > MAX_REQUEST_SIZE {
            return write_response(&mut socket, "400 Bad Request", "request too large\n").await;
        }
    }

    let head = String::from_utf8_lossy(&buffer);
    match parse_request_line(&head) {
        Some(("GET", "/metrics")) => match registry.render() {
            Ok(body) => write_response(&mut socket, "200 OK", &body).await,
            Err(e) => {
                log::error!("metrics render failed: {}", e);
                write_response(&mut socket, "500 Internal Server Error", "render error\n").await
            }
        },
        Some(("GET", _)) => write_response(&mut socket, "404 Not Found", "not found\n").await,
        Some(_) => {
            write_response(&mut socket, "405 Method Not Allowed", "method not allowed\n").await
        }
        None => write_response(&mut socket, "400 Bad Request", "bad request\n").await,
    }
}

/// Split `GET /metrics HTTP/1.1` into method and path
fn parse_request_line(head: &str) -> Option<(&str, &str)> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    parts.next()?; // HTTP version must be present
    Some((method, path))
}

async fn write_response(
    socket: &mut TcpStream,
    status: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        CONTENT_TYPE,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}
