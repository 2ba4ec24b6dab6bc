//! Single-shot probes: TCP connect, HTTP GET and Redis `PING`.
//!
//! Every probe returns an [`Outcome`]; failures are described in text and never
//! surface as errors.

use reqwest::Client;
use std::error::Error as _;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const REDIS_PING: &[u8] = b"*1\r\n$4\r\nPING\r\n";
const UNEXPECTED_PREVIEW: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub healthy: bool,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl Outcome {
    fn up(started: Instant, message: Option<String>) -> Self {
        Outcome { healthy: true, latency_ms: Some(elapsed_ms(started)), message }
    }

    fn down(latency_ms: Option<f64>, message: impl Into<String>) -> Self {
        Outcome { healthy: false, latency_ms, message: Some(message.into()) }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

pub(crate) fn describe_io(e: &io::Error) -> String {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => "Connection refused".to_string(),
        io::ErrorKind::TimedOut => "Connection timed out".to_string(),
        _ => format!("Network error: {}", e),
    }
}

async fn connect(addr: SocketAddr, dur: Duration) -> Result<TcpStream, String> {
    match timeout(dur, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(describe_io(&e)),
        Err(_) => Err("Connection timed out".to_string()),
    }
}

pub async fn tcp(addr: SocketAddr, dur: Duration) -> Outcome {
    let started = Instant::now();
    match connect(addr, dur).await {
        Ok(_stream) => Outcome::up(started, None),
        Err(msg) => Outcome::down(None, msg),
    }
}

/// GET `url`; any 2xx or 3xx status is healthy. Redirects are not followed.
pub async fn http(client: &Client, url: &str, dur: Duration) -> Outcome {
    let started = Instant::now();
    match client.get(url).timeout(dur).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() || status.is_redirection() {
                Outcome::up(started, None)
            } else {
                Outcome::down(Some(elapsed_ms(started)), format!("HTTP {}", status))
            }
        }
        Err(e) => Outcome::down(None, describe_reqwest(&e)),
    }
}

fn describe_reqwest(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        return "Request timed out".to_string();
    }
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return describe_io(io_err);
        }
        source = err.source();
    }
    format!("Request failed: {}", e)
}

/// Redis `PING`. `-NOAUTH` still proves the server is answering.
pub async fn redis_ping(addr: SocketAddr, dur: Duration) -> Outcome {
    let started = Instant::now();
    let mut stream = match connect(addr, dur).await {
        Ok(s) => s,
        Err(msg) => return Outcome::down(None, msg),
    };
    match timeout(dur, stream.write_all(REDIS_PING)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Outcome::down(None, format!("Redis check failed: {}", e)),
        Err(_) => return Outcome::down(None, "Redis check failed: write timed out"),
    }
    let mut buf = vec![0u8; 1024];
    let n = match timeout(dur, stream.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Outcome::down(None, format!("Redis check failed: {}", e)),
        Err(_) => return Outcome::down(None, "Redis check failed: read timed out"),
    };
    let reply = &buf[..n];
    if contains(reply, b"+PONG") {
        Outcome::up(started, None)
    } else if contains(reply, b"-NOAUTH") {
        Outcome::up(started, Some("Auth required".to_string()))
    } else {
        let preview = String::from_utf8_lossy(&reply[..n.min(UNEXPECTED_PREVIEW)]);
        Outcome::down(Some(elapsed_ms(started)), format!("Unexpected response: {:?}", preview))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
