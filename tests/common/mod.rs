//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use trace_proxy::config::ProxyConfig;
use trace_proxy::reporting::{InflightStats, MetricsReporter, SinkError};
use trace_proxy::{HttpServer, Shutdown};

/// Start a mock backend on an ephemeral port.
///
/// `f` receives the raw request head (request line and headers) and returns
/// the status code and body to answer with.
pub async fn start_backend<F>(f: F) -> SocketAddr
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let (status, body) = f(&head);
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Value of header `name` in a raw request head, if present.
pub fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Reporter whose windows are delivered to the returned channel. Not running.
pub fn channel_reporter(period: Duration) -> (Arc<MetricsReporter>, mpsc::UnboundedReceiver<InflightStats>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = Arc::new(MetricsReporter::new(period));
    reporter.set_stats_receiver(move |stats| {
        tx.send(stats).map_err(|e| SinkError::Receiver(e.to_string()))
    });
    (reporter, rx)
}

/// Spawn the reporter's timer loop.
pub fn spawn_reporter(reporter: &Arc<MetricsReporter>) -> tokio::task::JoinHandle<()> {
    let reporter = Arc::clone(reporter);
    tokio::spawn(async move { reporter.run().await })
}

/// A running proxy in front of `target`.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub server: tokio::task::JoinHandle<()>,
}

pub async fn start_proxy(target: SocketAddr, reporter: Arc<MetricsReporter>) -> TestProxy {
    let mut config = ProxyConfig::default();
    config.upstream.target = format!("http://{target}");
    config.upstream.request_timeout_secs = 5;

    let server = HttpServer::new(config, reporter).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    let server = tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy {
        addr,
        shutdown,
        server,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
