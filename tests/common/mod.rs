//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use pizza_service::telemetry::MetricBatch;

/// One request received by the mock ingest endpoint.
#[derive(Debug, Clone)]
pub struct CapturedPush {
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CapturedPush {
    pub fn batch(&self) -> MetricBatch {
        serde_json::from_slice(&self.body).expect("pushed body is a metric batch")
    }

    pub fn metric_name(&self) -> String {
        self.batch().metric_name().unwrap_or_default().to_string()
    }
}

/// Requests captured so far, shared with the mock.
#[derive(Debug, Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<CapturedPush>>>);

impl Captured {
    pub fn all(&self) -> Vec<CapturedPush> {
        self.0.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.all().iter().map(|p| p.metric_name()).collect()
    }

    /// Poll until at least `n` pushes arrived or `timeout` passed.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> Vec<CapturedPush> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let all = self.all();
            if all.len() >= n || tokio::time::Instant::now() >= deadline {
                return all;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Start a mock OTLP ingest endpoint on an ephemeral port that answers every
/// push with `status` and records it.
pub async fn start_mock_ingest(status: u16) -> (SocketAddr, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Captured::default();
    let sink = captured.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let sink = sink.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = socket.into_split();
                        let mut reader = BufReader::new(read);

                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).await.is_err() {
                            return;
                        }
                        let path = request_line
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or_default()
                            .to_string();

                        let mut content_length = 0usize;
                        let mut authorization = None;
                        let mut content_type = None;
                        loop {
                            let mut line = String::new();
                            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                                break;
                            }
                            let line = line.trim_end();
                            if line.is_empty() {
                                break;
                            }
                            if let Some((name, value)) = line.split_once(':') {
                                let value = value.trim().to_string();
                                match name.to_ascii_lowercase().as_str() {
                                    "content-length" => content_length = value.parse().unwrap_or(0),
                                    "authorization" => authorization = Some(value),
                                    "content-type" => content_type = Some(value),
                                    _ => {}
                                }
                            }
                        }

                        let mut body = vec![0u8; content_length];
                        if reader.read_exact(&mut body).await.is_err() {
                            return;
                        }
                        sink.0.lock().unwrap().push(CapturedPush {
                            path,
                            authorization,
                            content_type,
                            body,
                        });

                        let status_text = match status {
                            200 => "200 OK",
                            401 => "401 Unauthorized",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };
                        let reply = "ingest says no";
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            reply.len(),
                            reply
                        );
                        let _ = write.write_all(response.as_bytes()).await;
                        let _ = write.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, captured)
}

/// Start an ingest endpoint that accepts connections and reads requests but
/// never answers. Returns its address and the number of connections held.
pub async fn start_silent_ingest() -> (SocketAddr, Arc<Mutex<usize>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let held = Arc::new(Mutex::new(0usize));
    let counter = held.clone();

    tokio::spawn(async move {
        let mut sockets = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            *counter.lock().unwrap() += 1;
            sockets.push(socket);
        }
    });

    (addr, held)
}
