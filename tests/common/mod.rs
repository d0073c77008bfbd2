// Shared test helpers
#![allow(dead_code)]

use statmon::config::ServerConfig;
use statmon::evaluator::{EvaluatorOptions, Thresholds};
use statmon::fetcher::{FetchError, StatsSource};
use statmon::models::MetricsSnapshot;
use statmon::poller::{CeilingPolicy, PollerConfig};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Duration;

pub fn snapshot(
    load_average: f64,
    memory: (u64, u64),
    disk: (u64, u64),
    network: (u64, u64),
) -> MetricsSnapshot {
    MetricsSnapshot {
        load_average,
        total_memory: memory.0,
        used_memory: memory.1,
        total_disk: disk.0,
        used_disk: disk.1,
        total_network: network.0,
        used_network: network.1,
    }
}

pub fn quiet_snapshot() -> MetricsSnapshot {
    snapshot(1.0, (1000, 100), (2000, 100), (500, 10))
}

pub fn refused() -> FetchError {
    FetchError::Connect(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "connection refused",
    ))
}

pub fn poller_config(policy: CeilingPolicy) -> PollerConfig {
    PollerConfig {
        poll_interval: Duration::from_secs(5),
        error_ceiling: 3,
        on_error_ceiling: policy,
        thresholds: Thresholds::default(),
        evaluator: EvaluatorOptions::default(),
    }
}

pub fn local_server(port: u16) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port,
        path: "/_stats".into(),
        timeout_secs: 2,
    }
}

/// Replays scripted results in order, then keeps returning `fallback`
/// (or a connection error when there is none).
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<MetricsSnapshot, FetchError>>>,
    fallback: Option<MetricsSnapshot>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn sequence(script: Vec<Result<MetricsSnapshot, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(snapshot: MetricsSnapshot) -> Self {
        Self {
            fallback: Some(snapshot),
            ..Self::sequence(vec![])
        }
    }

    pub fn always_failing() -> Self {
        Self::sequence(vec![])
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl StatsSource for ScriptedSource {
    async fn fetch(&self) -> Result<MetricsSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => self.fallback.ok_or_else(refused),
        }
    }
}

/// Accepts one connection, waits for the request head, writes `response` verbatim and closes.
pub async fn raw_http_stub(response: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });
    port
}

/// Accepts connections and never answers.
pub async fn silent_stub() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    port
}
