//! In-process stand-in for a Pushgateway: serves `/metrics` for the groups
//! it holds and removes groups on `DELETE /metrics/job/...`.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    fmt::Write,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::State,
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode, Uri},
    routing::{delete, get},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE, Engine};
use pruner::{GatewayClient, LabelSet, PruneConfig, Pruner, RetryPolicy};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

#[derive(Debug, Clone)]
pub struct Group {
    pub labels: LabelSet,
    /// Unix seconds
    pub push_time: f64,
}

impl Group {
    /// A group that last pushed `age` ago.
    pub fn pushed_ago<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>, age: Duration) -> Self {
        Self {
            labels: labels.into_iter().collect(),
            push_time: now_secs() - age.as_secs_f64(),
        }
    }
}

#[derive(Default)]
struct Inner {
    groups: Mutex<Vec<Group>>,
    /// Paths of every DELETE received, in order.
    deletes: Mutex<Vec<String>>,
    /// Statuses to answer the next `/metrics` requests with instead of 200.
    metrics_statuses: Mutex<VecDeque<StatusCode>>,
    /// `Retry-After` seconds sent along with those statuses.
    retry_after: Mutex<Option<u64>>,
    /// DELETE paths that fail with the given status.
    failing_deletes: Mutex<HashMap<String, StatusCode>>,
    metrics_requests: Mutex<usize>,
    slow_requests: Mutex<usize>,
}

#[derive(Clone)]
pub struct FakeGateway {
    addr: SocketAddr,
    inner: Arc<Inner>,
}

impl FakeGateway {
    pub async fn start(groups: Vec<Group>) -> Self {
        let inner = Arc::new(Inner::default());
        *inner.groups.lock().unwrap() = groups;

        let app = Router::new()
            .route("/metrics", get(metrics))
            .route("/metrics/job/*grouping_key", delete(delete_group))
            .route("/slow/metrics", get(slow))
            .with_state(Arc::clone(&inner));
        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
            .serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        Self { addr, inner }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn config(&self) -> PruneConfig {
        PruneConfig {
            pushgateway_url: self.base_url().parse().unwrap(),
            requests_timeout: Duration::from_secs(5),
            ..PruneConfig::default()
        }
    }

    pub fn pruner(&self) -> Pruner {
        let config = self.config();
        let client = GatewayClient::new(config.requests_timeout, RetryPolicy::immediate()).unwrap();
        Pruner::with_client(config, client)
    }

    pub fn jobs(&self) -> Vec<String> {
        self.inner
            .groups
            .lock()
            .unwrap()
            .iter()
            .filter_map(|g| g.labels.job().map(str::to_owned))
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.inner.deletes.lock().unwrap().clone()
    }

    pub fn metrics_requests(&self) -> usize {
        *self.inner.metrics_requests.lock().unwrap()
    }

    pub fn slow_requests(&self) -> usize {
        *self.inner.slow_requests.lock().unwrap()
    }

    pub fn fail_metrics(&self, statuses: impl IntoIterator<Item = StatusCode>) {
        self.inner.metrics_statuses.lock().unwrap().extend(statuses);
    }

    pub fn retry_after(&self, secs: u64) {
        *self.inner.retry_after.lock().unwrap() = Some(secs);
    }

    pub fn fail_delete(&self, path: &str, status: StatusCode) {
        self.inner
            .failing_deletes
            .lock()
            .unwrap()
            .insert(path.to_owned(), status);
    }
}

pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

async fn metrics(State(inner): State<Arc<Inner>>) -> (StatusCode, HeaderMap, String) {
    *inner.metrics_requests.lock().unwrap() += 1;
    let mut headers = HeaderMap::new();
    if let Some(status) = inner.metrics_statuses.lock().unwrap().pop_front() {
        if let Some(secs) = *inner.retry_after.lock().unwrap() {
            headers.insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        return (status, headers, String::new());
    }
    (StatusCode::OK, headers, render(&inner.groups.lock().unwrap()))
}

async fn slow(State(inner): State<Arc<Inner>>) -> String {
    *inner.slow_requests.lock().unwrap() += 1;
    tokio::time::sleep(Duration::from_secs(2)).await;
    String::new()
}

async fn delete_group(State(inner): State<Arc<Inner>>, uri: Uri) -> StatusCode {
    let path = uri.path().to_owned();
    inner.deletes.lock().unwrap().push(path.clone());
    if let Some(status) = inner.failing_deletes.lock().unwrap().get(&path) {
        return *status;
    }
    let Some(key) = decode_grouping_key(&path) else {
        return StatusCode::BAD_REQUEST;
    };
    inner.groups.lock().unwrap().retain(|g| g.labels != key);
    StatusCode::ACCEPTED
}

/// Reverses `/metrics/job/<job>{/<name>@base64/<value>}`.
fn decode_grouping_key(path: &str) -> Option<LabelSet> {
    let mut segments = path.strip_prefix("/metrics/job/")?.split('/');
    let mut labels = LabelSet::new();
    labels.insert("job", segments.next()?);
    while let Some(name) = segments.next() {
        let name = name.strip_suffix("@base64")?;
        let value = match segments.next()? {
            "=" => String::new(),
            encoded => String::from_utf8(URL_SAFE.decode(encoded).ok()?).ok()?,
        };
        labels.insert(name, value);
    }
    Some(labels)
}

/// Renders groups the way the gateway does: one family per metric name, each
/// group contributing one sample.
fn render(groups: &[Group]) -> String {
    let mut out = String::new();
    let families = [
        ("job_last_success_unixtime", "gauge", "Last time a batch job successfully finished"),
        ("push_failure_time_seconds", "gauge", "Last Unix time when changing this group in the Pushgateway failed."),
        ("push_time_seconds", "gauge", "Last Unix time when changing this group in the Pushgateway succeeded."),
    ];
    for (name, kind, help) in families {
        writeln!(out, "# HELP {name} {help}").unwrap();
        writeln!(out, "# TYPE {name} {kind}").unwrap();
        for group in groups {
            let labels = group
                .labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
                .collect::<Vec<_>>()
                .join(",");
            let value = match name {
                "push_time_seconds" => group.push_time,
                "job_last_success_unixtime" => group.push_time - 1.0,
                _ => 0.0,
            };
            writeln!(out, "{name}{{{labels}}} {value:e}").unwrap();
        }
    }
    out
}

/// Raw HTTP server whose first `stalls` responses send their headers and part
/// of the body, then hang. Later responses are complete.
pub struct StallingServer {
    addr: SocketAddr,
    connections: Arc<Mutex<usize>>,
}

impl StallingServer {
    pub const BODY: &'static str = "# TYPE push_time_seconds gauge\npush_time_seconds{job=\"a\"} 1\n";

    pub async fn start(stalls: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let seen = {
                    let mut n = counter.lock().unwrap();
                    *n += 1;
                    *n
                };
                tokio::spawn(async move {
                    let mut request = [0u8; 1024];
                    let _ = stream.read(&mut request).await;
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        Self::BODY.len()
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    if seen <= stalls {
                        let _ = stream.write_all(&Self::BODY.as_bytes()[..4]).await;
                        let _ = stream.flush().await;
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    } else {
                        let _ = stream.write_all(Self::BODY.as_bytes()).await;
                    }
                });
            }
        });
        Self { addr, connections }
    }

    pub fn url(&self) -> String {
        format!("http://{}/metrics", self.addr)
    }

    pub fn connections(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}
