//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reachability::{CheckKind, ProbeError, ProbeTarget, Prober};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What a scripted probe does
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(u64),
    Fail(ProbeError),
    Panic,
}

/// In-memory prober answering from a script keyed by host and check kind.
/// Records every call and the peak number of concurrent calls.
pub struct ScriptedProber {
    script: HashMap<(String, CheckKind), Step>,
    default: Step,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<(String, CheckKind)>>,
}

impl ScriptedProber {
    pub fn new(default: Step) -> Self {
        Self {
            script: HashMap::new(),
            default,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, host: &str, kind: CheckKind, step: Step) -> Self {
        self.script.insert((host.to_string(), kind), step);
        self
    }

    /// Same step for every kind on one host
    pub fn host(mut self, host: &str, step: Step) -> Self {
        for kind in CheckKind::ALL {
            self.script.insert((host.to_string(), kind), step.clone());
        }
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, CheckKind)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, key: &str) -> Vec<CheckKind> {
        self.calls().into_iter().filter(|(k, _)| k == key).map(|(_, kind)| kind).collect()
    }

    pub fn probed_keys(&self) -> BTreeSet<String> {
        self.calls().into_iter().map(|(key, _)| key).collect()
    }
}

#[async_trait::async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, kind: CheckKind, target: &ProbeTarget) -> Result<u64, ProbeError> {
        self.calls.lock().unwrap().push((target.key.clone(), kind));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let step = self.script.get(&(target.host().to_string(), kind)).unwrap_or(&self.default).clone();
        match step {
            Step::Succeed(ms) => Ok(ms),
            Step::Fail(err) => Err(err),
            Step::Panic => panic!("scripted probe exploded"),
        }
    }
}

/// Bind an ephemeral local port
pub async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Serve `response` verbatim to every connection on `listener`
pub fn serve(listener: TcpListener, response: Vec<u8>) {
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 2048];
                let _ = socket.read(&mut request).await;
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
}

/// Bind and serve in one step; returns the port
pub async fn serve_http(response: Vec<u8>) -> u16 {
    let (listener, port) = bind().await;
    serve(listener, response);
    port
}

/// Canned HTTP/1.1 response with a correct Content-Length
pub fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n", body.len());
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}
