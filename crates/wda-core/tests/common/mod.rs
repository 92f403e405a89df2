//! Shared test helpers for wda-core integration tests.
//!
//! Two kinds of doubles live here: an in-process [`MockTransport`] that
//! replays canned envelopes and records every request, and a raw TCP HTTP
//! server for exercising the real `HttpTransport`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use wda_core::artifact::ArtifactSink;
use wda_core::session::WdaSession;
use wda_core::transport::{HttpRequest, HttpResponse, Transport, TransportError};

// ---------------------------------------------------------------------------
// Recording mock transport
// ---------------------------------------------------------------------------

/// Replays queued responses in order and records each request it receives.
/// An exhausted queue answers with a request error.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a 200 response with `body` serialized as JSON.
    pub fn respond(&self, body: Value) -> &Self {
        self.respond_raw(body.to_string().into_bytes())
    }

    pub fn respond_raw(&self, body: Vec<u8>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse { status: 200, body }));
        self
    }

    pub fn fail(&self, err: TransportError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> HttpRequest {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("no canned response".into())))
    }
}

/// Session against a [`MockTransport`], optionally already bound.
pub fn mock_session(session_id: Option<&str>) -> (WdaSession, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let mut session = WdaSession::new("http://device:8100", transport.clone());
    if let Some(id) = session_id {
        session.attach(id).unwrap();
    }
    (session, transport)
}

/// `{"value": value, "sessionId": sid}`
pub fn envelope(value: Value, session_id: &str) -> Value {
    serde_json::json!({"value": value, "sessionId": session_id})
}

// ---------------------------------------------------------------------------
// In-memory artifact sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySink {
    written: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink whose writes always fail.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            written: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn written(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.written.lock().unwrap().clone()
    }
}

impl ArtifactSink for MemorySink {
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.written
            .lock()
            .unwrap()
            .push((path.to_path_buf(), bytes.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raw TCP HTTP mock server
// ---------------------------------------------------------------------------

/// What the mock server does with one incoming request.
pub enum MockBehavior {
    /// Reply with the given status and body.
    Respond(u16, String),
    /// Read the request and never answer.
    Hang,
    /// Read the request and close the connection without answering.
    Drop,
}

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

/// Start an HTTP server that handles one connection per behavior, in order,
/// and records every request it reads.
pub async fn mock_http_server(
    behaviors: Vec<MockBehavior>,
) -> (SocketAddr, Arc<Mutex<Vec<RecordedRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let log = recorded.clone();

    tokio::spawn(async move {
        for behavior in behaviors {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let Some(request) = read_request(&mut stream).await else {
                return;
            };
            log.lock().unwrap().push(request);

            match behavior {
                MockBehavior::Respond(status, body) => {
                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.flush().await;
                }
                MockBehavior::Hang => {
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                }
                MockBehavior::Drop => drop(stream),
            }
        }
    });

    (addr, recorded)
}
