//! MCP transport layer.
//!
//! Each MCP server communicates over a transport:
//! - **Stdio**: spawn a child process, send JSON-RPC over stdin/stdout.
//! - **Sse**: open an HTTP Server-Sent-Events stream, POST requests to the
//!   endpoint the server announces, receive responses on the stream.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Default upper bound for a single request/response cycle. Callers that
/// need a tighter bound (tool execution, handshakes) wrap calls themselves.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Trait for MCP server transports.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the corresponding response.
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;

    /// Check if the transport is still alive.
    fn is_alive(&self) -> bool;

    /// Recent diagnostic output from the server (e.g. stderr), if any.
    fn diagnostics(&self) -> Option<String> {
        None
    }

    /// Shut down the transport gracefully.
    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("MCP server process has exited")]
    ProcessExited,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// True when the underlying executable could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e.to_string())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maximum number of non-JSON lines to skip before declaring the server broken.
const MAX_SKIP_LINES: usize = 1000;

/// Number of stderr lines kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Stdio transport: communicates with a child process over stdin/stdout.
///
/// Each JSON-RPC message is a single newline-delimited line.
/// The `request_lock` serializes entire request/response cycles to prevent
/// response mismatching when multiple callers use the same server.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    /// Serializes full request/response cycles to prevent response mismatching.
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
    request_timeout: Duration,
    stderr_tail: Arc<parking_lot::Mutex<VecDeque<String>>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioTransport {
    /// Spawn `command args...` with the given extra environment.
    ///
    /// A missing executable surfaces as `TransportError::Io` with
    /// `ErrorKind::NotFound` (see [`TransportError::is_not_found`]).
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(TransportError::Io)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            )))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            )))?;

        let stderr_tail = Arc::new(parking_lot::Mutex::new(VecDeque::new()));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(command.to_owned(), stderr, stderr_tail.clone())));

        tracing::debug!(command, pid = ?child.id(), "spawned MCP server process");

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stderr_tail,
            stderr_task,
        })
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Get the next unique request ID.
    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Write a line of JSON to stdin.
    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read a line of JSON from stdout, skipping any empty or non-JSON lines.
    ///
    /// Gives up after [`MAX_SKIP_LINES`] non-JSON lines to prevent spinning
    /// on a misconfigured server that writes logging to stdout.
    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "MCP server produced too many non-JSON lines on stdout",
                )));
            }
            tracing::debug!(line = %trimmed, "skipping non-JSON line from MCP server stdout");
        }
    }
}

/// Forward child stderr into debug logs, keeping the last few lines.
async fn drain_stderr(
    command: String,
    stderr: ChildStderr,
    tail: Arc<parking_lot::Mutex<VecDeque<String>>>,
) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(command = %command, line = %line, "MCP server stderr");
        let mut tail = tail.lock();
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        // Serialize the entire request/response cycle so concurrent callers
        // cannot read each other's responses.
        let _guard = self.request_lock.lock().await;

        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;

        tracing::debug!(id, method, "sending MCP request");
        self.write_line(&json).await?;

        // Read lines until we get a response matching our ID.
        // MCP servers may send notifications between request/response pairs;
        // we skip those (they have no `id` field).
        let result = tokio::time::timeout(self.request_timeout, async {
            loop {
                let line = self.read_line().await?;
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&line) {
                    if resp.id == id {
                        return Ok(resp);
                    }
                    tracing::debug!(
                        expected_id = id,
                        got_id = resp.id,
                        "received response for different request, continuing"
                    );
                }
                tracing::debug!(line = %line, "skipping non-matching message from MCP server");
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&notif)?;
        tracing::debug!(method, "sending MCP notification");
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn diagnostics(&self) -> Option<String> {
        let tail = self.stderr_tail.lock();
        if tail.is_empty() {
            None
        } else {
            Some(tail.iter().cloned().collect::<Vec<_>>().join("\n"))
        }
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        // Close stdin to signal the process to exit.
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "error closing MCP server stdin");
            }
        }
        let waited = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        let outcome = match waited {
            Ok(Ok(status)) => {
                tracing::debug!(?status, "MCP server process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => {
                tracing::warn!("MCP server process did not exit within timeout, killing");
                child.kill().await.map_err(TransportError::Io)
            }
        };
        if let Some(task) = &self.stderr_task {
            task.abort();
        }
        outcome
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type PendingMap = Arc<parking_lot::Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// A parsed Server-Sent-Events block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// SSE transport: a long-lived `text/event-stream` GET plus POSTs to the
/// endpoint announced by the server's first `endpoint` event.
///
/// Responses are matched to waiters by JSON-RPC id, so concurrent requests
/// do not need to be serialized.
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    headers: reqwest::header::HeaderMap,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream at `url` and wait for the endpoint announcement.
    ///
    /// Both the HTTP connect and the wait for the `endpoint` event are bounded
    /// by `connect_timeout`.
    pub async fn connect(
        url: &str,
        headers: &HashMap<String, String>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let stream_url = reqwest::Url::parse(url)
            .map_err(|e| TransportError::Http(format!("invalid SSE url '{url}': {e}")))?;
        let header_map = build_header_map(headers)?;

        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        let response = tokio::time::timeout(
            connect_timeout,
            http.get(stream_url.clone())
                .headers(header_map.clone())
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        if !response.status().is_success() {
            return Err(TransportError::Http(format!(
                "SSE stream at {stream_url} returned HTTP {}",
                response.status()
            )));
        }

        let pending: PendingMap = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_event_stream(
            response,
            endpoint_tx,
            pending.clone(),
            alive.clone(),
        ));

        let endpoint_path = match tokio::time::timeout(connect_timeout, endpoint_rx).await {
            Ok(Ok(path)) => path,
            Ok(Err(_)) => {
                reader.abort();
                return Err(TransportError::Closed);
            }
            Err(_) => {
                reader.abort();
                return Err(TransportError::Timeout);
            }
        };
        let endpoint = stream_url.join(&endpoint_path).map_err(|e| {
            reader.abort();
            TransportError::Http(format!("invalid endpoint '{endpoint_path}': {e}"))
        })?;

        tracing::debug!(url = %stream_url, endpoint = %endpoint, "SSE stream established");

        Ok(Self {
            http,
            endpoint,
            headers: header_map,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reader,
        })
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn post(&self, body: String) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::Http(format!(
                "POST {} returned HTTP {}",
                self.endpoint,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        tracing::debug!(id, method, "sending MCP request over SSE");
        if let Err(e) = self.post(body).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method, params);
        self.post(serde_json::to_string(&notif)?).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.alive.store(false, Ordering::SeqCst);
        self.reader.abort();
        // Dropping the senders wakes every waiter with `Closed`.
        self.pending.lock().clear();
        Ok(())
    }
}

fn build_header_map(headers: &HashMap<String, String>) -> Result<reqwest::header::HeaderMap, TransportError> {
    let mut map = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Http(format!("invalid header name '{name}': {e}")))?;
        let value = reqwest::header::HeaderValue::from_str(value)
            .map_err(|e| TransportError::Http(format!("invalid value for header '{name}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Pump the event stream until it closes, routing responses to waiters.
async fn read_event_stream(
    mut response: reqwest::Response,
    endpoint_tx: oneshot::Sender<String>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut decoder = SseDecoder::default();

    loop {
        match response.chunk().await {
            Ok(Some(bytes)) => {
                for event in decoder.feed(&bytes) {
                    dispatch_event(event, &mut endpoint_tx, &pending);
                }
            }
            Ok(None) => {
                tracing::debug!("SSE stream closed by server");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SSE stream read failed");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    pending.lock().clear();
}

fn dispatch_event(
    event: SseEvent,
    endpoint_tx: &mut Option<oneshot::Sender<String>>,
    pending: &PendingMap,
) {
    match event.event.as_str() {
        "endpoint" => {
            if let Some(tx) = endpoint_tx.take() {
                let _ = tx.send(event.data);
            }
        }
        "message" => match serde_json::from_str::<JsonRpcResponse>(&event.data) {
            Ok(resp) => {
                let waiter = pending.lock().remove(&resp.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(resp);
                    }
                    None => tracing::debug!(id = resp.id, "SSE response with no waiter"),
                }
            }
            Err(_) => tracing::debug!(data = %event.data, "skipping non-response SSE message"),
        },
        other => tracing::debug!(event = other, "ignoring SSE event"),
    }
}

/// Incremental decoder for an SSE byte stream.
///
/// Chunks may split a UTF-8 sequence or a `\r\n` pair; incomplete bytes are
/// held in `raw` and undelimited text in `text` until the next chunk.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    raw: Vec<u8>,
    text: String,
}

impl SseDecoder {
    /// Append a chunk and return every event it completes.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.raw.extend_from_slice(bytes);
        loop {
            match std::str::from_utf8(&self.raw) {
                Ok(decoded) => {
                    self.text.push_str(decoded);
                    self.raw.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.text
                        .push_str(std::str::from_utf8(&self.raw[..valid]).unwrap_or_default());
                    match e.error_len() {
                        // Truncated sequence: wait for the rest.
                        None => {
                            self.raw.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.raw.drain(..valid + len);
                        }
                    }
                }
            }
        }

        // Normalized over the whole pending text, so a pair split across
        // chunks is still caught.
        if self.text.contains("\r\n") {
            self.text = self.text.replace("\r\n", "\n");
        }
        drain_events(&mut self.text)
    }
}

/// Extract complete events from an SSE buffer.
///
/// Events are delimited by a blank line. Multiple `data:` lines are joined
/// with `\n`; a block without an `event:` line is a `message`. The buffer is
/// drained in place and any trailing partial event stays for the next call.
pub(crate) fn drain_events(buffer: &mut String) -> Vec<SseEvent> {
    let mut events = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        let mut event = String::from("message");
        let mut data: Vec<&str> = Vec::new();
        for line in block.lines() {
            if let Some(name) = line.strip_prefix("event:") {
                event = name.trim().to_string();
            } else if let Some(payload) = line.strip_prefix("data:") {
                data.push(payload.strip_prefix(' ').unwrap_or(payload));
            }
        }

        if !data.is_empty() {
            events.push(SseEvent {
                event,
                data: data.join("\n"),
            });
        }
    }

    events
}
