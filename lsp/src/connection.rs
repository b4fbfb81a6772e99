//! Connection — owns a language server process and the framed JSON-RPC
//! read/write loops, correlating responses to in-flight requests.
//!
//! One writer task serializes all outgoing frames through a queue so that
//! stdin backpressure never blocks the read loop. One reader task parses
//! incoming frames and routes them: responses to the pending-request map,
//! notifications to registered handlers, server-to-client requests to an
//! automatic method-not-found reply.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::codec::{FrameReader, FrameWriter};
use crate::error::{Error, Result};
use crate::protocol::{self, Notification, Request};

const WRITER_CHANNEL_CAPACITY: usize = 64;

const JSONRPC_METHOD_NOT_FOUND: i64 = -32601;

enum WriterCommand {
    Send(Value),
    Shutdown,
}

type Handler = Box<dyn Fn(Option<Value>) + Send + Sync>;

/// Dispatch table for server-initiated notifications, keyed by method.
/// Built once before the connection is wired; immutable afterward.
#[derive(Default)]
pub(crate) struct NotificationHandlers {
    map: HashMap<&'static str, Handler>,
}

impl NotificationHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on(
        mut self,
        method: &'static str,
        handler: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> Self {
        self.map.insert(method, Box::new(handler));
        self
    }
}

enum IncomingFrame {
    Response {
        id: u64,
        body: Value,
    },
    ServerRequest {
        id: Value,
        method: String,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

fn parse_incoming(frame: &Value) -> Option<IncomingFrame> {
    let id = frame.get("id");
    let method = frame
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, has_result_or_error) {
        (Some(id_val), None, true) => Some(IncomingFrame::Response {
            id: id_val.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id_val), Some(method), _) => Some(IncomingFrame::ServerRequest {
            id: id_val.clone(),
            method,
        }),
        (None, Some(method), _) => Some(IncomingFrame::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// A live connection to one language server process.
///
/// Exclusively owned by one session. Once the process exits or `stop` is
/// called the connection is terminally closed: every pending request is
/// rejected and further sends fail fast.
pub(crate) struct Connection {
    name: String,
    writer_tx: mpsc::Sender<WriterCommand>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    stopped: AtomicBool,
    child: Mutex<Option<Child>>,
}

impl Connection {
    /// Spawn the server binary and wire up the transport.
    ///
    /// The command is resolved on PATH; secret-bearing environment
    /// variables are stripped before spawn; stderr is drained to the log
    /// and never parsed as protocol data.
    pub async fn spawn(
        command: &str,
        args: &[String],
        root: &Path,
        name: &str,
        handlers: NotificationHandlers,
    ) -> Result<Self> {
        let resolved = which::which(command)
            .map_err(|_| Error::Initialization(format!("{command} not found in PATH")))?;

        let mut cmd = Command::new(&resolved);
        cmd.args(args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, _) in std::env::vars() {
            if tether_types::is_denied_env_key(&key) {
                cmd.env_remove(&key);
            }
        }

        tracing::debug!(server = name, command = %resolved.display(), ?args, "spawning language server");

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Initialization(format!("spawning {command}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Initialization("no stdout from child".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Initialization("no stdin from child".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let stderr_name = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %stderr_name, "stderr: {line}");
                }
            });
        }

        Ok(Self::wire(stdout, stdin, Some(child), name.to_string(), handlers))
    }

    /// Wire a connection over arbitrary streams. Production uses the child
    /// process pipes; tests use in-memory duplex streams.
    pub fn wire<R, W>(
        reader: R,
        writer: W,
        child: Option<Child>,
        name: String,
        handlers: NotificationHandlers,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut writer = FrameWriter::new(writer);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("LSP write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_alive = alive.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_name = name.clone();
        let handlers = Arc::new(handlers);
        tokio::spawn(async move {
            let mut reader = FrameReader::new(reader);
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        Self::dispatch_frame(
                            &frame,
                            &reader_pending,
                            &handlers,
                            &reader_writer_tx,
                            &reader_name,
                        )
                        .await;
                    }
                    Ok(None) => {
                        tracing::info!(server = %reader_name, "server closed stdout");
                        break;
                    }
                    // Framing is self-delimiting: a bad body leaves the
                    // stream aligned on the next frame boundary.
                    Err(Error::FrameParse(e)) => {
                        tracing::warn!(server = %reader_name, "discarding unparseable frame: {e}");
                    }
                    Err(e) => {
                        tracing::warn!(server = %reader_name, "reader error: {e}");
                        break;
                    }
                }
            }
            reader_alive.store(false, Ordering::SeqCst);
            // Dropping the senders rejects every in-flight request at once.
            reader_pending.lock().await.clear();
        });

        Self {
            name,
            writer_tx,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            stopped: AtomicBool::new(false),
            child: Mutex::new(child),
        }
    }

    async fn dispatch_frame(
        frame: &Value,
        pending: &Mutex<HashMap<u64, oneshot::Sender<Value>>>,
        handlers: &NotificationHandlers,
        writer_tx: &mpsc::Sender<WriterCommand>,
        server_name: &str,
    ) {
        let Some(incoming) = parse_incoming(frame) else {
            tracing::trace!("ignoring malformed JSON-RPC frame from '{server_name}'");
            return;
        };

        match incoming {
            IncomingFrame::Response { id, body } => {
                let sender = pending.lock().await.remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(body);
                    }
                    None => {
                        // Timed out or never ours; a resolved request is
                        // never resurrected.
                        tracing::debug!(
                            server = server_name,
                            id,
                            "discarding late or unknown response"
                        );
                    }
                }
            }
            IncomingFrame::ServerRequest { id, method } => {
                // Many servers send client/registerCapability,
                // workspace/configuration, etc. We must respond or the
                // server may block.
                tracing::debug!(
                    "'{server_name}' sent request {method} — replying method not found"
                );
                let response = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": JSONRPC_METHOD_NOT_FOUND,
                        "message": format!("Method not found: {method}")
                    }
                });
                let _ = writer_tx.send(WriterCommand::Send(response)).await;
            }
            IncomingFrame::Notification { method, params } => {
                if let Some(handler) = handlers.map.get(method.as_str()) {
                    handler(params);
                } else if method == "window/logMessage" || method == "window/showMessage" {
                    log_server_message(server_name, params.as_ref());
                } else {
                    tracing::trace!("ignoring notification from '{server_name}': {method}");
                }
            }
        }
    }

    /// Send a request and await the matching response.
    ///
    /// Ids are process-unique; any number of requests may be in flight and
    /// responses may arrive in any order. On timeout the pending entry is
    /// removed, a `$/cancelRequest` is sent best-effort, and a late
    /// response is discarded by the reader.
    pub async fn request(
        &self,
        method: &'static str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if !self.is_alive() {
            return Err(Error::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = Request::new(id, method, params);
        let frame = serde_json::to_value(&request)?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(Error::NotConnected);
        }

        let started = Instant::now();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(body)) => split_response(method, &body),
            Ok(Err(_)) => Err(Error::connection_lost(format!(
                "{} exited with requests in flight",
                self.name
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                let cancel = Notification::new("$/cancelRequest", Some(protocol::cancel_params(id)));
                if let Ok(frame) = serde_json::to_value(&cancel) {
                    let _ = self.writer_tx.try_send(WriterCommand::Send(frame));
                }
                Err(Error::Timeout {
                    method: method.to_string(),
                    elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &'static str, params: Option<Value>) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::NotConnected);
        }
        let notification = Notification::new(method, params);
        let frame = serde_json::to_value(&notification)?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| Error::NotConnected)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Tear down the transport and the process. Idempotent — the second
    /// call is a no-op. Outstanding requests are rejected immediately
    /// rather than waiting out their individual timeouts.
    pub async fn stop(&self, grace: Duration) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.pending.lock().await.clear();
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::debug!("'{}' didn't exit in time, killing", self.name);
                    let _ = child.kill().await;
                }
            }
        }
        self.alive.store(false, Ordering::SeqCst);
    }
}

fn split_response(method: &'static str, body: &Value) -> Result<Value> {
    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        if code == JSONRPC_METHOD_NOT_FOUND {
            return Err(Error::unsupported(method));
        }
        return Err(Error::Server {
            method: method.to_string(),
            code,
            message,
        });
    }
    Ok(body.get("result").cloned().unwrap_or(Value::Null))
}

fn log_server_message(server_name: &str, params: Option<&Value>) {
    let Some(params) = params else { return };
    let message = params
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    match params.get("type").and_then(Value::as_u64) {
        Some(1) => tracing::warn!(server = server_name, "{message}"),
        Some(2) => tracing::info!(server = server_name, "{message}"),
        _ => tracing::debug!(server = server_name, "{message}"),
    }
}
