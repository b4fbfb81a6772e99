//! In-process scripted language server for tests.
//!
//! Speaks framed JSON-RPC over an in-memory duplex stream, so connection
//! and session behavior can be exercised without spawning real server
//! binaries. Tests either drive a [`ServerEnd`] by hand or run it with a
//! [`MockBehavior`] that answers the standard lifecycle methods.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use crate::codec::FrameReader;
use crate::config::AdapterConfig;
use crate::connection::Connection;
use crate::diagnostics::DiagnosticsCache;
use crate::session::Session;

pub(crate) fn frame_id(frame: &Value) -> Option<u64> {
    frame.get("id").and_then(Value::as_u64)
}

pub(crate) fn frame_method(frame: &Value) -> Option<&str> {
    frame.get("method").and_then(Value::as_str)
}

/// The server side of a wired connection.
pub(crate) struct ServerEnd {
    reader: FrameReader<tokio::io::ReadHalf<DuplexStream>>,
    write: tokio::io::WriteHalf<DuplexStream>,
}

impl ServerEnd {
    pub fn new(io: DuplexStream) -> Self {
        let (read, write) = tokio::io::split(io);
        Self {
            reader: FrameReader::new(read),
            write,
        }
    }

    /// Read the next frame the client sent. `None` on EOF or codec error.
    pub async fn recv(&mut self) -> Option<Value> {
        self.reader.read_frame().await.ok().flatten()
    }

    async fn write_framed(&mut self, body: &[u8]) {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.write.write_all(header.as_bytes()).await.unwrap();
        self.write.write_all(body).await.unwrap();
        self.write.flush().await.unwrap();
    }

    pub async fn send(&mut self, frame: Value) {
        let body = serde_json::to_string(&frame).unwrap();
        self.write_framed(body.as_bytes()).await;
    }

    /// Send a correctly framed but non-JSON body.
    pub async fn send_raw_body(&mut self, body: &[u8]) {
        self.write_framed(body).await;
    }

    pub async fn respond_ok(&mut self, id: u64, result: Value) {
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result
        }))
        .await;
    }

    pub async fn respond_err(&mut self, id: u64, code: i64, message: &str) {
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }))
        .await;
    }

    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        }))
        .await;
    }

    pub async fn publish_diagnostics(&mut self, uri: &str, diagnostics: Value) {
        self.notify(
            "textDocument/publishDiagnostics",
            serde_json::json!({ "uri": uri, "diagnostics": diagnostics }),
        )
        .await;
    }
}

/// Canned behavior for [`run_mock`]: capabilities to advertise, per-method
/// results, and failure modes.
#[derive(Default)]
pub(crate) struct MockBehavior {
    pub capabilities: Value,
    /// Diagnostics array to push after every `didOpen`/`didChange`.
    pub publish_on_open: Option<Value>,
    /// Methods that get a method-not-found error.
    pub fail_methods: Vec<&'static str>,
    /// Methods that never get a response.
    pub hang_methods: Vec<&'static str>,
    /// Canned results by method.
    pub results: HashMap<&'static str, Value>,
}

impl MockBehavior {
    pub fn with_capabilities(capabilities: Value) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn result(mut self, method: &'static str, value: Value) -> Self {
        self.results.insert(method, value);
        self
    }
}

/// A minimal adapter config for tests. The command never spawns — tests
/// wire in-memory transports instead.
pub(crate) fn test_adapter() -> AdapterConfig {
    serde_json::from_value(serde_json::json!({
        "command": "mockls",
        "language_id": "rust"
    }))
    .unwrap()
}

/// Capabilities advertising every operation the facade gates on, except
/// pull diagnostics.
pub(crate) fn full_capabilities() -> Value {
    serde_json::json!({
        "hoverProvider": true,
        "definitionProvider": true,
        "referencesProvider": true,
        "renameProvider": { "prepareProvider": true },
        "completionProvider": { "triggerCharacters": ["."] },
        "signatureHelpProvider": { "triggerCharacters": ["("] },
        "documentSymbolProvider": true,
        "workspaceSymbolProvider": true,
        "codeActionProvider": true,
        "documentFormattingProvider": true,
        "documentRangeFormattingProvider": true,
        "textDocumentSync": { "openClose": true, "change": 1 }
    })
}

/// Wire a session to a scripted mock over in-memory streams and run the
/// handshake. Returns the session, the mock's task handle, and the log of
/// every frame the mock received.
pub(crate) async fn session_with_mock(
    adapter: AdapterConfig,
    behavior: MockBehavior,
) -> (Session, JoinHandle<()>, Arc<Mutex<Vec<Value>>>) {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (read, write) = tokio::io::split(client_io);
    let cache = Arc::new(DiagnosticsCache::new());
    let handlers = Session::notification_handlers(cache.clone());
    let conn = Connection::wire(read, write, None, "mock".to_string(), handlers);

    let (handle, log) = run_mock(ServerEnd::new(server_io), behavior);
    let session = Session::from_connection(conn, adapter, PathBuf::from("/workspace"), cache)
        .await
        .expect("mock session should initialize");
    (session, handle, log)
}

/// Drive a [`ServerEnd`] with canned behavior until `exit` or EOF.
///
/// Every received frame is appended to the returned log.
pub(crate) fn run_mock(
    mut server: ServerEnd,
    behavior: MockBehavior,
) -> (JoinHandle<()>, Arc<Mutex<Vec<Value>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let task_log = log.clone();

    let handle = tokio::spawn(async move {
        while let Some(frame) = server.recv().await {
            task_log.lock().unwrap().push(frame.clone());
            let method = frame_method(&frame).map(String::from).unwrap_or_default();
            let id = frame_id(&frame);

            if let Some(id) = id {
                if behavior.hang_methods.iter().any(|hung| *hung == method) {
                    continue;
                }
                if behavior.fail_methods.iter().any(|failed| *failed == method) {
                    server.respond_err(id, -32601, "method not found").await;
                    continue;
                }
            }

            match (method.as_str(), id) {
                ("exit", _) => break,
                ("initialize", Some(id)) => {
                    server
                        .respond_ok(
                            id,
                            serde_json::json!({ "capabilities": behavior.capabilities }),
                        )
                        .await;
                }
                ("shutdown", Some(id)) => {
                    server.respond_ok(id, Value::Null).await;
                }
                ("textDocument/didOpen" | "textDocument/didChange", _) => {
                    if let Some(diagnostics) = &behavior.publish_on_open {
                        let uri = frame
                            .pointer("/params/textDocument/uri")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        server.publish_diagnostics(&uri, diagnostics.clone()).await;
                    }
                }
                (m, Some(id)) => {
                    if behavior.hang_methods.iter().any(|hung| *hung == m) {
                        continue;
                    }
                    if behavior.fail_methods.iter().any(|failed| *failed == m) {
                        server.respond_err(id, -32601, "method not found").await;
                        continue;
                    }
                    match behavior.results.get(m) {
                        Some(result) => server.respond_ok(id, result.clone()).await,
                        None => server.respond_ok(id, Value::Null).await,
                    }
                }
                _ => {} // notifications we don't care about
            }
        }
    });

    (handle, log)
}
