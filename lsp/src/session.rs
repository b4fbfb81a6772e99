//! Session — drives one language server through its lifecycle and owns
//! every piece of per-server state: the connection, the negotiated
//! capabilities, the open-document table and the diagnostics cache.
//!
//! Sessions are passed around explicitly — there is no ambient "current
//! client" registry. A session that loses its server is terminally closed;
//! callers create a new one rather than the core respawning anything.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::capabilities::{PositionEncoding, ServerCapabilities};
use crate::config::{AdapterConfig, OperationKind, ServerProfile};
use crate::connection::{Connection, NotificationHandlers};
use crate::diagnostics::{DeliveryMode, DiagnosticsCache};
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::protocol;

const INIT_TIMEOUT: Duration = Duration::from_secs(30);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace period for the process to exit voluntarily after `exit`.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Initializing,
    Ready,
    ShuttingDown,
    Closed,
}

impl SessionState {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting down",
            Self::Closed => "closed",
        }
    }
}

/// One running language server and the client state attached to it.
pub struct Session {
    pub(crate) adapter: AdapterConfig,
    pub(crate) profile: ServerProfile,
    root: PathBuf,
    pub(crate) conn: Connection,
    state: StdMutex<SessionState>,
    /// Snapshot from the `initialize` response; never mutated after start.
    pub(crate) capabilities: ServerCapabilities,
    pub(crate) encoding: PositionEncoding,
    pub(crate) delivery: DeliveryMode,
    pub(crate) documents: Mutex<DocumentStore>,
    pub(crate) diagnostics: Arc<DiagnosticsCache>,
}

impl Session {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Spawn the adapter's server and run the initialize handshake.
    ///
    /// Returns a session in the `Ready` state, or `Initialization` when
    /// the server could not be spawned, rejected the handshake, or exited
    /// before answering.
    pub async fn start(adapter: AdapterConfig, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let diagnostics = Arc::new(DiagnosticsCache::new());
        let handlers = Self::notification_handlers(diagnostics.clone());
        let conn = Connection::spawn(
            &adapter.command,
            &adapter.args,
            &root,
            &adapter.language_id,
            handlers,
        )
        .await?;
        Self::from_connection(conn, adapter, root, diagnostics).await
    }

    /// The notification dispatch table every session installs. Registered
    /// before the handshake so early pushes are never missed.
    pub(crate) fn notification_handlers(cache: Arc<DiagnosticsCache>) -> NotificationHandlers {
        NotificationHandlers::new().on("textDocument/publishDiagnostics", move |params| {
            let Some(params) = params else { return };
            match serde_json::from_value::<protocol::PublishDiagnosticsParams>(params) {
                Ok(publish) => {
                    let items = protocol::diagnostics_from_wire(publish.diagnostics);
                    tracing::debug!(uri = %publish.uri, count = items.len(), "diagnostics updated");
                    cache.publish(&publish.uri, items);
                }
                Err(e) => {
                    tracing::debug!("failed to parse publishDiagnostics: {e}");
                }
            }
        })
    }

    /// Build a session over an already-wired connection and drive the
    /// handshake. Production goes through [`Session::start`]; tests wire
    /// in-memory transports.
    pub(crate) async fn from_connection(
        conn: Connection,
        adapter: AdapterConfig,
        root: PathBuf,
        diagnostics: Arc<DiagnosticsCache>,
    ) -> Result<Self> {
        let profile = adapter.profile.clone();
        let mut session = Self {
            profile,
            adapter,
            root,
            conn,
            state: StdMutex::new(SessionState::NotStarted),
            capabilities: ServerCapabilities::default(),
            encoding: PositionEncoding::Utf16,
            delivery: DeliveryMode::Polling,
            documents: Mutex::new(DocumentStore::new()),
            diagnostics,
        };

        if let Err(e) = session.initialize().await {
            session.conn.stop(SHUTDOWN_GRACE).await;
            *session.lock_state() = SessionState::Closed;
            return Err(match e {
                err @ Error::Initialization(_) => err,
                other => Error::Initialization(other.to_string()),
            });
        }
        Ok(session)
    }

    async fn initialize(&mut self) -> Result<()> {
        *self.lock_state() = SessionState::Initializing;

        let root_uri = protocol::path_to_file_uri(&self.root)?;
        let params = protocol::initialize_params(
            root_uri.as_str(),
            self.adapter.initialization_options.as_ref(),
        );
        let raw = self.conn.request("initialize", Some(params), INIT_TIMEOUT).await?;

        let caps_value = raw
            .get("capabilities")
            .cloned()
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| serde_json::json!({}));
        self.capabilities = serde_json::from_value(caps_value)
            .map_err(|e| Error::Initialization(format!("unreadable server capabilities: {e}")))?;
        self.encoding = self.capabilities.position_encoding();

        self.conn
            .notify("initialized", Some(serde_json::json!({})))
            .await?;

        // Some servers index the project before they can serve requests;
        // wait out the profile's bound before declaring readiness.
        if self.profile.requires_project_init {
            tokio::time::sleep(self.profile.readiness_check_timeout()).await;
        }

        // Diagnostics delivery is decided once per session, not per call.
        self.delivery = if self.capabilities.supports(OperationKind::PullDiagnostics)
            && !self.profile.declares_unsupported(OperationKind::PullDiagnostics)
        {
            DeliveryMode::Pull
        } else if self.profile.sends_initial_diagnostics {
            DeliveryMode::Push
        } else {
            DeliveryMode::Polling
        };

        *self.lock_state() = SessionState::Ready;
        tracing::info!(
            server = %self.adapter.language_id,
            delivery = ?self.delivery,
            "language server ready"
        );
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    #[must_use]
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn ensure_ready(&self) -> Result<()> {
        let state = self.state();
        if state == SessionState::Ready {
            Ok(())
        } else {
            Err(Error::NotReady {
                state: state.label(),
            })
        }
    }

    /// Graceful teardown: `shutdown` request, `exit` notification, then
    /// process termination with a kill fallback. Idempotent — the second
    /// call is a no-op. Outstanding requests are rejected immediately.
    pub async fn stop(&self) {
        {
            let mut state = self.lock_state();
            if matches!(*state, SessionState::ShuttingDown | SessionState::Closed) {
                return;
            }
            *state = SessionState::ShuttingDown;
        }

        if self.conn.is_alive() {
            if let Err(e) = self.conn.request("shutdown", None, SHUTDOWN_TIMEOUT).await {
                tracing::debug!("shutdown request failed: {e}");
            }
            let _ = self.conn.notify("exit", None).await;
        }
        self.conn.stop(SHUTDOWN_GRACE).await;

        *self.lock_state() = SessionState::Closed;
    }

    // ── Document lifecycle ─────────────────────────────────────────────

    /// Open a document at version 1. Opening an already-open uri is a
    /// no-op — a second `didOpen` is never sent without an intervening
    /// `didClose`.
    pub async fn open_document(&self, path: &Path, text: &str) -> Result<()> {
        self.ensure_ready()?;
        let uri = protocol::path_to_file_uri(path)?;

        let mut docs = self.documents.lock().await;
        let Some(version) = docs.open(uri.as_str(), text) else {
            return Ok(());
        };
        let params =
            protocol::did_open_params(uri.as_str(), &self.adapter.language_id, version, text);
        if let Err(e) = self.conn.notify("textDocument/didOpen", Some(params)).await {
            // The server never saw the open; keep the table honest.
            docs.discard(uri.as_str());
            return Err(e);
        }
        Ok(())
    }

    /// Sync new content with full-document replacement. The version is
    /// auto-incremented unless the caller supplies one, and always
    /// strictly increases.
    pub async fn update_document(
        &self,
        path: &Path,
        text: &str,
        version: Option<i32>,
    ) -> Result<i32> {
        self.ensure_ready()?;
        let uri = protocol::path_to_file_uri(path)?;

        let mut docs = self.documents.lock().await;
        let version = docs.update(uri.as_str(), text, version)?;
        let params = protocol::did_change_params(uri.as_str(), version, text);
        self.conn
            .notify("textDocument/didChange", Some(params))
            .await?;
        Ok(version)
    }

    /// Close a document and drop its cached diagnostics.
    pub async fn close_document(&self, path: &Path) -> Result<()> {
        self.ensure_ready()?;
        let uri = protocol::path_to_file_uri(path)?;

        let mut docs = self.documents.lock().await;
        docs.close(uri.as_str())?;
        self.diagnostics.remove(uri.as_str());
        let params = protocol::did_close_params(uri.as_str());
        self.conn
            .notify("textDocument/didClose", Some(params))
            .await?;
        Ok(())
    }

    pub async fn is_document_open(&self, path: &Path) -> bool {
        let Ok(uri) = protocol::path_to_file_uri(path) else {
            return false;
        };
        self.documents.lock().await.is_open(uri.as_str())
    }

    /// Open `path` from disk if it is not already open. Returns whether
    /// this call opened it (so the caller can close it again after a
    /// transient use).
    pub(crate) async fn ensure_open(&self, path: &Path) -> Result<bool> {
        if self.is_document_open(path).await {
            return Ok(false);
        }
        let text = tokio::fs::read_to_string(path).await?;
        self.open_document(path, &text).await?;
        if !self.profile.document_open_delay().is_zero() {
            tokio::time::sleep(self.profile.document_open_delay()).await;
        }
        Ok(true)
    }
}
