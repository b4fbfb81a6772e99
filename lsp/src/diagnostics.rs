//! Diagnostics cache and the push/pull/poll reconciler.
//!
//! Two delivery models exist in the wild: servers that push
//! `publishDiagnostics` notifications and servers that answer explicit
//! `textDocument/diagnostic` pulls. Some do neither reliably. This module
//! unifies all three behind one wait-with-retry operation whose timing
//! comes from the adapter's [`ServerProfile`], never from hardcoded
//! constants in the core.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::oneshot;

use crate::config::ServerProfile;
use crate::error::Result;
use crate::protocol::{self, PullReport};
use crate::session::Session;
use tether_types::Diagnostic;

/// Latest known diagnostics per document uri.
///
/// Written by the connection's notification handler (push) and by pull
/// responses; overwritten wholesale on each update, never merged. Entries
/// are removed when their document closes.
#[derive(Default)]
pub(crate) struct DiagnosticsCache {
    entries: Mutex<HashMap<String, Vec<Diagnostic>>>,
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

/// Lock a mutex, recovering the data from a poisoned guard.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl DiagnosticsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest diagnostics for a uri and wake anyone waiting.
    pub fn publish(&self, uri: &str, items: Vec<Diagnostic>) {
        lock(&self.entries).insert(uri.to_string(), items);
        if let Some(waiters) = lock(&self.waiters).remove(uri) {
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
    }

    pub fn get(&self, uri: &str) -> Option<Vec<Diagnostic>> {
        lock(&self.entries).get(uri).cloned()
    }

    pub fn remove(&self, uri: &str) {
        lock(&self.entries).remove(uri);
    }

    /// Register for a wake-up on the next publish for `uri`.
    pub fn subscribe(&self, uri: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        lock(&self.waiters)
            .entry(uri.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

/// How diagnostics are obtained from the server. Decided once per session
/// at initialization from the negotiated capabilities and the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Server pushes `publishDiagnostics` notifications.
    Push,
    /// Client pulls via `textDocument/diagnostic`.
    Pull,
    /// Neither is reliable: poll the local cache on a fixed cadence.
    Polling,
}

/// Options for [`Session::wait_for_diagnostics`].
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Close and reopen an already-open document so the server recomputes
    /// instead of serving stale results.
    pub force_refresh: bool,
    /// Leave the document open even if this call opened it.
    pub keep_open: bool,
    /// Override the profile's initial-diagnostics deadline.
    pub timeout: Option<Duration>,
}

/// The outcome of one diagnostics wait.
///
/// `attempts` and `delivery` let callers tell "polled N times and observed
/// nothing" apart from a server-confirmed empty result.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub items: Vec<Diagnostic>,
    pub delivery: DeliveryMode,
    pub attempts: u32,
}

/// Post-process raw diagnostics per the server's quirk flags.
///
/// Severity defaulting and message truncation already happened at the
/// protocol boundary; this pass only applies the dedup quirks. Some fast
/// servers report diagnostics against stale line numbers after edits, and
/// some emit the same diagnostic twice.
pub(crate) fn process_diagnostics(
    items: Vec<Diagnostic>,
    content: &str,
    profile: &ServerProfile,
) -> Vec<Diagnostic> {
    if !profile.needs_diagnostic_deduplication {
        return items;
    }
    let line_count = u32::try_from(content.lines().count()).unwrap_or(u32::MAX);
    let mut seen: HashSet<(u32, String)> = HashSet::new();
    items
        .into_iter()
        .filter(|d| d.line() < line_count)
        .filter(|d| seen.insert((d.line(), d.message().to_string())))
        .collect()
}

impl Session {
    /// Read the cached diagnostics for a document, if any have been
    /// observed this session.
    #[must_use]
    pub fn cached_diagnostics(&self, path: &Path) -> Option<Vec<Diagnostic>> {
        let uri = protocol::path_to_file_uri(path).ok()?;
        self.diagnostics.get(uri.as_str())
    }

    /// Wait for diagnostics for `path`, opening the document with `text`
    /// if it is not already open.
    ///
    /// Returns the latest diagnostics the chosen delivery mode produced
    /// within the deadline. An exhausted poll budget yields an empty
    /// report, not an error — the report's `delivery` and `attempts`
    /// fields record what actually happened. A document opened by this
    /// call is closed again before returning unless `keep_open` is set,
    /// on every path including errors.
    pub async fn wait_for_diagnostics(
        &self,
        path: &Path,
        text: &str,
        options: WaitOptions,
    ) -> Result<DiagnosticsReport> {
        self.ensure_ready()?;
        let uri = protocol::path_to_file_uri(path)?.to_string();

        // A prior push already answered this; don't re-query the server.
        if !options.force_refresh {
            if let Some(items) = self.diagnostics.get(&uri) {
                return Ok(DiagnosticsReport {
                    items: process_diagnostics(items, text, &self.profile),
                    delivery: self.delivery,
                    attempts: 0,
                });
            }
        }

        let was_open = self.is_document_open(path).await;
        if options.force_refresh && was_open {
            // Close and reopen so the server recomputes from scratch.
            self.close_document(path).await?;
            self.open_document(path, text).await?;
        }
        let opened_here = if was_open {
            false
        } else {
            self.open_document(path, text).await?;
            true
        };
        if !self.profile.document_open_delay().is_zero() {
            tokio::time::sleep(self.profile.document_open_delay()).await;
        }

        let observed = self.observe_diagnostics(&uri, options.timeout).await;

        if opened_here && !options.keep_open {
            if let Err(e) = self.close_document(path).await {
                tracing::debug!("failed to close transiently opened document: {e}");
            }
        }

        let (items, delivery, attempts) = observed?;
        Ok(DiagnosticsReport {
            items: process_diagnostics(items, text, &self.profile),
            delivery,
            attempts,
        })
    }

    async fn observe_diagnostics(
        &self,
        uri: &str,
        timeout_override: Option<Duration>,
    ) -> Result<(Vec<Diagnostic>, DeliveryMode, u32)> {
        let budget = timeout_override.unwrap_or_else(|| self.profile.initial_diagnostics_timeout());

        match self.delivery {
            DeliveryMode::Push => {
                let notified = self.diagnostics.subscribe(uri);
                // The notification may have landed between open and
                // subscribe; the cache is written before waiters wake.
                if let Some(items) = self.diagnostics.get(uri) {
                    return Ok((items, DeliveryMode::Push, 1));
                }
                match tokio::time::timeout(budget, notified).await {
                    Ok(_) => Ok((
                        self.diagnostics.get(uri).unwrap_or_default(),
                        DeliveryMode::Push,
                        1,
                    )),
                    // Push mode is only selected for servers that promise
                    // initial diagnostics; servers that stay silent on
                    // clean files run in polling mode from the start.
                    Err(_) => Ok((Vec::new(), DeliveryMode::Push, 1)),
                }
            }
            DeliveryMode::Pull => match self.pull_once(uri, budget).await {
                Ok(Some(items)) => Ok((items, DeliveryMode::Pull, 1)),
                Ok(None) => Ok((
                    self.diagnostics.get(uri).unwrap_or_default(),
                    DeliveryMode::Pull,
                    1,
                )),
                Err(e) if e.is_unsupported() || e.is_timeout() => {
                    tracing::debug!("pull diagnostics unavailable ({e}), demoting to polling");
                    let (items, attempts) = self.poll_diagnostics(uri).await;
                    Ok((items, DeliveryMode::Polling, attempts + 1))
                }
                Err(e) => Err(e),
            },
            DeliveryMode::Polling => {
                let (items, attempts) = self.poll_diagnostics(uri).await;
                Ok((items, DeliveryMode::Polling, attempts))
            }
        }
    }

    /// Issue one `textDocument/diagnostic` pull. `Ok(None)` means the
    /// server reported no change since its last report.
    pub(crate) async fn pull_once(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<Diagnostic>>> {
        let raw = self
            .conn
            .request(
                "textDocument/diagnostic",
                Some(protocol::pull_diagnostics_params(uri)),
                timeout,
            )
            .await?;
        match protocol::pull_report_from_value(raw)? {
            PullReport::Full(items) => {
                self.diagnostics.publish(uri, items.clone());
                Ok(Some(items))
            }
            PullReport::Unchanged => Ok(None),
        }
    }

    async fn poll_diagnostics(&self, uri: &str) -> (Vec<Diagnostic>, u32) {
        let deadline = Instant::now() + self.profile.initial_diagnostics_timeout();
        let mut latest: Vec<Diagnostic> = Vec::new();
        let mut attempts = 0;
        for attempt in 1..=self.profile.diagnostics_max_polls {
            attempts = attempt;
            tokio::time::sleep(self.profile.diagnostics_poll_interval()).await;
            if let Some(items) = self.diagnostics.get(uri) {
                latest = items;
            }
            // A single early empty observation is not proof of "no
            // diagnostics" — some servers send a spurious empty
            // notification before the real one.
            if !latest.is_empty() && attempt >= self.profile.diagnostics_min_polls {
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        (latest, attempts)
    }
}
