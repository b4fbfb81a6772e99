//! Open-document bookkeeping.
//!
//! Tracks which documents the server has been told about and their version
//! counters. This is pure state — the session owns the store and sends the
//! matching `didOpen`/`didChange`/`didClose` notifications.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// A document the server currently has open. The language id is not
/// tracked here — a session speaks to one server for one language, so it
/// is constant across every open document.
#[derive(Debug, Clone)]
pub(crate) struct OpenDocument {
    /// Monotonic, starts at 1 on open.
    pub version: i32,
    /// The content last synced to the server.
    pub content: String,
}

/// uri → open document table.
#[derive(Debug, Default)]
pub(crate) struct DocumentStore {
    docs: HashMap<String, OpenDocument>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly opened document at version 1.
    ///
    /// Returns `None` when the uri is already open (idempotent open — no
    /// second `didOpen` may be sent without an intervening `didClose`).
    pub fn open(&mut self, uri: &str, text: &str) -> Option<i32> {
        if self.docs.contains_key(uri) {
            return None;
        }
        let version = 1;
        self.docs.insert(
            uri.to_string(),
            OpenDocument {
                version,
                content: text.to_string(),
            },
        );
        Some(version)
    }

    /// Bump a document to its next version and record the new content.
    ///
    /// The caller may supply an explicit version; it must strictly
    /// increase or the update is rejected — versions sent to the server
    /// are never reordered.
    pub fn update(&mut self, uri: &str, text: &str, version: Option<i32>) -> Result<i32> {
        let doc = self
            .docs
            .get_mut(uri)
            .ok_or_else(|| Error::DocumentNotOpen(uri.to_string()))?;

        let next = match version {
            Some(proposed) => {
                if proposed <= doc.version {
                    return Err(Error::StaleVersion {
                        uri: uri.to_string(),
                        proposed,
                        current: doc.version,
                    });
                }
                proposed
            }
            None => doc.version + 1,
        };

        doc.version = next;
        doc.content = text.to_string();
        Ok(next)
    }

    /// Remove a document. Errors if it was never opened.
    pub fn close(&mut self, uri: &str) -> Result<()> {
        self.docs
            .remove(uri)
            .map(|_| ())
            .ok_or_else(|| Error::DocumentNotOpen(uri.to_string()))
    }

    /// Remove a document without the open-invariant check. Used to roll
    /// back bookkeeping when the matching notification failed to send.
    pub fn discard(&mut self, uri: &str) {
        self.docs.remove(uri);
    }

    pub fn is_open(&self, uri: &str) -> bool {
        self.docs.contains_key(uri)
    }

    /// The content last synced to the server for an open document.
    pub fn content(&self, uri: &str) -> Option<&str> {
        self.docs.get(uri).map(|d| d.content.as_str())
    }
}
