//! In-memory document/session registry.
//!
//! The registry is the canonical record of which documents are open and how
//! many live views each session holds. It is a plain synchronous structure:
//! the admin event loop is its single owner and the only execution context
//! that may call the mutating operations. Cross-thread access goes through
//! the event loop's request queue, never through this type directly.
//!
//! Unknown keys and sessions are deliberate no-ops, not errors: removal
//! races with catastrophic cleanup are normal and must never fail the loop.

use std::collections::HashMap;

use tracing::debug;

use crate::document::{DocKey, DocumentRecord, SessionEntry};

/// What `remove_view` actually did, so the caller can decide whether a
/// broadcast is warranted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// No document with that key
    UnknownDoc,

    /// Document exists but has no such session
    UnknownSession,

    /// View count decremented, session still has views
    ViewDropped,

    /// Session reached zero views and was removed
    SessionRemoved,

    /// Last session was removed and the record went with it
    DocRemoved,
}

impl RemovalOutcome {
    /// Returns true if the registry changed (and clients should be told).
    pub fn changed(&self) -> bool {
        !matches!(self, Self::UnknownDoc | Self::UnknownSession)
    }
}

/// Registry of open documents and their view sessions.
#[derive(Debug, Default)]
pub struct DocRegistry {
    docs: HashMap<DocKey, DocumentRecord>,
}

impl DocRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a view of a document.
    ///
    /// Unknown key: creates a record bound to `pid`/`filename` with one
    /// session at view count 1. Known key with a known session: increments
    /// that session's view count. Known key with a new session: inserts the
    /// session at view count 1.
    pub fn add_doc(
        &mut self,
        key: DocKey,
        pid: u32,
        filename: &str,
        session_id: &str,
        user_name: &str,
    ) {
        match self.docs.get_mut(&key) {
            Some(record) => {
                match record.sessions.get_mut(session_id) {
                    Some(session) => {
                        session.view_count += 1;
                        debug!(
                            doc_key = %key,
                            session_id,
                            views = session.view_count,
                            "View added to existing session"
                        );
                    }
                    None => {
                        record
                            .sessions
                            .insert(session_id.to_string(), SessionEntry::new(session_id, user_name));
                        debug!(doc_key = %key, session_id, "Session added to document");
                    }
                }
                record.touch();
            }
            None => {
                let record = DocumentRecord::new(key.clone(), pid, filename, session_id, user_name);
                self.docs.insert(key.clone(), record);
                debug!(
                    doc_key = %key,
                    pid,
                    filename,
                    total_docs = self.docs.len(),
                    "Document opened"
                );
            }
        }
    }

    /// Drops one view of a session, removing the session at zero views and
    /// the record at zero sessions.
    ///
    /// Unknown key or session is a no-op: the document server retries
    /// removals during shutdown and the forced-removal path may have won.
    pub fn remove_view(&mut self, key: &DocKey, session_id: &str) -> RemovalOutcome {
        let Some(record) = self.docs.get_mut(key) else {
            debug!(doc_key = %key, session_id, "remove_view for unknown document, ignoring");
            return RemovalOutcome::UnknownDoc;
        };

        let Some(session) = record.sessions.get_mut(session_id) else {
            debug!(doc_key = %key, session_id, "remove_view for unknown session, ignoring");
            return RemovalOutcome::UnknownSession;
        };

        session.view_count = session.view_count.saturating_sub(1);
        if session.view_count > 0 {
            record.touch();
            return RemovalOutcome::ViewDropped;
        }

        record.sessions.remove(session_id);
        debug!(doc_key = %key, session_id, "Session closed");

        if record.sessions.is_empty() {
            self.docs.remove(key);
            debug!(doc_key = %key, remaining_docs = self.docs.len(), "Document closed");
            return RemovalOutcome::DocRemoved;
        }

        record.touch();
        RemovalOutcome::SessionRemoved
    }

    /// Unconditionally removes a record and all its sessions.
    ///
    /// Used on worker termination or catastrophic failure; idempotent, so a
    /// key that is already gone simply returns false.
    pub fn remove_doc(&mut self, key: &DocKey) -> bool {
        match self.docs.remove(key) {
            Some(record) => {
                debug!(
                    doc_key = %key,
                    sessions = record.sessions.len(),
                    "Document force-removed"
                );
                true
            }
            None => {
                debug!(doc_key = %key, "Force-removal of unknown document, ignoring");
                false
            }
        }
    }

    /// Sets the unsaved-changes flag. A pid mismatch is logged but the flag
    /// still follows the alert; the worker is authoritative for its state.
    pub fn modification_alert(&mut self, key: &DocKey, pid: u32, modified: bool) -> bool {
        let Some(record) = self.docs.get_mut(key) else {
            debug!(doc_key = %key, "Modification alert for unknown document, ignoring");
            return false;
        };

        if record.pid != pid {
            debug!(
                doc_key = %key,
                expected_pid = record.pid,
                alert_pid = pid,
                "Modification alert pid mismatch"
            );
        }

        record.modified = modified;
        record.touch();
        true
    }

    /// Stamps the document's last-activity time.
    pub fn update_last_activity(&mut self, key: &DocKey) -> bool {
        match self.docs.get_mut(key) {
            Some(record) => {
                record.touch();
                true
            }
            None => false,
        }
    }

    /// Records the worker's latest dirty-memory figure.
    pub fn update_memory_dirty(&mut self, key: &DocKey, bytes: u64) -> bool {
        match self.docs.get_mut(key) {
            Some(record) => {
                record.dirty_memory_bytes = bytes;
                true
            }
            None => false,
        }
    }

    /// Adds to the document's traffic counters. Counters are monotone.
    pub fn add_bytes(&mut self, key: &DocKey, sent: u64, recv: u64) -> bool {
        match self.docs.get_mut(key) {
            Some(record) => {
                record.bytes_sent = record.bytes_sent.saturating_add(sent);
                record.bytes_recv = record.bytes_recv.saturating_add(recv);
                true
            }
            None => false,
        }
    }

    /// Returns the record for a key, if open.
    pub fn get(&self, key: &DocKey) -> Option<&DocumentRecord> {
        self.docs.get(key)
    }

    /// Iterates over all open documents.
    pub fn documents(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.docs.values()
    }

    /// Number of open documents.
    pub fn active_doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Number of live sessions across all documents.
    pub fn active_view_count(&self) -> usize {
        self.docs.values().map(|d| d.sessions.len()).sum()
    }

    /// Worker pids currently bound to a document, deduplicated.
    pub fn worker_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.docs.values().map(|d| d.pid).collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    }

    /// True when no documents are open.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
