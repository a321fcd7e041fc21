//! Open documents and the view sessions attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for one open document instance.
///
/// Opaque string bound to exactly one worker process id for the lifetime of
/// the record. The document server provides the key, so no format is assumed
/// or validated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocKey(String);

impl DocKey {
    /// Creates a new DocKey from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DocKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// View Sessions
// ============================================================================

/// One end-user session attached to a document.
///
/// A session can hold several views of the same document (split panes,
/// duplicated tabs). The entry is created at view count 1 and removed when
/// the count reaches zero again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Session identifier assigned by the document server
    pub session_id: String,

    /// Display name of the connected user
    pub user_name: String,

    /// Number of live views this session holds
    pub view_count: u32,
}

impl SessionEntry {
    /// Creates a session entry with a single view.
    pub fn new(session_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_name: user_name.into(),
            view_count: 1,
        }
    }
}

// ============================================================================
// Document Record
// ============================================================================

/// State tracked for one open document.
///
/// A record exists while at least one session holds a view of the document,
/// unless it is force-removed on termination or catastrophic failure. The
/// byte counters only ever grow; `dirty_memory_bytes` follows whatever the
/// worker last reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document key, unique per open document instance
    pub key: DocKey,

    /// Worker process rendering this document
    pub pid: u32,

    /// File name as reported by the document server
    pub filename: String,

    /// Live sessions keyed by session id
    pub sessions: HashMap<String, SessionEntry>,

    /// Last time any activity was reported for this document
    pub last_activity: DateTime<Utc>,

    /// Dirty (modified, unsaved) memory reported by the worker, in bytes
    pub dirty_memory_bytes: u64,

    /// Total bytes sent to clients of this document
    pub bytes_sent: u64,

    /// Total bytes received from clients of this document
    pub bytes_recv: u64,

    /// Whether the document has unsaved changes
    pub modified: bool,
}

impl DocumentRecord {
    /// Creates a record bound to `pid` with one session at view count 1.
    pub fn new(
        key: DocKey,
        pid: u32,
        filename: impl Into<String>,
        session_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        let session = SessionEntry::new(session_id, user_name);
        let mut sessions = HashMap::new();
        sessions.insert(session.session_id.clone(), session);

        Self {
            key,
            pid,
            filename: filename.into(),
            sessions,
            last_activity: Utc::now(),
            dirty_memory_bytes: 0,
            bytes_sent: 0,
            bytes_recv: 0,
            modified: false,
        }
    }

    /// Sum of view counts across all sessions.
    pub fn total_views(&self) -> u32 {
        self.sessions.values().map(|s| s.view_count).sum()
    }

    /// Marks the document as active right now.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}
