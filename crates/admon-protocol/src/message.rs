//! Outbound messages pushed to admin console clients.

use admon_core::{DocProcSettings, DocumentRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only snapshot of one open document for console display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Document key
    pub key: String,

    /// Worker process id bound to the document
    pub pid: u32,

    /// File name
    pub filename: String,

    /// Number of live sessions
    pub sessions: usize,

    /// Sum of view counts across sessions
    pub views: u32,

    /// Dirty memory reported by the worker, in bytes
    pub dirty_memory_bytes: u64,

    /// Bytes sent to document clients
    pub bytes_sent: u64,

    /// Bytes received from document clients
    pub bytes_recv: u64,

    /// Whether the document has unsaved changes
    pub modified: bool,

    /// Last reported activity
    pub last_activity: DateTime<Utc>,
}

impl From<&DocumentRecord> for DocumentSummary {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            key: record.key.as_str().to_string(),
            pid: record.pid,
            filename: record.filename.clone(),
            sessions: record.sessions.len(),
            views: record.total_views(),
            dirty_memory_bytes: record.dirty_memory_bytes,
            bytes_sent: record.bytes_sent,
            bytes_recv: record.bytes_recv,
            modified: record.modified,
            last_activity: record.last_activity,
        }
    }
}

/// Messages sent from the admin plane to console clients.
///
/// Serialized as JSON text frames. This is an internal contract between the
/// admin plane and its own console UI, versioned implicitly with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminMessage {
    /// Full document-list snapshot, sent after every registry change
    Documents {
        /// All currently open documents
        documents: Vec<DocumentSummary>,
    },

    /// Memory sampling tick
    MemStats {
        /// Resident memory summed across tracked worker pids, in bytes
        total_bytes: u64,
    },

    /// CPU sampling tick
    CpuStats {
        /// Aggregate worker CPU usage since the previous tick, in percent
        percent: f64,
    },

    /// Recorded sampling history, replayed to a client on attach
    StatsHistory {
        /// Memory ticks, oldest first
        mem: Vec<u64>,
        /// CPU ticks, oldest first
        cpu: Vec<f64>,
    },

    /// A document's unsaved-changes flag changed
    Modification {
        /// Document key
        doc_key: String,
        /// New flag value
        modified: bool,
    },

    /// Current sampler cadence and worker resource limits
    Settings {
        /// Memory sampling interval, in milliseconds
        mem_stats_interval_ms: u64,
        /// CPU sampling interval, in milliseconds
        cpu_stats_interval_ms: u64,
        /// Worker resource limits
        #[serde(flatten)]
        doc_proc: DocProcSettings,
    },

    /// Reply to the `total_mem` command
    TotalMem {
        /// Resident memory summed across tracked worker pids, in bytes
        total_bytes: u64,
    },

    /// Reply to the `active_docs_count` command
    DocCount {
        /// Number of open documents
        count: usize,
    },

    /// Reply to the `active_users_count` command
    UserCount {
        /// Number of live sessions across all documents
        count: usize,
    },

    /// Error report; deliberately generic for credential failures
    Error {
        /// Human-readable message
        message: String,
    },
}

impl AdminMessage {
    /// Creates a document-list snapshot from registry records.
    pub fn documents<'a>(records: impl Iterator<Item = &'a DocumentRecord>) -> Self {
        let mut documents: Vec<DocumentSummary> = records.map(DocumentSummary::from).collect();
        // Stable order so consoles don't reshuffle on every broadcast
        documents.sort_by(|a, b| a.key.cmp(&b.key));
        Self::Documents { documents }
    }

    /// Creates a memory tick message.
    pub fn mem_stats(total_bytes: u64) -> Self {
        Self::MemStats { total_bytes }
    }

    /// Creates a CPU tick message.
    pub fn cpu_stats(percent: f64) -> Self {
        Self::CpuStats { percent }
    }

    /// Creates a stats-history replay message.
    pub fn stats_history(mem: Vec<u64>, cpu: Vec<f64>) -> Self {
        Self::StatsHistory { mem, cpu }
    }

    /// Creates a modification-flag notification.
    pub fn modification(doc_key: &str, modified: bool) -> Self {
        Self::Modification {
            doc_key: doc_key.to_string(),
            modified,
        }
    }

    /// Creates a settings snapshot.
    pub fn settings(
        mem_stats_interval_ms: u64,
        cpu_stats_interval_ms: u64,
        doc_proc: DocProcSettings,
    ) -> Self {
        Self::Settings {
            mem_stats_interval_ms,
            cpu_stats_interval_ms,
            doc_proc,
        }
    }

    /// Creates an error message.
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admon_core::DocKey;

    #[test]
    fn test_documents_snapshot_is_sorted() {
        let b = DocumentRecord::new(DocKey::new("b"), 2, "b.odt", "s-2", "bob");
        let a = DocumentRecord::new(DocKey::new("a"), 1, "a.odt", "s-1", "alice");

        let msg = AdminMessage::documents([&b, &a].into_iter());
        match msg {
            AdminMessage::Documents { documents } => {
                assert_eq!(documents.len(), 2);
                assert_eq!(documents[0].key, "a");
                assert_eq!(documents[1].key, "b");
                assert_eq!(documents[0].views, 1);
            }
            other => panic!("Expected Documents, got {other:?}"),
        }
    }

    #[test]
    fn test_message_serialization_tags() {
        let json = serde_json::to_string(&AdminMessage::mem_stats(1024)).unwrap();
        assert!(json.contains("\"type\":\"mem_stats\""));
        assert!(json.contains("\"total_bytes\":1024"));

        let json = serde_json::to_string(&AdminMessage::error("authentication failed")).unwrap();
        assert!(json.contains("\"type\":\"error\""));
    }

    #[test]
    fn test_settings_flattens_limits() {
        let msg = AdminMessage::settings(
            5000,
            5000,
            DocProcSettings {
                limit_virt_mem_kb: 1024,
                limit_stack_mem_kb: 0,
                limit_file_size_kb: 0,
            },
        );
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"limit_virt_mem_kb\":1024"));
        assert!(json.contains("\"mem_stats_interval_ms\":5000"));

        let back: AdminMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_message_roundtrip() {
        let original = AdminMessage::stats_history(vec![1, 2, 3], vec![0.0, 12.5]);
        let json = serde_json::to_string(&original).unwrap();
        let back: AdminMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }
}
