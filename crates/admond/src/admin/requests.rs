//! Request types for the admin event loop.
//!
//! Every caller outside the loop - the document server reporting views, the
//! supervisor registering its channel, console connections relaying
//! commands - funnels through these messages. This queue is the only
//! sanctioned way across the concurrency boundary; nothing else may touch
//! the registry or the stats baseline.

use std::os::fd::OwnedFd;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use admon_core::{DocKey, DocProcSettings};

/// Requests processed by the admin event loop, in arrival order.
///
/// Mutations carry no response channel: the loop never rejects them (unknown
/// keys are no-ops by contract), so callers have nothing to wait for.
/// Queries answer over a oneshot.
#[derive(Debug)]
pub enum AdminRequest {
    /// Register a view of a document; creates record and session as needed.
    AddDoc {
        doc_key: DocKey,
        pid: u32,
        filename: String,
        session_id: String,
        user_name: String,
    },

    /// Drop one view of a session; removes session/record at zero.
    RemoveView { doc_key: DocKey, session_id: String },

    /// Force-remove a record and all its sessions. Idempotent.
    RemoveDoc { doc_key: DocKey },

    /// Set a document's unsaved-changes flag.
    ModificationAlert {
        doc_key: DocKey,
        pid: u32,
        modified: bool,
    },

    /// Stamp a document's last-activity time.
    UpdateLastActivity { doc_key: DocKey },

    /// Record the worker's latest dirty-memory figure.
    UpdateMemoryDirty { doc_key: DocKey, bytes: u64 },

    /// Add to a document's traffic counters.
    AddBytes { doc_key: DocKey, sent: u64, recv: u64 },

    /// Free-form command string from an authenticated console client.
    Update { session_id: u64, message: String },

    /// Attach an authenticated console connection to the broadcast roster.
    Attach {
        /// Queue the loop pushes outbound text frames into
        outbound: mpsc::UnboundedSender<String>,
        /// Receives the assigned console session id
        respond_to: oneshot::Sender<u64>,
    },

    /// Remove a console connection from the roster.
    Detach { session_id: u64 },

    /// Record the worker supervisor's process id.
    SetSupervisorPid { pid: u32 },

    /// Take ownership of the supervisor control pipe's write end.
    SetSupervisorPipe { fd: OwnedFd },

    /// Replace the worker resource limits and push them to the supervisor.
    SetDocProcSettings { settings: DocProcSettings },

    /// Read the current worker resource limits.
    GetDocProcSettings {
        respond_to: oneshot::Sender<DocProcSettings>,
    },

    /// Read the current sampling cadences (memory, CPU).
    StatsIntervals {
        respond_to: oneshot::Sender<(Duration, Duration)>,
    },

    /// Change the memory sampling cadence from the next tick onward.
    RescheduleMemTimer { every: Duration },

    /// Change the CPU sampling cadence from the next tick onward.
    RescheduleCpuTimer { every: Duration },

    /// Produce a human-readable snapshot for operator diagnostics.
    DumpState { respond_to: oneshot::Sender<String> },
}

/// Errors surfaced to callers of [`super::AdminHandle`].
#[derive(Debug, Clone, Error)]
pub enum AdminError {
    /// The event loop has shut down and the request channel is closed.
    #[error("admin loop has shut down")]
    ChannelClosed,
}
