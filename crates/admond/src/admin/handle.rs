//! Client interface for the admin event loop.
//!
//! `AdminHandle` is the cheap-to-clone face of the loop. The document
//! server, the worker supervisor's registration path and every console
//! connection all hold one; requests are serialized by the loop in arrival
//! order.

use std::os::fd::OwnedFd;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use admon_core::{DocKey, DocProcSettings};

use super::requests::{AdminError, AdminRequest};

/// Handle for interacting with the admin event loop.
#[derive(Clone)]
pub struct AdminHandle {
    sender: mpsc::Sender<AdminRequest>,
}

impl AdminHandle {
    /// Creates a handle over the loop's request channel.
    pub fn new(sender: mpsc::Sender<AdminRequest>) -> Self {
        Self { sender }
    }

    async fn send(&self, request: AdminRequest) -> Result<(), AdminError> {
        self.sender
            .send(request)
            .await
            .map_err(|_| AdminError::ChannelClosed)
    }

    /// Registers a view of a document. Repeated calls with the same
    /// (doc_key, session_id) increment that session's view count.
    pub async fn add_doc(
        &self,
        doc_key: DocKey,
        pid: u32,
        filename: impl Into<String>,
        session_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Result<(), AdminError> {
        self.send(AdminRequest::AddDoc {
            doc_key,
            pid,
            filename: filename.into(),
            session_id: session_id.into(),
            user_name: user_name.into(),
        })
        .await
    }

    /// Drops one view; the document is removed when its last view goes.
    /// Unknown keys and sessions are no-ops on the loop side.
    pub async fn remove_view(
        &self,
        doc_key: DocKey,
        session_id: impl Into<String>,
    ) -> Result<(), AdminError> {
        self.send(AdminRequest::RemoveView {
            doc_key,
            session_id: session_id.into(),
        })
        .await
    }

    /// Force-removes a document and all its views. Safe on unknown keys;
    /// used on termination and catastrophic cleanup.
    pub async fn remove_doc(&self, doc_key: DocKey) -> Result<(), AdminError> {
        self.send(AdminRequest::RemoveDoc { doc_key }).await
    }

    /// Sets a document's unsaved-changes flag.
    pub async fn modification_alert(
        &self,
        doc_key: DocKey,
        pid: u32,
        modified: bool,
    ) -> Result<(), AdminError> {
        self.send(AdminRequest::ModificationAlert {
            doc_key,
            pid,
            modified,
        })
        .await
    }

    /// Stamps a document's last-activity time.
    pub async fn update_last_activity(&self, doc_key: DocKey) -> Result<(), AdminError> {
        self.send(AdminRequest::UpdateLastActivity { doc_key }).await
    }

    /// Records the worker's latest dirty-memory figure for a document.
    pub async fn update_memory_dirty(&self, doc_key: DocKey, bytes: u64) -> Result<(), AdminError> {
        self.send(AdminRequest::UpdateMemoryDirty { doc_key, bytes })
            .await
    }

    /// Adds to a document's traffic counters.
    pub async fn add_bytes(&self, doc_key: DocKey, sent: u64, recv: u64) -> Result<(), AdminError> {
        self.send(AdminRequest::AddBytes { doc_key, sent, recv })
            .await
    }

    /// Relays a free-form command string from an authenticated console
    /// client. Unrecognized commands are dropped by the loop, never an
    /// error here.
    pub async fn update(&self, session_id: u64, message: impl Into<String>) -> Result<(), AdminError> {
        self.send(AdminRequest::Update {
            session_id,
            message: message.into(),
        })
        .await
    }

    /// Attaches an authenticated console connection.
    ///
    /// Returns the assigned session id and the queue the loop will push
    /// outbound text frames into, starting with the initial state snapshot.
    pub async fn attach(&self) -> Result<(u64, mpsc::UnboundedReceiver<String>), AdminError> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (tx, rx) = oneshot::channel();

        self.send(AdminRequest::Attach {
            outbound,
            respond_to: tx,
        })
        .await?;

        let session_id = rx.await.map_err(|_| AdminError::ChannelClosed)?;
        Ok((session_id, outbound_rx))
    }

    /// Detaches a console connection from the roster.
    pub async fn detach(&self, session_id: u64) -> Result<(), AdminError> {
        self.send(AdminRequest::Detach { session_id }).await
    }

    /// Records the worker supervisor's process id. Called once per
    /// (re)spawned supervisor.
    pub async fn set_supervisor_pid(&self, pid: u32) -> Result<(), AdminError> {
        self.send(AdminRequest::SetSupervisorPid { pid }).await
    }

    /// Hands the supervisor control pipe's write end to the loop. Called
    /// once per (re)spawned supervisor, paired with `set_supervisor_pid`.
    pub async fn set_supervisor_pipe(&self, fd: OwnedFd) -> Result<(), AdminError> {
        self.send(AdminRequest::SetSupervisorPipe { fd }).await
    }

    /// Replaces the worker resource limits; the loop pushes them to the
    /// supervisor.
    pub async fn set_doc_proc_settings(&self, settings: DocProcSettings) -> Result<(), AdminError> {
        self.send(AdminRequest::SetDocProcSettings { settings }).await
    }

    /// Reads the current worker resource limits.
    pub async fn doc_proc_settings(&self) -> Result<DocProcSettings, AdminError> {
        let (tx, rx) = oneshot::channel();
        self.send(AdminRequest::GetDocProcSettings { respond_to: tx })
            .await?;
        rx.await.map_err(|_| AdminError::ChannelClosed)
    }

    /// Reads the current sampling cadences as (memory, CPU).
    pub async fn stats_intervals(&self) -> Result<(Duration, Duration), AdminError> {
        let (tx, rx) = oneshot::channel();
        self.send(AdminRequest::StatsIntervals { respond_to: tx })
            .await?;
        rx.await.map_err(|_| AdminError::ChannelClosed)
    }

    /// Changes the memory sampling cadence from the next tick onward.
    pub async fn reschedule_mem_timer(&self, every: Duration) -> Result<(), AdminError> {
        self.send(AdminRequest::RescheduleMemTimer { every }).await
    }

    /// Changes the CPU sampling cadence from the next tick onward.
    pub async fn reschedule_cpu_timer(&self, every: Duration) -> Result<(), AdminError> {
        self.send(AdminRequest::RescheduleCpuTimer { every }).await
    }

    /// Produces a human-readable snapshot of loop state for diagnostics.
    pub async fn dump_state(&self) -> Result<String, AdminError> {
        let (tx, rx) = oneshot::channel();
        self.send(AdminRequest::DumpState { respond_to: tx }).await?;
        rx.await.map_err(|_| AdminError::ChannelClosed)
    }

    /// True while the loop is still draining requests.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (AdminHandle, mpsc::Receiver<AdminRequest>) {
        let (tx, rx) = mpsc::channel(16);
        (AdminHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_add_doc_sends_request() {
        let (handle, mut rx) = create_test_handle();

        handle
            .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
            .await
            .unwrap();

        match rx.recv().await {
            Some(AdminRequest::AddDoc {
                doc_key,
                pid,
                filename,
                session_id,
                user_name,
            }) => {
                assert_eq!(doc_key.as_str(), "doc1");
                assert_eq!(pid, 100);
                assert_eq!(filename, "a.odt");
                assert_eq!(session_id, "s-1");
                assert_eq!(user_name, "alice");
            }
            other => panic!("Expected AddDoc, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.remove_doc(DocKey::new("doc1")).await;
        assert!(matches!(result, Err(AdminError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_attach_round_trip() {
        let (handle, mut rx) = create_test_handle();

        let responder = tokio::spawn(async move {
            match rx.recv().await {
                Some(AdminRequest::Attach { respond_to, outbound }) => {
                    outbound.send("hello".to_string()).unwrap();
                    respond_to.send(7).unwrap();
                    true
                }
                _ => false,
            }
        });

        let (session_id, mut outbound) = handle.attach().await.unwrap();
        assert_eq!(session_id, 7);
        assert_eq!(outbound.recv().await.as_deref(), Some("hello"));
        assert!(responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_dump_state_round_trip() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            if let Some(AdminRequest::DumpState { respond_to }) = rx.recv().await {
                let _ = respond_to.send("snapshot".to_string());
            }
        });

        assert_eq!(handle.dump_state().await.unwrap(), "snapshot");
    }
}
