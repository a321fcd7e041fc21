//! Integration tests for the admin event loop.
//!
//! These drive the loop through its handle exactly the way the document
//! server, the supervisor and console connections do, and assert on the
//! broadcasts attached consoles observe.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use admon_core::DocKey;
use admon_protocol::AdminMessage;
use admond::admin::{spawn_admin, AdminHandle};
use admond::sampler::SystemProbe;

/// Sampling cadence long enough that no tick fires during a test.
const IDLE_INTERVAL: Duration = Duration::from_secs(3600);

/// How long to wait for an expected broadcast.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait before declaring that nothing was broadcast.
const SILENCE_WINDOW: Duration = Duration::from_millis(100);

fn spawn_idle_admin() -> AdminHandle {
    spawn_admin(IDLE_INTERVAL, IDLE_INTERVAL, 100, Box::new(SystemProbe::new()))
}

/// An attached console: the session id plus its outbound queue.
struct TestConsole {
    session_id: u64,
    outbound: UnboundedReceiver<String>,
}

impl TestConsole {
    async fn attach(handle: &AdminHandle) -> Self {
        let (session_id, outbound) = handle.attach().await.expect("attach console");
        Self {
            session_id,
            outbound,
        }
    }

    /// Attaches and drains the initial snapshot (settings, documents,
    /// stats history).
    async fn attach_drained(handle: &AdminHandle) -> Self {
        let mut console = Self::attach(handle).await;
        let settings = console.recv().await;
        assert!(matches!(settings, AdminMessage::Settings { .. }));
        let documents = console.recv().await;
        assert!(matches!(documents, AdminMessage::Documents { .. }));
        let history = console.recv().await;
        assert!(matches!(history, AdminMessage::StatsHistory { .. }));
        console
    }

    async fn recv(&mut self) -> AdminMessage {
        let text = timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("outbound queue closed");
        serde_json::from_str(&text).expect("outbound frame is valid AdminMessage JSON")
    }

    /// Asserts that nothing arrives within the silence window.
    async fn expect_silence(&mut self) {
        let result = timeout(SILENCE_WINDOW, self.outbound.recv()).await;
        assert!(result.is_err(), "expected silence, got {result:?}");
    }
}

fn documents_of(msg: AdminMessage) -> Vec<admon_protocol::DocumentSummary> {
    match msg {
        AdminMessage::Documents { documents } => documents,
        other => panic!("Expected Documents, got {other:?}"),
    }
}

// ============================================================================
// Snapshot and broadcast tests
// ============================================================================

#[tokio::test]
async fn test_attach_receives_initial_snapshot() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach(&handle).await;

    assert!(matches!(console.recv().await, AdminMessage::Settings { .. }));
    let docs = documents_of(console.recv().await);
    assert!(docs.is_empty());
    match console.recv().await {
        AdminMessage::StatsHistory { mem, cpu } => {
            assert!(mem.is_empty());
            assert!(cpu.is_empty());
        }
        other => panic!("Expected StatsHistory, got {other:?}"),
    }
}

#[tokio::test]
async fn test_add_doc_broadcasts_updated_list() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach_drained(&handle).await;

    handle
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();

    let docs = documents_of(console.recv().await);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].key, "doc1");
    assert_eq!(docs[0].views, 1);

    // Same (doc, session) again: view count goes up, no duplicate session.
    handle
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();

    let docs = documents_of(console.recv().await);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].sessions, 1);
    assert_eq!(docs[0].views, 2);
}

#[tokio::test]
async fn test_all_consoles_observe_same_order() {
    let handle = spawn_idle_admin();
    let mut first = TestConsole::attach_drained(&handle).await;
    let mut second = TestConsole::attach_drained(&handle).await;

    handle
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();
    handle
        .add_doc(DocKey::new("doc2"), 200, "b.odt", "s-2", "bob")
        .await
        .unwrap();
    handle.remove_doc(DocKey::new("doc1")).await.unwrap();

    let mut sequences = Vec::new();
    for console in [&mut first, &mut second] {
        let mut keys_per_update = Vec::new();
        for _ in 0..3 {
            let docs = documents_of(console.recv().await);
            let keys: Vec<String> = docs.into_iter().map(|d| d.key).collect();
            keys_per_update.push(keys);
        }
        sequences.push(keys_per_update);
    }

    assert_eq!(sequences[0], sequences[1]);
    assert_eq!(
        sequences[0],
        vec![
            vec!["doc1".to_string()],
            vec!["doc1".to_string(), "doc2".to_string()],
            vec!["doc2".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_remove_view_on_unknown_doc_broadcasts_nothing() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach_drained(&handle).await;

    handle
        .remove_view(DocKey::new("never-opened"), "s-1")
        .await
        .unwrap();

    console.expect_silence().await;
}

#[tokio::test]
async fn test_force_remove_is_idempotent_and_silent_second_time() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach_drained(&handle).await;

    handle
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();
    let _ = console.recv().await;

    handle.remove_doc(DocKey::new("doc1")).await.unwrap();
    let docs = documents_of(console.recv().await);
    assert!(docs.is_empty());

    // Second removal of the same key: still succeeds, no broadcast.
    handle.remove_doc(DocKey::new("doc1")).await.unwrap();
    console.expect_silence().await;
}

#[tokio::test]
async fn test_modification_alert_broadcasts_flag() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach_drained(&handle).await;

    handle
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();
    let _ = console.recv().await;

    handle
        .modification_alert(DocKey::new("doc1"), 100, true)
        .await
        .unwrap();

    match console.recv().await {
        AdminMessage::Modification { doc_key, modified } => {
            assert_eq!(doc_key, "doc1");
            assert!(modified);
        }
        other => panic!("Expected Modification, got {other:?}"),
    }
}

// ============================================================================
// Console command dispatch
// ============================================================================

#[tokio::test]
async fn test_unknown_command_is_ignored_and_connection_survives() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach_drained(&handle).await;

    handle
        .update(console.session_id, "restart --everything")
        .await
        .unwrap();
    console.expect_silence().await;

    // The console is still attached: a real query gets its reply.
    handle.update(console.session_id, "documents").await.unwrap();
    let docs = documents_of(console.recv().await);
    assert!(docs.is_empty());
}

#[tokio::test]
async fn test_kill_command_force_removes_document() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach_drained(&handle).await;

    handle
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();
    let _ = console.recv().await;

    handle.update(console.session_id, "kill doc1").await.unwrap();
    let docs = documents_of(console.recv().await);
    assert!(docs.is_empty());

    // Killing an unknown key is a no-op.
    handle.update(console.session_id, "kill doc1").await.unwrap();
    console.expect_silence().await;
}

#[tokio::test]
async fn test_settings_query_replies_to_requester_only() {
    let handle = spawn_idle_admin();
    let mut asker = TestConsole::attach_drained(&handle).await;
    let mut bystander = TestConsole::attach_drained(&handle).await;

    handle.update(asker.session_id, "settings").await.unwrap();

    match asker.recv().await {
        AdminMessage::Settings {
            mem_stats_interval_ms,
            cpu_stats_interval_ms,
            ..
        } => {
            assert_eq!(mem_stats_interval_ms, IDLE_INTERVAL.as_millis() as u64);
            assert_eq!(cpu_stats_interval_ms, IDLE_INTERVAL.as_millis() as u64);
        }
        other => panic!("Expected Settings, got {other:?}"),
    }

    bystander.expect_silence().await;
}

#[tokio::test]
async fn test_counts_queries() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach_drained(&handle).await;

    handle
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();
    handle
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-2", "bob")
        .await
        .unwrap();
    handle
        .add_doc(DocKey::new("doc2"), 200, "b.odt", "s-3", "carol")
        .await
        .unwrap();
    for _ in 0..3 {
        let _ = console.recv().await;
    }

    handle
        .update(console.session_id, "active_docs_count")
        .await
        .unwrap();
    match console.recv().await {
        AdminMessage::DocCount { count } => assert_eq!(count, 2),
        other => panic!("Expected DocCount, got {other:?}"),
    }

    handle
        .update(console.session_id, "active_users_count")
        .await
        .unwrap();
    match console.recv().await {
        AdminMessage::UserCount { count } => assert_eq!(count, 3),
        other => panic!("Expected UserCount, got {other:?}"),
    }
}

#[tokio::test]
async fn test_set_command_updates_limits_and_broadcasts_settings() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach_drained(&handle).await;

    handle
        .update(console.session_id, "set limit_virt_mem_kb=1024 limit_stack_mem_kb=256")
        .await
        .unwrap();

    match console.recv().await {
        AdminMessage::Settings { doc_proc, .. } => {
            assert_eq!(doc_proc.limit_virt_mem_kb, 1024);
            assert_eq!(doc_proc.limit_stack_mem_kb, 256);
        }
        other => panic!("Expected Settings, got {other:?}"),
    }

    let settings = handle.doc_proc_settings().await.unwrap();
    assert_eq!(settings.limit_virt_mem_kb, 1024);
    assert_eq!(settings.limit_stack_mem_kb, 256);
    assert_eq!(settings.limit_file_size_kb, 0);
}

// ============================================================================
// Timer reconfiguration and diagnostics
// ============================================================================

#[tokio::test]
async fn test_reschedule_timers_via_handle() {
    let handle = spawn_idle_admin();

    handle
        .reschedule_mem_timer(Duration::from_millis(500))
        .await
        .unwrap();
    handle
        .reschedule_cpu_timer(Duration::from_millis(2000))
        .await
        .unwrap();

    let (mem, cpu) = handle.stats_intervals().await.unwrap();
    assert_eq!(mem, Duration::from_millis(500));
    assert_eq!(cpu, Duration::from_millis(2000));
}

#[tokio::test]
async fn test_dump_state_describes_registry() {
    let handle = spawn_idle_admin();

    handle
        .add_doc(DocKey::new("doc1"), 100, "report.odt", "s-1", "alice")
        .await
        .unwrap();

    let dump = handle.dump_state().await.unwrap();
    assert!(dump.contains("doc1"), "dump missing doc key: {dump}");
    assert!(dump.contains("report.odt"), "dump missing filename: {dump}");
    assert!(dump.contains("alice"), "dump missing user: {dump}");
    assert!(dump.contains("supervisor"), "dump missing supervisor line: {dump}");
}

#[tokio::test]
async fn test_detach_stops_broadcasts() {
    let handle = spawn_idle_admin();
    let mut console = TestConsole::attach_drained(&handle).await;

    handle.detach(console.session_id).await.unwrap();

    handle
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();

    // The queue is dropped by the loop, so recv yields closure, not data.
    let next = timeout(RECV_TIMEOUT, console.outbound.recv()).await;
    assert!(matches!(next, Ok(None)), "expected closed queue, got {next:?}");
}
