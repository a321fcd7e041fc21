//! The admin event loop.
//!
//! One task owns every piece of admin state: the document registry, the
//! stats sampler and its baseline, the recorded stats history, the worker
//! resource limits, the supervisor channel and the console roster. It
//! multiplexes the request inbox with the two sampling timers; there is no
//! locking because there is exactly one writer, and every broadcast leaves
//! in the same order the triggering mutation was processed.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::os::fd::OwnedFd;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use admon_core::{DocKey, DocProcSettings, DocRegistry};
use admon_protocol::{ipc, AdminCommand, AdminMessage, Setting};

use crate::sampler::{StatsSampler, StatsTick, StatsTimers};
use crate::worker::SupervisorChannel;

use super::requests::AdminRequest;

/// The admin event loop task.
pub struct AdminActor {
    /// Request inbox
    receiver: mpsc::Receiver<AdminRequest>,

    /// Open documents and their view sessions
    registry: DocRegistry,

    /// Worker memory/CPU aggregation with its rolling baseline
    sampler: StatsSampler,

    /// Channel to the worker supervisor, closed until registration
    supervisor: SupervisorChannel,

    /// Worker resource limits relayed to the supervisor
    settings: DocProcSettings,

    /// Authenticated console connections, keyed by session id
    clients: HashMap<u64, mpsc::UnboundedSender<String>>,

    /// Next console session id
    next_session_id: u64,

    /// Recorded memory ticks, oldest first
    mem_history: VecDeque<u64>,

    /// Recorded CPU ticks, oldest first
    cpu_history: VecDeque<f64>,

    /// Bound on both history rings
    history_size: usize,

    /// Initial sampling cadences; live cadence is held by the timers
    mem_every: Duration,
    cpu_every: Duration,
}

impl AdminActor {
    /// Creates the actor. Call [`Self::run`] on a spawned task.
    pub fn new(
        receiver: mpsc::Receiver<AdminRequest>,
        sampler: StatsSampler,
        mem_every: Duration,
        cpu_every: Duration,
        history_size: usize,
    ) -> Self {
        Self {
            receiver,
            registry: DocRegistry::new(),
            sampler,
            supervisor: SupervisorChannel::new(),
            settings: DocProcSettings::default(),
            clients: HashMap::new(),
            next_session_id: 1,
            mem_history: VecDeque::new(),
            cpu_history: VecDeque::new(),
            history_size,
            mem_every,
            cpu_every,
        }
    }

    /// Runs the event loop until every handle is dropped.
    pub async fn run(mut self) {
        info!("Admin loop starting");

        // Timers are built here so the whole object can be constructed
        // outside the runtime.
        let mut timers = StatsTimers::new(self.mem_every, self.cpu_every);

        loop {
            tokio::select! {
                biased;

                request = self.receiver.recv() => match request {
                    Some(request) => self.handle_request(request, &mut timers),
                    None => break,
                },

                tick = timers.tick() => match tick {
                    StatsTick::Memory => self.sample_memory(),
                    StatsTick::Cpu => self.sample_cpu(),
                },
            }
        }

        info!(
            docs = self.registry.active_doc_count(),
            consoles = self.clients.len(),
            "Admin loop stopped"
        );
    }

    /// Dispatches one request. Runs to completion before the next request
    /// or timer tick is looked at.
    fn handle_request(&mut self, request: AdminRequest, timers: &mut StatsTimers) {
        match request {
            AdminRequest::AddDoc {
                doc_key,
                pid,
                filename,
                session_id,
                user_name,
            } => {
                self.registry
                    .add_doc(doc_key, pid, &filename, &session_id, &user_name);
                self.broadcast_documents();
            }

            AdminRequest::RemoveView { doc_key, session_id } => {
                if self.registry.remove_view(&doc_key, &session_id).changed() {
                    self.broadcast_documents();
                }
            }

            AdminRequest::RemoveDoc { doc_key } => {
                if self.registry.remove_doc(&doc_key) {
                    self.broadcast_documents();
                }
            }

            AdminRequest::ModificationAlert {
                doc_key,
                pid,
                modified,
            } => {
                if self.registry.modification_alert(&doc_key, pid, modified) {
                    self.broadcast(&AdminMessage::modification(doc_key.as_str(), modified));
                }
            }

            AdminRequest::UpdateLastActivity { doc_key } => {
                self.registry.update_last_activity(&doc_key);
            }

            AdminRequest::UpdateMemoryDirty { doc_key, bytes } => {
                self.registry.update_memory_dirty(&doc_key, bytes);
            }

            AdminRequest::AddBytes { doc_key, sent, recv } => {
                self.registry.add_bytes(&doc_key, sent, recv);
            }

            AdminRequest::Update { session_id, message } => {
                self.handle_update(session_id, &message, timers);
            }

            AdminRequest::Attach { outbound, respond_to } => {
                self.handle_attach(outbound, respond_to, timers);
            }

            AdminRequest::Detach { session_id } => {
                if self.clients.remove(&session_id).is_some() {
                    debug!(session_id, "Console detached");
                }
            }

            AdminRequest::SetSupervisorPid { pid } => {
                self.supervisor.set_pid(pid);
            }

            AdminRequest::SetSupervisorPipe { fd } => {
                self.handle_set_supervisor_pipe(fd);
            }

            AdminRequest::SetDocProcSettings { settings } => {
                self.settings = settings;
                self.notify_supervisor();
                let msg = self.settings_message(timers);
                self.broadcast(&msg);
            }

            AdminRequest::GetDocProcSettings { respond_to } => {
                let _ = respond_to.send(self.settings);
            }

            AdminRequest::StatsIntervals { respond_to } => {
                let _ = respond_to.send((timers.mem_every(), timers.cpu_every()));
            }

            AdminRequest::RescheduleMemTimer { every } => {
                timers.reschedule_mem(every);
            }

            AdminRequest::RescheduleCpuTimer { every } => {
                timers.reschedule_cpu(every);
            }

            AdminRequest::DumpState { respond_to } => {
                let _ = respond_to.send(self.dump_state(timers));
            }
        }
    }

    // ========================================================================
    // Console command dispatch
    // ========================================================================

    /// Executes one free-form command string from an authenticated console.
    ///
    /// Unrecognized commands are logged and dropped; they are never fatal to
    /// the connection or the loop.
    fn handle_update(&mut self, session_id: u64, message: &str, timers: &mut StatsTimers) {
        match AdminCommand::parse(message) {
            AdminCommand::Auth { .. } => {
                debug!(session_id, "auth on authenticated console, ignoring");
            }

            AdminCommand::Documents => {
                let msg = AdminMessage::documents(self.registry.documents());
                self.send_to(session_id, &msg);
            }

            AdminCommand::TotalMem => {
                let pids = self.tracked_pids();
                let total_bytes = self.sampler.total_memory(&pids);
                self.send_to(session_id, &AdminMessage::TotalMem { total_bytes });
            }

            AdminCommand::ActiveDocsCount => {
                let count = self.registry.active_doc_count();
                self.send_to(session_id, &AdminMessage::DocCount { count });
            }

            AdminCommand::ActiveUsersCount => {
                let count = self.registry.active_view_count();
                self.send_to(session_id, &AdminMessage::UserCount { count });
            }

            AdminCommand::Settings => {
                let msg = self.settings_message(timers);
                self.send_to(session_id, &msg);
            }

            AdminCommand::History => {
                let msg = AdminMessage::stats_history(
                    self.mem_history.iter().copied().collect(),
                    self.cpu_history.iter().copied().collect(),
                );
                self.send_to(session_id, &msg);
            }

            AdminCommand::Set(settings) => {
                self.handle_set(session_id, settings, timers);
            }

            AdminCommand::Kill { doc_key } => {
                info!(session_id, doc_key = %doc_key, "Console requested document removal");
                if self.registry.remove_doc(&DocKey::new(doc_key)) {
                    self.broadcast_documents();
                }
            }

            AdminCommand::Unknown(command) => {
                debug!(session_id, command = %command, "Unrecognized admin command, ignoring");
            }
        }
    }

    /// Applies `set` pairs: timer cadences take effect on the next tick,
    /// limit changes are pushed to the supervisor once, whatever the number
    /// of pairs.
    fn handle_set(&mut self, session_id: u64, settings: Vec<Setting>, timers: &mut StatsTimers) {
        if settings.is_empty() {
            debug!(session_id, "set command with no recognized pairs, ignoring");
            return;
        }

        let mut limits_changed = false;

        for setting in settings {
            match setting {
                Setting::MemStatsInterval(every) => timers.reschedule_mem(every),
                Setting::CpuStatsInterval(every) => timers.reschedule_cpu(every),
                Setting::LimitVirtMemKb(kb) => {
                    limits_changed |= self.settings.limit_virt_mem_kb != kb;
                    self.settings.limit_virt_mem_kb = kb;
                }
                Setting::LimitStackMemKb(kb) => {
                    limits_changed |= self.settings.limit_stack_mem_kb != kb;
                    self.settings.limit_stack_mem_kb = kb;
                }
                Setting::LimitFileSizeKb(kb) => {
                    limits_changed |= self.settings.limit_file_size_kb != kb;
                    self.settings.limit_file_size_kb = kb;
                }
            }
        }

        if limits_changed {
            self.notify_supervisor();
        }

        let msg = self.settings_message(timers);
        self.broadcast(&msg);
    }

    // ========================================================================
    // Console roster
    // ========================================================================

    /// Adds an authenticated console and replays the initial state: current
    /// settings, the document list and the recorded stats history.
    fn handle_attach(
        &mut self,
        outbound: mpsc::UnboundedSender<String>,
        respond_to: tokio::sync::oneshot::Sender<u64>,
        timers: &StatsTimers,
    ) {
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        self.clients.insert(session_id, outbound);
        info!(session_id, consoles = self.clients.len(), "Console attached");

        let _ = respond_to.send(session_id);

        let settings = self.settings_message(timers);
        self.send_to(session_id, &settings);
        let documents = AdminMessage::documents(self.registry.documents());
        self.send_to(session_id, &documents);
        let history = AdminMessage::stats_history(
            self.mem_history.iter().copied().collect(),
            self.cpu_history.iter().copied().collect(),
        );
        self.send_to(session_id, &history);
    }

    /// Pushes a message to every attached console.
    ///
    /// A console whose queue is gone is dropped silently; broadcast fan-out
    /// iterates the whole roster without pre-filtering, so sending to a
    /// closed connection must be a no-op.
    fn broadcast(&mut self, msg: &AdminMessage) {
        let Some(text) = serialize(msg) else { return };

        let mut dead: Vec<u64> = Vec::new();
        for (&session_id, outbound) in &self.clients {
            if outbound.send(text.clone()).is_err() {
                dead.push(session_id);
            }
        }

        for session_id in dead {
            self.clients.remove(&session_id);
            debug!(session_id, "Dropped disconnected console from roster");
        }
    }

    /// Pushes a message to a single console; silently a no-op if the
    /// session is already gone.
    fn send_to(&mut self, session_id: u64, msg: &AdminMessage) {
        let Some(text) = serialize(msg) else { return };

        if let Some(outbound) = self.clients.get(&session_id) {
            if outbound.send(text).is_err() {
                self.clients.remove(&session_id);
                debug!(session_id, "Dropped disconnected console from roster");
            }
        }
    }

    fn broadcast_documents(&mut self) {
        let msg = AdminMessage::documents(self.registry.documents());
        self.broadcast(&msg);
    }

    fn settings_message(&self, timers: &StatsTimers) -> AdminMessage {
        AdminMessage::settings(
            timers.mem_every().as_millis() as u64,
            timers.cpu_every().as_millis() as u64,
            self.settings,
        )
    }

    // ========================================================================
    // Sampling
    // ========================================================================

    /// Pids the sampler should aggregate: every worker with an open
    /// document, plus the supervisor itself once registered.
    fn tracked_pids(&self) -> Vec<u32> {
        let mut pids = self.registry.worker_pids();
        if let Some(pid) = self.supervisor.pid() {
            pids.push(pid);
        }
        pids
    }

    fn sample_memory(&mut self) {
        let pids = self.tracked_pids();
        let total = self.sampler.total_memory(&pids);

        self.mem_history.push_back(total);
        while self.mem_history.len() > self.history_size {
            self.mem_history.pop_front();
        }

        self.broadcast(&AdminMessage::mem_stats(total));
    }

    fn sample_cpu(&mut self) {
        let pids = self.tracked_pids();
        let percent = self.sampler.cpu_percent(&pids, Instant::now());

        self.cpu_history.push_back(percent);
        while self.cpu_history.len() > self.history_size {
            self.cpu_history.pop_front();
        }

        self.broadcast(&AdminMessage::cpu_stats(percent));
    }

    // ========================================================================
    // Supervisor channel
    // ========================================================================

    fn handle_set_supervisor_pipe(&mut self, fd: OwnedFd) {
        match self.supervisor.set_pipe(fd) {
            Ok(()) => {
                info!("Supervisor pipe registered");
                // A re-spawned supervisor starts from defaults; bring it up
                // to the current limits straight away.
                self.notify_supervisor();
            }
            Err(e) => {
                warn!(error = %e, "Failed to register supervisor pipe");
            }
        }
    }

    /// Writes the current limits to the supervisor pipe: one non-blocking
    /// attempt, logged on failure, never retried in-loop. Recovery happens
    /// only when the supervisor re-registers a fresh channel.
    fn notify_supervisor(&mut self) {
        let payload = ipc::encode_settings(&self.settings);
        match self.supervisor.notify(&payload) {
            Ok(()) => {
                debug!(bytes = payload.len(), "Settings pushed to supervisor");
            }
            Err(e) => {
                warn!(error = %e, "Failed to push settings to supervisor");
            }
        }
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Renders a human-readable snapshot of loop state. Free text for
    /// operators, not a versioned machine contract.
    fn dump_state(&self, timers: &StatsTimers) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "admin state:");
        let _ = writeln!(
            out,
            "  intervals: mem={}ms cpu={}ms",
            timers.mem_every().as_millis(),
            timers.cpu_every().as_millis()
        );
        let _ = writeln!(
            out,
            "  last total memory: {}",
            match self.sampler.last_total_memory() {
                Some(bytes) => format!("{bytes} bytes"),
                None => "never sampled".to_string(),
            }
        );
        let _ = writeln!(
            out,
            "  history: {} mem ticks, {} cpu ticks (cap {})",
            self.mem_history.len(),
            self.cpu_history.len(),
            self.history_size
        );
        let _ = writeln!(
            out,
            "  limits: virt={}kb stack={}kb file={}kb",
            self.settings.limit_virt_mem_kb,
            self.settings.limit_stack_mem_kb,
            self.settings.limit_file_size_kb
        );
        let _ = writeln!(
            out,
            "  supervisor: pid={:?} open={}",
            self.supervisor.pid(),
            self.supervisor.is_open()
        );

        let mut sessions: Vec<u64> = self.clients.keys().copied().collect();
        sessions.sort_unstable();
        let _ = writeln!(out, "  consoles: {} {:?}", self.clients.len(), sessions);

        let _ = writeln!(out, "  documents: {}", self.registry.active_doc_count());
        let mut docs: Vec<_> = self.registry.documents().collect();
        docs.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        for doc in docs {
            let _ = writeln!(
                out,
                "    {} pid={} file='{}' views={} dirty={}b sent={}b recv={}b modified={}",
                doc.key,
                doc.pid,
                doc.filename,
                doc.total_views(),
                doc.dirty_memory_bytes,
                doc.bytes_sent,
                doc.bytes_recv,
                doc.modified
            );
            for session in doc.sessions.values() {
                let _ = writeln!(
                    out,
                    "      session {} user='{}' views={}",
                    session.session_id, session.user_name, session.view_count
                );
            }
        }

        out
    }
}

fn serialize(msg: &AdminMessage) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "Failed to serialize admin message");
            None
        }
    }
}
