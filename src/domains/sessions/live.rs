use super::entity::{AutoApprovalUpdate, SessionSummary};
use super::events::SessionEvent;
use crate::domains::agents::{AgentOptions, AgentType};
use crate::domains::detection::{SessionState, StateDetector};
use crate::domains::terminal::{
    ProcessEvent, ProcessHandle, StartupClearFilter, TerminalScreen,
};
use crate::infrastructure::events::EventBus;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Identity of a live session, fixed at creation.
#[derive(Debug, Clone)]
pub(crate) struct SessionIdentity {
    pub id: String,
    pub worktree_path: String,
    pub project_path: Option<String>,
    pub agent_profile_id: String,
    pub agent_profile_name: String,
    pub agent_type: AgentType,
    pub options: AgentOptions,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionStatus {
    name: String,
    /// Last state reported by the detector.
    text_state: SessionState,
    /// Screen tail the detector last saw.
    detected_lines: Vec<String>,
    auto_approval_pending: bool,
    auto_approval_failed: bool,
    auto_approval_reason: Option<String>,
    exited: bool,
    exit_code: Option<u32>,
    last_error: Option<String>,
}

impl SessionStatus {
    fn effective_state(&self) -> SessionState {
        if self.auto_approval_pending {
            SessionState::PendingAutoApproval
        } else {
            self.text_state
        }
    }

    fn clear_auto_approval(&mut self) {
        self.auto_approval_pending = false;
        self.auto_approval_failed = false;
        self.auto_approval_reason = None;
    }
}

pub(crate) struct LiveSession {
    identity: SessionIdentity,
    handle: Arc<dyn ProcessHandle>,
    status: Mutex<SessionStatus>,
    screen: Mutex<TerminalScreen>,
    output: broadcast::Sender<Vec<u8>>,
    is_active: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
    events: EventBus<SessionEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LiveSession {
    pub fn new(
        identity: SessionIdentity,
        name: String,
        handle: Arc<dyn ProcessHandle>,
        cols: u16,
        rows: u16,
        events: EventBus<SessionEvent>,
    ) -> Self {
        let (output, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        Self {
            identity,
            handle,
            status: Mutex::new(SessionStatus {
                name,
                ..Default::default()
            }),
            screen: Mutex::new(TerminalScreen::new(cols, rows)),
            output,
            is_active: AtomicBool::new(false),
            pump: Mutex::new(None),
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn handle(&self) -> &Arc<dyn ProcessHandle> {
        &self.handle
    }

    pub fn summary(&self) -> SessionSummary {
        let status = lock(&self.status);
        SessionSummary {
            id: self.identity.id.clone(),
            name: status.name.clone(),
            worktree_path: self.identity.worktree_path.clone(),
            project_path: self.identity.project_path.clone(),
            agent_profile_id: self.identity.agent_profile_id.clone(),
            agent_profile_name: self.identity.agent_profile_name.clone(),
            agent_type: self.identity.agent_type,
            options: self.identity.options.clone(),
            state: status.effective_state(),
            is_active: self.is_active(),
            auto_approval_failed: status.auto_approval_failed,
            auto_approval_reason: status.auto_approval_reason.clone(),
            exited: status.exited,
            exit_code: status.exit_code,
            last_error: status.last_error.clone(),
            created_at: self.identity.created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    /// Returns true when the flag actually flipped.
    pub fn set_active(&self, active: bool) -> bool {
        self.is_active.swap(active, Ordering::SeqCst) != active
    }

    pub fn rename(&self, name: &str) {
        lock(&self.status).name = name.to_string();
    }

    pub fn record_error(&self, message: String) {
        lock(&self.status).last_error = Some(message);
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output.subscribe()
    }

    pub fn snapshot(&self) -> Vec<u8> {
        lock(&self.screen).snapshot()
    }

    pub fn resize_screen(&self, cols: u16, rows: u16) {
        lock(&self.screen).resize(cols, rows);
    }

    /// Applies an auto-approval signal and publishes the resulting state.
    /// The overlay wins over text detection while pending; a failure keeps
    /// the detected state and carries the reason.
    pub fn apply_auto_approval(&self, update: AutoApprovalUpdate) {
        let mut status = lock(&self.status);
        match update {
            AutoApprovalUpdate::Pending => {
                status.auto_approval_pending = true;
                status.auto_approval_failed = false;
                status.auto_approval_reason = None;
            }
            AutoApprovalUpdate::Resolved => status.clear_auto_approval(),
            AutoApprovalUpdate::Failed { reason } => {
                status.auto_approval_pending = false;
                status.auto_approval_failed = true;
                status.auto_approval_reason = Some(reason);
            }
        }
        self.publish_state(&status);
    }

    pub fn attach_pump(&self, pump: JoinHandle<()>) {
        if let Some(previous) = lock(&self.pump).replace(pump) {
            previous.abort();
        }
    }

    pub fn abort_pump(&self) {
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
    }

    fn publish_state(&self, status: &SessionStatus) {
        self.events.publish(SessionEvent::StateChanged {
            id: self.identity.id.clone(),
            state: status.effective_state(),
            auto_approval_failed: status.auto_approval_failed.then_some(true),
            reason: status.auto_approval_reason.clone(),
        });
    }

    fn handle_output(&self, batch: Vec<u8>, detector: &dyn StateDetector, tail: usize) {
        let lines = {
            let mut screen = lock(&self.screen);
            screen.process(&batch);
            screen.tail_lines(tail)
        };
        if self.is_active() {
            let _ = self.output.send(batch);
        }
        // A blank screen carries nothing to classify.
        if lines.is_empty() {
            return;
        }

        let mut status = lock(&self.status);
        if status.detected_lines == lines {
            return;
        }
        let detected = detector.detect(&lines, status.text_state);
        status.detected_lines = lines;
        if detected == status.text_state {
            return;
        }
        let before = status.effective_state();
        status.text_state = detected;
        status.auto_approval_failed = false;
        status.auto_approval_reason = None;
        if status.effective_state() != before {
            debug!("Session {} is now {}", self.identity.id, status.effective_state());
            self.publish_state(&status);
        }
    }

    fn handle_exit(&self, exit_code: Option<u32>) {
        let mut status = lock(&self.status);
        status.exited = true;
        status.exit_code = exit_code;
        let before = status.effective_state();
        status.text_state = SessionState::Idle;
        status.clear_auto_approval();
        if before != SessionState::Idle {
            self.publish_state(&status);
        }
        drop(status);

        info!("Agent process for session {} exited with {exit_code:?}", self.identity.id);
        self.events.publish(SessionEvent::Exited {
            id: self.identity.id.clone(),
            exit_code,
        });
    }
}

/// Drains process events for one session. Every wake-up collects whatever
/// else is already queued into a single flush, feeds it to the session's
/// screen and re-runs detection on the screen tail.
pub(crate) async fn pump_process_events(
    session: Arc<LiveSession>,
    mut events: mpsc::Receiver<ProcessEvent>,
    detector: Arc<dyn StateDetector>,
    tail_lines: usize,
) {
    let mut clear_filter = StartupClearFilter::default();

    while let Some(event) = events.recv().await {
        let mut batch = Vec::new();
        let mut exit = None;
        match event {
            ProcessEvent::Output(chunk) => batch.extend(clear_filter.filter(chunk)),
            ProcessEvent::Exited { exit_code } => exit = Some(exit_code),
        }
        while exit.is_none() {
            match events.try_recv() {
                Ok(ProcessEvent::Output(chunk)) => batch.extend(clear_filter.filter(chunk)),
                Ok(ProcessEvent::Exited { exit_code }) => exit = Some(exit_code),
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            session.handle_output(batch, detector.as_ref(), tail_lines);
        }
        if let Some(exit_code) = exit {
            session.handle_exit(exit_code);
            return;
        }
    }

    warn!("Process event stream for session {} closed without exit", session.id());
    session.handle_exit(None);
}
