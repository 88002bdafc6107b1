#![allow(dead_code)]

use agentdeck::domains::agents::{
    AdapterRegistry, AgentProfileCatalog, AgentType, TranscriptAdapter, TranscriptMessage,
    TranscriptMetadata,
};
use agentdeck::domains::sessions::{
    DiscoveryConfig, SessionEvent, SessionManagerDeps, SessionRecordStore,
};
use agentdeck::domains::settings::TerminalSettings;
use agentdeck::domains::terminal::{
    ProcessEvent, ProcessHandle, ProcessSupervisor, SpawnRequest, SpawnedProcess,
};
use agentdeck::infrastructure::database::Database;
use agentdeck::infrastructure::events::EventBus;
use agentdeck::services::SessionOrchestrator;
use agentdeck::shared::LifecycleGate;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc};

#[derive(Default)]
pub struct FakeHandle {
    pub written: Mutex<Vec<u8>>,
    pub killed: AtomicBool,
}

impl ProcessHandle for FakeHandle {
    fn write(&self, data: &[u8]) -> Result<()> {
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn resize(&self, _cols: u16, _rows: u16) -> Result<()> {
        Ok(())
    }

    fn kill(&self) -> Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        None
    }
}

pub struct FakeProcess {
    pub request: SpawnRequest,
    pub handle: Arc<FakeHandle>,
    pub output: mpsc::Sender<ProcessEvent>,
}

/// Stands in for the PTY layer; tests push output through the recorded
/// senders, in spawn order.
#[derive(Default)]
pub struct FakeSupervisor {
    pub processes: Mutex<Vec<FakeProcess>>,
}

impl FakeSupervisor {
    pub fn spawn_count(&self) -> usize {
        self.processes.lock().unwrap().len()
    }

    pub async fn feed(&self, index: usize, bytes: &[u8]) {
        let sender = self.processes.lock().unwrap()[index].output.clone();
        sender
            .send(ProcessEvent::Output(bytes.to_vec()))
            .await
            .unwrap();
    }

    pub async fn exit(&self, index: usize, exit_code: Option<u32>) {
        let sender = self.processes.lock().unwrap()[index].output.clone();
        sender.send(ProcessEvent::Exited { exit_code }).await.unwrap();
    }

    pub fn handle(&self, index: usize) -> Arc<FakeHandle> {
        self.processes.lock().unwrap()[index].handle.clone()
    }
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnedProcess> {
        let handle = Arc::new(FakeHandle::default());
        let (tx, rx) = mpsc::channel(64);
        self.processes.lock().unwrap().push(FakeProcess {
            request,
            handle: handle.clone(),
            output: tx,
        });
        Ok(SpawnedProcess { handle, events: rx })
    }
}

/// Transcript adapter that "finds" its file only from the given attempt on.
pub struct ScriptedAdapter {
    pub agent_type: AgentType,
    pub transcript: PathBuf,
    pub found_on_attempt: usize,
    pub calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(agent_type: AgentType, transcript: impl Into<PathBuf>, found_on_attempt: usize) -> Self {
        Self {
            agent_type,
            transcript: transcript.into(),
            found_on_attempt,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TranscriptAdapter for ScriptedAdapter {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    fn find_session_file(&self, _workdir: &Path, _since: Option<SystemTime>) -> Option<PathBuf> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (call >= self.found_on_attempt).then(|| self.transcript.clone())
    }

    fn extract_metadata(&self, _path: &Path) -> TranscriptMetadata {
        TranscriptMetadata {
            agent_session_id: Some("agent-123".to_string()),
        }
    }

    fn parse_messages(&self, _path: &Path) -> Vec<TranscriptMessage> {
        vec![
            TranscriptMessage::new("user", "<system-reminder>ignored</system-reminder>"),
            TranscriptMessage::new("user", "Fix   the login\nredirect"),
        ]
    }
}

pub fn fast_discovery(max_attempts: u32) -> DiscoveryConfig {
    DiscoveryConfig {
        max_attempts,
        retry_delay: Duration::from_millis(10),
        grace_period: Duration::from_secs(10),
    }
}

pub fn deps(
    db: Database,
    adapters: AdapterRegistry,
    supervisor: Arc<FakeSupervisor>,
    discovery: DiscoveryConfig,
) -> SessionManagerDeps {
    SessionManagerDeps {
        store: SessionRecordStore::new(db, Arc::new(adapters), discovery),
        supervisor,
        catalog: Arc::new(AgentProfileCatalog::default()),
        events: EventBus::default(),
        gate: Arc::new(LifecycleGate::new()),
        terminal: TerminalSettings::default(),
        home: None,
    }
}

pub fn orchestrator(supervisor: Arc<FakeSupervisor>) -> SessionOrchestrator {
    SessionOrchestrator::new(deps(
        Database::new_in_memory().unwrap(),
        AdapterRegistry::new(),
        supervisor,
        fast_discovery(1),
    ))
}

pub async fn wait_for<F>(events: &mut broadcast::Receiver<SessionEvent>, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time")
}
