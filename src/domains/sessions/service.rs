use super::discovery::DiscoveryRequest;
use super::entity::{AutoApprovalUpdate, CreateSessionParams, NewSessionRecord, SessionSummary};
use super::events::SessionEvent;
use super::live::{LiveSession, SessionIdentity, pump_process_events};
use super::repository::SessionRecordStore;
use super::utils::{current_branch, default_session_name, normalize_optional};
use crate::domains::agents::{AgentProfileCatalog, resolve_agent_binary};
use crate::domains::detection::detector_for;
use crate::domains::settings::TerminalSettings;
use crate::domains::terminal::{ProcessSupervisor, SpawnRequest};
use crate::errors::OrchestratorError;
use crate::infrastructure::events::EventBus;
use crate::shared::LifecycleGate;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Collaborators shared by every manager the orchestrator hands out.
#[derive(Clone)]
pub struct SessionManagerDeps {
    pub store: SessionRecordStore,
    pub supervisor: Arc<dyn ProcessSupervisor>,
    pub catalog: Arc<AgentProfileCatalog>,
    pub events: EventBus<SessionEvent>,
    pub gate: Arc<LifecycleGate>,
    pub terminal: TerminalSettings,
    /// Home directory used to locate agent binaries.
    pub home: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct DestroyAllReport {
    pub destroyed: Vec<String>,
    pub failed: Vec<(String, OrchestratorError)>,
}

/// Owns the live sessions of one project scope (or the unscoped default)
/// and the processes behind them.
#[derive(Clone)]
pub struct SessionManager {
    project_path: Option<PathBuf>,
    deps: SessionManagerDeps,
    sessions: Arc<DashMap<String, Arc<LiveSession>>>,
}

impl SessionManager {
    pub fn new(project_path: Option<PathBuf>, deps: SessionManagerDeps) -> Self {
        Self {
            project_path,
            deps,
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    pub fn store(&self) -> &SessionRecordStore {
        &self.deps.store
    }

    pub fn events(&self) -> &EventBus<SessionEvent> {
        &self.deps.events
    }

    pub async fn create(&self, params: CreateSessionParams) -> Result<SessionSummary, OrchestratorError> {
        let _entered = self.deps.gate.enter().await?;

        let profile = self.deps.catalog.resolve(&params.agent_profile_id)?.clone();
        let args = profile.launch_args(&params.options)?;

        let worktree = params.worktree_path.clone();
        if worktree.as_os_str().is_empty() {
            return Err(OrchestratorError::validation("worktree_path", "must not be empty"));
        }
        if !worktree.is_absolute() {
            return Err(OrchestratorError::validation(
                "worktree_path",
                format!("must be absolute, got '{}'", worktree.display()),
            ));
        }

        let id = normalize_optional(params.session_id_override.as_deref())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if self.sessions.contains_key(&id) {
            return Err(OrchestratorError::SessionAlreadyExists { session_id: id });
        }

        let name = normalize_optional(params.name_override.as_deref())
            .unwrap_or_else(|| default_session_name(&worktree, &profile.name));
        let branch_name = normalize_optional(params.branch_name.as_deref())
            .or_else(|| current_branch(&worktree));
        let worktree_str = worktree.to_string_lossy().to_string();
        let project_path = self
            .project_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string());

        let request = SpawnRequest {
            program: resolve_agent_binary(&profile.command, self.deps.home.as_deref()),
            args,
            cwd: worktree.clone(),
            env: profile
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cols: self.deps.terminal.cols,
            rows: self.deps.terminal.rows,
        };
        info!(
            "Starting {} for session {id} in {worktree_str}: {} {:?}",
            profile.id, request.program, request.args
        );
        let spawned = self
            .deps
            .supervisor
            .spawn(request)
            .await
            .map_err(|e| OrchestratorError::spawn(&profile.id, format!("{e:#}")))?;

        let identity = SessionIdentity {
            id: id.clone(),
            worktree_path: worktree_str.clone(),
            project_path: project_path.clone(),
            agent_profile_id: profile.id.clone(),
            agent_profile_name: profile.name.clone(),
            agent_type: profile.agent_type,
            options: params.options.clone(),
            created_at: Utc::now(),
        };
        let session = Arc::new(LiveSession::new(
            identity,
            name.clone(),
            spawned.handle,
            self.deps.terminal.cols,
            self.deps.terminal.rows,
            self.deps.events.clone(),
        ));

        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => {
                if let Err(e) = session.handle().kill() {
                    warn!("Failed to kill duplicate process for session {id}: {e:#}");
                }
                return Err(OrchestratorError::SessionAlreadyExists { session_id: id });
            }
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }

        let pump = tokio::spawn(pump_process_events(
            session.clone(),
            spawned.events,
            detector_for(profile.agent_type),
            self.deps.terminal.detection_tail_lines,
        ));
        session.attach_pump(pump);

        let record = self.deps.store.record_session_started(NewSessionRecord {
            id: id.clone(),
            agent_profile_id: profile.id.clone(),
            agent_profile_name: profile.name.clone(),
            agent_type: profile.agent_type,
            agent_options: params.options.clone(),
            worktree_path: worktree_str,
            branch_name,
            project_path,
            td_task_id: params.td_task_id.clone(),
            td_session_id: params.td_session_id.clone(),
            session_name: Some(name),
            intent: params.intent,
            created_at: None,
        });

        match record {
            Ok(record) if record.is_linked() => {
                if record.content_preview.is_none() {
                    let store = self.deps.store.clone();
                    let id = id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = store.hydrate_content_preview(&id).await {
                            warn!("Failed to hydrate preview for session {id}: {e:#}");
                        }
                    });
                }
            }
            Ok(record) => {
                let scheduled = self.deps.store.schedule_discovery(DiscoveryRequest {
                    id: id.clone(),
                    agent_type: profile.agent_type,
                    worktree_path: worktree.clone(),
                    created_at: record.created_at,
                });
                if !scheduled {
                    debug!("No transcript adapter for {}; session {id} stays unlinked", profile.agent_type);
                }
            }
            Err(e) => warn!("Failed to persist session record for {id}: {e:#}"),
        }

        let summary = session.summary();
        self.deps.events.publish(SessionEvent::Created {
            session: summary.clone(),
        });
        Ok(summary)
    }

    /// Stops the process and forgets the session. Unknown ids are a no-op
    /// returning `false`. Every cleanup step runs even if an earlier one
    /// fails; the kill error, if any, is reported afterwards.
    pub fn destroy(&self, id: &str) -> Result<bool, OrchestratorError> {
        let Some((_, session)) = self.sessions.remove(id) else {
            return Ok(false);
        };

        session.abort_pump();
        let killed = session.handle().kill();
        self.deps.store.cancel_discovery(id);
        if let Err(e) = self.deps.store.mark_session_ended(id, None) {
            warn!("Failed to mark session {id} ended: {e:#}");
        }
        self.deps.events.publish(SessionEvent::Destroyed { id: id.to_string() });

        match killed {
            Ok(()) => {
                info!("Destroyed session {id}");
                Ok(true)
            }
            Err(e) => Err(OrchestratorError::transport(id, "kill", format!("{e:#}"))),
        }
    }

    pub fn destroy_all(&self) -> DestroyAllReport {
        let mut report = DestroyAllReport::default();
        for id in self.session_ids() {
            match self.destroy(&id) {
                Ok(true) => report.destroyed.push(id),
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to destroy session {id}: {e}");
                    report.failed.push((id, e));
                }
            }
        }
        report
    }

    pub fn set_active(&self, id: &str, active: bool) -> Result<(), OrchestratorError> {
        let session = self.live(id)?;
        if session.set_active(active) {
            self.deps.events.publish(SessionEvent::ActiveChanged {
                id: id.to_string(),
                is_active: active,
            });
        }
        Ok(())
    }

    pub fn rename(&self, id: &str, name: &str) -> Result<SessionSummary, OrchestratorError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OrchestratorError::validation("name", "must not be blank"));
        }
        let session = self.live(id)?;
        session.rename(name);
        if let Err(e) = self.deps.store.update_session_name(id, name) {
            warn!("Failed to persist new name for session {id}: {e:#}");
        }
        self.deps.events.publish(SessionEvent::Renamed {
            id: id.to_string(),
            name: name.to_string(),
        });
        Ok(session.summary())
    }

    pub fn get(&self, id: &str) -> Option<SessionSummary> {
        self.sessions.get(id).map(|entry| entry.summary())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Oldest first.
    pub fn list_all(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self.sessions.iter().map(|entry| entry.summary()).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn write_input(&self, id: &str, data: &[u8]) -> Result<(), OrchestratorError> {
        let session = self.live(id)?;
        session.handle().write(data).map_err(|e| {
            let message = format!("{e:#}");
            session.record_error(message.clone());
            OrchestratorError::transport(id, "write", message)
        })
    }

    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), OrchestratorError> {
        if cols == 0 || rows == 0 {
            return Err(OrchestratorError::validation("size", "cols and rows must be positive"));
        }
        let session = self.live(id)?;
        session.resize_screen(cols, rows);
        session.handle().resize(cols, rows).map_err(|e| {
            let message = format!("{e:#}");
            session.record_error(message.clone());
            OrchestratorError::transport(id, "resize", message)
        })
    }

    /// Live output for attached clients. Pair with [`Self::snapshot`] to
    /// paint the current screen first.
    pub fn subscribe_output(&self, id: &str) -> Result<broadcast::Receiver<Vec<u8>>, OrchestratorError> {
        Ok(self.live(id)?.subscribe_output())
    }

    pub fn snapshot(&self, id: &str) -> Result<Vec<u8>, OrchestratorError> {
        Ok(self.live(id)?.snapshot())
    }

    pub fn update_auto_approval(
        &self,
        id: &str,
        update: AutoApprovalUpdate,
    ) -> Result<SessionSummary, OrchestratorError> {
        let session = self.live(id)?;
        session.apply_auto_approval(update);
        Ok(session.summary())
    }

    fn live(&self, id: &str) -> Result<Arc<LiveSession>, OrchestratorError> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrchestratorError::not_found(id))
    }
}
