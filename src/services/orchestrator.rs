use crate::domains::agents::{AdapterRegistry, AgentProfileCatalog, home_dir};
use crate::domains::sessions::{
    AutoApprovalUpdate, CreateSessionParams, DiscoveryConfig, SessionEvent, SessionManager,
    SessionManagerDeps, SessionQuery, SessionRecord, SessionRecordStore, SessionSummary,
    TdSessionLookup,
};
use crate::domains::settings::{DaemonSettings, validate_settings};
use crate::domains::terminal::ProcessSupervisor;
use crate::errors::OrchestratorError;
use crate::infrastructure::database::Database;
use crate::infrastructure::events::EventBus;
use crate::shared::LifecycleGate;
use crate::utils::normalize_project_path;
use dashmap::{DashMap, DashSet};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownReport {
    pub destroyed: Vec<String>,
    pub failed: Vec<String>,
    pub timed_out: bool,
    /// Sessions still registered when the deadline hit.
    pub remaining: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupReport {
    pub reconciled: Vec<String>,
    pub resumed: Vec<String>,
    pub resume_failed: Vec<String>,
}

/// Single entry point over every project's session manager.
///
/// Managers are created lazily per normalized project path; sessions created
/// without a project live in the unscoped default manager, which is always
/// consulted first when looking a session up by id.
pub struct SessionOrchestrator {
    deps: SessionManagerDeps,
    default_manager: SessionManager,
    managers: DashMap<PathBuf, SessionManager>,
    /// Override ids with a create in flight; makes the cross-manager
    /// duplicate check and the create one step.
    reserved_ids: DashSet<String>,
    resume_orphans: bool,
}

/// Releases an override id reservation, including when the create future
/// is dropped midway.
struct IdReservation<'a> {
    ids: &'a DashSet<String>,
    id: String,
}

impl Drop for IdReservation<'_> {
    fn drop(&mut self) {
        self.ids.remove(&self.id);
    }
}

impl SessionOrchestrator {
    pub fn new(deps: SessionManagerDeps) -> Self {
        Self {
            default_manager: SessionManager::new(None, deps.clone()),
            deps,
            managers: DashMap::new(),
            reserved_ids: DashSet::new(),
            resume_orphans: false,
        }
    }

    /// Wires every collaborator from loaded settings.
    pub fn from_settings(
        settings: &DaemonSettings,
        db: Database,
        supervisor: Arc<dyn ProcessSupervisor>,
    ) -> Result<Self, OrchestratorError> {
        validate_settings(settings)?;
        let catalog = AgentProfileCatalog::new(settings.agents.clone())?;
        let home = home_dir();
        let adapters = match home.as_deref() {
            Some(home) => AdapterRegistry::with_defaults(home)?,
            None => {
                warn!("No home directory; transcript discovery is disabled");
                AdapterRegistry::new()
            }
        };
        let store = SessionRecordStore::new(
            db,
            Arc::new(adapters),
            DiscoveryConfig::from(&settings.discovery),
        );

        let mut orchestrator = Self::new(SessionManagerDeps {
            store,
            supervisor,
            catalog: Arc::new(catalog),
            events: EventBus::default(),
            gate: Arc::new(LifecycleGate::new()),
            terminal: settings.terminal.clone(),
            home,
        });
        orchestrator.resume_orphans = settings.daemon.resume_orphaned_sessions;
        Ok(orchestrator)
    }

    pub fn with_orphan_resume(mut self, enabled: bool) -> Self {
        self.resume_orphans = enabled;
        self
    }

    pub fn store(&self) -> &SessionRecordStore {
        &self.deps.store
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.deps.events.subscribe()
    }

    /// Closes records a previous run left open and, when enabled, restarts
    /// those sessions under their old ids.
    pub async fn start(&self) -> Result<StartupReport, OrchestratorError> {
        let orphans = self
            .deps
            .store
            .reconcile_orphans()
            .map_err(OrchestratorError::from_store)?;
        let mut report = StartupReport {
            reconciled: orphans.iter().map(|r| r.id.clone()).collect(),
            ..Default::default()
        };
        if !self.resume_orphans {
            return Ok(report);
        }

        for record in orphans {
            let project = record.project_path.as_deref().map(Path::new);
            let mut params = CreateSessionParams::new(&record.worktree_path, &record.agent_profile_id);
            params.options = record.agent_options.clone();
            params.name_override = record.session_name.clone();
            params.session_id_override = Some(record.id.clone());
            params.intent = record.intent;
            params.td_task_id = record.td_task_id.clone();
            params.td_session_id = record.td_session_id.clone();
            params.branch_name = record.branch_name.clone();

            match self.create_session(project, params).await {
                Ok(_) => {
                    info!("Resumed orphaned session {}", record.id);
                    report.resumed.push(record.id);
                }
                Err(e) => {
                    warn!("Could not resume orphaned session {}: {e}", record.id);
                    report.resume_failed.push(record.id);
                }
            }
        }
        Ok(report)
    }

    pub fn default_manager(&self) -> &SessionManager {
        &self.default_manager
    }

    /// Manager for a project, created on first use. `None` is the unscoped
    /// default manager.
    pub fn manager_for(&self, project: Option<&Path>) -> SessionManager {
        let Some(project) = project else {
            return self.default_manager.clone();
        };
        let key = normalize_project_path(project);
        self.managers
            .entry(key.clone())
            .or_insert_with(|| {
                info!("Creating session manager for {}", key.display());
                SessionManager::new(Some(key.clone()), self.deps.clone())
            })
            .clone()
    }

    /// Every manager, default first.
    pub fn managers(&self) -> Vec<SessionManager> {
        let mut all = vec![self.default_manager.clone()];
        all.extend(self.managers.iter().map(|entry| entry.value().clone()));
        all
    }

    pub fn find_session(&self, id: &str) -> Option<SessionManager> {
        if self.default_manager.contains(id) {
            return Some(self.default_manager.clone());
        }
        self.managers
            .iter()
            .find(|entry| entry.value().contains(id))
            .map(|entry| entry.value().clone())
    }

    pub async fn create_session(
        &self,
        project: Option<&Path>,
        params: CreateSessionParams,
    ) -> Result<SessionSummary, OrchestratorError> {
        let _reservation = match params.session_id_override.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => {
                let already_exists = || OrchestratorError::SessionAlreadyExists {
                    session_id: id.to_string(),
                };
                if !self.reserved_ids.insert(id.to_string()) {
                    return Err(already_exists());
                }
                let reservation = IdReservation {
                    ids: &self.reserved_ids,
                    id: id.to_string(),
                };
                if self.find_session(id).is_some() {
                    return Err(already_exists());
                }
                Some(reservation)
            }
            _ => None,
        };
        self.manager_for(project).create(params).await
    }

    pub fn get_session(&self, id: &str) -> Option<SessionSummary> {
        self.find_session(id).and_then(|manager| manager.get(id))
    }

    /// Live sessions of one scope. Unknown projects have none; no manager is
    /// created for them.
    pub fn list_sessions(&self, project: Option<&Path>) -> Vec<SessionSummary> {
        match project {
            None => self.default_manager.list_all(),
            Some(project) => self
                .managers
                .get(&normalize_project_path(project))
                .map(|entry| entry.value().list_all())
                .unwrap_or_default(),
        }
    }

    /// Live sessions across all managers, each id once, oldest first.
    pub fn all_active_sessions(&self) -> Vec<SessionSummary> {
        let mut seen = HashSet::new();
        let mut sessions: Vec<_> = self
            .managers()
            .iter()
            .flat_map(|manager| manager.list_all())
            .filter(|summary| seen.insert(summary.id.clone()))
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Destroys the id in every manager holding it. Each manager is visited
    /// even if an earlier one failed; the first failure is returned.
    pub fn destroy_session(&self, id: &str) -> Result<bool, OrchestratorError> {
        let mut destroyed = false;
        let mut first_error = None;
        for manager in self.managers() {
            match manager.destroy(id) {
                Ok(found) => destroyed |= found,
                Err(e) => {
                    destroyed = true;
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(destroyed),
        }
    }

    /// Tears down a project's sessions and forgets its manager.
    pub fn destroy_project_sessions(&self, project: &Path) -> Vec<String> {
        let key = normalize_project_path(project);
        let Some((_, manager)) = self.managers.remove(&key) else {
            return Vec::new();
        };
        let report = manager.destroy_all();
        for (id, e) in &report.failed {
            warn!("Session {id} in {} did not shut down cleanly: {e}", key.display());
        }
        report
            .destroyed
            .into_iter()
            .chain(report.failed.into_iter().map(|(id, _)| id))
            .collect()
    }

    /// Closes the creation gate, waits for in-flight creates, then destroys
    /// every live session, giving up after `timeout`. Sessions whose kill
    /// failed are still unregistered and counted as failed.
    pub async fn destroy_all(&self, timeout: Duration) -> ShutdownReport {
        let _closed = self.deps.gate.close().await;
        let managers = self.managers();
        let progress = Arc::new(Mutex::new(ShutdownReport::default()));

        let work = {
            let managers = managers.clone();
            let progress = progress.clone();
            tokio::task::spawn_blocking(move || {
                for manager in managers {
                    for id in manager.session_ids() {
                        let result = manager.destroy(&id);
                        let mut report = progress.lock().unwrap_or_else(|p| p.into_inner());
                        match result {
                            Ok(true) => report.destroyed.push(id),
                            Ok(false) => {}
                            Err(e) => {
                                warn!("Failed to destroy session {id}: {e}");
                                report.failed.push(id);
                            }
                        }
                    }
                }
            })
        };

        let timed_out = match tokio::time::timeout(timeout, work).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!("Session teardown task failed: {e}");
                false
            }
            Err(_) => {
                warn!("Session teardown exceeded {timeout:?}");
                true
            }
        };

        let mut report = progress.lock().unwrap_or_else(|p| p.into_inner()).clone();
        report.timed_out = timed_out;
        report.remaining = managers.iter().flat_map(|m| m.session_ids()).collect();
        report
    }

    /// Final teardown: [`Self::destroy_all`] plus stopping background
    /// discovery.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let report = self.destroy_all(timeout).await;
        self.deps.store.discovery().cancel_all();
        info!(
            "Shutdown complete: {} destroyed, {} failed, {} remaining",
            report.destroyed.len(),
            report.failed.len(),
            report.remaining.len()
        );
        report
    }

    pub fn is_shutting_down(&self) -> bool {
        self.deps.gate.is_closing()
    }

    pub fn rename_session(&self, id: &str, name: &str) -> Result<SessionSummary, OrchestratorError> {
        self.require(id)?.rename(id, name)
    }

    pub fn set_session_active(&self, id: &str, active: bool) -> Result<(), OrchestratorError> {
        self.require(id)?.set_active(id, active)
    }

    pub fn write_input(&self, id: &str, data: &[u8]) -> Result<(), OrchestratorError> {
        self.require(id)?.write_input(id, data)
    }

    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), OrchestratorError> {
        self.require(id)?.resize(id, cols, rows)
    }

    pub fn subscribe_output(&self, id: &str) -> Result<broadcast::Receiver<Vec<u8>>, OrchestratorError> {
        self.require(id)?.subscribe_output(id)
    }

    pub fn snapshot(&self, id: &str) -> Result<Vec<u8>, OrchestratorError> {
        self.require(id)?.snapshot(id)
    }

    pub fn update_auto_approval(
        &self,
        id: &str,
        update: AutoApprovalUpdate,
    ) -> Result<SessionSummary, OrchestratorError> {
        self.require(id)?.update_auto_approval(id, update)
    }

    pub fn query_history(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, OrchestratorError> {
        self.deps
            .store
            .query_sessions(query)
            .map_err(OrchestratorError::from_store)
    }

    pub fn count_history(&self, query: &SessionQuery) -> Result<u64, OrchestratorError> {
        self.deps
            .store
            .count_sessions(query)
            .map_err(OrchestratorError::from_store)
    }

    pub fn get_record(&self, id: &str) -> Result<Option<SessionRecord>, OrchestratorError> {
        self.deps
            .store
            .get_session_by_id(id)
            .map_err(OrchestratorError::from_store)
    }

    pub fn latest_for_td_session(
        &self,
        lookup: &TdSessionLookup,
    ) -> Result<Option<SessionRecord>, OrchestratorError> {
        self.deps
            .store
            .get_latest_by_td_session_id(lookup)
            .map_err(OrchestratorError::from_store)
    }

    pub fn relink_session(
        &self,
        id: &str,
        agent_session_id: Option<&str>,
        transcript_path: &str,
    ) -> Result<bool, OrchestratorError> {
        if transcript_path.trim().is_empty() {
            return Err(OrchestratorError::validation("transcript_path", "must not be blank"));
        }
        self.deps
            .store
            .relink_agent_session(id, agent_session_id, transcript_path)
            .map_err(OrchestratorError::from_store)
    }

    pub async fn hydrate_content_preview(&self, id: &str) -> Result<Option<String>, OrchestratorError> {
        self.deps
            .store
            .hydrate_content_preview(id)
            .await
            .map_err(OrchestratorError::from_store)
    }

    fn require(&self, id: &str) -> Result<SessionManager, OrchestratorError> {
        self.find_session(id)
            .ok_or_else(|| OrchestratorError::not_found(id))
    }
}
