use super::db_sessions::AgentSessionMethods;
use super::discovery::{DiscoveryConfig, DiscoveryRequest, DiscoveryScheduler};
use super::entity::{NewSessionRecord, SessionQuery, SessionRecord, TdSessionLookup};
use super::preview::derive_content_preview;
use crate::domains::agents::AdapterRegistry;
use crate::infrastructure::database::Database;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Durable session history plus the background work that keeps it linked
/// to agent transcripts.
#[derive(Clone)]
pub struct SessionRecordStore {
    db: Database,
    adapters: Arc<AdapterRegistry>,
    discovery: Arc<DiscoveryScheduler>,
}

impl SessionRecordStore {
    pub fn new(db: Database, adapters: Arc<AdapterRegistry>, config: DiscoveryConfig) -> Self {
        let discovery = Arc::new(DiscoveryScheduler::new(db.clone(), adapters.clone(), config));
        Self {
            db,
            adapters,
            discovery,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn discovery(&self) -> &DiscoveryScheduler {
        &self.discovery
    }

    pub fn create_session_record(&self, input: NewSessionRecord) -> Result<SessionRecord> {
        let record = self.db.insert_agent_session(&input)?;
        debug!("Created session record {}", record.id);
        Ok(record)
    }

    /// Creates the record for a freshly started session, or resumes an
    /// existing one with the same id.
    pub fn record_session_started(&self, input: NewSessionRecord) -> Result<SessionRecord> {
        let record = self.db.upsert_started_agent_session(&input)?;
        debug!("Recorded start of session {}", record.id);
        Ok(record)
    }

    pub fn mark_session_ended(&self, id: &str, when: Option<DateTime<Utc>>) -> Result<bool> {
        self.db
            .set_agent_session_ended(id, when.unwrap_or_else(Utc::now))
    }

    pub fn mark_session_resumed(&self, id: &str) -> Result<bool> {
        self.db.set_agent_session_resumed(id)
    }

    pub fn update_session_name(&self, id: &str, name: &str) -> Result<bool> {
        self.db.set_agent_session_name(id, name)
    }

    /// Discovery-side link: never overwrites an existing one.
    pub fn update_agent_session_link(
        &self,
        id: &str,
        agent_session_id: Option<&str>,
        path: &str,
    ) -> Result<bool> {
        self.db.set_agent_session_link(id, agent_session_id, path, None)
    }

    /// Explicit relink requested by a user or tool. Pending discovery for the
    /// id is cancelled first so it cannot race the new link.
    pub fn relink_agent_session(
        &self,
        id: &str,
        agent_session_id: Option<&str>,
        path: &str,
    ) -> Result<bool> {
        self.discovery.cancel(id);
        let changed = self.db.replace_agent_session_link(id, agent_session_id, path)?;
        if changed {
            info!("Relinked session {id} to transcript {path}");
        }
        Ok(changed)
    }

    pub fn update_session_content_preview(&self, id: &str, preview: Option<&str>) -> Result<bool> {
        self.db.set_agent_session_preview(id, preview)
    }

    pub fn get_session_by_id(&self, id: &str) -> Result<Option<SessionRecord>> {
        self.db.get_agent_session(id)
    }

    pub fn query_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>> {
        self.db.query_agent_sessions(query)
    }

    pub fn count_sessions(&self, query: &SessionQuery) -> Result<u64> {
        self.db.count_agent_sessions(query)
    }

    pub fn get_latest_by_td_session_id(&self, lookup: &TdSessionLookup) -> Result<Option<SessionRecord>> {
        self.db.latest_agent_session_for_td(lookup)
    }

    pub fn list_unended_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.db.list_unended_agent_sessions()
    }

    pub fn schedule_discovery(&self, request: DiscoveryRequest) -> bool {
        self.discovery.schedule(request)
    }

    pub fn cancel_discovery(&self, id: &str) -> bool {
        self.discovery.cancel(id)
    }

    /// Derives the preview for a linked record that lacks one. Returns the
    /// stored preview, or `None` when the record is unlinked or the
    /// transcript has nothing meaningful yet.
    pub async fn hydrate_content_preview(&self, id: &str) -> Result<Option<String>> {
        let Some(record) = self.get_session_by_id(id)? else {
            return Ok(None);
        };
        if let Some(existing) = record.content_preview {
            return Ok(Some(existing));
        }
        let Some(path) = record.agent_session_path.map(PathBuf::from) else {
            return Ok(None);
        };
        let Some(adapter) = self.adapters.by_agent_type(record.agent_type) else {
            return Ok(None);
        };

        let preview = tokio::task::spawn_blocking(move || {
            derive_content_preview(&adapter.parse_messages(&path))
        })
        .await
        .context("preview task panicked")?;

        match preview {
            Some(preview) => {
                self.update_session_content_preview(id, Some(&preview))?;
                debug!("Hydrated preview for session {id}");
                Ok(Some(preview))
            }
            None => Ok(None),
        }
    }

    /// Marks records left open by a previous daemon run as ended and returns
    /// them, newest first.
    pub fn reconcile_orphans(&self) -> Result<Vec<SessionRecord>> {
        let orphans = self.list_unended_sessions()?;
        let now = Utc::now();
        for record in &orphans {
            if let Err(err) = self.mark_session_ended(&record.id, Some(now)) {
                warn!("Failed to close orphaned session {}: {err:#}", record.id);
            }
        }
        if !orphans.is_empty() {
            info!("Closed {} session record(s) orphaned by a previous run", orphans.len());
        }
        Ok(orphans)
    }
}
