use super::db_sessions::AgentSessionMethods;
use super::preview::derive_content_preview;
use crate::domains::agents::{AdapterRegistry, AgentType, TranscriptAdapter, TranscriptMetadata};
use crate::domains::settings::DiscoverySettings;
use crate::infrastructure::database::Database;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub id: String,
    pub agent_type: AgentType,
    pub worktree_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Transcripts modified up to this long before the session was created still qualify.
    pub grace_period: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::from(&DiscoverySettings::default())
    }
}

impl From<&DiscoverySettings> for DiscoveryConfig {
    fn from(settings: &DiscoverySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            retry_delay: settings.retry_delay(),
            grace_period: settings.grace_period(),
        }
    }
}

struct PendingDiscovery {
    generation: u64,
    handle: JoinHandle<()>,
}

struct DiscoveredTranscript {
    path: PathBuf,
    metadata: TranscriptMetadata,
    preview: Option<String>,
}

struct SchedulerShared {
    db: Database,
    pending: Mutex<HashMap<String, PendingDiscovery>>,
}

impl SchedulerShared {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingDiscovery>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes a result only while this loop is still the live one for the id.
    fn persist(&self, id: &str, generation: u64, found: DiscoveredTranscript) {
        let mut pending = self.pending();
        match pending.get(id) {
            Some(entry) if entry.generation == generation => {}
            _ => {
                debug!("Discarding transcript discovery result for cancelled session {id}");
                return;
            }
        }

        let path = found.path.to_string_lossy().to_string();
        match self.db.set_agent_session_link(
            id,
            found.metadata.agent_session_id.as_deref(),
            &path,
            found.preview.as_deref(),
        ) {
            Ok(true) => info!("Linked session {id} to transcript {path}"),
            Ok(false) => debug!("Session {id} already linked; kept existing transcript link"),
            Err(err) => warn!("Failed to persist transcript link for session {id}: {err:#}"),
        }
        pending.remove(id);
    }

    fn finish(&self, id: &str, generation: u64) {
        let mut pending = self.pending();
        if pending.get(id).is_some_and(|entry| entry.generation == generation) {
            pending.remove(id);
        }
    }
}

/// One cancellable retry loop per session id, looking for the transcript the
/// agent writes on its own schedule.
pub struct DiscoveryScheduler {
    shared: Arc<SchedulerShared>,
    adapters: Arc<AdapterRegistry>,
    config: DiscoveryConfig,
    next_generation: AtomicU64,
}

impl DiscoveryScheduler {
    pub fn new(db: Database, adapters: Arc<AdapterRegistry>, config: DiscoveryConfig) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                db,
                pending: Mutex::new(HashMap::new()),
            }),
            adapters,
            config,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> DiscoveryConfig {
        self.config
    }

    /// Starts (or restarts) discovery for `request.id`. Returns false when no
    /// adapter exists for the agent type, which is a normal outcome.
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, request: DiscoveryRequest) -> bool {
        let Some(adapter) = self.adapters.by_agent_type(request.agent_type) else {
            debug!(
                "No transcript adapter for {}; skipping discovery for session {}",
                request.agent_type, request.id
            );
            return false;
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let id = request.id.clone();

        // Hold the map while spawning so the loop cannot finish before it is registered.
        let mut pending = self.shared.pending();
        let handle = tokio::spawn(run_discovery(
            self.shared.clone(),
            adapter,
            self.config,
            request,
            generation,
        ));
        if let Some(previous) = pending.insert(id, PendingDiscovery { generation, handle }) {
            previous.handle.abort();
        }
        true
    }

    pub fn cancel(&self, id: &str) -> bool {
        match self.shared.pending().remove(id) {
            Some(entry) => {
                entry.handle.abort();
                debug!("Cancelled transcript discovery for session {id}");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.shared.pending().contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }

    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.shared.pending().drain().collect();
        for (_, entry) in drained {
            entry.handle.abort();
        }
    }
}

fn earliest_qualifying_mtime(created_at: DateTime<Utc>, grace: Duration) -> SystemTime {
    let created: SystemTime = created_at.into();
    created.checked_sub(grace).unwrap_or(SystemTime::UNIX_EPOCH)
}

async fn run_discovery(
    shared: Arc<SchedulerShared>,
    adapter: Arc<dyn TranscriptAdapter>,
    config: DiscoveryConfig,
    request: DiscoveryRequest,
    generation: u64,
) {
    let since = earliest_qualifying_mtime(request.created_at, config.grace_period);

    for attempt in 1..=config.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(config.retry_delay).await;
        }

        let adapter = adapter.clone();
        let workdir = request.worktree_path.clone();
        let lookup = tokio::task::spawn_blocking(move || {
            let path = adapter.find_session_file(&workdir, Some(since))?;
            let metadata = adapter.extract_metadata(&path);
            let preview = derive_content_preview(&adapter.parse_messages(&path));
            Some(DiscoveredTranscript {
                path,
                metadata,
                preview,
            })
        })
        .await;

        match lookup {
            Ok(Some(found)) => {
                shared.persist(&request.id, generation, found);
                return;
            }
            Ok(None) => debug!(
                "Transcript for session {} not found (attempt {attempt}/{})",
                request.id, config.max_attempts
            ),
            Err(err) => warn!(
                "Transcript lookup for session {} failed on attempt {attempt}: {err}",
                request.id
            ),
        }
    }

    debug!(
        "Transcript discovery for session {} stopped after {} attempts",
        request.id, config.max_attempts
    );
    shared.finish(&request.id, generation);
}
