use crate::domains::agents::{AgentOptions, AgentType};
use crate::domains::detection::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_QUERY_LIMIT: u32 = 50;
pub const MAX_QUERY_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionIntent {
    #[default]
    Work,
    Review,
    Manual,
}

impl SessionIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionIntent::Work => "work",
            SessionIntent::Review => "review",
            SessionIntent::Manual => "manual",
        }
    }
}

impl fmt::Display for SessionIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(SessionIntent::Work),
            "review" => Ok(SessionIntent::Review),
            "manual" => Ok(SessionIntent::Manual),
            other => Err(format!("unknown session intent '{other}'")),
        }
    }
}

/// Durable row for a session, kept after the process is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub agent_profile_id: String,
    pub agent_profile_name: String,
    pub agent_type: AgentType,
    pub agent_options: AgentOptions,
    pub agent_session_id: Option<String>,
    pub agent_session_path: Option<String>,
    pub worktree_path: String,
    pub branch_name: Option<String>,
    pub project_path: Option<String>,
    pub td_task_id: Option<String>,
    pub td_session_id: Option<String>,
    pub session_name: Option<String>,
    pub content_preview: Option<String>,
    pub intent: SessionIntent,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn is_linked(&self) -> bool {
        self.agent_session_path.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSessionRecord {
    pub id: String,
    pub agent_profile_id: String,
    pub agent_profile_name: String,
    pub agent_type: AgentType,
    pub agent_options: AgentOptions,
    pub worktree_path: String,
    pub branch_name: Option<String>,
    pub project_path: Option<String>,
    pub td_task_id: Option<String>,
    pub td_session_id: Option<String>,
    pub session_name: Option<String>,
    pub intent: SessionIntent,
    /// Defaults to now when unset.
    pub created_at: Option<DateTime<Utc>>,
}

/// Filters for history queries. Every set field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
    pub project_path: Option<String>,
    pub worktree_path: Option<String>,
    pub td_task_id: Option<String>,
    pub agent_type: Option<AgentType>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl SessionQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TdSessionLookup {
    pub td_session_id: String,
    pub td_task_id: Option<String>,
    pub project_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub worktree_path: PathBuf,
    pub agent_profile_id: String,
    pub options: AgentOptions,
    pub name_override: Option<String>,
    /// Reuse a previously persisted id instead of minting one.
    pub session_id_override: Option<String>,
    pub intent: SessionIntent,
    pub td_task_id: Option<String>,
    pub td_session_id: Option<String>,
    pub branch_name: Option<String>,
}

impl CreateSessionParams {
    pub fn new(worktree_path: impl Into<PathBuf>, agent_profile_id: impl Into<String>) -> Self {
        Self {
            worktree_path: worktree_path.into(),
            agent_profile_id: agent_profile_id.into(),
            options: AgentOptions::new(),
            name_override: None,
            session_id_override: None,
            intent: SessionIntent::Work,
            td_task_id: None,
            td_session_id: None,
            branch_name: None,
        }
    }
}

/// Read-only view of a live session handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub worktree_path: String,
    pub project_path: Option<String>,
    pub agent_profile_id: String,
    pub agent_profile_name: String,
    pub agent_type: AgentType,
    pub options: AgentOptions,
    pub state: SessionState,
    pub is_active: bool,
    pub auto_approval_failed: bool,
    pub auto_approval_reason: Option<String>,
    pub exited: bool,
    pub exit_code: Option<u32>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Out-of-band signal from the auto-approval engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoApprovalUpdate {
    Pending,
    Resolved,
    Failed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_limit_defaults_and_clamps() {
        assert_eq!(SessionQuery::default().effective_limit(), DEFAULT_QUERY_LIMIT);
        let big = SessionQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(big.effective_limit(), MAX_QUERY_LIMIT);
        let zero = SessionQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.effective_limit(), 1);
    }

    #[test]
    fn intent_parses_lowercase_names() {
        assert_eq!("review".parse::<SessionIntent>().unwrap(), SessionIntent::Review);
        assert!("Work".parse::<SessionIntent>().is_err());
    }
}
