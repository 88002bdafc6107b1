use super::entity::SessionSummary;
use crate::domains::detection::SessionState;
use crate::infrastructure::events::NamedEvent;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename = "session-created")]
    Created { session: SessionSummary },
    #[serde(rename = "session-destroyed")]
    Destroyed { id: String },
    #[serde(rename = "session-state-changed", rename_all = "camelCase")]
    StateChanged {
        id: String,
        state: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        auto_approval_failed: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "session-exited", rename_all = "camelCase")]
    Exited { id: String, exit_code: Option<u32> },
    #[serde(rename = "session-renamed")]
    Renamed { id: String, name: String },
    #[serde(rename = "session-active-changed", rename_all = "camelCase")]
    ActiveChanged { id: String, is_active: bool },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Created { session } => &session.id,
            SessionEvent::Destroyed { id }
            | SessionEvent::StateChanged { id, .. }
            | SessionEvent::Exited { id, .. }
            | SessionEvent::Renamed { id, .. }
            | SessionEvent::ActiveChanged { id, .. } => id,
        }
    }
}

impl NamedEvent for SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Created { .. } => "session-created",
            SessionEvent::Destroyed { .. } => "session-destroyed",
            SessionEvent::StateChanged { .. } => "session-state-changed",
            SessionEvent::Exited { .. } => "session-exited",
            SessionEvent::Renamed { .. } => "session-renamed",
            SessionEvent::ActiveChanged { .. } => "session-active-changed",
        }
    }
}
