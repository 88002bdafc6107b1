pub mod patterns;

use crate::domains::agents::AgentType;
use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Busy,
    WaitingInput,
    PendingAutoApproval,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Busy => "busy",
            SessionState::WaitingInput => "waiting_input",
            SessionState::PendingAutoApproval => "pending_auto_approval",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies the rendered tail of a terminal into a session state.
///
/// Implementations are pure: the same lines and previous state always give
/// the same answer, and unmatched input is a normal outcome.
pub trait StateDetector: Send + Sync {
    fn detect(&self, recent_lines: &[String], previous: SessionState) -> SessionState;
}

pub struct PatternStateDetector {
    waiting: RegexSet,
    busy: RegexSet,
}

impl PatternStateDetector {
    fn compile(waiting: Vec<&str>, busy: Vec<&str>) -> Self {
        let build = |patterns: Vec<&str>| {
            let patterns: Vec<String> = patterns.into_iter().map(|p| format!("(?im){p}")).collect();
            match RegexSet::new(&patterns) {
                Ok(set) => set,
                Err(err) => {
                    // Patterns are compile-time constants; an invalid one disables its group.
                    log::error!("Invalid state detection pattern: {err}");
                    RegexSet::empty()
                }
            }
        };
        Self {
            waiting: build(waiting),
            busy: build(busy),
        }
    }

    pub fn base() -> Self {
        Self::compile(patterns::BASE_WAITING.to_vec(), patterns::BASE_BUSY.to_vec())
    }

    pub fn for_agent(agent_type: AgentType) -> Self {
        let mut waiting = patterns::BASE_WAITING.to_vec();
        waiting.extend_from_slice(patterns::waiting_patterns(agent_type));
        let mut busy = patterns::BASE_BUSY.to_vec();
        busy.extend_from_slice(patterns::busy_patterns(agent_type));
        Self::compile(waiting, busy)
    }
}

impl StateDetector for PatternStateDetector {
    fn detect(&self, recent_lines: &[String], _previous: SessionState) -> SessionState {
        let text = recent_lines.join("\n");
        if self.waiting.is_match(&text) {
            SessionState::WaitingInput
        } else if self.busy.is_match(&text) {
            SessionState::Busy
        } else {
            SessionState::Idle
        }
    }
}

static DETECTORS: Lazy<HashMap<AgentType, Arc<PatternStateDetector>>> = Lazy::new(|| {
    AgentType::ALL
        .into_iter()
        .map(|agent_type| (agent_type, Arc::new(PatternStateDetector::for_agent(agent_type))))
        .collect()
});

static BASE_DETECTOR: Lazy<Arc<PatternStateDetector>> =
    Lazy::new(|| Arc::new(PatternStateDetector::base()));

pub fn detector_for(agent_type: AgentType) -> Arc<dyn StateDetector> {
    match DETECTORS.get(&agent_type) {
        Some(detector) => detector.clone(),
        None => BASE_DETECTOR.clone(),
    }
}
