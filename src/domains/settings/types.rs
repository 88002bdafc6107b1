use crate::domains::agents::AgentProfile;
use crate::domains::terminal::{DEFAULT_COLS, DEFAULT_ROWS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub storage: StorageSettings,
    pub discovery: DiscoverySettings,
    pub terminal: TerminalSettings,
    pub daemon: LifecycleSettings,
    pub agents: Vec<AgentProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub grace_period_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay_ms: 3_000,
            grace_period_secs: 10,
        }
    }
}

impl DiscoverySettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    pub cols: u16,
    pub rows: u16,
    /// Rendered lines handed to the state detector per flush.
    pub detection_tail_lines: usize,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            detection_tail_lines: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub resume_orphaned_sessions: bool,
    pub shutdown_timeout_secs: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            resume_orphaned_sessions: false,
            shutdown_timeout_secs: 15,
        }
    }
}

impl LifecycleSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
