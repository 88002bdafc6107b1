pub mod control_sequences;
pub mod pty;
pub mod screen;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use control_sequences::{StartupClearFilter, strip_startup_clear};
pub use pty::PtySupervisor;
pub use screen::TerminalScreen;

pub const DEFAULT_COLS: u16 = 120;
pub const DEFAULT_ROWS: u16 = 40;

/// Opaque handle to a running agent process. Only the session manager
/// holds one.
pub trait ProcessHandle: Send + Sync {
    fn write(&self, data: &[u8]) -> Result<()>;
    fn resize(&self, cols: u16, rows: u16) -> Result<()>;
    fn kill(&self) -> Result<()>;
    fn pid(&self) -> Option<u32>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(Vec<u8>),
    Exited { exit_code: Option<u32> },
}

#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
}

pub struct SpawnedProcess {
    pub handle: Arc<dyn ProcessHandle>,
    /// Output chunks in arrival order, terminated by a single `Exited`.
    pub events: mpsc::Receiver<ProcessEvent>,
}

#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnedProcess>;
}
