pub mod adapter;
pub mod claude;
pub mod codex;
pub mod gemini;
pub mod manifest;

use std::path::{Path, PathBuf};

pub use adapter::{AdapterRegistry, TranscriptAdapter, TranscriptMessage, TranscriptMetadata};
pub use manifest::{AgentOptions, AgentProfile, AgentProfileCatalog, AgentType, validate_options};

/// Resolves an agent command to an absolute binary path.
///
/// Paths and commands with separators are returned untouched; bare names are
/// looked up in the user's common install locations, then `PATH`. Unresolved
/// names are returned as-is so the spawn error names the missing command.
pub fn resolve_agent_binary(command: &str, home: Option<&Path>) -> String {
    let command = command.trim();
    if command.contains(std::path::MAIN_SEPARATOR) {
        return command.to_string();
    }

    if let Some(home) = home {
        for dir in [".local/bin", ".cargo/bin", "bin", ".npm-global/bin"] {
            let candidate = home.join(dir).join(command);
            if candidate.is_file() {
                log::info!("Found {command} at {}", candidate.display());
                return candidate.to_string_lossy().to_string();
            }
        }
    }

    if let Ok(path) = which::which(command) {
        let path_str = path.to_string_lossy().to_string();
        log::info!("Found {command} via which crate: {path_str}");
        return path_str;
    }

    log::warn!("Could not resolve path for '{command}', using as-is");
    command.to_string()
}

pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}
