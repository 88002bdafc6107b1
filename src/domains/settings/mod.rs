pub mod types;

pub use types::*;

use crate::domains::agents::AgentProfileCatalog;
use crate::errors::OrchestratorError;
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "AGENTDECK_CONFIG";

/// Explicit path, then `AGENTDECK_CONFIG`, then the platform config dir.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(value) = std::env::var(CONFIG_ENV_VAR)
        && !value.trim().is_empty()
    {
        return Some(PathBuf::from(value.trim()));
    }
    dirs::config_dir().map(|dir| dir.join("agentdeck").join("config.toml"))
}

pub fn load_settings(path: Option<&Path>) -> Result<DaemonSettings> {
    let Some(path) = path else {
        log::info!("No config location available; using default settings");
        return Ok(DaemonSettings::default());
    };

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            log::info!("Config {} not found; using default settings", path.display());
            return Ok(DaemonSettings::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read config {}", path.display()));
        }
    };

    let settings: DaemonSettings = toml::from_str(&raw).map_err(|e| OrchestratorError::ConfigError {
        key: path.display().to_string(),
        message: e.to_string(),
    })?;
    validate_settings(&settings)?;
    log::info!("Loaded settings from {}", path.display());
    Ok(settings)
}

pub fn validate_settings(settings: &DaemonSettings) -> Result<(), OrchestratorError> {
    if settings.discovery.max_attempts == 0 {
        return Err(OrchestratorError::ConfigError {
            key: "discovery.max_attempts".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    if settings.terminal.cols == 0 || settings.terminal.rows == 0 {
        return Err(OrchestratorError::ConfigError {
            key: "terminal".to_string(),
            message: "cols and rows must be non-zero".to_string(),
        });
    }
    if settings.terminal.detection_tail_lines == 0 {
        return Err(OrchestratorError::ConfigError {
            key: "terminal.detection_tail_lines".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    AgentProfileCatalog::new(settings.agents.clone())?;
    Ok(())
}
