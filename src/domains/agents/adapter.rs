use super::manifest::AgentType;
use super::{claude::ClaudeTranscriptAdapter, codex::CodexTranscriptAdapter, gemini::GeminiTranscriptAdapter};
use crate::errors::OrchestratorError;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptMetadata {
    pub agent_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
}

impl TranscriptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Locates and reads the transcript an agent CLI writes on its own.
///
/// Every method is best effort: missing or unreadable files yield `None` or
/// empty results rather than errors, since the agent controls when and
/// whether these files exist.
pub trait TranscriptAdapter: Send + Sync {
    fn agent_type(&self) -> AgentType;

    /// Newest transcript for `workdir` modified at or after `since`.
    fn find_session_file(&self, workdir: &Path, since: Option<SystemTime>) -> Option<PathBuf>;

    fn extract_metadata(&self, path: &Path) -> TranscriptMetadata;

    fn parse_messages(&self, path: &Path) -> Vec<TranscriptMessage>;
}

#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<AgentType, Arc<dyn TranscriptAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the transcript adapters for every agent that writes one,
    /// rooted at `home`.
    pub fn with_defaults(home: &Path) -> Result<Self, OrchestratorError> {
        let mut registry = Self::new();
        registry.register(Arc::new(ClaudeTranscriptAdapter::new(home)))?;
        registry.register(Arc::new(CodexTranscriptAdapter::new(home)))?;
        registry.register(Arc::new(GeminiTranscriptAdapter::new(home)))?;
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn TranscriptAdapter>) -> Result<(), OrchestratorError> {
        let agent_type = adapter.agent_type();
        if self.adapters.contains_key(&agent_type) {
            return Err(OrchestratorError::ConfigError {
                key: format!("adapters.{agent_type}"),
                message: "a transcript adapter is already registered for this agent type".to_string(),
            });
        }
        log::debug!("Registered transcript adapter for {agent_type}");
        self.adapters.insert(agent_type, adapter);
        Ok(())
    }

    pub fn by_agent_type(&self, agent_type: AgentType) -> Option<Arc<dyn TranscriptAdapter>> {
        self.adapters.get(&agent_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<AgentType> {
        let mut types: Vec<_> = self.adapters.keys().copied().collect();
        types.sort();
        types
    }
}

pub(crate) fn modified_time(path: &Path) -> Option<SystemTime> {
    let metadata = fs::metadata(path).ok()?;
    if metadata.len() == 0 {
        return None;
    }
    metadata.modified().ok()
}

/// Picks the most recently modified candidate no older than `since`.
/// Ties fall back to path order so the choice is stable.
pub(crate) fn newest_since(
    candidates: impl IntoIterator<Item = PathBuf>,
    since: Option<SystemTime>,
) -> Option<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for path in candidates {
        let Some(modified) = modified_time(&path) else {
            continue;
        };
        if let Some(since) = since
            && modified < since
        {
            continue;
        }
        let is_newer = match &newest {
            Some((time, existing)) => modified > *time || (modified == *time && path > *existing),
            None => true,
        };
        if is_newer {
            newest = Some((modified, path));
        }
    }

    newest.map(|(_, path)| path)
}

pub(crate) fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == extension))
        .collect()
}

/// Parsed JSON objects from a JSONL file; malformed lines are skipped since
/// agents may still be appending to the last one.
pub(crate) fn read_json_lines(path: &Path) -> Vec<Value> {
    let Ok(file) = File::open(path) else {
        return Vec::new();
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(&line).ok())
        .collect()
}

pub(crate) fn first_json_line(path: &Path) -> Option<Value> {
    let file = File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    serde_json::from_str(line.trim()).ok()
}

/// Flattens a message `content` field that is either a string or an array of
/// typed parts carrying `text`.
pub(crate) fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}
