use super::adapter::{
    TranscriptAdapter, TranscriptMessage, TranscriptMetadata, content_text, first_json_line,
    newest_since, read_json_lines,
};
use super::manifest::AgentType;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Codex writes `rollout-*.jsonl` files into date-partitioned folders under
/// `~/.codex/sessions`; the first line is a `session_meta` record naming the cwd.
pub struct CodexTranscriptAdapter {
    sessions_dir: PathBuf,
}

impl CodexTranscriptAdapter {
    pub fn new(home: &Path) -> Self {
        Self {
            sessions_dir: home.join(".codex").join("sessions"),
        }
    }

    fn rollout_files(&self, since: Option<SystemTime>) -> Vec<PathBuf> {
        WalkDir::new(&self.sessions_dir)
            .max_depth(5)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                name.starts_with("rollout-") && name.ends_with(".jsonl")
            })
            .filter(|entry| match (since, entry.metadata()) {
                (Some(since), Ok(meta)) => meta.modified().map(|m| m >= since).unwrap_or(false),
                _ => true,
            })
            .map(|entry| entry.into_path())
            .collect()
    }
}

fn session_meta(path: &Path) -> Option<Value> {
    let first = first_json_line(path)?;
    if first.get("type").and_then(Value::as_str) != Some("session_meta") {
        return None;
    }
    first.get("payload").cloned()
}

impl TranscriptAdapter for CodexTranscriptAdapter {
    fn agent_type(&self) -> AgentType {
        AgentType::Codex
    }

    fn find_session_file(&self, workdir: &Path, since: Option<SystemTime>) -> Option<PathBuf> {
        let matching = self.rollout_files(since).into_iter().filter(|path| {
            session_meta(path)
                .and_then(|meta| meta.get("cwd").and_then(Value::as_str).map(PathBuf::from))
                .is_some_and(|cwd| cwd == workdir)
        });
        newest_since(matching, since)
    }

    fn extract_metadata(&self, path: &Path) -> TranscriptMetadata {
        TranscriptMetadata {
            agent_session_id: session_meta(path)
                .and_then(|meta| meta.get("id").and_then(Value::as_str).map(str::to_string)),
        }
    }

    fn parse_messages(&self, path: &Path) -> Vec<TranscriptMessage> {
        read_json_lines(path)
            .into_iter()
            .filter(|line| line.get("type").and_then(Value::as_str) == Some("response_item"))
            .filter_map(|line| {
                let payload = line.get("payload")?;
                if payload.get("type").and_then(Value::as_str) != Some("message") {
                    return None;
                }
                let role = payload.get("role").and_then(Value::as_str)?;
                let content = content_text(payload.get("content")?)?;
                Some(TranscriptMessage::new(role, content))
            })
            .collect()
    }
}
