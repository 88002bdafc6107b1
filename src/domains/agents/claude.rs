use super::adapter::{
    TranscriptAdapter, TranscriptMessage, TranscriptMetadata, content_text, files_with_extension,
    newest_since, read_json_lines,
};
use super::manifest::AgentType;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Claude Code keeps one JSONL transcript per conversation under
/// `~/.claude/projects/<sanitized cwd>/`.
pub struct ClaudeTranscriptAdapter {
    projects_dir: PathBuf,
}

impl ClaudeTranscriptAdapter {
    pub fn new(home: &Path) -> Self {
        Self {
            projects_dir: home.join(".claude").join("projects"),
        }
    }

    pub fn project_dir(&self, workdir: &Path) -> PathBuf {
        self.projects_dir.join(sanitize_project_path(workdir))
    }
}

pub fn sanitize_project_path(workdir: &Path) -> String {
    workdir
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

impl TranscriptAdapter for ClaudeTranscriptAdapter {
    fn agent_type(&self) -> AgentType {
        AgentType::ClaudeCode
    }

    fn find_session_file(&self, workdir: &Path, since: Option<SystemTime>) -> Option<PathBuf> {
        let dir = self.project_dir(workdir);
        let found = newest_since(files_with_extension(&dir, "jsonl"), since);
        log::debug!(
            "Claude transcript lookup in {}: {:?}",
            dir.display(),
            found.as_ref().map(|p| p.display().to_string())
        );
        found
    }

    fn extract_metadata(&self, path: &Path) -> TranscriptMetadata {
        let from_lines = read_json_lines(path).into_iter().find_map(|line| {
            line.get("sessionId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        });
        let agent_session_id = from_lines.or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
        });
        TranscriptMetadata { agent_session_id }
    }

    fn parse_messages(&self, path: &Path) -> Vec<TranscriptMessage> {
        read_json_lines(path)
            .into_iter()
            .filter(|line| !line.get("isMeta").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|line| {
                let role = line.get("type").and_then(Value::as_str)?;
                if role != "user" && role != "assistant" {
                    return None;
                }
                let content = content_text(line.get("message")?.get("content")?)?;
                Some(TranscriptMessage::new(role, content))
            })
            .collect()
    }
}
