use super::adapter::{
    TranscriptAdapter, TranscriptMessage, TranscriptMetadata, content_text, files_with_extension,
    newest_since,
};
use super::manifest::AgentType;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Gemini stores chats as whole JSON documents under
/// `~/.gemini/tmp/<sha256 of project path>/chats/`.
pub struct GeminiTranscriptAdapter {
    tmp_dir: PathBuf,
}

impl GeminiTranscriptAdapter {
    pub fn new(home: &Path) -> Self {
        Self {
            tmp_dir: home.join(".gemini").join("tmp"),
        }
    }

    pub fn chats_dir(&self, workdir: &Path) -> PathBuf {
        self.tmp_dir
            .join(compute_gemini_project_hash(workdir))
            .join("chats")
    }
}

pub fn compute_gemini_project_hash(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn read_document(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            log::debug!("Gemini transcript {} is not valid JSON yet: {err}", path.display());
            None
        }
    }
}

impl TranscriptAdapter for GeminiTranscriptAdapter {
    fn agent_type(&self) -> AgentType {
        AgentType::Gemini
    }

    fn find_session_file(&self, workdir: &Path, since: Option<SystemTime>) -> Option<PathBuf> {
        newest_since(files_with_extension(&self.chats_dir(workdir), "json"), since)
    }

    fn extract_metadata(&self, path: &Path) -> TranscriptMetadata {
        TranscriptMetadata {
            agent_session_id: read_document(path).and_then(|doc| {
                doc.get("sessionId")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
            }),
        }
    }

    fn parse_messages(&self, path: &Path) -> Vec<TranscriptMessage> {
        let Some(doc) = read_document(path) else {
            return Vec::new();
        };
        let Some(messages) = doc.get("messages").and_then(Value::as_array) else {
            return Vec::new();
        };

        messages
            .iter()
            .filter_map(|message| {
                let role = match message.get("type").and_then(Value::as_str)? {
                    "user" => "user",
                    "gemini" | "model" => "assistant",
                    _ => return None,
                };
                let content = content_text(message.get("content")?)?;
                Some(TranscriptMessage::new(role, content))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn hash_is_stable_sha256_hex() {
        let hash = compute_gemini_project_hash(Path::new("/repo/wt-a"));
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_gemini_project_hash(Path::new("/repo/wt-a")));
        assert_ne!(hash, compute_gemini_project_hash(Path::new("/repo/wt-b")));
    }

    #[test]
    fn reads_chat_document() {
        let home = TempDir::new().unwrap();
        let adapter = GeminiTranscriptAdapter::new(home.path());
        let workdir = Path::new("/repo/wt-a");
        let dir = adapter.chats_dir(workdir);
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("session-1.json");
        fs::write(
            &file,
            r#"{"sessionId":"g-1","messages":[{"type":"info","content":"boot"},{"type":"user","content":"Explain main.rs"},{"type":"gemini","content":"Sure"}]}"#,
        )
        .unwrap();

        assert_eq!(adapter.find_session_file(workdir, None), Some(file.clone()));
        assert_eq!(adapter.extract_metadata(&file).agent_session_id.as_deref(), Some("g-1"));
        assert_eq!(
            adapter.parse_messages(&file),
            vec![
                TranscriptMessage::new("user", "Explain main.rs"),
                TranscriptMessage::new("assistant", "Sure"),
            ]
        );
    }

    #[test]
    fn half_written_document_yields_nothing() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("partial.json");
        fs::write(&file, r#"{"sessionId":"g-1","messages":[{"type":"us"#).unwrap();
        let adapter = GeminiTranscriptAdapter::new(home.path());
        assert!(adapter.parse_messages(&file).is_empty());
        assert!(adapter.extract_metadata(&file).agent_session_id.is_none());
    }
}
