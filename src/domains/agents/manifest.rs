use crate::errors::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Key/value launch options as supplied by the caller, kept ordered so the
/// serialized form is stable.
pub type AgentOptions = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentType {
    #[serde(rename = "claude-code")]
    ClaudeCode,
    #[serde(rename = "codex")]
    Codex,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "opencode")]
    OpenCode,
}

impl AgentType {
    pub const ALL: [AgentType; 4] = [
        AgentType::ClaudeCode,
        AgentType::Codex,
        AgentType::Gemini,
        AgentType::OpenCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::ClaudeCode => "claude-code",
            AgentType::Codex => "codex",
            AgentType::Gemini => "gemini",
            AgentType::OpenCode => "opencode",
        }
    }

    fn allowed_option_keys(&self) -> &'static [&'static str] {
        match self {
            AgentType::ClaudeCode => &["model", "permission_mode", "args"],
            AgentType::Codex => &["model", "sandbox", "approval_policy", "args"],
            AgentType::Gemini => &["model", "yolo", "args"],
            AgentType::OpenCode => &["model", "args"],
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude-code" | "claude" => Ok(AgentType::ClaudeCode),
            "codex" => Ok(AgentType::Codex),
            "gemini" => Ok(AgentType::Gemini),
            "opencode" => Ok(AgentType::OpenCode),
            other => Err(format!("unknown agent type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub agent_type: AgentType,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl AgentProfile {
    fn builtin(id: &str, name: &str, agent_type: AgentType, command: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            agent_type,
            command: command.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Full argument vector for a launch: profile defaults followed by the
    /// flags derived from validated options.
    pub fn launch_args(&self, options: &AgentOptions) -> Result<Vec<String>, OrchestratorError> {
        validate_options(self.agent_type, options)?;

        let mut args = self.args.clone();
        for (key, value) in options {
            let value = value.trim();
            match (self.agent_type, key.as_str()) {
                (_, "model") => {
                    args.push("--model".to_string());
                    args.push(value.to_string());
                }
                (AgentType::ClaudeCode, "permission_mode") => {
                    args.push("--permission-mode".to_string());
                    args.push(value.to_string());
                }
                (AgentType::Codex, "sandbox") => {
                    args.push("--sandbox".to_string());
                    args.push(value.to_string());
                }
                (AgentType::Codex, "approval_policy") => {
                    args.push("--ask-for-approval".to_string());
                    args.push(value.to_string());
                }
                (AgentType::Gemini, "yolo") => {
                    if value == "true" {
                        args.push("--yolo".to_string());
                    }
                }
                (_, "args") => {
                    let extra = shell_words::split(value)
                        .map_err(|e| OrchestratorError::validation("options.args", e))?;
                    args.extend(extra);
                }
                _ => {}
            }
        }
        Ok(args)
    }
}

pub fn builtin_profiles() -> Vec<AgentProfile> {
    vec![
        AgentProfile::builtin("claude-code", "Claude Code", AgentType::ClaudeCode, "claude"),
        AgentProfile::builtin("codex", "Codex", AgentType::Codex, "codex"),
        AgentProfile::builtin("gemini", "Gemini", AgentType::Gemini, "gemini"),
        AgentProfile::builtin("opencode", "OpenCode", AgentType::OpenCode, "opencode"),
    ]
}

/// Rejects unknown keys and malformed values before anything is spawned.
pub fn validate_options(agent_type: AgentType, options: &AgentOptions) -> Result<(), OrchestratorError> {
    let allowed = agent_type.allowed_option_keys();

    for (key, value) in options {
        let field = format!("options.{key}");
        if key.trim().is_empty() {
            return Err(OrchestratorError::validation("options", "option keys must not be empty"));
        }
        if !allowed.contains(&key.as_str()) {
            return Err(OrchestratorError::validation(
                &field,
                format!(
                    "unsupported option for {agent_type}; expected one of: {}",
                    allowed.join(", ")
                ),
            ));
        }
        if value.contains('\0') {
            return Err(OrchestratorError::validation(&field, "value contains a NUL byte"));
        }

        match key.as_str() {
            "model" | "permission_mode" | "sandbox" | "approval_policy" if value.trim().is_empty() => {
                return Err(OrchestratorError::validation(&field, "value must not be blank"));
            }
            "yolo" if !matches!(value.trim(), "true" | "false") => {
                return Err(OrchestratorError::validation(&field, "expected 'true' or 'false'"));
            }
            "args" => {
                shell_words::split(value).map_err(|e| OrchestratorError::validation(&field, e))?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Launchable profiles: the built-in defaults overlaid with configured ones.
#[derive(Debug, Clone)]
pub struct AgentProfileCatalog {
    profiles: BTreeMap<String, AgentProfile>,
}

impl Default for AgentProfileCatalog {
    fn default() -> Self {
        Self {
            profiles: builtin_profiles()
                .into_iter()
                .map(|profile| (profile.id.clone(), profile))
                .collect(),
        }
    }
}

impl AgentProfileCatalog {
    pub fn new(configured: Vec<AgentProfile>) -> Result<Self, OrchestratorError> {
        let mut catalog = Self::default();
        let mut seen = HashSet::new();

        for profile in configured {
            let id = profile.id.trim().to_string();
            if id.is_empty() {
                return Err(OrchestratorError::ConfigError {
                    key: "agents.id".to_string(),
                    message: "agent profile id must not be empty".to_string(),
                });
            }
            if !seen.insert(id.clone()) {
                return Err(OrchestratorError::ConfigError {
                    key: format!("agents.{id}"),
                    message: "duplicate agent profile id".to_string(),
                });
            }
            if profile.command.trim().is_empty() {
                return Err(OrchestratorError::ConfigError {
                    key: format!("agents.{id}.command"),
                    message: "command must not be empty".to_string(),
                });
            }
            if catalog.profiles.contains_key(&id) {
                log::info!("Agent profile '{id}' overrides the built-in default");
            }
            catalog.profiles.insert(id.clone(), AgentProfile { id, ..profile });
        }

        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&AgentProfile> {
        self.profiles.get(id.trim())
    }

    pub fn resolve(&self, id: &str) -> Result<&AgentProfile, OrchestratorError> {
        self.get(id).ok_or_else(|| OrchestratorError::AgentNotFound {
            agent_id: id.to_string(),
        })
    }

    pub fn list(&self) -> impl Iterator<Item = &AgentProfile> {
        self.profiles.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> AgentOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn agent_type_round_trips_through_str() {
        for agent_type in AgentType::ALL {
            assert_eq!(agent_type.as_str().parse::<AgentType>().unwrap(), agent_type);
        }
        assert_eq!("claude".parse::<AgentType>().unwrap(), AgentType::ClaudeCode);
        assert!("vim".parse::<AgentType>().is_err());
    }

    #[test]
    fn unknown_option_key_is_rejected() {
        let err = validate_options(AgentType::ClaudeCode, &opts(&[("sandbox", "x")])).unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation { ref field, .. } if field == "options.sandbox"));
    }

    #[test]
    fn yolo_must_be_boolean() {
        assert!(validate_options(AgentType::Gemini, &opts(&[("yolo", "maybe")])).is_err());
        assert!(validate_options(AgentType::Gemini, &opts(&[("yolo", "true")])).is_ok());
    }

    #[test]
    fn unbalanced_args_are_rejected() {
        let err = validate_options(AgentType::Codex, &opts(&[("args", "--flag \"open")])).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn launch_args_follow_profile_defaults() {
        let mut profile = builtin_profiles().remove(0);
        profile.args = vec!["--verbose".to_string()];
        let args = profile
            .launch_args(&opts(&[("model", "opus"), ("args", "--add-dir '/tmp/a b'")]))
            .unwrap();
        assert_eq!(
            args,
            vec!["--verbose", "--add-dir", "/tmp/a b", "--model", "opus"]
        );
    }

    #[test]
    fn catalog_rejects_duplicate_and_empty_profiles() {
        let profile = AgentProfile::builtin("mine", "Mine", AgentType::Codex, "codex");
        assert!(AgentProfileCatalog::new(vec![profile.clone(), profile.clone()]).is_err());

        let mut empty = profile.clone();
        empty.command = "  ".to_string();
        assert!(AgentProfileCatalog::new(vec![empty]).is_err());
    }

    #[test]
    fn configured_profile_overrides_builtin() {
        let custom = AgentProfile::builtin("codex", "Codex Nightly", AgentType::Codex, "codex-nightly");
        let catalog = AgentProfileCatalog::new(vec![custom]).unwrap();
        assert_eq!(catalog.resolve("codex").unwrap().command, "codex-nightly");
        assert!(matches!(
            catalog.resolve("missing"),
            Err(OrchestratorError::AgentNotFound { .. })
        ));
    }
}
