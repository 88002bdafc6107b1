use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum OrchestratorError {
    Validation {
        field: String,
        message: String,
    },
    AgentNotFound {
        agent_id: String,
    },
    SessionNotFound {
        session_id: String,
    },
    SessionAlreadyExists {
        session_id: String,
    },
    ProcessSpawn {
        agent_id: String,
        message: String,
    },
    StorageCorruption {
        path: String,
        message: String,
    },
    DatabaseError {
        message: String,
    },
    Transport {
        session_id: String,
        operation: String,
        message: String,
    },
    ConfigError {
        key: String,
        message: String,
    },
    ShuttingDown,
}

impl OrchestratorError {
    pub fn validation(field: &str, message: impl ToString) -> Self {
        OrchestratorError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn spawn(agent_id: &str, error: impl ToString) -> Self {
        OrchestratorError::ProcessSpawn {
            agent_id: agent_id.to_string(),
            message: error.to_string(),
        }
    }

    pub fn transport(session_id: &str, operation: &str, error: impl ToString) -> Self {
        OrchestratorError::Transport {
            session_id: session_id.to_string(),
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }

    pub fn not_found(session_id: &str) -> Self {
        OrchestratorError::SessionNotFound {
            session_id: session_id.to_string(),
        }
    }

    /// Maps a store failure into the public taxonomy, keeping fatal corruption distinct.
    pub fn from_store(error: anyhow::Error) -> Self {
        if let Some(existing) = error.downcast_ref::<OrchestratorError>() {
            return existing.clone();
        }
        OrchestratorError::DatabaseError {
            message: format!("{error:#}"),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Validation { .. } | OrchestratorError::AgentNotFound { .. }
        )
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Validation { field, message } => {
                write!(f, "Invalid input for field '{field}': {message}")
            }
            Self::AgentNotFound { agent_id } => {
                write!(f, "Agent profile '{agent_id}' not found")
            }
            Self::SessionNotFound { session_id } => {
                write!(f, "Session '{session_id}' not found")
            }
            Self::SessionAlreadyExists { session_id } => {
                write!(f, "Session '{session_id}' already exists")
            }
            Self::ProcessSpawn { agent_id, message } => {
                write!(f, "Failed to spawn agent '{agent_id}': {message}")
            }
            Self::StorageCorruption { path, message } => {
                write!(f, "Session store at '{path}' is corrupt: {message}")
            }
            Self::DatabaseError { message } => {
                write!(f, "Database error: {message}")
            }
            Self::Transport {
                session_id,
                operation,
                message,
            } => {
                write!(
                    f,
                    "Terminal operation '{operation}' failed for session '{session_id}': {message}"
                )
            }
            Self::ConfigError { key, message } => {
                write!(f, "Configuration error for key '{key}': {message}")
            }
            Self::ShuttingDown => write!(f, "Daemon is shutting down"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<OrchestratorError> for String {
    fn from(error: OrchestratorError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let err = OrchestratorError::not_found("abc");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "SessionNotFound");
        assert_eq!(json["data"]["session_id"], "abc");
    }

    #[test]
    fn from_store_preserves_corruption_variant() {
        let original = OrchestratorError::StorageCorruption {
            path: "/tmp/sessions.db".into(),
            message: "file is not a database".into(),
        };
        let wrapped = anyhow::Error::new(original.clone());
        assert_eq!(OrchestratorError::from_store(wrapped), original);
    }

    #[test]
    fn from_store_wraps_plain_errors() {
        let err = OrchestratorError::from_store(anyhow::anyhow!("disk full"));
        assert!(matches!(err, OrchestratorError::DatabaseError { .. }));
        assert!(err.to_string().contains("disk full"));
    }
}
