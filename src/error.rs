use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Connection to {endpoint} failed: {reason}")]
    Connectivity { endpoint: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not enough non-overlapping placements: got {available}, need {requested}")]
    Capacity { available: usize, requested: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Recoverability class of a [`SwarmError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Protocol,
    Validation,
    Capacity,
    Config,
    Internal,
}

impl SwarmError {
    pub fn connectivity(endpoint: impl ToString, reason: impl ToString) -> Self {
        SwarmError::Connectivity {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SwarmError::Connectivity { .. } | SwarmError::Io(_) => ErrorKind::Connectivity,
            SwarmError::Protocol(_) | SwarmError::Json(_) => ErrorKind::Protocol,
            SwarmError::Validation(_) => ErrorKind::Validation,
            SwarmError::Capacity { .. } => ErrorKind::Capacity,
            SwarmError::Config(_) | SwarmError::Yaml(_) => ErrorKind::Config,
            SwarmError::Task(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
