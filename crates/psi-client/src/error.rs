//! Client error types

use psi_engine::{CacheError, EngineError};
use thiserror::Error;

use crate::orchestrator::RunState;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Server refused to open a session (status {status}): {message}")]
    SessionNegotiation { status: u16, message: String },

    #[error("Session {session_id} expired or is unknown to the server (status {status})")]
    SessionExpired { session_id: u64, status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Cache key {key} already holds a different value")]
    CacheKeyConflict { key: String },

    #[error("Cannot connect to the cache: {0}")]
    CacheConnection(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid key description: {0}")]
    InvalidKeyDescription(String),

    #[error("Cannot decode Bloom filter: {0}")]
    FilterDecode(String),

    #[error("Engine error: {0}")]
    Engine(EngineError),

    #[error("Operation {operation} is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: RunState,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<psi_core::Error> for ClientError {
    fn from(err: psi_core::Error) -> Self {
        match err {
            psi_core::Error::Io(e) => ClientError::Io(e),
            psi_core::Error::Json(e) => ClientError::Json(e),
            psi_core::Error::UnsupportedAlgorithm(name) => ClientError::UnsupportedAlgorithm(name),
            psi_core::Error::InvalidKeyDescription(msg) => ClientError::InvalidKeyDescription(msg),
            psi_core::Error::FilterDecode(msg) => ClientError::FilterDecode(msg),
        }
    }
}

impl From<CacheError> for ClientError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::KeyConflict { key } => ClientError::CacheKeyConflict { key },
            CacheError::Connection(msg) => ClientError::CacheConnection(msg),
            CacheError::Backend(msg) => ClientError::Cache(msg),
        }
    }
}

impl From<EngineError> for ClientError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Cache(e) => e.into(),
            EngineError::InvalidKeyDescription(msg) => ClientError::InvalidKeyDescription(msg),
            EngineError::UnsupportedAlgorithm(kind) => {
                ClientError::UnsupportedAlgorithm(format!("{} (no engine implementation)", kind))
            }
            other => ClientError::Engine(other),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
