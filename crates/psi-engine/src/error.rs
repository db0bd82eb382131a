//! Engine and cache error types

use psi_core::AlgorithmKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache key {key} already holds a different value. Cache entries are write-once; this indicates key material drift or a cache key collision")]
    KeyConflict { key: String },

    #[error("Cannot connect to the cache: {0}")]
    Connection(String),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Invalid engine bootstrap parameters: {0}")]
    InvalidBootstrap(String),

    #[error("Invalid key description: {0}")]
    InvalidKeyDescription(String),

    #[error("Algorithm {0} is not supported by this engine")]
    UnsupportedAlgorithm(AlgorithmKind),

    #[error("Key size {key_size} is not supported for {algorithm}")]
    UnsupportedKeySize { algorithm: AlgorithmKind, key_size: u32 },

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Correlation mismatch: identifiers {0:?} are present in only one map")]
    CorrelationMismatch(Vec<u64>),

    #[error("Engine not ready: {0}")]
    NotReady(&'static str),
}

pub type Result<T> = std::result::Result<T, EngineError>;
