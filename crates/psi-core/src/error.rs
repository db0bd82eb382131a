//! Error types for psi-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported algorithm: {0}. Expected one of BS, DH, ECBS, ECDH")]
    UnsupportedAlgorithm(String),

    #[error("Invalid key description: {0}")]
    InvalidKeyDescription(String),

    #[error("Cannot decode Bloom filter: {0}")]
    FilterDecode(String),
}
