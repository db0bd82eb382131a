//! psi-client: Client side of a two-party PSI exchange
//!
//! The [`Orchestrator`] runs one PSI session against a [`RemoteSession`]:
//!
//! 1. negotiate `(algorithm, key size)` and receive bootstrap parameters
//! 2. optionally shrink the dataset with the server's Bloom filter
//! 3. encrypt the dataset, have the server re-encrypt it
//! 4. page through the server's encrypted dataset
//! 5. match doubly encrypted values and map them back to plaintexts
//!
//! [`HttpSessionClient`] talks to a real server over REST; [`MockRemoteSession`]
//! serves the same protocol in-process.
//!
//! # Example
//!
//! ```ignore
//! use psi_client::{HttpSessionClient, Orchestrator};
//! use std::sync::Arc;
//!
//! let remote = Arc::new(HttpSessionClient::new("http://localhost:8080")?);
//! let mut orchestrator = Orchestrator::builder(remote).page_size(500).build();
//! let report = orchestrator.run(&dataset, "ECDH", 256).await?;
//! println!("{} common entries", report.intersection.len());
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub mod orchestrator;
pub mod redis_cache;
pub mod remote;

pub use config::{CacheConfig, ClientConfig};
pub use error::{ClientError, Result};
pub use http::HttpSessionClient;
pub use mock::MockRemoteSession;
pub use orchestrator::{
    ExecutionReport, IngestSummary, Orchestrator, OrchestratorBuilder, RunFailure, RunState,
};
pub use redis_cache::{cache_from_config, RedisCache};
pub use remote::RemoteSession;
