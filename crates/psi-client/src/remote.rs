//! The server as seen by the orchestrator

use async_trait::async_trait;
use psi_core::{AlgorithmParameter, EntryCorrelationMap, ServerDatasetPage, SessionDescriptor};

use crate::error::Result;

/// One PSI server, reached over whatever transport the implementation uses
///
/// Implementations never retry. Submit and fetch report a vanished session
/// as [`ClientError::SessionExpired`](crate::ClientError::SessionExpired);
/// a refused open is [`ClientError::SessionNegotiation`](crate::ClientError::SessionNegotiation).
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Supported (algorithm, key size) pairs
    async fn list_parameters(&self) -> Result<Vec<AlgorithmParameter>>;

    async fn open_session(&self, parameter: AlgorithmParameter) -> Result<SessionDescriptor>;

    /// Send the client-encrypted map, receive the server's re-encryption
    async fn submit_client_set(
        &self,
        session_id: u64,
        map: &EntryCorrelationMap,
    ) -> Result<EntryCorrelationMap>;

    async fn fetch_server_page(&self, session_id: u64, page: u32, size: u32) -> Result<ServerDatasetPage>;
}
