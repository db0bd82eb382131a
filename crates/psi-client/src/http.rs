//! HTTP implementation of [`RemoteSession`]

use async_trait::async_trait;
use psi_core::wire::{AlgorithmParameterList, AlgorithmParameterRequest, DatasetMapMessage};
use psi_core::{AlgorithmParameter, EntryCorrelationMap, ServerDatasetPage, SessionDescriptor};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::remote::RemoteSession;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which call a non-success status came back from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    ListParameters,
    OpenSession,
    Session(u64),
}

/// Map a non-success status to the client error for `call`
pub fn status_error(call: Call, status: u16, body: &str) -> ClientError {
    match call {
        Call::OpenSession => ClientError::SessionNegotiation {
            status,
            message: error_message(status, body),
        },
        Call::Session(session_id) if status == 404 || status == 408 => {
            ClientError::SessionExpired { session_id, status }
        }
        _ => ClientError::Transport(error_message(status, body)),
    }
}

/// `"HTTP 400: <first line of body>"`, or just the status for empty bodies
pub fn error_message(status: u16, body: &str) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    match body.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => format!("HTTP {} {}: {}", status, reason, line),
        None => format!("HTTP {} {}", status, reason),
    }
}

/// Validate a server URL and strip trailing slashes
pub fn normalize_base_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed)
        .map_err(|e| ClientError::Config(format!("invalid server URL {:?}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::Config(format!(
            "server URL must use http or https, got {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ClientError::Config(format!("server URL {:?} has no host", url)));
    }
    Ok(trimmed.to_string())
}

/// Client for a PSI server's REST API
pub struct HttpSessionClient {
    http: Client,
    base_url: String,
}

impl HttpSessionClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn decode<T: DeserializeOwned>(call: Call, resp: Response) -> Result<T> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(status_error(call, status.as_u16(), &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("malformed response body: {}", e)))
    }
}

#[async_trait]
impl RemoteSession for HttpSessionClient {
    async fn list_parameters(&self) -> Result<Vec<AlgorithmParameter>> {
        let url = format!("{}/psi/parameters", self.base_url);
        let resp = self.http.get(&url).send().await?;
        let list: AlgorithmParameterList = Self::decode(Call::ListParameters, resp).await?;
        Ok(list.content)
    }

    async fn open_session(&self, parameter: AlgorithmParameter) -> Result<SessionDescriptor> {
        let url = format!("{}/psi", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&AlgorithmParameterRequest { content: parameter })
            .send()
            .await?;
        Self::decode(Call::OpenSession, resp).await
    }

    async fn submit_client_set(
        &self,
        session_id: u64,
        map: &EntryCorrelationMap,
    ) -> Result<EntryCorrelationMap> {
        let url = format!("{}/psi/{}/clientSet", self.base_url, session_id);
        let resp = self
            .http
            .post(&url)
            .json(&DatasetMapMessage::from(map.clone()))
            .send()
            .await?;
        let reply: DatasetMapMessage = Self::decode(Call::Session(session_id), resp).await?;
        Ok(reply.content)
    }

    async fn fetch_server_page(&self, session_id: u64, page: u32, size: u32) -> Result<ServerDatasetPage> {
        let url = format!("{}/psi/{}/serverSet", self.base_url, session_id);
        tracing::debug!(session_id, page, size, "Fetching server page");
        let resp = self
            .http
            .get(&url)
            .query(&[("page", page), ("size", size)])
            .send()
            .await?;
        Self::decode(Call::Session(session_id), resp).await
    }
}
