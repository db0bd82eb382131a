//! Session orchestrator: drives one PSI run from negotiation to result
//!
//! ```text
//! Init -> SessionOpened -> [Filtered] -> EngineReady -> ClientSetSubmitted
//!      -> ServerSetIngesting -> ServerSetComplete -> IntersectionComputed -> Terminal
//! ```
//!
//! Any error moves the orchestrator to `Failed`; a failed orchestrator
//! refuses every later operation, so no partial result can escape an
//! aborted run.

use chrono::{DateTime, Duration, Utc};
use psi_core::{
    apply_pre_filter, AlgorithmKind, AlgorithmParameter, ClientDataset, ExecutionStatistics,
    IndexedDataset, KeyDescription, KeyMaterialStore, PreFilterOutcome, SessionDescriptor,
};
use psi_engine::{EngineFactory, NoCache, PsiCache, PsiEngine, ReferenceEngineFactory};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::error::{ClientError, Result};
use crate::remote::RemoteSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    SessionOpened,
    Filtered,
    EngineReady,
    ClientSetSubmitted,
    ServerSetIngesting,
    ServerSetComplete,
    IntersectionComputed,
    Terminal,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::SessionOpened => "session_opened",
            RunState::Filtered => "filtered",
            RunState::EngineReady => "engine_ready",
            RunState::ClientSetSubmitted => "client_set_submitted",
            RunState::ServerSetIngesting => "server_set_ingesting",
            RunState::ServerSetComplete => "server_set_complete",
            RunState::IntersectionComputed => "intersection_computed",
            RunState::Terminal => "terminal",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Totals over the server dataset pages of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub pages: u32,
    pub entries: u64,
}

/// Outcome of a successful [`Orchestrator::run`]
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub session_id: u64,
    pub parameter: AlgorithmParameter,
    pub pre_filter: PreFilterOutcome,
    /// Client entries sent to the server after pre-filtering
    pub submitted_entries: usize,
    pub ingest: IngestSummary,
    pub intersection: BTreeSet<String>,
    pub key_description: KeyDescription,
    pub statistics: ExecutionStatistics,
}

impl ExecutionReport {
    /// Write the intersection, one entry per line in sorted order
    pub fn write_intersection(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut content = String::new();
        for entry in &self.intersection {
            content.push_str(entry);
            content.push('\n');
        }
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

/// A run that stopped early, with whatever statistics the engine gathered
#[derive(Error, Debug)]
#[error("PSI run failed in state {phase}: {error}")]
pub struct RunFailure {
    /// State the orchestrator was in when the failing operation started
    pub phase: RunState,
    #[source]
    pub error: ClientError,
    pub statistics: ExecutionStatistics,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    remote: Arc<dyn RemoteSession>,
    factory: Arc<dyn EngineFactory>,
    cache: Arc<dyn PsiCache>,
    key_description: Option<KeyDescription>,
    key_output: Option<PathBuf>,
    page_size: u32,
    bloom_filter_max_age: Option<Duration>,
    clock: Clock,
}

impl OrchestratorBuilder {
    pub fn new(remote: Arc<dyn RemoteSession>) -> Self {
        Self {
            remote,
            factory: Arc::new(ReferenceEngineFactory),
            cache: Arc::new(NoCache),
            key_description: None,
            key_output: None,
            page_size: psi_core::constants::DEFAULT_PAGE_SIZE,
            bloom_filter_max_age: None,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn PsiCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Reuse key material from an earlier run
    pub fn key_description(mut self, key: KeyDescription) -> Self {
        self.key_description = Some(key);
        self
    }

    /// Persist the run's key description here when [`Orchestrator::run`] finishes
    pub fn key_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_output = Some(path.into());
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Enable Bloom pre-filtering for filters younger than `max_age`
    pub fn bloom_filter_max_age(mut self, max_age: Duration) -> Self {
        self.bloom_filter_max_age = Some(max_age);
        self
    }

    pub fn clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            remote: self.remote,
            factory: self.factory,
            cache: self.cache,
            key_description: self.key_description,
            key_output: self.key_output,
            page_size: self.page_size,
            bloom_filter_max_age: self.bloom_filter_max_age,
            clock: self.clock,
            state: RunState::Init,
            session: None,
            dataset: None,
            pre_filter: None,
            engine: None,
            submitted_entries: 0,
            ingest: IngestSummary::default(),
            result: None,
        }
    }
}

/// One PSI run against one remote session
pub struct Orchestrator {
    remote: Arc<dyn RemoteSession>,
    factory: Arc<dyn EngineFactory>,
    cache: Arc<dyn PsiCache>,
    key_description: Option<KeyDescription>,
    key_output: Option<PathBuf>,
    page_size: u32,
    bloom_filter_max_age: Option<Duration>,
    clock: Clock,
    state: RunState,
    session: Option<SessionDescriptor>,
    dataset: Option<ClientDataset>,
    pre_filter: Option<PreFilterOutcome>,
    engine: Option<Box<dyn PsiEngine>>,
    submitted_entries: usize,
    ingest: IngestSummary,
    result: Option<BTreeSet<String>>,
}

impl Orchestrator {
    pub fn builder(remote: Arc<dyn RemoteSession>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(remote)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn session(&self) -> Option<&SessionDescriptor> {
        self.session.as_ref()
    }

    pub fn pre_filter_outcome(&self) -> Option<PreFilterOutcome> {
        self.pre_filter
    }

    pub fn submitted_entries(&self) -> usize {
        self.submitted_entries
    }

    pub fn ingest_summary(&self) -> IngestSummary {
        self.ingest
    }

    /// True once the clock has passed the session's expiration
    pub fn session_expired(&self) -> bool {
        let now = (self.clock)();
        self.session.as_ref().is_some_and(|s| s.is_expired_at(now))
    }

    fn warn_if_expired(&self, session_id: u64, operation: &'static str) {
        if self.session_expired() {
            tracing::warn!(session_id, operation, "Session expiration has passed, the server may refuse");
        }
    }

    /// Engine statistics so far; empty before the engine exists
    pub fn statistics(&self) -> ExecutionStatistics {
        let phases = self.engine.as_ref().map(|e| e.statistics()).unwrap_or_default();
        ExecutionStatistics::from_phases(phases)
    }

    fn expect_state(&self, operation: &'static str, allowed: &[RunState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Move to `Failed` on error; `Terminal` and `Failed` are never left
    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() && self.state != RunState::Terminal {
            self.state = RunState::Failed;
        }
        result
    }

    fn session_id(&self) -> Result<u64> {
        self.session
            .as_ref()
            .map(|s| s.session_id)
            .ok_or(ClientError::InvalidState {
                operation: "session_id",
                state: self.state,
            })
    }

    fn engine_mut(&mut self, operation: &'static str) -> Result<&mut Box<dyn PsiEngine>> {
        let state = self.state;
        self.engine
            .as_mut()
            .ok_or(ClientError::InvalidState { operation, state })
    }

    /// Negotiate a session for `algorithm` at `key_size`
    pub async fn open_session(&mut self, algorithm: &str, key_size: u32) -> Result<SessionDescriptor> {
        let result = self.open_session_inner(algorithm, key_size).await;
        self.record(result)
    }

    async fn open_session_inner(&mut self, algorithm: &str, key_size: u32) -> Result<SessionDescriptor> {
        self.expect_state("open_session", &[RunState::Init])?;
        let kind: AlgorithmKind = algorithm.parse()?;
        let parameter = AlgorithmParameter::new(kind, key_size);

        let session = self.remote.open_session(parameter).await?;
        if session.parameter() != parameter {
            return Err(ClientError::Protocol(format!(
                "requested {} but the server opened {}",
                parameter,
                session.parameter()
            )));
        }

        tracing::info!(
            session_id = session.session_id,
            algorithm = %parameter,
            expiration = %session.expiration,
            bloom_filter = session.bloom_filter.is_some(),
            "Session opened"
        );
        self.session = Some(session.clone());
        self.state = RunState::SessionOpened;
        Ok(session)
    }

    /// Shrink `dataset` with the session's Bloom filter when it is fresh
    ///
    /// Absent, stale or disabled filtering keeps the dataset as given. The
    /// resulting dataset is what later phases encrypt.
    pub fn apply_pre_filter(
        &mut self,
        dataset: &ClientDataset,
        max_age: Option<Duration>,
    ) -> Result<PreFilterOutcome> {
        let result = self.apply_pre_filter_inner(dataset, max_age);
        self.record(result)
    }

    fn apply_pre_filter_inner(
        &mut self,
        dataset: &ClientDataset,
        max_age: Option<Duration>,
    ) -> Result<PreFilterOutcome> {
        self.expect_state("apply_pre_filter", &[RunState::SessionOpened])?;
        let descriptor = self.session.as_ref().and_then(|s| s.bloom_filter.as_ref());
        let now = (self.clock)();
        let (filtered, outcome) = apply_pre_filter(dataset, descriptor, max_age, now)?;

        match outcome {
            PreFilterOutcome::Disabled => {}
            PreFilterOutcome::Absent => tracing::debug!("Session carries no Bloom filter"),
            PreFilterOutcome::Stale { age } => tracing::info!(
                age_minutes = age.num_minutes(),
                "Bloom filter is stale, skipping pre-filter"
            ),
            PreFilterOutcome::Applied { before, after } => {
                tracing::info!(before, after, "Applied Bloom pre-filter");
                self.state = RunState::Filtered;
            }
        }

        self.dataset = Some(filtered);
        self.pre_filter = Some(outcome);
        Ok(outcome)
    }

    /// Build the engine from the session bootstrap, reusing key material if given
    pub fn prepare_engine(&mut self) -> Result<()> {
        let result = self.prepare_engine_inner();
        self.record(result)
    }

    fn prepare_engine_inner(&mut self) -> Result<()> {
        self.expect_state("prepare_engine", &[RunState::SessionOpened, RunState::Filtered])?;
        let session = self.session.as_ref().ok_or(ClientError::InvalidState {
            operation: "prepare_engine",
            state: self.state,
        })?;

        let algorithm = session.parameter().algorithm;
        if algorithm.has_client_secret() && self.key_description.is_none() {
            tracing::info!(%algorithm, "No key description given, drawing a fresh client key");
        }

        let engine = self.factory.create(
            &session.bootstrap,
            self.key_description.as_ref(),
            self.cache.clone(),
        )?;
        self.engine = Some(engine);
        self.state = RunState::EngineReady;
        Ok(())
    }

    /// Encrypt the client dataset, have the server re-encrypt it, and load the result
    ///
    /// Returns the number of entries submitted.
    pub async fn exchange_encrypted_sets(&mut self) -> Result<usize> {
        let result = self.exchange_encrypted_sets_inner().await;
        self.record(result)
    }

    async fn exchange_encrypted_sets_inner(&mut self) -> Result<usize> {
        self.expect_state("exchange_encrypted_sets", &[RunState::EngineReady])?;
        let session_id = self.session_id()?;
        let dataset = self.dataset.as_ref().ok_or(ClientError::InvalidState {
            operation: "exchange_encrypted_sets",
            state: self.state,
        })?;
        let indexed = IndexedDataset::from_dataset(dataset);
        let minted = indexed.ids();

        let engine = self.engine_mut("exchange_encrypted_sets")?;
        let encrypted = engine.encrypt_locally(&indexed).await?;
        if encrypted.ids() != minted {
            return Err(ClientError::Protocol(format!(
                "engine returned {} identifiers for {} entries",
                encrypted.len(),
                minted.len()
            )));
        }

        self.warn_if_expired(session_id, "submit_client_set");
        let reply = self.remote.submit_client_set(session_id, &encrypted).await?;
        let submitted_ids = encrypted.ids();
        let reply_ids = reply.ids();
        let missing: Vec<u64> = submitted_ids.difference(&reply_ids).copied().collect();
        let unexpected: Vec<u64> = reply_ids.difference(&submitted_ids).copied().collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(ClientError::Protocol(format!(
                "server reply identifiers differ from the submitted set (missing {:?}, unexpected {:?})",
                missing, unexpected
            )));
        }

        let submitted = encrypted.len();
        self.engine_mut("exchange_encrypted_sets")?
            .load_remote_encrypted_map(reply)?;
        self.submitted_entries = submitted;
        self.state = RunState::ClientSetSubmitted;

        tracing::info!(session_id, entries = submitted, "Client set exchanged");
        Ok(submitted)
    }

    /// Fetch and process every page of the server's encrypted dataset
    pub async fn ingest_server_dataset(&mut self, page_size: u32) -> Result<IngestSummary> {
        let result = self.ingest_server_dataset_inner(page_size).await;
        self.record(result)
    }

    async fn ingest_server_dataset_inner(&mut self, page_size: u32) -> Result<IngestSummary> {
        self.expect_state("ingest_server_dataset", &[RunState::ClientSetSubmitted])?;
        if page_size == 0 {
            return Err(ClientError::Config("page size must be positive".into()));
        }
        let session_id = self.session_id()?;
        self.state = RunState::ServerSetIngesting;
        self.warn_if_expired(session_id, "fetch_server_page");

        let mut summary = IngestSummary::default();
        let mut page: u32 = 0;
        loop {
            let response = self.remote.fetch_server_page(session_id, page, page_size).await?;
            if response.page != page {
                return Err(ClientError::Protocol(format!(
                    "requested page {} but received page {}",
                    page, response.page
                )));
            }
            if response.entries as usize != response.content.len() {
                tracing::warn!(
                    session_id,
                    page,
                    declared = response.entries,
                    received = response.content.len(),
                    "Page entry count disagrees with its content"
                );
            }

            self.engine_mut("ingest_server_dataset")?
                .ingest_server_page(&response.content)
                .await?;
            summary.pages += 1;
            summary.entries += response.content.len() as u64;
            tracing::debug!(session_id, page, entries = response.content.len(), "Processed server page");

            if response.last {
                break;
            }
            page = page
                .checked_add(1)
                .ok_or_else(|| ClientError::Protocol("server never sent a last page".into()))?;
        }

        tracing::info!(
            session_id,
            pages = summary.pages,
            entries = summary.entries,
            "Server dataset ingested"
        );
        self.ingest = summary;
        self.state = RunState::ServerSetComplete;
        Ok(summary)
    }

    /// The intersection; repeated calls return the same memoised set
    pub fn compute_result(&mut self) -> Result<BTreeSet<String>> {
        let result = self.compute_result_inner();
        self.record(result)
    }

    fn compute_result_inner(&mut self) -> Result<BTreeSet<String>> {
        self.expect_state(
            "compute_result",
            &[RunState::ServerSetComplete, RunState::IntersectionComputed],
        )?;
        if let Some(result) = &self.result {
            return Ok(result.clone());
        }

        let intersection = self.engine_mut("compute_result")?.compute_intersection()?;
        tracing::info!(entries = intersection.len(), "Intersection computed");
        self.result = Some(intersection.clone());
        self.state = RunState::IntersectionComputed;
        Ok(intersection)
    }

    /// The engine's key description, for reuse on a later run
    pub fn export_key_description(&self) -> Result<KeyDescription> {
        if self.state == RunState::Failed {
            return Err(ClientError::InvalidState {
                operation: "export_key_description",
                state: self.state,
            });
        }
        self.engine
            .as_ref()
            .map(|e| e.export_key_description())
            .ok_or(ClientError::InvalidState {
                operation: "export_key_description",
                state: self.state,
            })
    }

    /// Persist the key description to `path` and end the run
    pub fn finish(&mut self, path: impl AsRef<Path>) -> Result<KeyDescription> {
        let result = self.terminate(Some(path.as_ref()));
        self.record(result)
    }

    fn terminate(&mut self, path: Option<&Path>) -> Result<KeyDescription> {
        self.expect_state("finish", &[RunState::IntersectionComputed])?;
        let key = self.export_key_description()?;
        if let Some(path) = path {
            KeyMaterialStore::save(&key, path)?;
            tracing::info!(path = %path.display(), "Key description saved");
        }
        self.state = RunState::Terminal;
        Ok(key)
    }

    /// Drive every phase in order with the configured options
    pub async fn run(
        &mut self,
        dataset: &ClientDataset,
        algorithm: &str,
        key_size: u32,
    ) -> std::result::Result<ExecutionReport, RunFailure> {
        let phase = self.state;
        let session = match self.open_session(algorithm, key_size).await {
            Ok(session) => session,
            Err(error) => return Err(self.failure(phase, error)),
        };

        let phase = self.state;
        let max_age = self.bloom_filter_max_age;
        let pre_filter = match self.apply_pre_filter(dataset, max_age) {
            Ok(outcome) => outcome,
            Err(error) => return Err(self.failure(phase, error)),
        };

        let phase = self.state;
        if let Err(error) = self.prepare_engine() {
            return Err(self.failure(phase, error));
        }

        let phase = self.state;
        let submitted_entries = match self.exchange_encrypted_sets().await {
            Ok(n) => n,
            Err(error) => return Err(self.failure(phase, error)),
        };

        let phase = self.state;
        let page_size = self.page_size;
        let ingest = match self.ingest_server_dataset(page_size).await {
            Ok(summary) => summary,
            Err(error) => return Err(self.failure(phase, error)),
        };

        let phase = self.state;
        let intersection = match self.compute_result() {
            Ok(result) => result,
            Err(error) => return Err(self.failure(phase, error)),
        };

        let phase = self.state;
        let key_output = self.key_output.clone();
        let terminated = self.terminate(key_output.as_deref());
        let key_description = match self.record(terminated) {
            Ok(key) => key,
            Err(error) => return Err(self.failure(phase, error)),
        };

        let statistics = self.statistics();
        for phase in &statistics.phases {
            tracing::info!(
                phase = %phase.phase,
                operations = phase.operations(),
                cache_hit = phase.cache_hit,
                cache_miss = phase.cache_miss,
                "Phase statistics"
            );
        }

        Ok(ExecutionReport {
            session_id: session.session_id,
            parameter: session.parameter(),
            pre_filter,
            submitted_entries,
            ingest,
            intersection,
            key_description,
            statistics,
        })
    }

    fn failure(&self, phase: RunState, error: ClientError) -> RunFailure {
        let statistics = self.statistics();
        tracing::error!(phase = %phase, error = %error, "PSI run failed");
        RunFailure {
            phase,
            error,
            statistics,
        }
    }
}
