//! In-process PSI server for tests and demos
//!
//! `MockRemoteSession` plays the server with [`ReferenceServer`]: it keeps
//! one server key per parameter for its lifetime, so repeated runs against
//! the same mock see the same server ciphertexts. Knobs bend its behaviour
//! to exercise the client's edge cases.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use psi_core::{
    AlgorithmParameter, BloomFilterDescriptor, EntryCorrelationMap, ServerDatasetPage,
    SessionDescriptor,
};
use psi_engine::ReferenceServer;
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ClientError, Result};
use crate::remote::RemoteSession;

const DEFAULT_FPP: f64 = 0.01;
const SESSION_LIFETIME_MINUTES: i64 = 30;

struct OpenSession {
    server: Arc<ReferenceServer>,
    encrypted_dataset: Arc<Vec<String>>,
    pages_served: u32,
}

#[derive(Default)]
struct MockState {
    servers: HashMap<AlgorithmParameter, Arc<ReferenceServer>>,
    sessions: HashMap<u64, OpenSession>,
}

/// Call counters
#[derive(Debug, Default)]
pub struct MockCounters {
    pub list_parameters: AtomicUsize,
    pub open_session: AtomicUsize,
    pub submit_client_set: AtomicUsize,
    pub fetch_server_page: AtomicUsize,
}

pub struct MockRemoteSession {
    dataset: Vec<String>,
    parameters: Vec<AlgorithmParameter>,
    bloom_filter_age: Option<Duration>,
    corrupt_bloom_filter: bool,
    max_page_size: Option<u32>,
    empty_pages: BTreeSet<u32>,
    expire_on_submit: bool,
    expire_after_pages: Option<u32>,
    drop_reply_entry: bool,
    extra_reply_entry: bool,
    misnumber_pages: bool,
    next_session_id: AtomicU64,
    state: Mutex<MockState>,
    counters: MockCounters,
    fetched_pages: Mutex<Vec<u32>>,
}

impl MockRemoteSession {
    /// A server holding `dataset`, supporting the reference parameters
    pub fn new<I, S>(dataset: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dataset: Vec<String> = dataset.into_iter().map(Into::into).collect();
        dataset.sort();
        dataset.dedup();

        Self {
            dataset,
            parameters: ReferenceServer::supported_parameters(),
            bloom_filter_age: None,
            corrupt_bloom_filter: false,
            max_page_size: None,
            empty_pages: BTreeSet::new(),
            expire_on_submit: false,
            expire_after_pages: None,
            drop_reply_entry: false,
            extra_reply_entry: false,
            misnumber_pages: false,
            next_session_id: AtomicU64::new(1),
            state: Mutex::new(MockState::default()),
            counters: MockCounters::default(),
            fetched_pages: Mutex::new(Vec::new()),
        }
    }

    /// Restrict the parameters the server accepts
    pub fn with_parameters(mut self, parameters: Vec<AlgorithmParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Attach a Bloom filter created `age` ago to every session
    pub fn with_bloom_filter_age(mut self, age: Duration) -> Self {
        self.bloom_filter_age = Some(age);
        self
    }

    /// Send filter bytes no decoder accepts
    pub fn with_corrupt_bloom_filter(mut self) -> Self {
        self.corrupt_bloom_filter = true;
        self
    }

    /// Cap page sizes regardless of what the client asks for
    pub fn with_max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = Some(size);
        self
    }

    /// Serve these page indices empty (and not last)
    pub fn with_empty_pages(mut self, pages: impl IntoIterator<Item = u32>) -> Self {
        self.empty_pages = pages.into_iter().collect();
        self
    }

    /// Answer every client set submission with 408
    pub fn expire_on_submit(mut self) -> Self {
        self.expire_on_submit = true;
        self
    }

    /// Answer with 408 once `pages` pages of a session were served
    pub fn expire_after_pages(mut self, pages: u32) -> Self {
        self.expire_after_pages = Some(pages);
        self
    }

    /// Drop one entry from the re-encrypted client map
    pub fn with_dropped_reply_entry(mut self) -> Self {
        self.drop_reply_entry = true;
        self
    }

    /// Add one identifier the client never submitted to the re-encrypted map
    pub fn with_extra_reply_entry(mut self) -> Self {
        self.extra_reply_entry = true;
        self
    }

    /// Label every served page one index too high
    pub fn with_misnumbered_pages(mut self) -> Self {
        self.misnumber_pages = true;
        self
    }

    pub fn counters(&self) -> &MockCounters {
        &self.counters
    }

    /// Page indices fetched so far, in request order
    pub async fn fetched_pages(&self) -> Vec<u32> {
        self.fetched_pages.lock().await.clone()
    }

    fn bloom_filter(&self) -> Option<BloomFilterDescriptor> {
        let age = self.bloom_filter_age?;
        let serialized = if self.corrupt_bloom_filter {
            vec![9, 0, 0]
        } else {
            ReferenceServer::bloom_filter(self.dataset.iter().map(String::as_str), DEFAULT_FPP).to_bytes()
        };
        Some(BloomFilterDescriptor {
            serialized,
            created_at: Utc::now() - age,
        })
    }

    fn expired(session_id: u64) -> ClientError {
        ClientError::SessionExpired {
            session_id,
            status: 408,
        }
    }
}

/// Content ranges per page, with forced empty pages spliced in
///
/// The final page is the one that exhausts the content and every forced
/// empty index; an empty dataset still yields one (last) page.
fn page_layout(total: usize, size: usize, empty_pages: &BTreeSet<u32>) -> Vec<Range<usize>> {
    let mut layout = Vec::new();
    let mut offset = 0;
    let mut page: u32 = 0;
    let last_forced = empty_pages.iter().next_back().copied();

    loop {
        if empty_pages.contains(&page) {
            layout.push(offset..offset);
        } else if offset < total {
            let end = (offset + size).min(total);
            layout.push(offset..end);
            offset = end;
        } else {
            layout.push(offset..offset);
        }
        page += 1;
        if offset >= total && last_forced.map_or(true, |last| page > last) {
            break;
        }
    }
    layout
}

#[async_trait]
impl RemoteSession for MockRemoteSession {
    async fn list_parameters(&self) -> Result<Vec<AlgorithmParameter>> {
        self.counters.list_parameters.fetch_add(1, Ordering::SeqCst);
        Ok(self.parameters.clone())
    }

    async fn open_session(&self, parameter: AlgorithmParameter) -> Result<SessionDescriptor> {
        self.counters.open_session.fetch_add(1, Ordering::SeqCst);
        if !self.parameters.contains(&parameter) {
            return Err(ClientError::SessionNegotiation {
                status: 400,
                message: format!("parameter {} is not supported", parameter),
            });
        }

        let mut state = self.state.lock().await;
        let server = match state.servers.get(&parameter) {
            Some(server) => server.clone(),
            None => {
                let server = Arc::new(ReferenceServer::new(parameter).map_err(|e| {
                    ClientError::SessionNegotiation {
                        status: 400,
                        message: e.to_string(),
                    }
                })?);
                state.servers.insert(parameter, server.clone());
                server
            }
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let encrypted_dataset = Arc::new(server.encrypt_dataset(self.dataset.iter().map(String::as_str)));
        let descriptor = SessionDescriptor {
            session_id,
            expiration: Utc::now() + Duration::minutes(SESSION_LIFETIME_MINUTES),
            bootstrap: server.bootstrap(),
            bloom_filter: self.bloom_filter(),
        };
        state.sessions.insert(
            session_id,
            OpenSession {
                server,
                encrypted_dataset,
                pages_served: 0,
            },
        );
        Ok(descriptor)
    }

    async fn submit_client_set(
        &self,
        session_id: u64,
        map: &EntryCorrelationMap,
    ) -> Result<EntryCorrelationMap> {
        self.counters.submit_client_set.fetch_add(1, Ordering::SeqCst);
        if self.expire_on_submit {
            return Err(Self::expired(session_id));
        }

        let server = {
            let state = self.state.lock().await;
            let session = state
                .sessions
                .get(&session_id)
                .ok_or_else(|| ClientError::SessionExpired { session_id, status: 404 })?;
            session.server.clone()
        };

        let mut reply = server
            .encrypt_client_map(map)
            .map_err(|e| ClientError::Transport(format!("HTTP 400 Bad Request: {}", e)))?;
        if self.drop_reply_entry {
            if let Some(id) = reply.ids().into_iter().next_back() {
                reply = reply.iter().filter(|(i, _)| *i != id).map(|(i, v)| (i, v.to_string())).collect();
            }
        }
        if self.extra_reply_entry {
            let id = reply.ids().into_iter().next_back().map_or(0, |last| last + 1);
            let value = reply.iter().next().map(|(_, v)| v.to_string()).unwrap_or_default();
            reply.insert(id, value);
        }
        Ok(reply)
    }

    async fn fetch_server_page(&self, session_id: u64, page: u32, size: u32) -> Result<ServerDatasetPage> {
        self.counters.fetch_server_page.fetch_add(1, Ordering::SeqCst);
        self.fetched_pages.lock().await.push(page);

        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| ClientError::SessionExpired { session_id, status: 404 })?;
        if matches!(self.expire_after_pages, Some(limit) if session.pages_served >= limit) {
            return Err(Self::expired(session_id));
        }
        if size == 0 {
            return Err(ClientError::Transport("HTTP 400 Bad Request: size must be positive".into()));
        }

        let size = self.max_page_size.map_or(size, |max| size.min(max));
        let layout = page_layout(session.encrypted_dataset.len(), size as usize, &self.empty_pages);
        let range = layout
            .get(page as usize)
            .cloned()
            .ok_or_else(|| ClientError::Transport(format!("HTTP 400 Bad Request: page {} out of range", page)))?;
        session.pages_served += 1;

        let content = session.encrypted_dataset[range].to_vec();
        Ok(ServerDatasetPage {
            page: if self.misnumber_pages { page + 1 } else { page },
            size,
            entries: content.len() as u32,
            last: page as usize + 1 == layout.len(),
            total_pages: Some(layout.len() as u32),
            total_entries: Some(session.encrypted_dataset.len() as u64),
            content,
        })
    }
}
