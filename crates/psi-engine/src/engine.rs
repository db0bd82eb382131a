//! The engine capability and its cached reference implementation

use async_trait::async_trait;
use psi_core::{AlgorithmKind, EntryCorrelationMap, IndexedDataset, KeyDescription, PhaseStatistics, PsiPhase};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::cache::PsiCache;
use crate::cipher::CommutativeCipher;
use crate::error::{EngineError, Result};

/// Client-side cryptographic half of one PSI run
///
/// Calls arrive in protocol order: `encrypt_locally`, then
/// `load_remote_encrypted_map`, then any number of `ingest_server_page`,
/// then `compute_intersection`.
#[async_trait]
pub trait PsiEngine: Send + Sync {
    fn algorithm(&self) -> AlgorithmKind;

    /// Encrypt every client entry under the client key, keeping ids
    async fn encrypt_locally(&mut self, dataset: &IndexedDataset) -> Result<EntryCorrelationMap>;

    /// Accept the server's re-encryption of the map from `encrypt_locally`
    fn load_remote_encrypted_map(&mut self, map: EntryCorrelationMap) -> Result<()>;

    /// Apply the client key to one page of server-encrypted entries
    async fn ingest_server_page(&mut self, page: &[String]) -> Result<()>;

    /// Client plaintexts whose doubly encrypted form appears in the server set
    fn compute_intersection(&self) -> Result<BTreeSet<String>>;

    fn export_key_description(&self) -> KeyDescription;

    /// One entry per phase that ran, in phase order
    fn statistics(&self) -> Vec<PhaseStatistics>;
}

/// Engine over any [`CommutativeCipher`], consulting a [`PsiCache`]
pub struct ReferenceEngine {
    cipher: Box<dyn CommutativeCipher>,
    cache: Arc<dyn PsiCache>,
    plaintexts: Option<BTreeMap<u64, String>>,
    double_encrypted: Option<EntryCorrelationMap>,
    server_set: HashSet<String>,
    client_stats: Option<PhaseStatistics>,
    server_stats: Option<PhaseStatistics>,
}

const TAG_PLAINTEXT: &str = "plaintext";
const TAG_ELEMENT: &str = "element";

impl ReferenceEngine {
    pub fn new(cipher: Box<dyn CommutativeCipher>, cache: Arc<dyn PsiCache>) -> Self {
        Self {
            cipher,
            cache,
            plaintexts: None,
            double_encrypted: None,
            server_set: HashSet::new(),
            client_stats: None,
            server_stats: None,
        }
    }

    /// Cache key for one operation, scoped to this engine's key material
    pub fn cache_key(&self, tag: &str, input: &str) -> String {
        cache_key(self.cipher.algorithm(), self.cipher.fingerprint(), tag, input)
    }

    async fn cached<F>(&self, tag: &str, input: &str, stats: &mut PhaseStatistics, compute: F) -> Result<String>
    where
        F: FnOnce(&dyn CommutativeCipher) -> Result<String> + Send,
    {
        let key = self.cache_key(tag, input);
        if let Some(hit) = self.cache.get(&key).await? {
            stats.cache_hit += 1;
            return Ok(hit);
        }

        let value = compute(self.cipher.as_ref())?;
        self.cache.put(&key, &value).await?;
        stats.cache_miss += 1;
        Ok(value)
    }
}

/// `psi:<hex sha256(algorithm | fingerprint | tag | input)>`
pub fn cache_key(algorithm: AlgorithmKind, fingerprint: &str, tag: &str, input: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [algorithm.as_str(), fingerprint, tag, input] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    format!("psi:{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl PsiEngine for ReferenceEngine {
    fn algorithm(&self) -> AlgorithmKind {
        self.cipher.algorithm()
    }

    async fn encrypt_locally(&mut self, dataset: &IndexedDataset) -> Result<EntryCorrelationMap> {
        let mut stats = PhaseStatistics::new(PsiPhase::ClientEncryption);
        let mut encrypted = EntryCorrelationMap::new();
        let mut plaintexts = BTreeMap::new();

        for (id, entry) in dataset.iter() {
            let ciphertext = self
                .cached(TAG_PLAINTEXT, entry, &mut stats, |c| Ok(c.encrypt_plaintext(entry)))
                .await?;
            encrypted.insert(id, ciphertext);
            plaintexts.insert(id, entry.to_string());
        }

        tracing::debug!(
            entries = encrypted.len(),
            cache_hit = stats.cache_hit,
            cache_miss = stats.cache_miss,
            "Encrypted client dataset"
        );

        self.plaintexts = Some(plaintexts);
        self.client_stats = Some(stats);
        Ok(encrypted)
    }

    fn load_remote_encrypted_map(&mut self, map: EntryCorrelationMap) -> Result<()> {
        let plaintexts = self
            .plaintexts
            .as_ref()
            .ok_or(EngineError::NotReady("client dataset has not been encrypted"))?;

        let expected: BTreeSet<u64> = plaintexts.keys().copied().collect();
        let received = map.ids();
        let mismatched: Vec<u64> = expected.symmetric_difference(&received).copied().collect();
        if !mismatched.is_empty() {
            return Err(EngineError::CorrelationMismatch(mismatched));
        }

        self.double_encrypted = Some(map);
        Ok(())
    }

    async fn ingest_server_page(&mut self, page: &[String]) -> Result<()> {
        let mut stats = self
            .server_stats
            .unwrap_or_else(|| PhaseStatistics::new(PsiPhase::ServerSetProcessing));

        let mut processed = Vec::with_capacity(page.len());
        for element in page {
            let value = self
                .cached(TAG_ELEMENT, element, &mut stats, |c| c.encrypt_element(element))
                .await?;
            processed.push(value);
        }
        self.server_set.extend(processed);
        self.server_stats = Some(stats);

        tracing::debug!(
            page_entries = page.len(),
            server_set = self.server_set.len(),
            "Ingested server page"
        );
        Ok(())
    }

    fn compute_intersection(&self) -> Result<BTreeSet<String>> {
        let plaintexts = self
            .plaintexts
            .as_ref()
            .ok_or(EngineError::NotReady("client dataset has not been encrypted"))?;
        let double_encrypted = self
            .double_encrypted
            .as_ref()
            .ok_or(EngineError::NotReady("server re-encryption has not been loaded"))?;

        let mut intersection = BTreeSet::new();
        for (id, value) in double_encrypted.iter() {
            if !self.server_set.contains(value) {
                continue;
            }
            let plaintext = plaintexts
                .get(&id)
                .ok_or_else(|| EngineError::CorrelationMismatch(vec![id]))?;
            intersection.insert(plaintext.clone());
        }
        Ok(intersection)
    }

    fn export_key_description(&self) -> KeyDescription {
        self.cipher.key_description()
    }

    fn statistics(&self) -> Vec<PhaseStatistics> {
        self.client_stats
            .into_iter()
            .chain(self.server_stats)
            .collect()
    }
}
