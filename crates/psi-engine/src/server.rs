//! Server-side counterpart of the reference engine
//!
//! Holds the server key and produces what a PSI server sends: bootstrap
//! parameters, the re-encrypted client map, encrypted dataset entries and a
//! Bloom filter over the plaintext dataset. Used by mock sessions and test
//! servers.

use psi_core::constants::{DEFAULT_KEY_SIZE, EC_KEY_SIZE, EC_SPEC_NAME};
use psi_core::{AlgorithmKind, AlgorithmParameter, BloomFilter, EngineBootstrap, EntryCorrelationMap};

use crate::cipher::{modp_2048, CommutativeCipher, ModpCipher, RistrettoCipher};
use crate::error::{EngineError, Result};

/// Generator advertised for the MODP group
const MODP_GENERATOR: &str = "2";

pub struct ReferenceServer {
    parameter: AlgorithmParameter,
    cipher: Box<dyn CommutativeCipher>,
    modulus: Option<String>,
}

impl ReferenceServer {
    /// Parameters the reference server accepts, in preference order
    pub fn supported_parameters() -> Vec<AlgorithmParameter> {
        vec![
            AlgorithmParameter::new(AlgorithmKind::EcDiffieHellman, EC_KEY_SIZE),
            AlgorithmParameter::new(AlgorithmKind::DiffieHellman, DEFAULT_KEY_SIZE),
        ]
    }

    /// Draw a fresh server key for `parameter`
    pub fn new(parameter: AlgorithmParameter) -> Result<Self> {
        match parameter.algorithm {
            AlgorithmKind::DiffieHellman => {
                if parameter.key_size != DEFAULT_KEY_SIZE {
                    return Err(EngineError::UnsupportedKeySize {
                        algorithm: parameter.algorithm,
                        key_size: parameter.key_size,
                    });
                }
                let cipher = ModpCipher::generate(modp_2048()?)?;
                let modulus = cipher.modulus().to_str_radix(10);
                Ok(Self {
                    parameter,
                    cipher: Box::new(cipher),
                    modulus: Some(modulus),
                })
            }
            AlgorithmKind::EcDiffieHellman => {
                if parameter.key_size != EC_KEY_SIZE {
                    return Err(EngineError::UnsupportedKeySize {
                        algorithm: parameter.algorithm,
                        key_size: parameter.key_size,
                    });
                }
                Ok(Self {
                    parameter,
                    cipher: Box::new(RistrettoCipher::generate()?),
                    modulus: None,
                })
            }
            other => Err(EngineError::UnsupportedAlgorithm(other)),
        }
    }

    pub fn parameter(&self) -> AlgorithmParameter {
        self.parameter
    }

    /// Public parameters the client engine is built from
    pub fn bootstrap(&self) -> EngineBootstrap {
        let mut bootstrap = EngineBootstrap::new(self.parameter);
        if self.parameter.algorithm.is_elliptic_curve() {
            bootstrap.ec_spec_name = Some(EC_SPEC_NAME.to_string());
        } else {
            bootstrap.modulus = self.modulus.clone();
            bootstrap.generator = Some(MODP_GENERATOR.to_string());
        }
        bootstrap
    }

    /// Apply the server key to every client ciphertext, keeping ids
    pub fn encrypt_client_map(&self, map: &EntryCorrelationMap) -> Result<EntryCorrelationMap> {
        map.iter()
            .map(|(id, element)| Ok((id, self.cipher.encrypt_element(element)?)))
            .collect()
    }

    /// Encrypt the server dataset, sorted so page boundaries are stable
    pub fn encrypt_dataset<'a>(&self, entries: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut encrypted: Vec<String> = entries
            .into_iter()
            .map(|entry| self.cipher.encrypt_plaintext(entry))
            .collect();
        encrypted.sort();
        encrypted
    }

    /// Bloom filter over the plaintext server dataset
    pub fn bloom_filter<'a>(entries: impl IntoIterator<Item = &'a str>, fpp: f64) -> BloomFilter {
        let entries: Vec<&str> = entries.into_iter().collect();
        BloomFilter::from_entries(entries.iter().copied(), entries.len() as u64, fpp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoCache;
    use crate::factory::{EngineFactory, ReferenceEngineFactory};
    use psi_core::{ClientDataset, IndexedDataset};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    async fn intersect(parameter: AlgorithmParameter, client: &[&str], server_entries: &[&str]) -> BTreeSet<String> {
        let server = ReferenceServer::new(parameter).unwrap();
        let mut engine = ReferenceEngineFactory
            .create(&server.bootstrap(), None, Arc::new(NoCache))
            .unwrap();

        let dataset = IndexedDataset::from_dataset(&client.iter().copied().collect::<ClientDataset>());
        let encrypted = engine.encrypt_locally(&dataset).await.unwrap();
        let reencrypted = server.encrypt_client_map(&encrypted).unwrap();
        engine.load_remote_encrypted_map(reencrypted).unwrap();

        let pages = server.encrypt_dataset(server_entries.iter().copied());
        for page in pages.chunks(2) {
            engine.ingest_server_page(page).await.unwrap();
        }
        engine.compute_intersection().unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_for_each_supported_parameter() {
        let expected: BTreeSet<String> = ["COMMON1", "COMMON2"].iter().map(|s| s.to_string()).collect();
        for parameter in ReferenceServer::supported_parameters() {
            let result = intersect(
                parameter,
                &["A", "B", "C", "COMMON1", "COMMON2"],
                &["COMMON1", "COMMON2", "X", "Y"],
            )
            .await;
            assert_eq!(result, expected, "parameter {}", parameter);
        }
    }

    #[test]
    fn test_bootstrap_shape() {
        let dh = ReferenceServer::new(AlgorithmParameter::new(AlgorithmKind::DiffieHellman, 2048)).unwrap();
        let bootstrap = dh.bootstrap();
        assert!(bootstrap.modulus.is_some());
        assert_eq!(bootstrap.generator.as_deref(), Some("2"));
        assert!(bootstrap.ec_spec_name.is_none());

        let ec = ReferenceServer::new(AlgorithmParameter::new(AlgorithmKind::EcDiffieHellman, 256)).unwrap();
        assert_eq!(ec.bootstrap().ec_spec_name.as_deref(), Some(EC_SPEC_NAME));
    }

    #[test]
    fn test_rejects_unsupported_parameters() {
        assert!(matches!(
            ReferenceServer::new(AlgorithmParameter::new(AlgorithmKind::DiffieHellman, 1024)),
            Err(EngineError::UnsupportedKeySize { .. })
        ));
        assert!(matches!(
            ReferenceServer::new(AlgorithmParameter::new(AlgorithmKind::BlindSignature, 2048)),
            Err(EngineError::UnsupportedAlgorithm(AlgorithmKind::BlindSignature))
        ));
    }

    #[test]
    fn test_bloom_filter_covers_dataset() {
        let filter = ReferenceServer::bloom_filter(["COMMON1", "COMMON2"], 0.01);
        assert!(filter.might_contain("COMMON1"));
        assert!(filter.might_contain("COMMON2"));
    }

    #[test]
    fn test_encrypted_client_map_keeps_ids() {
        let server = ReferenceServer::new(AlgorithmParameter::new(AlgorithmKind::EcDiffieHellman, 256)).unwrap();
        let client = RistrettoCipher::generate().unwrap();
        let map: EntryCorrelationMap = [(3u64, client.encrypt_plaintext("A")), (9, client.encrypt_plaintext("B"))]
            .into_iter()
            .collect();
        let out = server.encrypt_client_map(&map).unwrap();
        assert!(out.same_ids(&map));
        assert_ne!(out.get(3), map.get(3));
    }
}
