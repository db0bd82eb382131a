//! Engine construction from negotiated bootstrap parameters

use psi_core::constants::{EC_KEY_SIZE, EC_SPEC_NAME};
use psi_core::{AlgorithmKind, EngineBootstrap, KeyDescription};
use std::sync::Arc;

use crate::cache::PsiCache;
use crate::cipher::{parse_decimal, CommutativeCipher, ModpCipher, RistrettoCipher};
use crate::engine::{PsiEngine, ReferenceEngine};
use crate::error::{EngineError, Result};

/// Builds an engine for one session
///
/// With `key` present the engine reuses that key material, so its
/// ciphertexts match earlier runs; otherwise a fresh key is drawn.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        bootstrap: &EngineBootstrap,
        key: Option<&KeyDescription>,
        cache: Arc<dyn PsiCache>,
    ) -> Result<Box<dyn PsiEngine>>;
}

/// Factory for [`ReferenceEngine`]: DH over MODP groups, ECDH over ristretto255
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEngineFactory;

impl ReferenceEngineFactory {
    fn cipher(
        bootstrap: &EngineBootstrap,
        key: Option<&KeyDescription>,
    ) -> Result<Box<dyn CommutativeCipher>> {
        let parameter = bootstrap.parameter();
        match parameter.algorithm {
            AlgorithmKind::DiffieHellman => {
                let modulus = bootstrap
                    .modulus
                    .as_deref()
                    .ok_or_else(|| EngineError::InvalidBootstrap("DH session carries no modulus".into()))?;
                let modulus = parse_decimal(modulus, "modulus")
                    .map_err(|_| EngineError::InvalidBootstrap("modulus is not a decimal number".into()))?;
                if modulus.bits() != u64::from(parameter.key_size) {
                    return Err(EngineError::InvalidBootstrap(format!(
                        "modulus has {} bits, session negotiated {}",
                        modulus.bits(),
                        parameter.key_size
                    )));
                }

                let cipher = match key {
                    Some(key) => ModpCipher::from_key_description(key, &modulus)?,
                    None => ModpCipher::generate(modulus)?,
                };
                Ok(Box::new(cipher))
            }
            AlgorithmKind::EcDiffieHellman => {
                if parameter.key_size != EC_KEY_SIZE {
                    return Err(EngineError::UnsupportedKeySize {
                        algorithm: parameter.algorithm,
                        key_size: parameter.key_size,
                    });
                }
                if let Some(curve) = bootstrap.ec_spec_name.as_deref() {
                    if !curve.eq_ignore_ascii_case(EC_SPEC_NAME) {
                        return Err(EngineError::InvalidBootstrap(format!("unsupported curve {}", curve)));
                    }
                }

                let cipher = match key {
                    Some(key) => RistrettoCipher::from_key_description(key)?,
                    None => RistrettoCipher::generate()?,
                };
                Ok(Box::new(cipher))
            }
            other => Err(EngineError::UnsupportedAlgorithm(other)),
        }
    }
}

impl EngineFactory for ReferenceEngineFactory {
    fn create(
        &self,
        bootstrap: &EngineBootstrap,
        key: Option<&KeyDescription>,
        cache: Arc<dyn PsiCache>,
    ) -> Result<Box<dyn PsiEngine>> {
        let cipher = Self::cipher(bootstrap, key)?;
        tracing::debug!(
            algorithm = %bootstrap.parameter(),
            reused_key = key.is_some(),
            "Created engine"
        );
        Ok(Box::new(ReferenceEngine::new(cipher, cache)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoCache;
    use crate::cipher::modp_2048;
    use psi_core::AlgorithmParameter;

    fn dh_bootstrap() -> EngineBootstrap {
        let mut bootstrap = EngineBootstrap::new(AlgorithmParameter::new(AlgorithmKind::DiffieHellman, 2048));
        bootstrap.modulus = Some(modp_2048().unwrap().to_str_radix(10));
        bootstrap
    }

    fn ecdh_bootstrap(key_size: u32) -> EngineBootstrap {
        let mut bootstrap = EngineBootstrap::new(AlgorithmParameter::new(AlgorithmKind::EcDiffieHellman, key_size));
        bootstrap.ec_spec_name = Some(EC_SPEC_NAME.into());
        bootstrap
    }

    #[test]
    fn test_creates_supported_engines() {
        let factory = ReferenceEngineFactory;
        let engine = factory.create(&dh_bootstrap(), None, Arc::new(NoCache)).unwrap();
        assert_eq!(engine.algorithm(), AlgorithmKind::DiffieHellman);

        let engine = factory.create(&ecdh_bootstrap(256), None, Arc::new(NoCache)).unwrap();
        assert_eq!(engine.algorithm(), AlgorithmKind::EcDiffieHellman);
    }

    #[test]
    fn test_blind_signature_families_unsupported() {
        let factory = ReferenceEngineFactory;
        for kind in [AlgorithmKind::BlindSignature, AlgorithmKind::EcBlindSignature] {
            let bootstrap = EngineBootstrap::new(AlgorithmParameter::new(kind, 2048));
            let err = factory.create(&bootstrap, None, Arc::new(NoCache)).err().unwrap();
            assert!(matches!(err, EngineError::UnsupportedAlgorithm(k) if k == kind));
        }
    }

    #[test]
    fn test_dh_bootstrap_validation() {
        let factory = ReferenceEngineFactory;

        let mut missing = dh_bootstrap();
        missing.modulus = None;
        assert!(matches!(
            factory.create(&missing, None, Arc::new(NoCache)),
            Err(EngineError::InvalidBootstrap(_))
        ));

        let mut wrong_width = dh_bootstrap();
        wrong_width.psi_algorithm_parameter.key_size = 4096;
        assert!(matches!(
            factory.create(&wrong_width, None, Arc::new(NoCache)),
            Err(EngineError::InvalidBootstrap(_))
        ));
    }

    #[test]
    fn test_ecdh_key_size_checked() {
        let factory = ReferenceEngineFactory;
        assert!(matches!(
            factory.create(&ecdh_bootstrap(384), None, Arc::new(NoCache)),
            Err(EngineError::UnsupportedKeySize { key_size: 384, .. })
        ));
    }

    #[test]
    fn test_reused_key_reproduces_key_description() {
        let factory = ReferenceEngineFactory;
        let first = factory.create(&dh_bootstrap(), None, Arc::new(NoCache)).unwrap();
        let key = first.export_key_description();

        let second = factory.create(&dh_bootstrap(), Some(&key), Arc::new(NoCache)).unwrap();
        assert_eq!(second.export_key_description(), key);
    }

    #[test]
    fn test_key_from_other_family_rejected() {
        let factory = ReferenceEngineFactory;
        let ec_key = factory
            .create(&ecdh_bootstrap(256), None, Arc::new(NoCache))
            .unwrap()
            .export_key_description();
        assert!(matches!(
            factory.create(&dh_bootstrap(), Some(&ec_key), Arc::new(NoCache)),
            Err(EngineError::InvalidKeyDescription(_))
        ));
    }
}
