//! psi-engine: Cryptographic engine for the client side of a PSI exchange
//!
//! The orchestrator drives a [`PsiEngine`] built by an [`EngineFactory`]
//! from the session's bootstrap parameters. The reference implementation
//! covers the commutative-encryption families:
//!
//! | Algorithm | Group | Key size |
//! |-----------|-------|----------|
//! | DH | RFC 3526 MODP prime | 2048 |
//! | ECDH | ristretto255 | 256 |
//!
//! Every cryptographic operation goes through a [`PsiCache`] so repeated
//! runs with a reused key skip recomputation.

mod cache;
pub mod cipher;
mod engine;
mod error;
mod factory;
mod server;

pub use cache::{InMemoryCache, NoCache, PsiCache};
pub use cipher::{CommutativeCipher, ModpCipher, RistrettoCipher};
pub use engine::{cache_key, PsiEngine, ReferenceEngine};
pub use error::{CacheError, EngineError, Result};
pub use factory::{EngineFactory, ReferenceEngineFactory};
pub use server::ReferenceServer;
