//! psi-core: Shared types for the client side of a two-party PSI protocol
//!
//! This crate defines everything both ends of the exchange agree on:
//! - Algorithm identifiers and negotiated parameters
//! - Session descriptors and the optional server Bloom filter
//! - Entry correlation maps and server dataset pages
//! - Key descriptions and their on-disk store
//! - The Bloom pre-filter and its wire codec
//!
//! # Protocol Summary
//!
//! | Step | Client | Server |
//! |------|--------|--------|
//! | 1 | open session with `(algorithm, key size)` | returns session, bootstrap params, Bloom filter |
//! | 2 | encrypts `id -> H(x)^a` | returns `id -> H(x)^ab` |
//! | 3 | fetches pages of `H(y)^b` | streams its encrypted dataset |
//! | 4 | computes `H(y)^ba` and matches ids | learns nothing about non-matches |
//!
//! Neither side sees the other's non-matching entries in the clear. The
//! Bloom filter is an untrusted hint: it can only drop entries that are
//! certainly absent on the server, so it never changes the result.

mod algorithm;
pub mod bloom;
mod dataset;
mod error;
mod key_description;
mod murmur3;
pub mod prefilter;
mod session;
mod stats;
pub mod wire;

pub use algorithm::{AlgorithmKind, AlgorithmParameter};
pub use bloom::{BloomFilter, HashStrategy};
pub use dataset::{ClientDataset, EntryCorrelationMap, IndexedDataset, ServerDatasetPage};
pub use error::Error;
pub use key_description::{KeyDescription, KeyMaterialStore};
pub use murmur3::murmur3_x64_128;
pub use prefilter::{apply_pre_filter, PreFilterOutcome};
pub use session::{BloomFilterDescriptor, EngineBootstrap, SessionDescriptor};
pub use stats::{ExecutionStatistics, PhaseStatistics, PsiPhase};

pub type Result<T> = std::result::Result<T, Error>;

/// Protocol defaults
pub mod constants {
    /// Default number of server entries requested per page
    pub const DEFAULT_PAGE_SIZE: u32 = 100;

    /// Default key size in bits
    pub const DEFAULT_KEY_SIZE: u32 = 2048;

    /// Key size of the ristretto255 group
    pub const EC_KEY_SIZE: u32 = 256;

    /// Curve name advertised for the EC families
    pub const EC_SPEC_NAME: &str = "ristretto255";
}
