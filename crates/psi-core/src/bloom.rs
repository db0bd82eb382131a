//! Bloom filter compatible with the JVM `BloomFilter<CharSequence>` wire format
//!
//! Serialized layout (all integers big-endian):
//!
//! ```text
//! u8        strategy ordinal (0 = MURMUR128_MITZ_32, 1 = MURMUR128_MITZ_64)
//! u8        number of hash functions
//! i32       number of 64-bit words
//! u64 * n   bit array words
//! ```
//!
//! Entries are hashed as their UTF-8 bytes with MurmurHash3 x64 128.
//! A filter never reports a false negative for an entry that was put into it.

use crate::murmur3::murmur3_x64_128;
use crate::{ClientDataset, Error, Result};

/// Header size in bytes
const HEADER_SIZE: usize = 6;

/// Probing strategy encoded in the first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStrategy {
    Murmur128Mitz32,
    Murmur128Mitz64,
}

impl HashStrategy {
    fn ordinal(self) -> u8 {
        match self {
            HashStrategy::Murmur128Mitz32 => 0,
            HashStrategy::Murmur128Mitz64 => 1,
        }
    }

    fn from_ordinal(ordinal: u8) -> Result<Self> {
        match ordinal {
            0 => Ok(HashStrategy::Murmur128Mitz32),
            1 => Ok(HashStrategy::Murmur128Mitz64),
            other => Err(Error::FilterDecode(format!(
                "unknown hash strategy ordinal {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    strategy: HashStrategy,
    num_hash_functions: u8,
    words: Vec<u64>,
}

impl BloomFilter {
    /// Size a filter for `expected_insertions` at false positive rate `fpp`
    pub fn with_capacity(expected_insertions: u64, fpp: f64) -> Self {
        let n = expected_insertions.max(1) as f64;
        let p = if fpp <= 0.0 { f64::MIN_POSITIVE } else { fpp.min(0.99) };
        let ln2 = std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln()) / (ln2 * ln2)) as u64;
        let num_bits = num_bits.max(64);
        let num_hash_functions = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 255.0) as u8;
        let num_words = num_bits.div_ceil(64) as usize;

        Self {
            strategy: HashStrategy::Murmur128Mitz64,
            num_hash_functions,
            words: vec![0; num_words],
        }
    }

    /// Build a filter containing every entry of `entries`
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a str>,
        expected_insertions: u64,
        fpp: f64,
    ) -> Self {
        let mut filter = Self::with_capacity(expected_insertions, fpp);
        for entry in entries {
            filter.put(entry);
        }
        filter
    }

    pub fn strategy(&self) -> HashStrategy {
        self.strategy
    }

    pub fn num_hash_functions(&self) -> u8 {
        self.num_hash_functions
    }

    /// Number of addressable bits
    pub fn bit_size(&self) -> u64 {
        self.words.len() as u64 * 64
    }

    /// Add an entry. Returns true if any bit changed.
    pub fn put(&mut self, entry: &str) -> bool {
        let indices = self.bit_indices(entry);
        let mut changed = false;
        for index in indices {
            changed |= self.set_bit(index);
        }
        changed
    }

    /// False means the entry was certainly never put into the filter
    pub fn might_contain(&self, entry: &str) -> bool {
        self.bit_indices(entry).into_iter().all(|index| self.get_bit(index))
    }

    /// Serialize into the wire layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.words.len() * 8);
        buf.push(self.strategy.ordinal());
        buf.push(self.num_hash_functions);
        buf.extend_from_slice(&(self.words.len() as i32).to_be_bytes());
        for word in &self.words {
            buf.extend_from_slice(&word.to_be_bytes());
        }
        buf
    }

    /// Parse the wire layout
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::FilterDecode(format!(
                "filter too short: {} bytes",
                data.len()
            )));
        }

        let strategy = HashStrategy::from_ordinal(data[0])?;
        let num_hash_functions = data[1];
        if num_hash_functions == 0 {
            return Err(Error::FilterDecode("zero hash functions".to_string()));
        }

        let word_count = i32::from_be_bytes([data[2], data[3], data[4], data[5]]);
        if word_count <= 0 {
            return Err(Error::FilterDecode(format!(
                "invalid word count {}",
                word_count
            )));
        }

        let body = &data[HEADER_SIZE..];
        let expected = word_count as usize * 8;
        if body.len() != expected {
            return Err(Error::FilterDecode(format!(
                "expected {} bytes of bit data, got {}",
                expected,
                body.len()
            )));
        }

        let words = body
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_be_bytes(word)
            })
            .collect();

        Ok(Self {
            strategy,
            num_hash_functions,
            words,
        })
    }

    fn bit_indices(&self, entry: &str) -> Vec<u64> {
        let (h1, h2) = murmur3_x64_128(entry.as_bytes(), 0);
        let bit_size = self.bit_size();
        let k = self.num_hash_functions as u32;

        match self.strategy {
            HashStrategy::Murmur128Mitz64 => {
                let hash2 = h2 as i64;
                let mut combined = h1 as i64;
                (0..k)
                    .map(|_| {
                        let index = (combined & i64::MAX) as u64 % bit_size;
                        combined = combined.wrapping_add(hash2);
                        index
                    })
                    .collect()
            }
            HashStrategy::Murmur128Mitz32 => {
                let hash1 = h1 as i32;
                let hash2 = (h1 >> 32) as i32;
                (1..=k as i32)
                    .map(|i| {
                        let mut combined = hash1.wrapping_add(i.wrapping_mul(hash2));
                        if combined < 0 {
                            combined = !combined;
                        }
                        combined as u64 % bit_size
                    })
                    .collect()
            }
        }
    }

    fn get_bit(&self, index: u64) -> bool {
        self.words[(index >> 6) as usize] & (1u64 << (index & 63)) != 0
    }

    fn set_bit(&mut self, index: u64) -> bool {
        let word = &mut self.words[(index >> 6) as usize];
        let mask = 1u64 << (index & 63);
        let was_set = *word & mask != 0;
        *word |= mask;
        !was_set
    }
}

/// Keep the dataset entries the filter might contain
pub fn filter_dataset(dataset: &ClientDataset, filter: &BloomFilter) -> ClientDataset {
    dataset.filtered(|entry| filter.might_contain(entry))
}
