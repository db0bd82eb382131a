//! Bloom pre-filter: shrink the client dataset before any cryptography
//!
//! Filtering only ever drops entries that are certainly absent from the
//! server's dataset, so the intersection is the same with or without it.

use chrono::{DateTime, Duration, Utc};

use crate::bloom::{filter_dataset, BloomFilter};
use crate::{BloomFilterDescriptor, ClientDataset, Result};

/// What the pre-filter did to the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreFilterOutcome {
    /// No max age configured
    Disabled,
    /// The session carried no filter
    Absent,
    /// The filter was older than the allowed max age
    Stale { age: Duration },
    /// The filter was applied
    Applied { before: usize, after: usize },
}

impl PreFilterOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PreFilterOutcome::Applied { .. })
    }
}

/// True when `now - created_at < max_age`
///
/// A creation time in the future (clock skew) counts as fresh.
pub fn is_fresh(created_at: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(created_at) < max_age
}

/// Apply the session's Bloom filter if one is present and fresh
///
/// Returns the (possibly unchanged) dataset and what happened. Stale and
/// absent filters are not errors. Malformed filter bytes are reported as
/// [`crate::Error::FilterDecode`].
pub fn apply_pre_filter(
    dataset: &ClientDataset,
    descriptor: Option<&BloomFilterDescriptor>,
    max_age: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<(ClientDataset, PreFilterOutcome)> {
    let Some(max_age) = max_age else {
        return Ok((dataset.clone(), PreFilterOutcome::Disabled));
    };
    let Some(descriptor) = descriptor else {
        return Ok((dataset.clone(), PreFilterOutcome::Absent));
    };

    if !is_fresh(descriptor.created_at, max_age, now) {
        let age = now.signed_duration_since(descriptor.created_at);
        return Ok((dataset.clone(), PreFilterOutcome::Stale { age }));
    }

    let filter = BloomFilter::from_bytes(&descriptor.serialized)?;
    let filtered = filter_dataset(dataset, &filter);
    let outcome = PreFilterOutcome::Applied {
        before: dataset.len(),
        after: filtered.len(),
    };
    Ok((filtered, outcome))
}
