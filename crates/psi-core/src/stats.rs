//! Per-phase cache statistics

use serde::Serialize;
use std::fmt;

/// Engine phases that perform cacheable cryptographic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PsiPhase {
    /// Single encryption of the client dataset
    ClientEncryption,
    /// Client-side encryption of the server's pages
    ServerSetProcessing,
}

impl fmt::Display for PsiPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsiPhase::ClientEncryption => write!(f, "client_encryption"),
            PsiPhase::ServerSetProcessing => write!(f, "server_set_processing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseStatistics {
    pub phase: PsiPhase,
    pub cache_hit: u64,
    pub cache_miss: u64,
}

impl PhaseStatistics {
    pub fn new(phase: PsiPhase) -> Self {
        Self {
            phase,
            cache_hit: 0,
            cache_miss: 0,
        }
    }

    /// Cryptographic operations performed or skipped in this phase
    pub fn operations(&self) -> u64 {
        self.cache_hit + self.cache_miss
    }
}

impl fmt::Display for PhaseStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: cache_hit={} cache_miss={}",
            self.phase, self.cache_hit, self.cache_miss
        )
    }
}

/// Run totals across phases. Reported, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStatistics {
    pub phases: Vec<PhaseStatistics>,
    pub total_cache_hit: u64,
    pub total_cache_miss: u64,
}

impl ExecutionStatistics {
    pub fn from_phases(phases: Vec<PhaseStatistics>) -> Self {
        let total_cache_hit = phases.iter().map(|p| p.cache_hit).sum();
        let total_cache_miss = phases.iter().map(|p| p.cache_miss).sum();
        Self {
            phases,
            total_cache_hit,
            total_cache_miss,
        }
    }

    pub fn total_operations(&self) -> u64 {
        self.total_cache_hit + self.total_cache_miss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_accumulate() {
        let mut a = PhaseStatistics::new(PsiPhase::ClientEncryption);
        a.cache_hit = 3;
        a.cache_miss = 2;
        let mut b = PhaseStatistics::new(PsiPhase::ServerSetProcessing);
        b.cache_miss = 10;

        let stats = ExecutionStatistics::from_phases(vec![a, b]);
        assert_eq!(stats.total_cache_hit, 3);
        assert_eq!(stats.total_cache_miss, 12);
        assert_eq!(stats.total_operations(), 15);
        assert_eq!(a.to_string(), "client_encryption: cache_hit=3 cache_miss=2");
    }
}
