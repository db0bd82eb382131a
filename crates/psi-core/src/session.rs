//! Session descriptor returned by the server when a PSI session opens

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AlgorithmParameter;

/// Everything the client engine needs from the server to start
///
/// The modular families carry `modulus` (and `server_public_exponent` for
/// BS); the EC families carry the curve name (and the server point for ECBS).
/// All numbers are decimal strings, points are hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineBootstrap {
    pub psi_algorithm_parameter: AlgorithmParameter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_public_exponent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec_spec_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec_server_public_q: Option<String>,
}

impl EngineBootstrap {
    pub fn new(parameter: AlgorithmParameter) -> Self {
        Self {
            psi_algorithm_parameter: parameter,
            modulus: None,
            generator: None,
            server_public_exponent: None,
            ec_spec_name: None,
            ec_server_public_q: None,
        }
    }

    pub fn parameter(&self) -> AlgorithmParameter {
        self.psi_algorithm_parameter
    }
}

/// A serialized server Bloom filter plus its creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilterDescriptor {
    #[serde(rename = "serializedBloomFilter", with = "base64_bytes")]
    pub serialized: Vec<u8>,
    #[serde(rename = "bloomFilterCreationDate", with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// An open PSI session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Opaque handle used by every later call
    #[serde(rename = "sessionId")]
    pub session_id: u64,
    #[serde(with = "timestamp")]
    pub expiration: DateTime<Utc>,
    #[serde(rename = "psiClientSession")]
    pub bootstrap: EngineBootstrap,
    #[serde(
        rename = "bloomFilterDTO",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub bloom_filter: Option<BloomFilterDescriptor>,
}

impl SessionDescriptor {
    pub fn parameter(&self) -> AlgorithmParameter {
        self.bootstrap.parameter()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// RFC 3339 on the way out; RFC 3339 or epoch seconds on the way in
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(f64),
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom),
            Raw::Seconds(secs) => {
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9).round() as u32;
                DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
                    .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
            }
        }
    }
}
