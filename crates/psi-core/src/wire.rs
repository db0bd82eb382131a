//! JSON bodies exchanged with the PSI server
//!
//! | Endpoint | Request | Response |
//! |----------|---------|----------|
//! | `GET /psi/parameters` | - | [`AlgorithmParameterList`] |
//! | `POST /psi` | [`AlgorithmParameterRequest`] | [`SessionDescriptor`](crate::SessionDescriptor) |
//! | `POST /psi/{id}/clientSet` | [`DatasetMapMessage`] | [`DatasetMapMessage`] |
//! | `GET /psi/{id}/serverSet?page&size` | - | [`ServerDatasetPage`](crate::ServerDatasetPage) |

use serde::{Deserialize, Serialize};

use crate::{AlgorithmParameter, EntryCorrelationMap};

/// Supported (algorithm, key size) pairs, in server order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmParameterList {
    #[serde(default)]
    pub content: Vec<AlgorithmParameter>,
}

/// Body of the session-opening request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmParameterRequest {
    pub content: AlgorithmParameter,
}

/// Body carrying a correlation map in either direction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMapMessage {
    #[serde(default)]
    pub content: EntryCorrelationMap,
}

impl From<EntryCorrelationMap> for DatasetMapMessage {
    fn from(content: EntryCorrelationMap) -> Self {
        Self { content }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlgorithmKind;

    #[test]
    fn test_parameter_list_parsing() {
        let json = r#"{"content":[{"algorithm":"BS","keySize":2048},{"algorithm":"ECDH","keySize":256}]}"#;
        let list: AlgorithmParameterList = serde_json::from_str(json).unwrap();
        assert_eq!(list.content.len(), 2);
        assert_eq!(list.content[1].algorithm, AlgorithmKind::EcDiffieHellman);
        assert_eq!(list.content[1].key_size, 256);
    }

    #[test]
    fn test_request_shape() {
        let req = AlgorithmParameterRequest {
            content: AlgorithmParameter::new(AlgorithmKind::DiffieHellman, 4096),
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"content":{"algorithm":"DH","keySize":4096}}"#
        );
    }
}
