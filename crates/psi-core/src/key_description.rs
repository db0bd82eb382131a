//! Key descriptions and the key material store
//!
//! The engine produces a key description at the end of every run. Writing
//! it to disk and feeding it back on the next run keeps ciphertexts stable,
//! which is what makes cached encryptions reusable across process
//! invocations for the DH families.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{AlgorithmKind, Error, Result};

/// Algorithm-specific key material, moved between engine and disk
///
/// Modular fields are decimal strings, EC fields are hex strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_private_exponent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_public_exponent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec_client_private_d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec_server_public_q: Option<String>,
}

#[derive(Clone, Copy)]
enum Radix {
    Decimal,
    Hex,
}

impl KeyDescription {
    /// Check the fields required by `algorithm` are present and numeric
    pub fn validate_for(&self, algorithm: AlgorithmKind) -> Result<()> {
        match algorithm {
            AlgorithmKind::DiffieHellman => {
                require(&self.modulus, "modulus", Radix::Decimal)?;
                require(&self.client_private_exponent, "clientPrivateExponent", Radix::Decimal)?;
            }
            AlgorithmKind::BlindSignature => {
                require(&self.modulus, "modulus", Radix::Decimal)?;
                require(&self.server_public_exponent, "serverPublicExponent", Radix::Decimal)?;
            }
            AlgorithmKind::EcDiffieHellman => {
                require(&self.ec_client_private_d, "ecClientPrivateD", Radix::Hex)?;
            }
            AlgorithmKind::EcBlindSignature => {
                require(&self.ec_server_public_q, "ecServerPublicQ", Radix::Hex)?;
            }
        }
        Ok(())
    }
}

fn require(field: &Option<String>, name: &str, radix: Radix) -> Result<()> {
    let value = field
        .as_deref()
        .ok_or_else(|| Error::InvalidKeyDescription(format!("missing field {}", name)))?;

    let well_formed = !value.is_empty()
        && match radix {
            Radix::Decimal => value.bytes().all(|b| b.is_ascii_digit()),
            Radix::Hex => value.len() % 2 == 0 && value.bytes().all(|b| b.is_ascii_hexdigit()),
        };

    if !well_formed {
        return Err(Error::InvalidKeyDescription(format!(
            "field {} is not a valid {} number",
            name,
            match radix {
                Radix::Decimal => "decimal",
                Radix::Hex => "hex",
            }
        )));
    }
    Ok(())
}

/// Loads and persists key descriptions as flat JSON documents
pub struct KeyMaterialStore;

impl KeyMaterialStore {
    /// Load a key description and validate it against `algorithm`
    pub fn load(path: impl AsRef<Path>, algorithm: AlgorithmKind) -> Result<KeyDescription> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let description: KeyDescription = serde_json::from_str(&content)
            .map_err(|e| Error::InvalidKeyDescription(e.to_string()))?;
        description.validate_for(algorithm)?;
        Ok(description)
    }

    /// Write a key description as pretty-printed JSON
    pub fn save(description: &KeyDescription, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(description)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dh_key() -> KeyDescription {
        KeyDescription {
            client_private_exponent: Some("123456789".into()),
            modulus: Some("170141183460469231731687303715884105727".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");

        KeyMaterialStore::save(&dh_key(), &path).unwrap();
        let loaded = KeyMaterialStore::load(&path, AlgorithmKind::DiffieHellman).unwrap();
        assert_eq!(loaded, dh_key());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"clientPrivateExponent\": \"123456789\""));
        assert!(!raw.contains("ecClientPrivateD"));
    }

    #[test]
    fn test_wrong_family_fields_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        KeyMaterialStore::save(&dh_key(), &path).unwrap();

        let err = KeyMaterialStore::load(&path, AlgorithmKind::EcDiffieHellman).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyDescription(msg) if msg.contains("ecClientPrivateD")));

        let err = KeyMaterialStore::load(&path, AlgorithmKind::BlindSignature).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyDescription(_)));
    }

    #[test]
    fn test_malformed_document_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, "modulus: [not json").unwrap();

        let err = KeyMaterialStore::load(&path, AlgorithmKind::DiffieHellman).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyDescription(_)));
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        let mut key = dh_key();
        key.modulus = Some("12ab".into());
        assert!(key.validate_for(AlgorithmKind::DiffieHellman).is_err());

        let ec = KeyDescription {
            ec_client_private_d: Some("zz".into()),
            ..Default::default()
        };
        assert!(ec.validate_for(AlgorithmKind::EcDiffieHellman).is_err());

        let ec = KeyDescription {
            ec_client_private_d: Some("0a1b".into()),
            ..Default::default()
        };
        assert!(ec.validate_for(AlgorithmKind::EcDiffieHellman).is_ok());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = KeyMaterialStore::load("/nonexistent/key.json", AlgorithmKind::DiffieHellman)
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
