//! PSI algorithm identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Algorithm family used for the double encryption
///
/// - BS / ECBS: blind-signature style, the server signs blinded client values
/// - DH / ECDH: commutative encryption, both parties exponentiate
///
/// The modular families (BS, DH) take key sizes like 2048 or 4096; the
/// elliptic-curve families are fixed by the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlgorithmKind {
    #[serde(rename = "BS")]
    BlindSignature,
    #[serde(rename = "DH")]
    DiffieHellman,
    #[serde(rename = "ECBS")]
    EcBlindSignature,
    #[serde(rename = "ECDH")]
    EcDiffieHellman,
}

impl AlgorithmKind {
    /// Wire name of this algorithm
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::BlindSignature => "BS",
            AlgorithmKind::DiffieHellman => "DH",
            AlgorithmKind::EcBlindSignature => "ECBS",
            AlgorithmKind::EcDiffieHellman => "ECDH",
        }
    }

    /// Returns true for the elliptic-curve families
    pub fn is_elliptic_curve(&self) -> bool {
        matches!(
            self,
            AlgorithmKind::EcBlindSignature | AlgorithmKind::EcDiffieHellman
        )
    }

    /// Returns true when the client holds a private key (DH families).
    ///
    /// Cache hits across runs require reloading that key.
    pub fn has_client_secret(&self) -> bool {
        matches!(
            self,
            AlgorithmKind::DiffieHellman | AlgorithmKind::EcDiffieHellman
        )
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BS" => Ok(AlgorithmKind::BlindSignature),
            "DH" => Ok(AlgorithmKind::DiffieHellman),
            "ECBS" => Ok(AlgorithmKind::EcBlindSignature),
            "ECDH" => Ok(AlgorithmKind::EcDiffieHellman),
            _ => Err(Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// An (algorithm, key size) pair as offered by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmParameter {
    pub algorithm: AlgorithmKind,
    pub key_size: u32,
}

impl AlgorithmParameter {
    pub fn new(algorithm: AlgorithmKind, key_size: u32) -> Self {
        Self {
            algorithm,
            key_size,
        }
    }
}

impl fmt::Display for AlgorithmParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm, self.key_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("DH".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::DiffieHellman);
        assert_eq!("ecdh".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::EcDiffieHellman);
        assert_eq!(" BS ".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::BlindSignature);
        assert_eq!("ECBS".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::EcBlindSignature);
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let err = "RSA".parse::<AlgorithmKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(name) if name == "RSA"));
    }

    #[test]
    fn test_algorithm_serialization() {
        assert_eq!(serde_json::to_string(&AlgorithmKind::DiffieHellman).unwrap(), "\"DH\"");
        assert_eq!(
            serde_json::from_str::<AlgorithmKind>("\"ECBS\"").unwrap(),
            AlgorithmKind::EcBlindSignature
        );
    }

    #[test]
    fn test_parameter_wire_shape() {
        let param = AlgorithmParameter::new(AlgorithmKind::DiffieHellman, 2048);
        let json = serde_json::to_string(&param).unwrap();
        assert_eq!(json, r#"{"algorithm":"DH","keySize":2048}"#);
        assert_eq!(param.to_string(), "DH-2048");
    }

    #[test]
    fn test_family_predicates() {
        assert!(AlgorithmKind::EcDiffieHellman.is_elliptic_curve());
        assert!(!AlgorithmKind::DiffieHellman.is_elliptic_curve());
        assert!(AlgorithmKind::DiffieHellman.has_client_secret());
        assert!(!AlgorithmKind::BlindSignature.has_client_secret());
    }
}
