//! Commutative ciphers behind the DH families
//!
//! Both ciphers map a plaintext into a prime-order-ish group and raise it to
//! a private scalar. Applying two parties' keys in either order yields the
//! same element, which is what the intersection relies on:
//!
//! ```text
//! client: c = H(x)^a        server: s = c^b = H(x)^(ab)
//! server: t = H(y)^b        client: u = t^a = H(y)^(ab)
//! ```
//!
//! Ciphertexts travel as lowercase hex strings.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use num_bigint::BigUint;
use psi_core::{AlgorithmKind, KeyDescription};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{EngineError, Result};

/// RFC 3526 group 14 prime (2048-bit MODP)
pub const MODP_2048_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA0510",
    "15728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

/// Size in bits of freshly drawn DH exponents
pub const DH_EXPONENT_BITS: usize = 256;

const MODP_DOMAIN: &[u8] = b"psi-exchange/modp/v1";
const RISTRETTO_DOMAIN: &[u8] = b"psi-exchange/ristretto255/v1";

/// The 2048-bit MODP prime as a big integer
pub fn modp_2048() -> Result<BigUint> {
    BigUint::parse_bytes(MODP_2048_PRIME_HEX.as_bytes(), 16)
        .ok_or_else(|| EngineError::InvalidBootstrap("MODP prime constant is not hex".into()))
}

/// Parse a decimal big integer from a bootstrap or key field
pub fn parse_decimal(value: &str, field: &str) -> Result<BigUint> {
    BigUint::parse_bytes(value.as_bytes(), 10)
        .ok_or_else(|| EngineError::InvalidKeyDescription(format!("{} is not a decimal number", field)))
}

/// A private-key holder for one commutative group
pub trait CommutativeCipher: Send + Sync {
    fn algorithm(&self) -> AlgorithmKind;

    /// Stable digest of the key material, used to scope cache keys
    fn fingerprint(&self) -> &str;

    /// Hash a plaintext into the group and apply the private key
    fn encrypt_plaintext(&self, plaintext: &str) -> String;

    /// Apply the private key to an element already encrypted by the peer
    fn encrypt_element(&self, element: &str) -> Result<String>;

    /// Key material needed to rebuild this cipher on a later run
    fn key_description(&self) -> KeyDescription;
}

/// Exponentiation in a multiplicative group modulo a safe prime
pub struct ModpCipher {
    modulus: BigUint,
    exponent: BigUint,
    byte_len: usize,
    fingerprint: String,
}

impl ModpCipher {
    pub fn new(modulus: BigUint, exponent: BigUint) -> Result<Self> {
        if modulus.bits() < 64 {
            return Err(EngineError::InvalidBootstrap(format!(
                "modulus of {} bits is too small",
                modulus.bits()
            )));
        }
        if exponent == BigUint::from(0u8) || exponent >= modulus {
            return Err(EngineError::InvalidKeyDescription(
                "private exponent must lie in [1, modulus)".into(),
            ));
        }

        let byte_len = ((modulus.bits() + 7) / 8) as usize;
        let fingerprint = fingerprint(&[
            AlgorithmKind::DiffieHellman.as_str().as_bytes(),
            modulus.to_bytes_be().as_slice(),
            exponent.to_bytes_be().as_slice(),
        ]);

        Ok(Self {
            modulus,
            exponent,
            byte_len,
            fingerprint,
        })
    }

    /// Draw a fresh exponent for `modulus`
    pub fn generate(modulus: BigUint) -> Result<Self> {
        let mut bytes = [0u8; DH_EXPONENT_BITS / 8];
        rand::thread_rng().fill_bytes(&mut bytes);

        let two = BigUint::from(2u8);
        if modulus <= two {
            return Err(EngineError::InvalidBootstrap("modulus must exceed 2".into()));
        }
        // lands in [1, modulus - 1)
        let exponent = BigUint::from_bytes_be(&bytes) % (&modulus - &two) + BigUint::from(1u8);
        Self::new(modulus, exponent)
    }

    /// Rebuild from a stored key; the stored modulus must match the session's
    pub fn from_key_description(key: &KeyDescription, session_modulus: &BigUint) -> Result<Self> {
        let modulus = key
            .modulus
            .as_deref()
            .ok_or_else(|| EngineError::InvalidKeyDescription("missing field modulus".into()))?;
        let modulus = parse_decimal(modulus, "modulus")?;
        if &modulus != session_modulus {
            return Err(EngineError::InvalidKeyDescription(
                "stored modulus differs from the session modulus".into(),
            ));
        }

        let exponent = key.client_private_exponent.as_deref().ok_or_else(|| {
            EngineError::InvalidKeyDescription("missing field clientPrivateExponent".into())
        })?;
        let exponent = parse_decimal(exponent, "clientPrivateExponent")?;
        Self::new(modulus, exponent)
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Expand SHA-512 over the modulus width, then square into the residues
    fn hash_to_group(&self, plaintext: &str) -> BigUint {
        let target = self.byte_len + 16;
        let mut expanded = Vec::with_capacity(target + 64);
        let mut counter: u32 = 0;
        while expanded.len() < target {
            let mut hasher = Sha512::new();
            hasher.update(counter.to_be_bytes());
            hasher.update(MODP_DOMAIN);
            hasher.update(plaintext.as_bytes());
            expanded.extend_from_slice(&hasher.finalize());
            counter += 1;
        }
        expanded.truncate(target);

        let base = BigUint::from_bytes_be(&expanded) % &self.modulus;
        (&base * &base) % &self.modulus
    }

    fn decode(&self, element: &str) -> Result<BigUint> {
        let value = BigUint::parse_bytes(element.as_bytes(), 16)
            .ok_or_else(|| EngineError::MalformedCiphertext(format!("not hex: {}", element)))?;
        if value == BigUint::from(0u8) || value >= self.modulus {
            return Err(EngineError::MalformedCiphertext(
                "element outside the group".into(),
            ));
        }
        Ok(value)
    }
}

impl CommutativeCipher for ModpCipher {
    fn algorithm(&self) -> AlgorithmKind {
        AlgorithmKind::DiffieHellman
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn encrypt_plaintext(&self, plaintext: &str) -> String {
        self.hash_to_group(plaintext)
            .modpow(&self.exponent, &self.modulus)
            .to_str_radix(16)
    }

    fn encrypt_element(&self, element: &str) -> Result<String> {
        let value = self.decode(element)?;
        Ok(value.modpow(&self.exponent, &self.modulus).to_str_radix(16))
    }

    fn key_description(&self) -> KeyDescription {
        KeyDescription {
            modulus: Some(self.modulus.to_str_radix(10)),
            client_private_exponent: Some(self.exponent.to_str_radix(10)),
            ..Default::default()
        }
    }
}

/// Scalar multiplication on ristretto255
pub struct RistrettoCipher {
    scalar: Scalar,
    fingerprint: String,
}

impl RistrettoCipher {
    pub fn new(scalar: Scalar) -> Result<Self> {
        if scalar == Scalar::ZERO {
            return Err(EngineError::InvalidKeyDescription(
                "private scalar must be non-zero".into(),
            ));
        }
        let fingerprint = fingerprint(&[
            AlgorithmKind::EcDiffieHellman.as_str().as_bytes(),
            &scalar.as_bytes()[..],
        ]);
        Ok(Self {
            scalar,
            fingerprint,
        })
    }

    pub fn generate() -> Result<Self> {
        let mut wide = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut wide);
        Self::new(Scalar::from_bytes_mod_order_wide(&wide))
    }

    pub fn from_key_description(key: &KeyDescription) -> Result<Self> {
        let encoded = key.ec_client_private_d.as_deref().ok_or_else(|| {
            EngineError::InvalidKeyDescription("missing field ecClientPrivateD".into())
        })?;
        let bytes = hex::decode(encoded)
            .map_err(|e| EngineError::InvalidKeyDescription(format!("ecClientPrivateD: {}", e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            EngineError::InvalidKeyDescription("ecClientPrivateD must be 32 bytes".into())
        })?;
        let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes)).ok_or_else(|| {
            EngineError::InvalidKeyDescription("ecClientPrivateD is not a canonical scalar".into())
        })?;
        Self::new(scalar)
    }

    fn hash_to_group(plaintext: &str) -> RistrettoPoint {
        let mut hasher = Sha512::new();
        hasher.update(RISTRETTO_DOMAIN);
        hasher.update(plaintext.as_bytes());
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&hasher.finalize());
        RistrettoPoint::from_uniform_bytes(&wide)
    }

    fn decode(element: &str) -> Result<RistrettoPoint> {
        let bytes = hex::decode(element)
            .map_err(|e| EngineError::MalformedCiphertext(format!("{}: {}", element, e)))?;
        let compressed = CompressedRistretto::from_slice(&bytes)
            .map_err(|_| EngineError::MalformedCiphertext("point must be 32 bytes".into()))?;
        compressed
            .decompress()
            .ok_or_else(|| EngineError::MalformedCiphertext("not a ristretto255 point".into()))
    }
}

impl CommutativeCipher for RistrettoCipher {
    fn algorithm(&self) -> AlgorithmKind {
        AlgorithmKind::EcDiffieHellman
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn encrypt_plaintext(&self, plaintext: &str) -> String {
        let point = Self::hash_to_group(plaintext) * self.scalar;
        hex::encode(point.compress().as_bytes())
    }

    fn encrypt_element(&self, element: &str) -> Result<String> {
        let point = Self::decode(element)? * self.scalar;
        Ok(hex::encode(point.compress().as_bytes()))
    }

    fn key_description(&self) -> KeyDescription {
        KeyDescription {
            ec_client_private_d: Some(hex::encode(self.scalar.as_bytes())),
            ..Default::default()
        }
    }
}

fn fingerprint(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
