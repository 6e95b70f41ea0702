//! Ed25519 signing primitives.
//!
//! Keys are imported from a raw 32-byte seed (the RFC 8032 secret input,
//! not the expanded 64-byte form); the expanded material is derived
//! internally by `ed25519-dalek`. Signatures are pure Ed25519 over the
//! caller-supplied message bytes -- for operation records that message is
//! the canonical JSON of the unsigned envelope, so no additional domain
//! prefix is applied.
//!
//! Secret material is wrapped in `Secret` for guaranteed zeroization on
//! drop and a redacted `Debug` representation.

use crate::codec::{b64u_decode, b64u_encode};
use crate::error::{Error, Result};
use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey as Ed25519SigningKey, Verifier, VerifyingKey,
};
use secrecy::{CloneableSecret, ExposeSecret, Secret, Zeroize};
use serde::{Deserialize, Serialize};

/// Length of a raw Ed25519 seed in bytes.
pub const SEED_LEN: usize = 32;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// A signing key for producing operation-record signatures.
#[derive(Clone)]
pub struct SigningKey {
    signing_key: Secret<Ed25519SigningKeyWrapper>,
}

// Wrapper so Secret can hold the dalek key. ed25519-dalek 2.x zeroizes the
// inner key on Drop, so Zeroize here is a no-op.
struct Ed25519SigningKeyWrapper(Ed25519SigningKey);

impl Clone for Ed25519SigningKeyWrapper {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Zeroize for Ed25519SigningKeyWrapper {
    fn zeroize(&mut self) {}
}

impl CloneableSecret for Ed25519SigningKeyWrapper {}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("signing_key", &"***SECRET***")
            .finish()
    }
}

impl SigningKey {
    /// Create a signing key from a raw 32-byte seed.
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Self {
        let signing_key = Ed25519SigningKey::from_bytes(seed);
        Self {
            signing_key: Secret::new(Ed25519SigningKeyWrapper(signing_key)),
        }
    }

    /// Create a signing key from a base64url-encoded seed.
    ///
    /// Fails with a validation error if the decoded seed is not exactly
    /// 32 bytes.
    pub fn from_b64u(seed: &str) -> Result<Self> {
        let bytes = b64u_decode(seed)?;
        let seed: [u8; SEED_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::validation(format!("seed must be {} bytes, got {}", SEED_LEN, v.len()))
        })?;
        Ok(Self::from_seed(&seed))
    }

    /// Derive the public verification key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.expose_secret().0.verifying_key(),
        }
    }

    /// Sign a message, returning the base64url-encoded 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> String {
        let sig = self.signing_key.expose_secret().0.sign(message);
        b64u_encode(sig.to_bytes())
    }
}

/// A public key for verifying operation-record signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Create a public key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes)
            .map_err(|e| Error::validation(format!("invalid public key: {}", e)))?;
        Ok(Self { verifying_key })
    }

    /// Create a public key from its base64url form.
    pub fn from_b64u(s: &str) -> Result<Self> {
        let bytes = b64u_decode(s)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::validation(format!("public key must be 32 bytes, got {}", v.len()))
        })?;
        Self::from_bytes(&arr)
    }

    /// The key as raw bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// The key in base64url form, as carried in configs and diagnostics.
    pub fn to_b64u(&self) -> String {
        b64u_encode(self.to_bytes())
    }

    /// Short fingerprint (first 8 bytes, hex) for logs and key ids.
    pub fn fingerprint(&self) -> String {
        let bytes = self.to_bytes();
        hex::encode(&bytes[..8])
    }

    /// Verify a base64url signature over a message.
    pub fn verify(&self, message: &[u8], signature_b64u: &str) -> Result<()> {
        let bytes = b64u_decode(signature_b64u)?;
        let arr: [u8; SIGNATURE_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::validation(format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_LEN,
                v.len()
            ))
        })?;
        let sig = DalekSignature::from_bytes(&arr);
        self.verifying_key
            .verify(message, &sig)
            .map_err(|e| Error::validation(format!("signature verification failed: {}", e)))
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_b64u())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_b64u(&s).map_err(serde::de::Error::custom)
    }
}
