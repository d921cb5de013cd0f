//! Curve25519 key pairs in the WireGuard text encoding.

use std::fmt;

use base64::Engine;
use rand_core::OsRng;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::{WgError, WgResult};

/// Key size in bytes (256-bit Curve25519 keys).
pub const KEY_SIZE: usize = 32;

/// A tunnel public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Encodes the key as base64, the form carried in configs and SDP.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a public key from base64.
    pub fn from_base64(s: &str) -> WgResult<Self> {
        Ok(PublicKey(decode_key(s)?))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        write!(f, "PublicKey({}...)", &b64[..8.min(b64.len())])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// A tunnel private key. Never logged in full.
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    /// Generates a new random private key.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        PrivateKey(secret.to_bytes())
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        PublicKey(*X25519PublicKey::from(&secret).as_bytes())
    }

    /// Encodes the key as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a private key from base64.
    pub fn from_base64(s: &str) -> WgResult<Self> {
        Ok(PrivateKey(decode_key(s)?))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

/// A private + public key pair.
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        let private = PrivateKey::generate();
        let public = private.public_key();
        KeyPair { private, public }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

fn decode_key(s: &str) -> WgResult<[u8; KEY_SIZE]> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| WgError::InvalidBase64(e.to_string()))?;
    if bytes.len() != KEY_SIZE {
        return Err(WgError::InvalidKeyLength(bytes.len()));
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_derivation_is_deterministic() {
        let private = PrivateKey::generate();
        assert_eq!(private.public_key().to_base64(), private.public_key().to_base64());
    }

    #[test]
    fn distinct_private_keys_yield_distinct_public_keys() {
        assert_ne!(
            PrivateKey::generate().public_key(),
            PrivateKey::generate().public_key()
        );
    }

    #[test]
    fn base64_roundtrip() {
        let pair = KeyPair::generate();
        let private = PrivateKey::from_base64(&pair.private_key().to_base64()).unwrap();
        let public = PublicKey::from_base64(&pair.public_key().to_base64()).unwrap();
        assert_eq!(&private, pair.private_key());
        assert_eq!(&public, pair.public_key());
    }

    #[test]
    fn short_key_material_is_rejected() {
        // 16 bytes of base64
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(matches!(
            PrivateKey::from_base64(&short),
            Err(WgError::InvalidKeyLength(16))
        ));
        assert!(PublicKey::from_base64("not base64!").is_err());
    }

    #[test]
    fn private_key_debug_is_redacted() {
        let pair = KeyPair::generate();
        let debug = format!("{:?}", pair.private_key());
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&pair.private_key().to_base64()));
    }
}
