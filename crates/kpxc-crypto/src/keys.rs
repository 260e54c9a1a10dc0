//! Key material: X25519 keypairs, identity keys, nonces.
//!
//! Everything crossing the wire is standard base64 embedded in JSON. Decoding
//! is strict: a malformed or wrong-length value is `InvalidKeyEncoding`, never
//! silently truncated or padded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore as _;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::channel::CryptoError;

/// Size of keys (curve points and shared secrets) in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of nonces in bytes. Full XChaCha20-Poly1305 width.
pub const NONCE_SIZE: usize = 24;

/// Decode a base64 value into a fixed-size byte array.
pub fn decode_fixed<const N: usize>(b64: &str) -> Result<[u8; N], CryptoError> {
    let bytes = STANDARD
        .decode(b64)
        .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyEncoding(format!("expected {N} bytes, got {len}")))
}

/// X25519 keypair for the session.
///
/// Generated fresh every process run and never persisted. The private half
/// stays inside this crate; callers only see the public key.
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    /// Generate a new keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Raw public key bytes.
    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Public key as standard base64.
    pub fn public_b64(&self) -> String {
        STANDARD.encode(self.public.as_bytes())
    }

    pub(crate) fn diffie_hellman(&self, peer: &PublicKey) -> x25519_dalek::SharedSecret {
        self.secret.diffie_hellman(peer)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public_b64())
            .finish_non_exhaustive()
    }
}

/// Durable 32-byte association identity key.
///
/// Minted once per association and persisted alongside the daemon-assigned
/// profile name. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct IdentityKey([u8; KEY_SIZE]);

impl IdentityKey {
    /// Generate a fresh random identity key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from standard base64; fails on bad encoding or wrong length.
    pub fn from_b64(b64: &str) -> Result<Self, CryptoError> {
        Ok(Self(decode_fixed(b64)?))
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        write!(f, "IdentityKey(..)")
    }
}

/// Random 24-byte nonce, unique per sealed message.
///
/// Always full-width random. Counter nonces are unsafe here: the protocol has
/// no sequence state that survives a restart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a fresh random nonce using the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_b64(b64: &str) -> Result<Self, CryptoError> {
        Ok(Self(decode_fixed(b64)?))
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}
