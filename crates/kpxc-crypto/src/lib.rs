//! Cryptographic primitives for kpxc.
//!
//! This crate provides:
//! - X25519 keypairs (fresh per process run, never persisted)
//! - Random 32-byte association identity keys
//! - Full-width random 24-byte nonces
//! - A sealed-box secure channel: X25519 Diffie-Hellman, HKDF-SHA256 key
//!   derivation, XChaCha20-Poly1305 authenticated encryption
//!
//! # Design
//!
//! The channel seals at the asymmetric layer on every call instead of caching
//! a derived symmetric key. Message volume per session is single-digit, so the
//! extra scalar multiplication is irrelevant and there is no key-derivation
//! state to get wrong.

#![forbid(unsafe_code)]

pub mod channel;
pub mod keys;

pub use channel::{CryptoError, SealedMessage, SecureChannel};
pub use keys::{IdentityKey, Keypair, Nonce, KEY_SIZE, NONCE_SIZE};
