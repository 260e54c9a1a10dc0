//! Sealed-box secure channel.
//!
//! Sender seals with their private key and the recipient's public key; the
//! recipient opens with their private key and the sender's public key. Both
//! sides derive the same symmetric key (X25519 is commutative), which drives
//! XChaCha20-Poly1305 with an explicit random 24-byte nonce per message.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::PublicKey;
use zeroize::Zeroize;

use crate::keys::{decode_fixed, Keypair, Nonce, KEY_SIZE};

/// Errors from key handling and the secure channel.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No peer public key has been established yet.
    #[error("no peer public key established")]
    NoPeerKey,

    /// A peer public key is already installed for this session.
    #[error("peer public key already set")]
    PeerKeyAlreadySet,

    #[error("encryption failed")]
    EncryptionFailed,

    /// Authentication failed: tampered ciphertext, wrong key, or wrong nonce.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),
}

/// A sealed message ready for the wire: explicit nonce plus ciphertext.
///
/// The two parts travel as separate base64 wire fields; there is no manual
/// `nonce || ciphertext` slicing anywhere.
pub struct SealedMessage {
    pub nonce: Nonce,
    pub ciphertext: Vec<u8>,
}

impl SealedMessage {
    pub fn nonce_b64(&self) -> String {
        self.nonce.to_b64()
    }

    pub fn ciphertext_b64(&self) -> String {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        STANDARD.encode(&self.ciphertext)
    }
}

/// Authenticated encryption endpoint for one session.
///
/// Owns the session keypair. The peer key is set exactly once, after the
/// public-key exchange; `seal` and `open` fail with [`CryptoError::NoPeerKey`]
/// before that.
pub struct SecureChannel {
    keypair: Keypair,
    peer: Option<PublicKey>,
}

impl SecureChannel {
    /// Create a channel with a fresh session keypair and no peer key.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
            peer: None,
        }
    }

    /// Own public key as standard base64, for the key-exchange message.
    pub fn public_key_b64(&self) -> String {
        self.keypair.public_b64()
    }

    pub fn public_key_bytes(&self) -> [u8; KEY_SIZE] {
        self.keypair.public_bytes()
    }

    /// Install the peer's public key learned during the handshake.
    ///
    /// Settable exactly once per session; a second call fails with
    /// [`CryptoError::PeerKeyAlreadySet`] and leaves the channel bound to the
    /// original peer. Rekeying means building a new channel.
    pub fn set_peer_key(&mut self, b64: &str) -> Result<(), CryptoError> {
        if self.peer.is_some() {
            return Err(CryptoError::PeerKeyAlreadySet);
        }
        let bytes: [u8; KEY_SIZE] = decode_fixed(b64)?;
        self.peer = Some(PublicKey::from(bytes));
        Ok(())
    }

    pub fn has_peer_key(&self) -> bool {
        self.peer.is_some()
    }

    /// Derive the symmetric key: HKDF-SHA256 over the X25519 shared secret.
    fn symmetric_key(&self) -> Result<[u8; KEY_SIZE], CryptoError> {
        let peer = self.peer.as_ref().ok_or(CryptoError::NoPeerKey)?;
        let shared = self.keypair.diffie_hellman(peer);
        let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        hkdf.expand(&[], &mut key)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(key)
    }

    /// Seal a plaintext for the peer. A fresh nonce is generated per call and
    /// returned alongside the ciphertext for transmission.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedMessage, CryptoError> {
        let mut key = self.symmetric_key()?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let nonce = Nonce::generate();
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed);
        key.zeroize();
        Ok(SealedMessage {
            nonce,
            ciphertext: ciphertext?,
        })
    }

    /// Open a sealed message from the peer.
    ///
    /// All-or-nothing: authentication failure never yields partial plaintext.
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut key = self.symmetric_key()?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce.as_bytes()), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed);
        key.zeroize();
        plaintext
    }
}

impl Default for SecureChannel {
    fn default() -> Self {
        Self::new()
    }
}
