//! The session state machine.
//!
//! `Disconnected → KeysExchanged → Associated → Ready`, with a terminal
//! `Failed` state reachable from any of them. One exception: a stale stored
//! association drops the session back to `KeysExchanged` so the caller can
//! re-run association over the same channel.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore as _;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use kpxc_common::protocol::{
    Action, AssociatePayload, KeyListEntry, LoginEntry, LoginsPayload, Request, Response,
};
use kpxc_common::Verbosity;
use kpxc_crypto::{CryptoError, IdentityKey, Nonce, SecureChannel};
use kpxc_store::{Profile, ProfileStore};

use crate::error::{Error, Result};
use crate::transport;

const CLIENT_ID_PREFIX: &str = "kpxc";

/// Hardening default: a hung daemon fails the operation instead of blocking
/// the session forever.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Session configuration, passed in explicitly (no process-global state).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub socket_path: PathBuf,
    pub read_timeout: Duration,
    pub verbosity: Verbosity,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_path: kpxc_common::default_socket_path(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            verbosity: Verbosity::Normal,
        }
    }
}

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    KeysExchanged,
    Associated,
    Ready,
    Failed,
}

/// The durable `(name, key)` pair registering this client with the daemon.
///
/// The key is the client's long-term credential for the name; it is never
/// regenerated for an existing name.
#[derive(Clone)]
pub struct AssociationIdentity {
    /// Opaque profile name assigned by the daemon. Empty until associated.
    pub name: String,
    pub key: IdentityKey,
}

impl AssociationIdentity {
    fn fresh() -> Self {
        Self {
            name: String::new(),
            key: IdentityKey::generate(),
        }
    }

    pub fn from_profile(profile: &Profile) -> Result<Self> {
        Ok(Self {
            name: profile.name.clone(),
            key: IdentityKey::from_b64(&profile.key)?,
        })
    }

    pub fn to_profile(&self) -> Profile {
        Profile {
            name: self.name.clone(),
            key: self.key.to_b64(),
        }
    }
}

impl fmt::Debug for AssociationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("AssociationIdentity")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One client session against the daemon.
///
/// Generic over the byte stream so tests can drive it over an in-memory
/// duplex pipe; production uses a Unix socket. The stream is owned
/// exclusively and closed when the session drops.
pub struct Session<S> {
    stream: S,
    channel: SecureChannel,
    identity: AssociationIdentity,
    client_id: String,
    state: SessionState,
    daemon_version: Option<String>,
    config: SessionConfig,
}

#[cfg(unix)]
impl Session<tokio::net::UnixStream> {
    /// Open the daemon socket and wrap it in a fresh session.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        debug!(socket = %config.socket_path.display(), "connecting to daemon");
        let stream = transport::connect(&config.socket_path).await?;
        Ok(Self::from_stream(stream, config))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    /// Wrap an already connected byte stream.
    ///
    /// Generates the session keypair, a placeholder identity, and the
    /// per-process client identifier.
    pub fn from_stream(stream: S, config: SessionConfig) -> Self {
        let mut suffix = [0u8; 24];
        OsRng.fill_bytes(&mut suffix);

        Self {
            stream,
            channel: SecureChannel::new(),
            identity: AssociationIdentity::fresh(),
            client_id: format!("{CLIENT_ID_PREFIX}-{}", STANDARD.encode(suffix)),
            state: SessionState::Disconnected,
            daemon_version: None,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> &AssociationIdentity {
        &self.identity
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Daemon software version, as reported during the key exchange or
    /// association. `None` until then, or if the daemon omits it.
    pub fn daemon_version(&self) -> Option<&str> {
        self.daemon_version.as_deref()
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::State(self.state))
        }
    }

    /// Exchange public keys with the daemon.
    ///
    /// The one message type never sealed: no shared key exists yet.
    pub async fn exchange_keys(&mut self) -> Result<()> {
        self.expect_state(SessionState::Disconnected)?;
        match self.exchange_keys_inner().await {
            Ok(()) => {
                self.state = SessionState::KeysExchanged;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    async fn exchange_keys_inner(&mut self) -> Result<()> {
        let mut request = Request::new(Action::ChangePublicKeys);
        request.public_key = Some(self.channel.public_key_b64());

        let response = self.round_trip(request).await?;
        if let Some(message) = daemon_error(&response) {
            return Err(Error::HandshakeFailed(message));
        }
        if response.version.is_some() {
            self.daemon_version = response.version.clone();
        }
        match response.public_key.as_deref() {
            Some(peer_key) if !peer_key.is_empty() => {
                self.channel.set_peer_key(peer_key)?;
                info!("exchanged public keys with daemon");
                Ok(())
            }
            _ => Err(Error::HandshakeFailed(
                "daemon did not return a public key".into(),
            )),
        }
    }

    /// Adopt an identity loaded from the store and skip negotiation.
    ///
    /// The session is optimistically considered associated; real validation
    /// happens in [`Session::test_associate`].
    pub fn resume_association(&mut self, identity: AssociationIdentity) -> Result<()> {
        self.expect_state(SessionState::KeysExchanged)?;
        info!(profile = %identity.name, "resuming stored association");
        self.identity = identity;
        self.state = SessionState::Associated;
        Ok(())
    }

    /// Discard the current identity for a fresh random one.
    ///
    /// Used by the stale-association recovery policy before re-associating.
    pub fn reset_identity(&mut self) -> Result<()> {
        self.expect_state(SessionState::KeysExchanged)?;
        self.identity = AssociationIdentity::fresh();
        Ok(())
    }

    /// Register this client with the daemon.
    ///
    /// Sends the session public key and the identity key; the daemon answers
    /// with the profile name it assigned. Returns the resulting identity for
    /// the caller to persist.
    pub async fn associate(&mut self) -> Result<AssociationIdentity> {
        self.expect_state(SessionState::KeysExchanged)?;
        match self.associate_inner().await {
            Ok(identity) => {
                self.state = SessionState::Associated;
                Ok(identity)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    async fn associate_inner(&mut self) -> Result<AssociationIdentity> {
        let mut request = Request::new(Action::Associate);
        request.key = Some(self.channel.public_key_b64());
        request.id_key = Some(self.identity.key.to_b64());

        let plaintext = match self.round_trip_sealed(request).await {
            Ok(plaintext) => plaintext,
            Err(Error::Daemon(message)) => return Err(Error::AssociationFailed(message)),
            Err(e) => return Err(e),
        };

        let payload: AssociatePayload = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::AssociationFailed(format!("malformed associate response: {e}")))?;
        if payload.id.is_empty() {
            return Err(Error::AssociationFailed(
                "daemon did not assign a profile name".into(),
            ));
        }
        if payload.version.is_some() {
            self.daemon_version = payload.version;
        }

        info!(profile = %payload.id, "associated with daemon");
        self.identity.name = payload.id;
        Ok(self.identity.clone())
    }

    /// Validate the current identity against the daemon.
    ///
    /// A daemon-reported error or a decryption failure here means the
    /// persisted identity is stale or revoked; the session drops back to
    /// `KeysExchanged` and the caller decides the recovery policy.
    pub async fn test_associate(&mut self) -> Result<()> {
        self.expect_state(SessionState::Associated)?;

        let mut request = Request::new(Action::TestAssociate);
        request.id = Some(self.identity.name.clone());
        request.key = Some(self.identity.key.to_b64());

        match self.round_trip_sealed(request).await {
            Ok(_) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(Error::Daemon(message)) => {
                warn!(profile = %self.identity.name, %message, "identity rejected by daemon");
                self.state = SessionState::KeysExchanged;
                Err(Error::AssociationStale(message))
            }
            Err(Error::Crypto(CryptoError::DecryptionFailed)) => {
                self.state = SessionState::KeysExchanged;
                Err(Error::AssociationStale(
                    "could not decrypt test-associate response".into(),
                ))
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Fetch credentials matching `url`. An empty list is a valid result.
    pub async fn get_logins(&mut self, url: &str) -> Result<Vec<LoginEntry>> {
        self.expect_state(SessionState::Ready)?;

        let mut request = Request::new(Action::GetLogins);
        request.url = Some(url.to_string());
        request.id = Some(self.identity.name.clone());
        request.keys = Some(vec![self.key_list_entry()]);

        let plaintext = self.ready_round_trip(request).await?;
        let payload: LoginsPayload = serde_json::from_slice(&plaintext).map_err(|e| {
            self.state = SessionState::Failed;
            Error::Protocol(format!("malformed get-logins response: {e}"))
        })?;
        debug!(count = payload.entries.len(), "received login entries");
        Ok(payload.entries)
    }

    /// Ask the daemon to generate a password.
    ///
    /// The decrypted payload is passed through as raw JSON for the consumer.
    pub async fn generate_password(&mut self) -> Result<serde_json::Value> {
        self.expect_state(SessionState::Ready)?;

        let mut request = Request::new(Action::GeneratePassword);
        request.keys = Some(vec![self.key_list_entry()]);

        let plaintext = self.ready_round_trip(request).await?;
        serde_json::from_slice(&plaintext).map_err(|e| {
            self.state = SessionState::Failed;
            Error::Protocol(format!("malformed generate-password response: {e}"))
        })
    }

    fn key_list_entry(&self) -> KeyListEntry {
        KeyListEntry {
            id: self.identity.name.clone(),
            key: self.identity.key.to_b64(),
        }
    }

    /// Sealed round trip for `Ready`-state queries. A daemon-reported error
    /// leaves the channel usable; transport or channel failures are terminal.
    async fn ready_round_trip(&mut self, request: Request) -> Result<Vec<u8>> {
        match self.round_trip_sealed(request).await {
            Ok(plaintext) => Ok(plaintext),
            Err(e @ Error::Daemon(_)) => Err(e),
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Seal a request payload, send the envelope, open the response.
    async fn round_trip_sealed(&mut self, request: Request) -> Result<Vec<u8>> {
        let action = request.action;
        let inner = serde_json::to_vec(&request)
            .map_err(|e| Error::Protocol(format!("failed to encode request: {e}")))?;
        let sealed = self.channel.seal(&inner)?;

        let mut envelope = Request::new(action);
        envelope.nonce = Some(sealed.nonce_b64());
        envelope.message = Some(sealed.ciphertext_b64());

        let response = self.round_trip(envelope).await?;
        if let Some(message) = daemon_error(&response) {
            return Err(Error::Daemon(message));
        }

        let nonce = response
            .nonce
            .as_deref()
            .ok_or_else(|| Error::Protocol("response missing nonce".into()))?;
        let message = response
            .message
            .as_deref()
            .ok_or_else(|| Error::Protocol("response missing message".into()))?;

        let nonce = Nonce::from_b64(nonce)?;
        let ciphertext = STANDARD
            .decode(message)
            .map_err(|e| Error::Protocol(format!("invalid base64 in response message: {e}")))?;
        Ok(self.channel.open(&nonce, &ciphertext)?)
    }

    /// Send one message and block on its response. The single outstanding
    /// call discipline: no pipelining, no demultiplexing.
    async fn round_trip(&mut self, mut request: Request) -> Result<Response> {
        request.client_id = Some(self.client_id.clone());
        if request.nonce.is_none() {
            request.nonce = Some(Nonce::generate().to_b64());
        }

        let bytes = serde_json::to_vec(&request)
            .map_err(|e| Error::Protocol(format!("failed to encode request: {e}")))?;
        if self.config.verbosity == Verbosity::Debug {
            debug!(request = %String::from_utf8_lossy(&bytes), "sending message");
        }

        transport::write_message(&mut self.stream, &bytes).await?;
        let (response, raw) =
            transport::read_response(&mut self.stream, self.config.read_timeout).await?;
        if self.config.verbosity == Verbosity::Debug {
            debug!(response = %String::from_utf8_lossy(&raw), "received message");
        }
        Ok(response)
    }
}

fn daemon_error(response: &Response) -> Option<String> {
    match response.error.as_deref() {
        Some(error) if !error.is_empty() => Some(match &response.error_code {
            Some(code) => format!("{error} (code {code})"),
            None => error.to_string(),
        }),
        _ => None,
    }
}

/// Drive a session from connected stream to `Ready`.
///
/// Loads the default profile from the store when present (replay), otherwise
/// performs a fresh association and persists the result before validating.
/// Returns whether a stored identity was used. `AssociationStale` is passed
/// through untouched; recovery is the caller's decision.
pub async fn establish<S>(session: &mut Session<S>, store: &mut ProfileStore) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session.exchange_keys().await?;

    let stored = match store.extract_default_profile() {
        Some(profile) => {
            let identity = AssociationIdentity::from_profile(profile)?;
            session.resume_association(identity)?;
            true
        }
        None => {
            let identity = session.associate().await?;
            store.add_profile(identity.to_profile());
            store.set_default(&identity.name);
            store.commit()?;
            false
        }
    };

    session.test_associate().await?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SessionConfig {
        SessionConfig {
            read_timeout: Duration::from_millis(200),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn operations_enforce_session_state() {
        let (stream, _peer) = tokio::io::duplex(1024);
        let mut session = Session::from_stream(stream, test_config());

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(session.associate().await, Err(Error::State(_))));
        assert!(matches!(
            session.test_associate().await,
            Err(Error::State(_))
        ));
        assert!(matches!(
            session.get_logins("https://example.com").await,
            Err(Error::State(_))
        ));
        assert!(matches!(
            session.generate_password().await,
            Err(Error::State(_))
        ));
        assert!(matches!(session.reset_identity(), Err(Error::State(_))));

        // State misuse does not poison the machine.
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn closed_transport_fails_the_handshake() {
        let (stream, peer) = tokio::io::duplex(1024);
        drop(peer);
        let mut session = Session::from_stream(stream, test_config());

        assert!(session.exchange_keys().await.is_err());
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn silent_daemon_surfaces_timeout() {
        let (stream, _peer) = tokio::io::duplex(1024);
        let mut session = Session::from_stream(stream, test_config());

        let result = session.exchange_keys().await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn client_ids_are_unique_per_session() {
        let (a, _ka) = tokio::io::duplex(16);
        let (b, _kb) = tokio::io::duplex(16);
        let first = Session::from_stream(a, test_config());
        let second = Session::from_stream(b, test_config());
        assert_ne!(first.client_id(), second.client_id());
        assert!(first.client_id().starts_with("kpxc-"));
    }
}
