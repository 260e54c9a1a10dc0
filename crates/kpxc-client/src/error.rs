//! Session error taxonomy.
//!
//! Every failure is a typed result returned to the caller; nothing is
//! swallowed or retried internally. The orchestrating layer decides what is
//! fatal. `AssociationStale` is the one variant with an expected recovery
//! policy: drop the stale profile and re-run association.

use thiserror::Error;

use crate::session::SessionState;
use kpxc_crypto::CryptoError;
use kpxc_store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The daemon socket could not be reached.
    #[error("failed to connect to daemon socket: {0}")]
    Connect(#[source] std::io::Error),

    /// The key exchange did not yield a peer public key.
    #[error("key exchange failed: {0}")]
    HandshakeFailed(String),

    /// The daemon rejected the association, or its response was malformed.
    #[error("association failed: {0}")]
    AssociationFailed(String),

    /// The persisted identity was rejected by test-associate. Recoverable:
    /// remove the stale profile and associate again.
    #[error("stored association is no longer accepted: {0}")]
    AssociationStale(String),

    /// The daemon reported an error for a request.
    #[error("daemon error: {0}")]
    Daemon(String),

    /// Malformed or unexpected response shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No response within the configured read timeout.
    #[error("timed out waiting for daemon response")]
    Timeout,

    /// Operation called in the wrong session state.
    #[error("operation not valid in session state {0:?}")]
    State(SessionState),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
