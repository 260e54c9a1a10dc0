//! Session protocol for the KeePassXC browser socket.
//!
//! Drives one mutually authenticated session against a locally running
//! daemon: public-key exchange, association (fresh or replayed from the
//! profile store), validation, then authenticated queries. Strictly one
//! outstanding request at a time; every operation blocks until the matching
//! response arrives, the read timeout fires, or the transport fails.
//!
//! The session owns its transport handle exclusively; dropping the session
//! closes the stream on every exit path.

#![forbid(unsafe_code)]

pub mod error;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use session::{
    establish, AssociationIdentity, Session, SessionConfig, SessionState, DEFAULT_READ_TIMEOUT,
};
