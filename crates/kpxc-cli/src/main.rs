//! Command-line client for the KeePassXC browser socket.
//!
//! Establishes an encrypted session with the daemon, associating on first
//! run and replaying the stored association afterwards, then runs one query
//! and prints its result as JSON on stdout. Any unrecoverable error exits
//! non-zero after printing a diagnostic.

#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use kpxc_client::{establish, Error, Session, SessionConfig};
use kpxc_common::Verbosity;
use kpxc_store::{ProfileStore, StoreError};

#[derive(Parser, Debug)]
#[command(name = "kpxc")]
#[command(about = "KeePassXC browser-protocol client", version)]
struct Args {
    /// Path to the daemon socket
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Path to the profile store
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Enable debug logging, including raw wire messages
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch credentials matching a URL
    Logins {
        /// URL to search for; empty lets the daemon decide
        #[arg(short, long, default_value = "")]
        url: String,
    },

    /// Ask the daemon to generate a password
    Generate,

    /// Print the daemon's reported version
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let verbosity = if args.debug {
        Verbosity::Debug
    } else {
        Verbosity::Normal
    };
    kpxc_common::init_tracing(verbosity.filter());

    let config = SessionConfig {
        socket_path: args
            .socket
            .clone()
            .unwrap_or_else(kpxc_common::default_socket_path),
        verbosity,
        ..SessionConfig::default()
    };

    let mut session = Session::connect(config).await?;

    // The version is reported during the key exchange; no association needed.
    if matches!(args.command, Command::Version) {
        session.exchange_keys().await?;
        println!("{}", session.daemon_version().unwrap_or("unknown"));
        return Ok(());
    }

    let store_path = args
        .store
        .clone()
        .unwrap_or_else(kpxc_common::default_store_path);
    let mut store = match ProfileStore::load(&store_path) {
        Ok(store) => store,
        Err(StoreError::NotFound) => ProfileStore::new(&store_path),
        Err(e) => return Err(e).context("failed to load profile store"),
    };

    if let Err(e) = establish(&mut session, &mut store).await {
        match e {
            Error::AssociationStale(reason) => {
                warn!(%reason, "stored association rejected, negotiating a new one");
                let stale = session.identity().name.clone();
                store.remove_profile(&stale);
                store.commit()?;

                session.reset_identity()?;
                let identity = session.associate().await?;
                store.add_profile(identity.to_profile());
                store.set_default(&identity.name);
                store.commit()?;

                session.test_associate().await?;
            }
            other => return Err(other.into()),
        }
    }

    let output = match args.command {
        Command::Logins { url } => serde_json::to_value(session.get_logins(&url).await?)?,
        Command::Generate => session.generate_password().await?,
        // Already handled before the association flow.
        Command::Version => return Ok(()),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
