//! Default path discovery for the daemon socket and the profile store.

use std::env;
use std::path::PathBuf;

/// Socket path of a Flatpak-packaged KeePassXC, relative to `XDG_RUNTIME_DIR`.
const FLATPAK_SOCKET: &str =
    "app/org.keepassxc.KeePassXC/org.keepassxc.KeePassXC.BrowserServer";

/// Socket filename of a natively packaged KeePassXC.
const NATIVE_SOCKET: &str = "org.keepassxc.KeePassXC.BrowserServer";

/// Default daemon socket path.
///
/// Prefers the Flatpak socket when it exists, falling back to the native one.
pub fn default_socket_path() -> PathBuf {
    let runtime_dir = env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));

    let flatpak = runtime_dir.join(FLATPAK_SOCKET);
    if flatpak.exists() {
        return flatpak;
    }
    runtime_dir.join(NATIVE_SOCKET)
}

/// Default profile store path: `$XDG_CONFIG_HOME/kpxc.json`, falling back to
/// `$HOME/.config/kpxc.json`.
pub fn default_store_path() -> PathBuf {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("kpxc.json");
    }
    let home = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".config").join("kpxc.json")
}
