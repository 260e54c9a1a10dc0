//! Durable, file-backed persistence of association profiles.
//!
//! One JSON file maps profile names to their negotiated identity keys and
//! tracks which profile is the default:
//!
//! ```json
//! {"default_profile": "client1", "profiles": [{"name": "client1", "key": "..."}]}
//! ```
//!
//! The key is a credential equivalent to a vault bypass, so the file is
//! written owner-readable only, via a temp sibling plus rename so a crash
//! mid-write can never corrupt the only copy.
//!
//! The file is not locked against concurrent processes; two runs committing
//! against the same path race with last-writer-wins semantics. Acceptable for
//! a single-user tool.

#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Store failures. A missing file is distinguished from a corrupt one: the
/// former is a normal first-run condition, the latter is not.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile store not found")]
    NotFound,

    #[error("profile store is corrupt: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A named, persisted association identity. `key` is standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub key: String,
}

/// The on-disk profile collection plus its path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileStore {
    #[serde(default)]
    pub default_profile: String,

    #[serde(default)]
    pub profiles: Vec<Profile>,

    #[serde(skip)]
    path: PathBuf,
}

impl ProfileStore {
    /// An empty store that will commit to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            default_profile: String::new(),
            profiles: Vec::new(),
            path: path.into(),
        }
    }

    /// Read and parse the persisted store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let mut store: ProfileStore =
            serde_json::from_slice(&content).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        store.path = path;
        debug!(
            profiles = store.profiles.len(),
            path = %store.path.display(),
            "loaded profile store"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a profile by name.
    pub fn extract_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The profile the default name points at.
    ///
    /// `None` covers both "no default set" and a default naming a profile
    /// that is no longer in the collection.
    pub fn extract_default_profile(&self) -> Option<&Profile> {
        if self.default_profile.is_empty() {
            return None;
        }
        self.extract_profile(&self.default_profile)
    }

    /// Append a profile. Names are not deduplicated here; callers own
    /// uniqueness if it matters to them.
    pub fn add_profile(&mut self, profile: Profile) {
        self.profiles.push(profile);
    }

    pub fn set_default(&mut self, name: &str) {
        self.default_profile = name.to_string();
    }

    /// Remove every profile with the given name, clearing the default if it
    /// pointed there. Returns whether anything was removed.
    pub fn remove_profile(&mut self, name: &str) -> bool {
        let before = self.profiles.len();
        self.profiles.retain(|p| p.name != name);
        if self.default_profile == name {
            self.default_profile.clear();
        }
        self.profiles.len() != before
    }

    /// Serialize the full store and replace the file atomically.
    ///
    /// Writes a temp sibling and renames it over the target; a write-in-place
    /// would leave a half-written file looking like valid state after a
    /// crash. The sibling is created owner-only so the keys it holds are
    /// never readable by other users, not even between write and rename.
    pub fn commit(&self) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = create_private(&tmp)?;
        file.write_all(&content)?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "committed profile store");
        Ok(())
    }
}

/// Create `path` with mode 0600 before any content lands in it. A leftover
/// sibling from an interrupted commit is removed, not reused, so its
/// permissions never carry over.
fn create_private(path: &Path) -> io::Result<fs::File> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_store(path: impl Into<PathBuf>) -> ProfileStore {
        let mut store = ProfileStore::new(path);
        store.add_profile(Profile {
            name: "client1".into(),
            key: "a2V5MQ==".into(),
        });
        store.add_profile(Profile {
            name: "client2".into(),
            key: "a2V5Mg==".into(),
        });
        store.set_default("client1");
        store
    }

    #[test]
    fn commit_then_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kpxc.json");

        let store = sample_store(&path);
        store.commit().unwrap();

        let loaded = ProfileStore::load(&path).unwrap();
        assert_eq!(loaded.default_profile, store.default_profile);
        assert_eq!(loaded.profiles, store.profiles);

        // Serialization is stable: committing the loaded store is lossless.
        loaded.commit().unwrap();
        let again = ProfileStore::load(&path).unwrap();
        assert_eq!(again.profiles, store.profiles);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let result = ProfileStore::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[test]
    fn unparseable_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kpxc.json");
        fs::write(&path, b"{\"default_profile\": ").unwrap();

        let result = ProfileStore::load(&path);
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn dangling_default_yields_no_profile() {
        let mut store = ProfileStore::new("unused.json");
        store.add_profile(Profile {
            name: "present".into(),
            key: "a2V5".into(),
        });
        store.set_default("missing");
        assert!(store.extract_default_profile().is_none());

        store.set_default("");
        assert!(store.extract_default_profile().is_none());

        store.set_default("present");
        assert_eq!(store.extract_default_profile().unwrap().name, "present");
    }

    #[test]
    fn added_profile_survives_commit_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kpxc.json");

        let store = sample_store(&path);
        store.commit().unwrap();

        let mut loaded = ProfileStore::load(&path).unwrap();
        loaded.add_profile(Profile {
            name: "client3".into(),
            key: "a2V5Mw==".into(),
        });
        loaded.commit().unwrap();

        let reloaded = ProfileStore::load(&path).unwrap();
        let added = reloaded.extract_profile("client3").unwrap();
        assert_eq!(added.key, "a2V5Mw==");
        assert_eq!(reloaded.profiles.len(), 3);
    }

    #[test]
    fn remove_profile_clears_matching_default() {
        let mut store = sample_store("unused.json");
        assert!(store.remove_profile("client1"));
        assert!(store.default_profile.is_empty());
        assert!(store.extract_profile("client1").is_none());
        assert!(!store.remove_profile("client1"));

        // Removing a non-default profile leaves the default alone.
        let mut store = sample_store("unused.json");
        assert!(store.remove_profile("client2"));
        assert_eq!(store.default_profile, "client1");
    }

    #[cfg(unix)]
    #[test]
    fn committed_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("kpxc.json");
        sample_store(&path).commit().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn commit_never_widens_temp_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("kpxc.json");
        let tmp = path.with_extension("tmp");

        // Leftover sibling from an interrupted run, with loose permissions.
        fs::write(&tmp, b"stale").unwrap();
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o644)).unwrap();

        sample_store(&path).commit().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!tmp.exists());
    }

    #[test]
    fn commit_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config/kpxc.json");
        sample_store(&path).commit().unwrap();
        assert!(ProfileStore::load(&path).is_ok());
    }
}
