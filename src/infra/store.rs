//! Content-addressed artifact store
//!
//! Layout under the store root:
//!
//! ```text
//! objects/<key[..2]>/<key>/   published artifacts, immutable
//! inputs/<sha[..16]>/<name>   injected input files, content-addressed
//! locks/<key>.lock            advisory lock of the single writer of a key
//! tmp/<key>.<pid>.<nanos>/    staging directories
//! ```
//!
//! Artifacts are built in a staging directory and renamed into place, so a
//! reader never sees a partial artifact. Writers of the same key serialize
//! through an exclusive OS advisory lock on the key's lock file; a waiting
//! writer polls, and on acquiring the lock finds the artifact already
//! published. The OS drops the lock when its holder exits, so a killed
//! build never blocks the next one. The lock file itself stays behind until
//! [`ArtifactStore::clean_staging`] removes it.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use fs4::FileExt;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

const OBJECTS_DIR: &str = "objects";
const INPUTS_DIR: &str = "inputs";
const LOCKS_DIR: &str = "locks";
const TMP_DIR: &str = "tmp";

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of [`ArtifactStore::publish_with`]
#[derive(Debug)]
pub struct Publication<T> {
    /// Published artifact directory
    pub path: PathBuf,
    /// Value returned by the build closure, None when the artifact was
    /// already present
    pub built: Option<T>,
}

impl<T> Publication<T> {
    /// Whether the artifact came from the store without building
    pub fn cached(&self) -> bool {
        self.built.is_none()
    }
}

/// Content-addressed, immutable artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    lock_timeout: Duration,
}

/// Holds the advisory lock of a key until dropped
struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release lock {}: {e}", self.path.display());
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| io_error(path, &e))
}

/// Take the lock without waiting; false while another writer holds it
fn try_lock(file: &File, path: &Path) -> Result<bool, StoreError> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(io_error(path, &e)),
    }
}

fn io_error(path: &Path, error: &std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}

impl ArtifactStore {
    /// Store rooted at `root`
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            lock_timeout,
        }
    }

    /// Store root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a key is published under
    ///
    /// The first two characters of the key name a subdirectory to keep
    /// directory sizes reasonable.
    #[must_use]
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        let prefix = &key[..2.min(key.len())];
        self.root.join(OBJECTS_DIR).join(prefix).join(key)
    }

    /// Whether `key` is published
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.artifact_path(key).is_dir()
    }

    /// Compute a key from build inputs
    ///
    /// Each part is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
    /// never collide.
    #[must_use]
    pub fn compute_key<I, S>(parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut hasher = Sha256::new();
        for part in parts {
            let bytes = part.as_ref();
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        hex::encode(hasher.finalize())
    }

    /// Publish the artifact for `key`, building it with `build` if absent.
    ///
    /// `build` receives an empty staging directory. On success the staging
    /// directory is renamed to [`ArtifactStore::artifact_path`]; on failure
    /// it is removed and nothing is published.
    pub fn publish_with<T, E, F>(&self, key: &str, build: F) -> Result<Publication<T>, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Path) -> Result<T, E>,
    {
        let path = self.artifact_path(key);
        if self.contains(key) {
            tracing::debug!("Store hit for {key}");
            return Ok(Publication { path, built: None });
        }

        let _guard = self.lock(key)?;

        // another writer may have published while we waited
        if self.contains(key) {
            tracing::debug!("Store hit for {key} after waiting for lock");
            return Ok(Publication { path, built: None });
        }

        let staging = self.staging_dir(key)?;
        let built = match build(&staging) {
            Ok(built) => built,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                    tracing::warn!("Failed to remove {}: {cleanup}", staging.display());
                }
                return Err(e);
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
        }
        std::fs::rename(&staging, &path).map_err(|e| io_error(&path, &e))?;
        tracing::debug!("Published {key} at {}", path.display());

        Ok(Publication {
            path,
            built: Some(built),
        })
    }

    /// Store an input file by content and return its absolute path.
    ///
    /// Equal contents under the same name always resolve to the same path.
    pub fn put_input(&self, name: &str, contents: &str) -> Result<PathBuf, StoreError> {
        let digest = Self::compute_key([name.as_bytes(), contents.as_bytes()]);
        let dir = self.root.join(INPUTS_DIR).join(&digest[..16]);
        let path = dir.join(name);
        if path.is_file() {
            return Ok(path);
        }

        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, &e))?;
        let tmp = dir.join(format!(".{name}.{}", unique_suffix()));
        std::fs::write(&tmp, contents).map_err(|e| io_error(&tmp, &e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_error(&path, &e))?;
        Ok(path)
    }

    /// Published artifact keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let objects = self.root.join(OBJECTS_DIR);
        let mut keys: Vec<String> = walkdir::WalkDir::new(&objects)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        keys.sort();
        keys
    }

    /// Remove abandoned staging directories and the lock files no writer
    /// holds. Entries of builds still running are left alone. Returns how
    /// many entries were removed.
    pub fn clean_staging(&self) -> Result<usize, StoreError> {
        let mut removed = 0;

        let tmp = self.root.join(TMP_DIR);
        if tmp.exists() {
            for entry in std::fs::read_dir(&tmp).map_err(|e| io_error(&tmp, &e))? {
                let entry = entry.map_err(|e| io_error(&tmp, &e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = name.split('.').next().unwrap_or_default();
                if self.is_locked(key)? {
                    tracing::debug!("Keeping {name}, its build is still running");
                    continue;
                }
                std::fs::remove_dir_all(entry.path())
                    .map_err(|e| io_error(&entry.path(), &e))?;
                removed += 1;
            }
        }

        let locks = self.root.join(LOCKS_DIR);
        if locks.exists() {
            for entry in std::fs::read_dir(&locks).map_err(|e| io_error(&locks, &e))? {
                let path = entry.map_err(|e| io_error(&locks, &e))?.path();
                let file = open_lock_file(&path)?;
                if !try_lock(&file, &path)? {
                    continue;
                }
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::debug!("Leaving {}: {e}", path.display()),
                }
            }
        }

        Ok(removed)
    }

    /// Whether a writer currently holds the lock of `key`
    fn is_locked(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.lock_path(key);
        if !path.exists() {
            return Ok(false);
        }
        let file = open_lock_file(&path)?;
        Ok(!try_lock(&file, &path)?)
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.root.join(LOCKS_DIR).join(format!("{key}.lock"))
    }

    fn staging_dir(&self, key: &str) -> Result<PathBuf, StoreError> {
        let dir = self
            .root
            .join(TMP_DIR)
            .join(format!("{key}.{}", unique_suffix()));
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, &e))?;
        Ok(dir)
    }

    fn lock(&self, key: &str) -> Result<LockGuard, StoreError> {
        let locks = self.root.join(LOCKS_DIR);
        std::fs::create_dir_all(&locks).map_err(|e| io_error(&locks, &e))?;
        let path = self.lock_path(key);
        let file = open_lock_file(&path)?;

        let started = Instant::now();
        let mut announced = false;
        while !try_lock(&file, &path)? {
            if started.elapsed() >= self.lock_timeout {
                return Err(StoreError::LockTimeout {
                    path,
                    seconds: self.lock_timeout.as_secs(),
                });
            }
            if !announced {
                tracing::info!("Waiting for another build of {key}");
                announced = true;
            }
            std::thread::sleep(LOCK_POLL_INTERVAL);
        }
        Ok(LockGuard { file, path })
    }
}

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    format!("{}.{nanos}", std::process::id())
}
