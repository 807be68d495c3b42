//! Key/value backends for durable counter storage
//!
//! Implementations:
//! - `InMemoryBackend`: For unit tests and embedding
//! - `LocalFsBackend`: One file per key under a directory

use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::{ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Byte-oriented key/value storage used by [`super::BackendCounterStore`]
///
/// `put` must replace a value atomically: a concurrent or later `get` sees
/// either the old bytes or the new bytes, never a mix.
pub trait KeyValueBackend: Send + Sync + 'static {
    /// Value stored under `key`, `None` if absent
    fn get(&self, key: &str) -> IoResult<Option<Vec<u8>>>;

    /// Create or overwrite `key`
    fn put(&self, key: &str, value: &[u8]) -> IoResult<()>;

    /// Delete `key`, returning whether it existed
    fn delete(&self, key: &str) -> IoResult<bool>;

    /// All keys starting with `prefix`, sorted
    fn keys(&self, prefix: &str) -> IoResult<Vec<String>>;
}

// ============================================================================
// InMemoryBackend - For tests
// ============================================================================

/// In-memory backend; clones share the same data
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values (for testing)
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueBackend for InMemoryBackend {
    fn get(&self, key: &str) -> IoResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> IoResult<()> {
        self.data.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> IoResult<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> IoResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// ============================================================================
// LocalFsBackend - For single-node persistence
// ============================================================================

const TEMP_SUFFIX: &str = ".tmp";

/// Hex characters per path component; keeps every file and directory name
/// well under the usual 255-byte limit
const SEGMENT_LEN: usize = 200;

/// Marks a directory holding the continuation of longer keys
const DIR_SUFFIX: &str = ".d";

/// Filesystem backend storing each key in its own file
///
/// The hex encoding of the key is split into components of at most
/// [`SEGMENT_LEN`] characters: every full leading component becomes a
/// directory, the remainder names the file. Arbitrary counter names never
/// escape the base directory and long names never exceed the file name
/// limit. Writes go to a temporary file that is renamed over the target.
/// Directories are left in place when their last key is deleted.
#[derive(Debug, Clone)]
pub struct LocalFsBackend {
    base_path: PathBuf,
}

impl LocalFsBackend {
    /// Open (creating if needed) a backend rooted at `base_path`
    pub fn open(base_path: impl Into<PathBuf>) -> IoResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(LocalFsBackend { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(relative_path(key))
    }

    fn ensure_parent(&self, path: &Path) -> IoResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl KeyValueBackend for LocalFsBackend {
    fn get(&self, key: &str) -> IoResult<Option<Vec<u8>>> {
        match std::fs::read(self.full_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> IoResult<()> {
        let path = self.full_path(key);
        self.ensure_parent(&path)?;
        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        std::fs::write(&temp, value)?;
        std::fs::rename(&temp, &path)
    }

    fn delete(&self, key: &str) -> IoResult<bool> {
        match std::fs::remove_file(self.full_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn keys(&self, prefix: &str) -> IoResult<Vec<String>> {
        let mut keys = Vec::new();
        collect_keys(&self.base_path, "", prefix, &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}

/// Walk `dir`, where `encoded` is the hex already consumed by parent
/// directories
fn collect_keys(
    dir: &Path,
    encoded: &str,
    prefix: &str,
    keys: &mut Vec<String>,
) -> IoResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };

        if file_type.is_dir() {
            if let Some(segment) = file_name.strip_suffix(DIR_SUFFIX) {
                if segment.len() == SEGMENT_LEN {
                    let nested = format!("{}{}", encoded, segment);
                    collect_keys(&entry.path(), &nested, prefix, keys)?;
                }
            }
        } else if file_type.is_file() && file_name.len() <= SEGMENT_LEN {
            // Leftover temp files and foreign files are skipped
            if let Some(key) = decode_key(&format!("{}{}", encoded, file_name)) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
    }
    Ok(())
}

fn relative_path(key: &str) -> PathBuf {
    let encoded = encode_key(key);
    let mut path = PathBuf::new();
    let mut rest = encoded.as_str();
    while rest.len() > SEGMENT_LEN {
        let (segment, tail) = rest.split_at(SEGMENT_LEN);
        path.push(format!("{}{}", segment, DIR_SUFFIX));
        rest = tail;
    }
    path.push(rest);
    path
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() * 2);
    for byte in key.as_bytes() {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn decode_key(encoded: &str) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(encoded.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
