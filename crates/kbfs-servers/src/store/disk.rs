//! On-disk store: one file per key under a single directory.
//!
//! Short keys are hex-encoded into file names so arbitrary key strings
//! (folder handles contain commas and `#`) stay filesystem-safe. Keys too long
//! for a file name are stored under their BLAKE3 hash, with the key itself
//! framed in front of the value. Every write goes to its own temp file and is
//! renamed into place, so concurrent puts of one key never collide.

use super::KvStore;
use async_trait::async_trait;
use kbfs_core::{ServerError, ServerResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const FILE_SUFFIX: &str = ".dat";
const HASHED_SUFFIX: &str = ".kdat";
const TEMP_SUFFIX: &str = ".tmp";

/// Longest key kept under its hex name; hex doubles it and NAME_MAX is 255
const MAX_PLAIN_KEY_LEN: usize = 120;

/// Where a key lives on disk
enum Slot {
    Plain(PathBuf),
    Hashed(PathBuf),
}

impl Slot {
    fn path(&self) -> &Path {
        match self {
            Slot::Plain(path) | Slot::Hashed(path) => path,
        }
    }
}

/// Directory-backed key/value store
#[derive(Debug, Clone)]
pub struct DiskStore {
    base_path: PathBuf,
}

impl DiskStore {
    /// Open the store, creating its directory if needed.
    ///
    /// This is the only fallible step of constructing a persistent tier and
    /// runs synchronously.
    pub fn open(base_path: impl AsRef<Path>) -> ServerResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)
            .map_err(|e| ServerError::init(base_path.display().to_string(), e.to_string()))?;
        let meta = std::fs::metadata(&base_path)
            .map_err(|e| ServerError::init(base_path.display().to_string(), e.to_string()))?;
        if !meta.is_dir() {
            return Err(ServerError::init(
                base_path.display().to_string(),
                "not a directory",
            ));
        }
        Ok(Self { base_path })
    }

    fn slot_for(&self, key: &str) -> Slot {
        if key.len() <= MAX_PLAIN_KEY_LEN {
            let name = format!("{}{FILE_SUFFIX}", hex::encode(key.as_bytes()));
            Slot::Plain(self.base_path.join(name))
        } else {
            let name = format!("{}{HASHED_SUFFIX}", blake3::hash(key.as_bytes()).to_hex());
            Slot::Hashed(self.base_path.join(name))
        }
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(format!("{:016x}{TEMP_SUFFIX}", rand::random::<u64>()))
    }

    fn plain_key(file_name: &str) -> Option<String> {
        let encoded = file_name.strip_suffix(FILE_SUFFIX)?;
        let bytes = hex::decode(encoded).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// `key length (u32 BE) || key || value`
fn frame_hashed(key: &str, value: Vec<u8>) -> ServerResult<Vec<u8>> {
    let len = u32::try_from(key.len())
        .map_err(|_| ServerError::WriteFailed(format!("key of {} bytes", key.len())))?;
    let mut framed = Vec::with_capacity(4 + key.len() + value.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(key.as_bytes());
    framed.extend_from_slice(&value);
    Ok(framed)
}

fn unframe_hashed(path: &Path, framed: &[u8]) -> ServerResult<(String, Vec<u8>)> {
    let malformed = || ServerError::ReadFailed(format!("{}: malformed entry", path.display()));
    if framed.len() < 4 {
        return Err(malformed());
    }
    let (len, rest) = framed.split_at(4);
    let len = <[u8; 4]>::try_from(len).map_err(|_| malformed())?;
    let len = usize::try_from(u32::from_be_bytes(len)).map_err(|_| malformed())?;
    if rest.len() < len {
        return Err(malformed());
    }
    let (key, value) = rest.split_at(len);
    let key = String::from_utf8(key.to_vec()).map_err(|_| malformed())?;
    Ok((key, value.to_vec()))
}

#[async_trait]
impl KvStore for DiskStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> ServerResult<()> {
        let slot = self.slot_for(key);
        let contents = match slot {
            Slot::Plain(_) => value,
            Slot::Hashed(_) => frame_hashed(key, value)?,
        };

        let tmp = self.temp_path();
        fs::write(&tmp, contents)
            .await
            .map_err(|e| ServerError::WriteFailed(format!("{}: {e}", tmp.display())))?;
        if let Err(e) = fs::rename(&tmp, slot.path()).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(ServerError::WriteFailed(format!("{}: {e}", slot.path().display())));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> ServerResult<Option<Vec<u8>>> {
        let slot = self.slot_for(key);
        let path = slot.path();
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ServerError::ReadFailed(format!("{}: {e}", path.display()))),
        };
        match slot {
            Slot::Plain(_) => Ok(Some(bytes)),
            Slot::Hashed(_) => {
                let (stored, value) = unframe_hashed(path, &bytes)?;
                Ok((stored == key).then_some(value))
            }
        }
    }

    async fn remove(&self, key: &str) -> ServerResult<bool> {
        let slot = self.slot_for(key);
        let path = slot.path();
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ServerError::WriteFailed(format!("{}: {e}", path.display()))),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> ServerResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| ServerError::ReadFailed(format!("{}: {e}", self.base_path.display())))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ServerError::ReadFailed(e.to_string()))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let key = if name.ends_with(HASHED_SUFFIX) {
                let path = entry.path();
                let bytes = match fs::read(&path).await {
                    Ok(bytes) => bytes,
                    // Removed since the directory was listed.
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => {
                        return Err(ServerError::ReadFailed(format!("{}: {e}", path.display())))
                    }
                };
                unframe_hashed(&path, &bytes)?.0
            } else {
                match Self::plain_key(name) {
                    Some(key) => key,
                    None => continue,
                }
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn location(&self) -> Option<PathBuf> {
        Some(self.base_path.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kbfs_block");

        let store = DiskStore::open(&path).unwrap();
        store.put("folder,one#two", b"abc".to_vec()).await.unwrap();
        drop(store);

        let reopened = DiskStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("folder,one#two").await.unwrap(),
            Some(b"abc".to_vec())
        );
        assert_eq!(
            reopened.keys_with_prefix("folder").await.unwrap(),
            vec!["folder,one#two".to_string()]
        );
    }

    #[test]
    fn test_open_fails_when_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();

        let err = DiskStore::open(&file).unwrap_err();
        assert!(matches!(err, ServerError::Init { .. }));
    }

    #[tokio::test]
    async fn test_remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        store.put("k", vec![1]).await.unwrap();
        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_of_one_key_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        let writers: Vec<_> = (0..64u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.put("same-block", vec![i; 256]).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let stored = store.get("same-block").await.unwrap().unwrap();
        assert_eq!(stored.len(), 256);
        assert!(stored.iter().all(|b| *b == stored[0]));

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                let name = e.as_ref().unwrap().file_name();
                name.to_string_lossy().ends_with(TEMP_SUFFIX)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_long_keys_are_stored_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let long = format!("folder,{}", "a".repeat(300));

        store.put(&long, b"value".to_vec()).await.unwrap();
        store.put("folder,short", b"other".to_vec()).await.unwrap();

        let reopened = DiskStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&long).await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(
            reopened.keys_with_prefix("folder,").await.unwrap(),
            vec![long.clone(), "folder,short".to_string()]
        );
        assert!(reopened.remove(&long).await.unwrap());
        assert_eq!(reopened.get(&long).await.unwrap(), None);
    }
}
