//! File-backed local cache.

use crate::cache::LocalCache;
use crate::error::{Result, StoreError};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the cache directory manifest.
const CACHE_MAGIC: &[u8; 4] = b"VSM\0";

/// Magic bytes for cache entry files.
const ENTRY_MAGIC: &[u8; 4] = b"VSC\0";

/// Current cache format version.
const CACHE_VERSION: u8 = 1;

/// A directory of cache entries, one file per key.
///
/// Each entry file holds a header, the payload length, the payload, and a
/// CRC-32 trailer. Writes go to a temporary file that is renamed into place,
/// so a crash leaves either the old entry or the new one.
///
/// The directory is exclusively locked while open: only one process may act
/// as the local replica.
pub struct FileCache {
    /// Base directory.
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,
}

impl FileCache {
    /// Open an existing cache directory or create a new one.
    pub fn open_or_create(path: impl AsRef<Path>, create_if_missing: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.join("MANIFEST").exists() {
            Self::open(path)
        } else if create_if_missing {
            Self::create(path)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new cache directory.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let lock_file = Self::acquire_lock(&path)?;
        Self::write_manifest(&path)?;

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Open an existing cache directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Self::verify_manifest(&path)?;

        let lock_file = Self::acquire_lock(&path)?;

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Base directory of the cache.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File holding the entry for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.path.join(format!("{}.entry", name))
    }

    fn write_entry(path: &Path, payload: &[u8]) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let mut file = File::create(&tmp_path)?;

        // Write header
        file.write_all(ENTRY_MAGIC)?;
        file.write_all(&[CACHE_VERSION])?;

        // Write payload
        file.write_all(&(payload.len() as u64).to_le_bytes())?;
        file.write_all(payload)?;

        // Write checksum
        let checksum = crc32fast::hash(payload);
        file.write_all(&checksum.to_le_bytes())?;

        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn read_entry(path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(path)?;

        // Read and verify magic
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != ENTRY_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid cache entry magic".into()));
        }

        // Read version
        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != CACHE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported cache entry version: {}",
                version[0]
            )));
        }

        // Read payload
        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);

        let file_len = file.metadata()?.len();
        if len > file_len {
            return Err(StoreError::Corruption(format!(
                "cache entry claims {} bytes but file holds {}",
                len, file_len
            )));
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)
            .map_err(|e| StoreError::Corruption(format!("truncated cache entry: {}", e)))?;

        // Read and verify checksum
        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)
            .map_err(|e| StoreError::Corruption(format!("missing checksum: {}", e)))?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&payload);

        if stored_checksum != computed_checksum {
            return Err(StoreError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(payload)
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(CACHE_MAGIC)?;
        file.write_all(&[CACHE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != CACHE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid cache magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != CACHE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported cache version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let payload = Self::read_entry(&path)?;
        String::from_utf8(payload)
            .map(Some)
            .map_err(|e| StoreError::Corruption(format!("cache entry is not UTF-8: {}", e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        Self::write_entry(&self.entry_path(key), value.as_bytes())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        if path.exists() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
