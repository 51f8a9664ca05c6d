use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use thiserror::Error;

/// AES-GCM nonce length in bytes, prepended to every encrypted record.
const NONCE_LEN: usize = 12;

/// Errors raised by the storage capability.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The underlying medium failed.
    #[error("storage i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// A stored value exists but could not be decrypted.
    #[error("could not decrypt the stored value")]
    Decrypt,
    /// A value could not be encrypted for storage.
    #[error("could not encrypt the value")]
    Encrypt,
}

/// Byte-oriented read/write capability for named files.
///
/// Production wires [`DiskStorage`]; tests wire [`MemoryStorage`]. The
/// stores never talk to either directly, only through the
/// [`EncryptedStorage`] wrapper.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Reads the full content of `name`, or `None` if it does not exist.
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;
    /// Replaces the content of `name`.
    async fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError>;
}

/// File storage rooted at a directory on disk.
///
/// Writes go through a sibling temporary file followed by a rename, so a
/// reader never observes a half-written record.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStorage for DiskStorage {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(self.root.join(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root)?;
        let tmp = self.root.join(format!("{name}.tmp"));
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, self.root.join(name))?;
        Ok(())
    }
}

/// In-memory file storage for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.files.lock().unwrap().get(name).cloned())
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }
}

/// Encryption-at-rest wrapper over any [`FileStorage`].
///
/// Values are sealed with AES-256-GCM under a per-install key; the random
/// 96-bit nonce is prepended to the ciphertext. A record that fails to
/// decrypt reads as [`StorageError::Decrypt`], which the stores treat the
/// same as an absent file.
pub struct EncryptedStorage {
    inner: Arc<dyn FileStorage>,
    cipher: Aes256Gcm,
}

impl EncryptedStorage {
    /// Wraps `inner` with the given 256-bit key.
    pub fn new(inner: Arc<dyn FileStorage>, key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        Self { inner, cipher }
    }
}

#[async_trait]
impl FileStorage for EncryptedStorage {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let sealed = match self.inner.read(name).await? {
            Some(sealed) => sealed,
            None => return Ok(None),
        };
        if sealed.len() < NONCE_LEN {
            return Err(StorageError::Decrypt);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::Decrypt)?;
        Ok(Some(plain))
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, data)
            .map_err(|_| StorageError::Encrypt)?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        self.inner.write(name, &sealed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_storage_round_trips() {
        let storage = MemoryStorage::new();
        assert!(storage.read("a").await.unwrap().is_none());
        storage.write("a", b"hello").await.unwrap();
        assert_eq!(storage.read("a").await.unwrap().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn encrypted_storage_round_trips() {
        let inner = Arc::new(MemoryStorage::new());
        let storage = EncryptedStorage::new(inner.clone(), &[7u8; 32]);

        storage.write("list", b"trust me").await.unwrap();
        assert_eq!(storage.read("list").await.unwrap().unwrap(), b"trust me");

        // the backing record is not the plaintext
        let sealed = inner.read("list").await.unwrap().unwrap();
        assert!(sealed.len() > b"trust me".len());
        assert!(!sealed.windows(8).any(|w| w == b"trust me"));
    }

    #[tokio::test]
    async fn tampered_record_fails_to_decrypt() {
        let inner = Arc::new(MemoryStorage::new());
        let storage = EncryptedStorage::new(inner.clone(), &[7u8; 32]);
        storage.write("list", b"trust me").await.unwrap();

        let mut sealed = inner.read("list").await.unwrap().unwrap();
        *sealed.last_mut().unwrap() ^= 0xff;
        inner.write("list", &sealed).await.unwrap();

        assert!(matches!(
            storage.read("list").await,
            Err(StorageError::Decrypt)
        ));
    }

    #[tokio::test]
    async fn wrong_key_fails_to_decrypt() {
        let inner = Arc::new(MemoryStorage::new());
        EncryptedStorage::new(inner.clone(), &[7u8; 32])
            .write("list", b"trust me")
            .await
            .unwrap();

        let other = EncryptedStorage::new(inner, &[8u8; 32]);
        assert!(matches!(other.read("list").await, Err(StorageError::Decrypt)));
    }
}
