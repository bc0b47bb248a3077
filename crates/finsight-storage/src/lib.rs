//! # finsight-storage
//!
//! Storage Gateway: the single seam between the pipeline and remote object
//! storage. Uploaded PDFs live remotely; the database keeps only the
//! `(public_id, url)` reference returned by [`ObjectStore::store`].
//!
//! Backends:
//! - [`HttpObjectStore`] — bearer-authenticated remote store (production)
//! - [`MemoryObjectStore`] — in-process map with failure injection (tests)

pub mod http;
pub mod memory;

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};

use finsight_core::Result;

pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;

/// Reference to a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Opaque key used for fetch/remove.
    pub public_id: String,
    /// Direct download URL.
    pub url: String,
}

/// Abstraction over remote object storage.
///
/// Transport failures surface as `Error::Storage`; a missing object on
/// `remove` is reported as `Ok(false)`, not an error, so cleanup paths can
/// stay best-effort.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `data` and return its reference. `owner` and `name` feed the
    /// key derivation; the raw values never appear in the key.
    async fn store(&self, data: &[u8], owner: &str, name: &str) -> Result<StoredObject>;

    /// Download the object bytes.
    async fn fetch(&self, public_id: &str) -> Result<Vec<u8>>;

    /// Delete the object. `Ok(true)` = removed, `Ok(false)` = not found.
    async fn remove(&self, public_id: &str) -> Result<bool>;
}

/// Derive a collision-resistant storage key for an upload.
///
/// `statements/{hex(sha256(owner:name:salt))[..24]}` with a fresh random
/// salt, so the same user re-uploading the same filename never collides
/// with the earlier object.
pub fn derive_public_id(owner: &str, name: &str) -> String {
    let salt: u64 = rand::thread_rng().gen();
    let mut hasher = Sha256::new();
    hasher.update(owner.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(salt.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("statements/{}", &digest[..24])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_id_shape() {
        let id = derive_public_id("user-1", "jan.pdf");
        assert!(id.starts_with("statements/"));
        let hash = id.strip_prefix("statements/").unwrap();
        assert_eq!(hash.len(), 24);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_public_id_never_collides_on_reupload() {
        let a = derive_public_id("user-1", "jan.pdf");
        let b = derive_public_id("user-1", "jan.pdf");
        assert_ne!(a, b);
    }

    #[test]
    fn test_public_id_hides_inputs() {
        let id = derive_public_id("user-1", "secret-account.pdf");
        assert!(!id.contains("user-1"));
        assert!(!id.contains("secret"));
    }
}
