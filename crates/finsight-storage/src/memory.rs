//! In-memory object store for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use finsight_core::{Error, Result};

use crate::{derive_public_id, ObjectStore, StoredObject};

/// Map-backed [`ObjectStore`] with switchable failure injection.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    fail_store: AtomicBool,
    fail_fetch: AtomicBool,
    fail_remove: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `store` calls fail with a transport error.
    pub fn fail_store(&self, fail: bool) {
        self.fail_store.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `fetch` calls fail with a transport error.
    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `remove` calls fail with a transport error.
    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Number of objects currently held.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn store(&self, data: &[u8], owner: &str, name: &str) -> Result<StoredObject> {
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(Error::Storage("injected store failure".into()));
        }
        let public_id = derive_public_id(owner, name);
        let url = format!("memory://{public_id}");
        self.objects
            .write()
            .await
            .insert(public_id.clone(), data.to_vec());
        Ok(StoredObject { public_id, url })
    }

    async fn fetch(&self, public_id: &str) -> Result<Vec<u8>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::Storage("injected fetch failure".into()));
        }
        self.objects
            .read()
            .await
            .get(public_id)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("object not found: {public_id}")))
    }

    async fn remove(&self, public_id: &str) -> Result<bool> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Error::Storage("injected remove failure".into()));
        }
        Ok(self.objects.write().await.remove(public_id).is_some())
    }
}
