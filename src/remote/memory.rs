use super::BlobStore;
use crate::errors::RemoteError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-process blob store. Can be switched into a failing mode to simulate
/// an unreachable backend.
#[derive(Default)]
pub struct MemoryBlobStore {
    docs: Mutex<HashMap<String, Value>>,
    next_id: AtomicUsize,
    writes: AtomicUsize,
    unreachable: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of successful `create` and `update` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn document(&self, id: &str) -> Option<Value> {
        self.docs.lock().ok()?.get(id).cloned()
    }

    pub fn insert(&self, id: &str, doc: Value) {
        if let Ok(mut docs) = self.docs.lock() {
            docs.insert(id.to_string(), doc);
        }
    }

    fn check_reachable(&self) -> Result<(), RemoteError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("memory store unreachable".to_string()));
        }
        Ok(())
    }

    fn docs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, RemoteError> {
        self.docs
            .lock()
            .map_err(|_| RemoteError::Transport("memory store poisoned".to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn create(&self, doc: &Value) -> Result<String, RemoteError> {
        self.check_reachable()?;
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.docs()?.insert(id.clone(), doc.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn read(&self, id: &str) -> Result<Value, RemoteError> {
        self.check_reachable()?;
        self.docs()?
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, doc: &Value) -> Result<(), RemoteError> {
        self.check_reachable()?;
        let mut docs = self.docs()?;
        let slot = docs
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        *slot = doc.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.check_reachable()?;
        self.docs()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }
}
