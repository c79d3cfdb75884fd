//! Remote blob stores.
//!
//! - [`JsonBinClient`]: HTTP JSON-blob API (`/b`, `/b/{id}/latest`)
//! - [`MemoryBlobStore`]: process-local store for tests and local-only mode
//!
//! Each call is one round trip. There is no retry, no backoff and no
//! idempotency key, so a repeated `create` produces a second document.

pub mod jsonbin;
pub mod memory;

pub use jsonbin::JsonBinClient;
pub use memory::MemoryBlobStore;

use crate::errors::RemoteError;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Human-readable backend name (e.g., "jsonbin", "memory").
    fn backend_name(&self) -> &str;

    /// Store a new document and return its id.
    async fn create(&self, doc: &Value) -> Result<String, RemoteError>;

    /// Fetch the latest version of a document.
    async fn read(&self, id: &str) -> Result<Value, RemoteError>;

    /// Replace a document wholesale.
    async fn update(&self, id: &str, doc: &Value) -> Result<(), RemoteError>;

    async fn delete(&self, id: &str) -> Result<(), RemoteError>;
}
