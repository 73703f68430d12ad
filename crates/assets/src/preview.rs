//! Revocable in-memory preview handles.
//!
//! A [`PreviewHandle`] is the equivalent of a browser object URL: an
//! opaque reference the renderer can load until it is revoked. Handles are
//! issued by a [`PreviewRegistry`]; the asset store wraps each one in a
//! [`PreviewLease`] so revocation happens exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::file::SelectedFile;

/// Opaque preview reference, e.g. `preview://wmark/7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    id: u64,
    url: String,
}

impl PreviewHandle {
    pub fn new(id: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Issues and revokes preview handles.
pub trait PreviewRegistry: Send + Sync {
    /// Create a handle that keeps `file`'s bytes renderable.
    fn create(&self, file: &SelectedFile) -> PreviewHandle;

    /// Release the bytes behind `handle`.
    fn revoke(&self, handle: &PreviewHandle);
}

/// Registry that keeps preview bytes in process memory.
///
/// Counts every create and revoke call so leaks and double revocations
/// are observable.
#[derive(Default)]
pub struct InMemoryPreviewRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Arc<[u8]>>>,
    created: AtomicUsize,
    revoked: AtomicUsize,
}

impl InMemoryPreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes behind a live handle.
    pub fn bytes(&self, handle: &PreviewHandle) -> Option<Arc<[u8]>> {
        self.live_map().get(&handle.id).cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.load(Ordering::SeqCst)
    }

    /// Handles created and not yet revoked.
    pub fn outstanding(&self) -> usize {
        self.live_map().len()
    }

    fn live_map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<[u8]>>> {
        // A poisoned map is still structurally valid.
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PreviewRegistry for InMemoryPreviewRegistry {
    fn create(&self, file: &SelectedFile) -> PreviewHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.live_map().insert(id, Arc::clone(&file.bytes));
        self.created.fetch_add(1, Ordering::SeqCst);
        PreviewHandle::new(id, format!("preview://wmark/{id}"))
    }

    fn revoke(&self, handle: &PreviewHandle) {
        self.revoked.fetch_add(1, Ordering::SeqCst);
        if self.live_map().remove(&handle.id).is_none() {
            tracing::warn!(url = handle.url(), "Revoking unknown preview handle");
        }
    }
}

/// Sole owner of one preview handle. Revokes it when released or dropped.
pub struct PreviewLease {
    handle: PreviewHandle,
    registry: Arc<dyn PreviewRegistry>,
}

impl PreviewLease {
    /// Create a handle for `file` through `registry`.
    pub fn acquire(registry: &Arc<dyn PreviewRegistry>, file: &SelectedFile) -> Self {
        Self {
            handle: registry.create(file),
            registry: Arc::clone(registry),
        }
    }

    pub fn handle(&self) -> &PreviewHandle {
        &self.handle
    }

    /// Revoke the handle now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PreviewLease {
    fn drop(&mut self) {
        self.registry.revoke(&self.handle);
    }
}

impl std::fmt::Debug for PreviewLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewLease")
            .field("handle", &self.handle)
            .finish()
    }
}
