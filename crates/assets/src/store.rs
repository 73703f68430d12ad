//! The image asset store.
//!
//! Holds the images the user picked, sorted by name, with one preview
//! lease per asset and an optional active selection. Dimensions are
//! probed on the blocking pool after the asset is visible; a probe that
//! finishes after its asset was removed (or re-added with a new handle)
//! is discarded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::file::{AssetId, SelectedFile};
use crate::preview::{PreviewHandle, PreviewLease, PreviewRegistry};
use crate::probe::{probe_dimensions, Dimensions};

/// Options for [`ImageAssetStore::add_files`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Clear the store before adding.
    pub replace: bool,
}

/// A selected image as seen by the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    pub id: AssetId,
    pub name: String,
    pub size: u64,
    pub mime: String,
    pub last_modified: i64,
    pub preview_url: String,
    #[serde(skip)]
    pub preview: PreviewHandle,
    pub dimensions: Option<Dimensions>,
}

struct Entry {
    asset: ImageAsset,
    lease: PreviewLease,
}

#[derive(Default)]
struct StoreState {
    entries: Vec<Entry>,
    active_id: Option<AssetId>,
}

struct StoreInner {
    registry: Arc<dyn PreviewRegistry>,
    state: Mutex<StoreState>,
}

/// Owns the user's image selection and its preview handles.
///
/// Every handle is revoked exactly once: on removal, on clear, or when the
/// store is dropped.
pub struct ImageAssetStore {
    inner: Arc<StoreInner>,
    probes: Mutex<Vec<JoinHandle<()>>>,
}

impl ImageAssetStore {
    pub fn new(registry: Arc<dyn PreviewRegistry>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                registry,
                state: Mutex::new(StoreState::default()),
            }),
            probes: Mutex::new(Vec::new()),
        }
    }

    /// Add the image entries of `selection`, returning the ids that were
    /// actually added.
    ///
    /// Non-image entries are ignored. A selection with no images changes
    /// nothing, even with `replace`. Files whose id is already present
    /// (in the store or earlier in the same batch) are skipped.
    pub fn add_files(&self, selection: Vec<SelectedFile>, options: AddOptions) -> Vec<AssetId> {
        let total = selection.len();
        let images: Vec<SelectedFile> = selection.into_iter().filter(|f| f.is_image()).collect();
        if images.len() < total {
            tracing::debug!(ignored = total - images.len(), "Ignoring non-image files");
        }
        if images.is_empty() {
            return Vec::new();
        }

        let mut to_probe = Vec::new();
        {
            let mut state = self.inner.lock_state();
            if options.replace {
                clear_locked(&mut state);
            }

            let mut seen: HashSet<AssetId> =
                state.entries.iter().map(|e| e.asset.id.clone()).collect();

            for file in images {
                let id = file.asset_id();
                if !seen.insert(id.clone()) {
                    continue;
                }
                let lease = PreviewLease::acquire(&self.inner.registry, &file);
                let handle = lease.handle().clone();
                state.entries.push(Entry {
                    asset: ImageAsset {
                        id: id.clone(),
                        name: file.name.clone(),
                        size: file.size,
                        mime: file.mime.clone(),
                        last_modified: file.last_modified,
                        preview_url: handle.url().to_string(),
                        preview: handle.clone(),
                        dimensions: None,
                    },
                    lease,
                });
                to_probe.push((id, handle, file));
            }

            state.entries.sort_by(|a, b| compare_names(&a.asset.name, &b.asset.name));

            if state.active_id.is_none() {
                state.active_id = state.entries.first().map(|e| e.asset.id.clone());
            }
        }

        let added: Vec<AssetId> = to_probe.iter().map(|(id, _, _)| id.clone()).collect();
        tracing::debug!(added = added.len(), "Image assets added");

        for (id, handle, file) in to_probe {
            self.spawn_probe(id, handle, file);
        }
        added
    }

    /// Remove one asset and revoke its preview. If it was active, the new
    /// first asset (or nothing) becomes active.
    pub fn remove_image(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.inner.lock_state();
            let Some(pos) = state.entries.iter().position(|e| e.asset.id == id) else {
                return false;
            };
            let entry = state.entries.remove(pos);
            if state.active_id.as_deref() == Some(id) {
                state.active_id = state.entries.first().map(|e| e.asset.id.clone());
            }
            entry
        };
        removed.lease.release();
        true
    }

    /// Revoke every preview and empty the store.
    pub fn clear(&self) {
        let mut state = self.inner.lock_state();
        clear_locked(&mut state);
    }

    /// Make `id` the active asset. Unknown ids are ignored.
    pub fn set_active(&self, id: &str) -> bool {
        let mut state = self.inner.lock_state();
        if !state.entries.iter().any(|e| e.asset.id == id) {
            return false;
        }
        state.active_id = Some(id.to_string());
        true
    }

    /// All assets, sorted by name.
    pub fn images(&self) -> Vec<ImageAsset> {
        self.inner
            .lock_state()
            .entries
            .iter()
            .map(|e| e.asset.clone())
            .collect()
    }

    pub fn image(&self, id: &str) -> Option<ImageAsset> {
        self.inner
            .lock_state()
            .entries
            .iter()
            .find(|e| e.asset.id == id)
            .map(|e| e.asset.clone())
    }

    pub fn active_id(&self) -> Option<AssetId> {
        self.inner.lock_state().active_id.clone()
    }

    pub fn active_image(&self) -> Option<ImageAsset> {
        let state = self.inner.lock_state();
        let id = state.active_id.as_ref()?;
        state
            .entries
            .iter()
            .find(|e| &e.asset.id == id)
            .map(|e| e.asset.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every dimension probe started so far has finished.
    pub async fn wait_for_dimensions(&self) {
        let pending: Vec<JoinHandle<()>> = {
            let mut probes = self.probes.lock().unwrap_or_else(|e| e.into_inner());
            probes.drain(..).collect()
        };
        for probe in pending {
            if let Err(e) = probe.await {
                tracing::warn!(error = %e, "Dimension probe task failed");
            }
        }
    }

    // ---- private helpers ----

    /// Probe on the blocking pool when a runtime is available, inline
    /// otherwise.
    fn spawn_probe(&self, id: AssetId, handle: PreviewHandle, file: SelectedFile) {
        let inner = Arc::downgrade(&self.inner);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let task = rt.spawn_blocking(move || {
                    let dims = probe_dimensions(&file.bytes);
                    apply_dimensions(&inner, &id, &handle, dims);
                });
                let mut probes = self.probes.lock().unwrap_or_else(|e| e.into_inner());
                probes.retain(|p| !p.is_finished());
                probes.push(task);
            }
            Err(_) => {
                let dims = probe_dimensions(&file.bytes);
                apply_dimensions(&inner, &id, &handle, dims);
            }
        }
    }
}

impl StoreInner {
    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Record probe output, unless the asset is gone or now owns a different
/// handle.
fn apply_dimensions(
    inner: &Weak<StoreInner>,
    id: &str,
    handle: &PreviewHandle,
    dims: Option<Dimensions>,
) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut state = inner.lock_state();
    match state
        .entries
        .iter_mut()
        .find(|e| e.asset.id == id && &e.asset.preview == handle)
    {
        Some(entry) => entry.asset.dimensions = dims,
        None => tracing::debug!(asset_id = id, "Discarding stale dimension probe"),
    }
}

fn clear_locked(state: &mut StoreState) {
    state.active_id = None;
    for entry in state.entries.drain(..) {
        entry.lease.release();
    }
}

/// Case-insensitive name order, ties broken by exact name.
fn compare_names(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
