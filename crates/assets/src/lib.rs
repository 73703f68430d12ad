//! Client-side image assets selected for export.
//!
//! The [`store::ImageAssetStore`] owns one preview handle per selected
//! image and guarantees each handle is revoked exactly once. Pixel
//! dimensions are filled in by a background header probe. [`drag`]
//! models the drop target that feeds files into the store.

pub mod drag;
pub mod file;
pub mod preview;
pub mod probe;
pub mod store;

pub use drag::{DefaultAction, DropTarget, DropZone, NodeId};
pub use file::{AssetId, SelectedFile};
pub use preview::{InMemoryPreviewRegistry, PreviewHandle, PreviewLease, PreviewRegistry};
pub use probe::Dimensions;
pub use store::{AddOptions, ImageAsset, ImageAssetStore};
