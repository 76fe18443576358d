//! Avatar composition
//!
//! Reconciles the current clothing selection with the avatar scene graph:
//! embedded items toggle meshes that ship inside the avatar, external items
//! are loaded separately and attached as tagged subtrees.

pub mod attachment;
pub mod coordinator;
pub mod embedded;

pub use attachment::{AttachedGarment, AttachmentManager};
pub use coordinator::{CompositionEngine, EngineOptions};
pub use embedded::{ClothingMarkers, CompositorReport, EmbeddedCompositor, MatchPolicy};

use crate::catalog::ClothingCategory;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    #[error("Invalid selection: '{item_id}' is not a {category} item")]
    InvalidSelection {
        category: ClothingCategory,
        item_id: String,
    },

    #[error("Failed to load {path}: {reason}")]
    AssetLoadFailure { path: String, reason: String },

    #[error("Failed to load avatar {uri}: {reason}")]
    BaseModelLoadFailure { uri: String, reason: String },

    #[error("Avatar model is not loaded")]
    AvatarNotLoaded,
}

pub type CompositionResult<T> = Result<T, CompositionError>;
