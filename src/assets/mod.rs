//! Asset loading for avatar and garment models
//!
//! Loaders turn a source (URL or path) into a [`SceneGraph`]; the
//! [`AssetManager`] runs them off the mutation path and reports back through
//! a completion channel; the [`AssetLoadCache`] deduplicates loads per path.

pub mod cache;
pub mod gltf_loader;
pub mod manager;
pub mod material;

pub use cache::{AssetLoadCache, CacheStats, CompletionOutcome, EnsureOutcome, LoadState};
pub use gltf_loader::GltfSceneLoader;
pub use manager::{AssetManager, LoadCompletion, LoadTarget, SceneLoader};
pub use material::{Material, MaterialId};

use crate::rendering::scene::SceneGraph;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("I/O error reading {source_path}: {reason}")]
    Io { source_path: String, reason: String },

    #[error("HTTP error fetching {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("Failed to parse {source_path}: {reason}")]
    Parse { source_path: String, reason: String },

    #[error("Timed out loading {source_path} after {after:?}")]
    Timeout { source_path: String, after: Duration },

    #[error("{reason}")]
    Other { reason: String },
}

pub type LoadResult = Result<SceneGraph, LoadError>;
