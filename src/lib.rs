// Avatar Outfitter: clothing composition for 3D avatars

pub mod assets;
pub mod catalog;
pub mod composition;
pub mod config;
pub mod rendering;
pub mod utils;
pub mod world;

// Re-export commonly used types for convenience
pub use assets::{GltfSceneLoader, LoadError, LoadState, SceneLoader};
pub use catalog::{ClothingCatalog, ClothingCategory, ClothingItem, ItemSource, SelectionState};
pub use composition::{CompositionEngine, CompositionError, CompositionResult, EngineOptions, MatchPolicy};
pub use config::ViewerSettings;
pub use rendering::{RenderItem, SceneGraph};
pub use world::{AvatarPhase, CompositionEvent, CompositionEventKind};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
