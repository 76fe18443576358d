use crate::catalog::ClothingCategory;
use crate::composition::CompositionError;
use std::time::{Duration, SystemTime};

/// Events published by the composition engine to the UI layer.
/// Load failures arrive here instead of being returned from `select`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionEvent {
    pub kind: CompositionEventKind,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompositionEventKind {
    SelectionChanged {
        category: ClothingCategory,
        item_id: String,
    },
    AvatarLoaded {
        uri: String,
        elapsed: Duration,
    },
    AvatarLoadFailed {
        error: CompositionError,
    },
    AssetLoaded {
        path: String,
        elapsed: Duration,
    },
    /// `categories` lists the categories that were waiting on `path`
    AssetLoadFailed {
        path: String,
        categories: Vec<ClothingCategory>,
        error: CompositionError,
    },
    GarmentAttached {
        category: ClothingCategory,
        item_id: String,
    },
    GarmentDetached {
        category: ClothingCategory,
        item_id: String,
    },
    /// A load finished after every category had moved on from it
    StaleResultDiscarded {
        path: String,
    },
}

impl CompositionEvent {
    pub fn new(kind: CompositionEventKind) -> Self {
        Self {
            kind,
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(&self) -> Option<&CompositionError> {
        match &self.kind {
            CompositionEventKind::AvatarLoadFailed { error }
            | CompositionEventKind::AssetLoadFailed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}
