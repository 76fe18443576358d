//! Clothing catalog
//!
//! Read-only description of every item a user can pick, grouped by
//! category. Built once at startup, either from the built-in store or from a
//! TOML catalog file, and never mutated afterwards.

pub mod selection;

pub use selection::{SelectionCallback, SelectionChange, SelectionManager, SelectionState};

use crate::utils::math::{Color, Transform, TransformSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

const PLACEHOLDER_THUMBNAIL: &str = "/api/placeholder/100/100";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClothingCategory {
    Top,
    Bottom,
}

impl ClothingCategory {
    pub const ALL: [ClothingCategory; 2] = [ClothingCategory::Top, ClothingCategory::Bottom];

    /// Heading shown above the category's picker
    pub fn display_name(&self) -> &'static str {
        match self {
            ClothingCategory::Top => "Shirts",
            ClothingCategory::Bottom => "Pants",
        }
    }
}

impl std::fmt::Display for ClothingCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClothingCategory::Top => write!(f, "Top"),
            ClothingCategory::Bottom => write!(f, "Bottom"),
        }
    }
}

/// Where an item's geometry comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemSource {
    /// Meshes already inside the avatar model, matched by name
    Embedded { object_name: String },
    /// A separately loaded model attached to the avatar
    External {
        model_path: String,
        #[serde(default)]
        transform: TransformSpec,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClothingItem {
    pub id: String,
    pub name: String,
    pub category: ClothingCategory,
    pub source: ItemSource,
    #[serde(default, rename = "color", skip_serializing_if = "Option::is_none")]
    pub color_override: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl ClothingItem {
    pub fn embedded(
        id: impl Into<String>,
        name: impl Into<String>,
        category: ClothingCategory,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            source: ItemSource::Embedded { object_name: object_name.into() },
            color_override: None,
            thumbnail: None,
        }
    }

    pub fn external(
        id: impl Into<String>,
        name: impl Into<String>,
        category: ClothingCategory,
        model_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            source: ItemSource::External {
                model_path: model_path.into(),
                transform: TransformSpec::default(),
            },
            color_override: None,
            thumbnail: None,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color_override = Some(color);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_transform(mut self, spec: TransformSpec) -> Self {
        if let ItemSource::External { transform, .. } = &mut self.source {
            *transform = spec;
        }
        self
    }

    pub fn is_external(&self) -> bool {
        matches!(self.source, ItemSource::External { .. })
    }

    pub fn model_path(&self) -> Option<&str> {
        match &self.source {
            ItemSource::External { model_path, .. } => Some(model_path),
            ItemSource::Embedded { .. } => None,
        }
    }

    pub fn object_name(&self) -> Option<&str> {
        match &self.source {
            ItemSource::Embedded { object_name } => Some(object_name),
            ItemSource::External { .. } => None,
        }
    }

    /// Placement for external items; identity for embedded ones
    pub fn transform(&self) -> Transform {
        match &self.source {
            ItemSource::External { transform, .. } => (*transform).into(),
            ItemSource::Embedded { .. } => Transform::IDENTITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Category {0} has no items")]
    EmptyCategory(ClothingCategory),

    #[error("Duplicate item id: {0}")]
    DuplicateId(String),

    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    items: Vec<ClothingItem>,
}

/// Ordered items per category. Every category has at least one item and
/// item ids are unique across the whole catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ClothingCatalog {
    items: BTreeMap<ClothingCategory, Vec<ClothingItem>>,
}

impl ClothingCatalog {
    /// Group `items` by category, keeping their relative order
    pub fn from_items(items: Vec<ClothingItem>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut grouped: BTreeMap<ClothingCategory, Vec<ClothingItem>> = BTreeMap::new();

        for item in items {
            if !seen.insert(item.id.clone()) {
                return Err(CatalogError::DuplicateId(item.id));
            }
            grouped.entry(item.category).or_default().push(item);
        }

        for category in ClothingCategory::ALL {
            if grouped.get(&category).map_or(true, Vec::is_empty) {
                return Err(CatalogError::EmptyCategory(category));
            }
        }

        debug!(
            "Catalog built: {} tops, {} bottoms",
            grouped.get(&ClothingCategory::Top).map_or(0, Vec::len),
            grouped.get(&ClothingCategory::Bottom).map_or(0, Vec::len)
        );

        Ok(Self { items: grouped })
    }

    pub fn from_toml_str(data: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(data)?;
        Self::from_items(file.items)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        info!("Loading clothing catalog from {}", path.display());
        let data = fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    /// The store the viewer ships with: four shirts and two pants, all
    /// embedded in the default avatar model
    pub fn builtin() -> Self {
        use ClothingCategory::{Bottom, Top};

        let entries = [
            ("shirt1", "Basic T-Shirt", Top, "Wolf3D_Outfit_Top", Color::rgba(1.0, 0.0, 0.0, 1.0)),
            ("shirt2", "Formal Shirt", Top, "Wolf3D_Outfit_Top_2", Color::rgba(0.0, 0.0, 1.0, 1.0)),
            ("shirt3", "Hoodie", Top, "Wolf3D_Outfit_Top_3", Color::rgba(0.0, 1.0, 0.0, 1.0)),
            ("shirt4", "Tank Top", Top, "Wolf3D_Outfit_Top_4", Color::rgba(1.0, 1.0, 0.0, 1.0)),
            ("pants1", "Jeans", Bottom, "Wolf3D_Outfit_Bottom", Color::rgba(0.0, 0.0, 128.0 / 255.0, 1.0)),
            (
                "pants2",
                "Shorts",
                Bottom,
                "Wolf3D_Outfit_Bottom_2",
                Color::rgba(139.0 / 255.0, 69.0 / 255.0, 19.0 / 255.0, 1.0),
            ),
        ];

        let mut items: BTreeMap<ClothingCategory, Vec<ClothingItem>> = BTreeMap::new();
        for (id, name, category, object_name, color) in entries {
            items.entry(category).or_default().push(
                ClothingItem::embedded(id, name, category, object_name)
                    .with_color(color)
                    .with_thumbnail(PLACEHOLDER_THUMBNAIL),
            );
        }

        Self { items }
    }

    pub fn categories(&self) -> impl Iterator<Item = ClothingCategory> + '_ {
        self.items.keys().copied()
    }

    pub fn items(&self, category: ClothingCategory) -> &[ClothingItem] {
        self.items.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, category: ClothingCategory, id: &str) -> Option<&ClothingItem> {
        self.items(category).iter().find(|item| item.id == id)
    }

    pub fn first(&self, category: ClothingCategory) -> Option<&ClothingItem> {
        self.items(category).first()
    }

    pub fn len(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ClothingCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
