use crate::assets::{AssetLoadCache, AssetManager, EnsureOutcome, LoadTarget};
use crate::catalog::{ClothingCategory, ClothingItem};
use crate::rendering::scene::{NodeId, SceneGraph};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// External garment currently grafted into the avatar scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedGarment {
    pub item_id: String,
    pub model_path: String,
    pub node: NodeId,
}

/// Loads, attaches and detaches externally sourced clothing.
///
/// Holds at most one attached garment per category. Each attachment is a
/// deep copy of the cached fragment with its own materials.
#[derive(Debug, Default)]
pub struct AttachmentManager {
    cache: AssetLoadCache,
    attached: BTreeMap<ClothingCategory, AttachedGarment>,
}

impl AttachmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &AssetLoadCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut AssetLoadCache {
        &mut self.cache
    }

    /// Make sure `path` is loaded or loading, spawning a load if needed
    pub fn ensure_loaded(&mut self, path: &str, assets: &AssetManager) -> EnsureOutcome {
        let outcome = self.cache.ensure(path);
        if let EnsureOutcome::Started { attempt } = outcome {
            assets.begin_load(LoadTarget::External(path.to_string()), attempt);
        }
        outcome
    }

    /// Restart a failed load of `path`. Returns whether a load was spawned.
    pub fn retry(&mut self, path: &str, assets: &AssetManager) -> bool {
        match self.cache.retry(path) {
            Some(attempt) => {
                assets.begin_load(LoadTarget::External(path.to_string()), attempt);
                true
            }
            None => false,
        }
    }

    pub fn attached(&self, category: ClothingCategory) -> Option<&AttachedGarment> {
        self.attached.get(&category)
    }

    pub fn is_attached(&self, category: ClothingCategory, item_id: &str) -> bool {
        self.attached
            .get(&category)
            .is_some_and(|garment| garment.item_id == item_id)
    }

    /// Graft `fragment` under the scene root, tinted and placed for `item`,
    /// replacing whatever was attached for `category`
    pub fn attach(
        &mut self,
        scene: &mut SceneGraph,
        category: ClothingCategory,
        item: &ClothingItem,
        fragment: &SceneGraph,
    ) -> Option<NodeId> {
        let model_path = item.model_path()?.to_string();
        self.detach(scene, category);

        let node = scene.graft(scene.root(), fragment)?;
        scene.set_tag(node, Some(category));
        scene.set_transform(node, item.transform());

        if let Some(color) = item.color_override {
            let materials: BTreeSet<_> = scene
                .traverse_from(node, |_| true)
                .into_iter()
                .filter_map(|id| scene.node(id).and_then(|n| n.material()))
                .collect();
            for material in materials {
                scene.set_material_color(material, color);
            }
        }

        info!("Attached {} ({}) for {} as node {}", item.id, model_path, category, node);
        self.attached.insert(
            category,
            AttachedGarment {
                item_id: item.id.clone(),
                model_path,
                node,
            },
        );
        Some(node)
    }

    /// Remove the garment attached for `category`, if any
    pub fn detach(&mut self, scene: &mut SceneGraph, category: ClothingCategory) -> Option<AttachedGarment> {
        let garment = self.attached.remove(&category);
        if let Some(garment) = &garment {
            scene.remove_subtree(garment.node);
            info!("Detached {} from {}", garment.item_id, category);
        }

        for stray in scene.find_tagged(category) {
            debug!("Removing untracked {} attachment {}", category, stray);
            scene.remove_subtree(stray);
        }

        garment
    }
}
