use crate::assets::material::MaterialId;
use crate::catalog::{ClothingCategory, ClothingItem, ItemSource};
use crate::rendering::scene::{NodeId, SceneGraph};
use crate::utils::math::Color;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// How an embedded item's `object_name` is matched against mesh names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Mesh name equals the object name
    #[default]
    Exact,
    /// Mesh name contains the object name. "Outfit_Top" also matches
    /// "Outfit_Top_2".
    Substring,
}

impl MatchPolicy {
    pub fn matches(&self, mesh_name: &str, object_name: &str) -> bool {
        match self {
            MatchPolicy::Exact => mesh_name == object_name,
            MatchPolicy::Substring => mesh_name.contains(object_name),
        }
    }
}

/// Name fragments that mark a mesh as swappable clothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClothingMarkers {
    pub top: String,
    pub bottom: String,
}

impl Default for ClothingMarkers {
    fn default() -> Self {
        Self {
            top: "Outfit_Top".to_string(),
            bottom: "Outfit_Bottom".to_string(),
        }
    }
}

impl ClothingMarkers {
    pub fn marker(&self, category: ClothingCategory) -> &str {
        match category {
            ClothingCategory::Top => &self.top,
            ClothingCategory::Bottom => &self.bottom,
        }
    }

    pub fn category_of(&self, mesh_name: &str) -> Option<ClothingCategory> {
        ClothingCategory::ALL
            .into_iter()
            .find(|category| mesh_name.contains(self.marker(*category)))
    }

    pub fn is_clothing(&self, mesh_name: &str) -> bool {
        self.category_of(mesh_name).is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositorReport {
    /// Clothing-capable meshes seen in the base model
    pub clothing_meshes: usize,
    /// Meshes left visible because a selected item matched them
    pub shown: usize,
    pub visibility_changes: usize,
    pub recolored: usize,
}

impl CompositorReport {
    pub fn is_noop(&self) -> bool {
        self.visibility_changes == 0 && self.recolored == 0
    }
}

/// Shows the meshes of selected embedded items and hides every other
/// clothing mesh of the base model. Attached garments are never touched.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedCompositor {
    policy: MatchPolicy,
    markers: ClothingMarkers,
}

impl EmbeddedCompositor {
    pub fn new(policy: MatchPolicy, markers: ClothingMarkers) -> Self {
        Self { policy, markers }
    }

    /// Recompose embedded clothing for the given selection.
    ///
    /// The target visibility is planned in two passes (hide every clothing
    /// mesh, then show the matches of each selected embedded item) and only
    /// then written, so a show is never undone by a later hide and running
    /// twice with the same selection leaves the graph revision untouched.
    /// Tints go straight into the shared material.
    pub fn apply<'a, I>(&self, scene: &mut SceneGraph, selection: I) -> CompositorReport
    where
        I: IntoIterator<Item = &'a ClothingItem>,
    {
        let meshes = scene.base_meshes();
        let mut plan: BTreeMap<NodeId, bool> = BTreeMap::new();
        let mut tints: BTreeMap<MaterialId, Color> = BTreeMap::new();
        let mut report = CompositorReport::default();

        for id in &meshes {
            if let Some(node) = scene.node(*id) {
                if self.markers.is_clothing(&node.name) {
                    plan.insert(*id, false);
                    report.clothing_meshes += 1;
                }
            }
        }

        for item in selection {
            let ItemSource::Embedded { object_name } = &item.source else {
                continue;
            };

            for id in &meshes {
                let Some(node) = scene.node(*id) else {
                    continue;
                };
                if !self.policy.matches(&node.name, object_name) {
                    continue;
                }

                trace!("{} matches mesh {} ({})", item.id, node.name, id);
                plan.insert(*id, true);
                if let (Some(color), Some(material)) = (item.color_override, node.material()) {
                    tints.insert(material, color);
                }
            }
        }

        for (id, visible) in plan {
            if visible {
                report.shown += 1;
            }
            if scene.set_visible(id, visible) {
                report.visibility_changes += 1;
            }
        }
        for (material, color) in tints {
            if scene.set_material_color(material, color) {
                report.recolored += 1;
            }
        }

        debug!(
            "Embedded composition: {} clothing meshes, {} shown, {} visibility changes, {} recolored",
            report.clothing_meshes, report.shown, report.visibility_changes, report.recolored
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::material::Material;
    use crate::rendering::scene::SceneNode;

    fn avatar() -> SceneGraph {
        let mut graph = SceneGraph::new("avatar.glb");
        let top = graph.add_material(Material::new("Top", Color::WHITE));
        let top2 = graph.add_material(Material::new("Top2", Color::WHITE));
        let bottom = graph.add_material(Material::new("Bottom", Color::WHITE));
        let skin = graph.add_material(Material::new("Skin", Color::WHITE));
        let root = graph.root();
        graph.add_child(root, SceneNode::mesh("Wolf3D_Body", skin)).unwrap();
        graph.add_child(root, SceneNode::mesh("Wolf3D_Outfit_Top", top)).unwrap();
        graph.add_child(root, SceneNode::mesh("Wolf3D_Outfit_Top_2", top2)).unwrap();
        graph.add_child(root, SceneNode::mesh("Wolf3D_Outfit_Bottom", bottom)).unwrap();
        graph
    }

    fn visible_names(graph: &SceneGraph) -> Vec<String> {
        graph.visible_meshes().into_iter().map(|item| item.name).collect()
    }

    fn top(object_name: &str) -> ClothingItem {
        ClothingItem::embedded("t", "Top", ClothingCategory::Top, object_name)
    }

    fn bottom() -> ClothingItem {
        ClothingItem::embedded("b", "Bottom", ClothingCategory::Bottom, "Wolf3D_Outfit_Bottom")
    }

    #[test]
    fn test_exact_policy_shows_only_selected_meshes() {
        let mut graph = avatar();
        let compositor = EmbeddedCompositor::default();
        let report = compositor.apply(&mut graph, [&top("Wolf3D_Outfit_Top"), &bottom()]);

        assert_eq!(
            visible_names(&graph),
            vec!["Wolf3D_Body", "Wolf3D_Outfit_Top", "Wolf3D_Outfit_Bottom"]
        );
        assert_eq!(report.clothing_meshes, 3);
        assert_eq!(report.shown, 2);
    }

    #[test]
    fn test_substring_policy_has_prefix_collision() {
        let mut graph = avatar();
        let compositor = EmbeddedCompositor::new(MatchPolicy::Substring, ClothingMarkers::default());
        compositor.apply(&mut graph, [&top("Wolf3D_Outfit_Top"), &bottom()]);

        assert_eq!(
            visible_names(&graph),
            vec!["Wolf3D_Body", "Wolf3D_Outfit_Top", "Wolf3D_Outfit_Top_2", "Wolf3D_Outfit_Bottom"]
        );
    }

    #[test]
    fn test_switching_items_hides_previous() {
        let mut graph = avatar();
        let compositor = EmbeddedCompositor::default();
        compositor.apply(&mut graph, [&top("Wolf3D_Outfit_Top"), &bottom()]);
        compositor.apply(&mut graph, [&top("Wolf3D_Outfit_Top_2"), &bottom()]);

        assert_eq!(
            visible_names(&graph),
            vec!["Wolf3D_Body", "Wolf3D_Outfit_Top_2", "Wolf3D_Outfit_Bottom"]
        );
    }

    #[test]
    fn test_color_override_mutates_shared_material() {
        let mut graph = avatar();
        let red = Color::rgba(1.0, 0.0, 0.0, 1.0);
        let compositor = EmbeddedCompositor::default();
        let report = compositor.apply(&mut graph, [&top("Wolf3D_Outfit_Top").with_color(red)]);
        assert_eq!(report.recolored, 1);

        let id = graph.find_by_name("Wolf3D_Outfit_Top").unwrap();
        let material = graph.node(id).unwrap().material().unwrap();
        assert_eq!(graph.material(material).unwrap().base_color, red);
    }

    #[test]
    fn test_reapply_is_noop() {
        let mut graph = avatar();
        let compositor = EmbeddedCompositor::default();
        let shirt = top("Wolf3D_Outfit_Top").with_color(Color::rgba(0.0, 0.0, 1.0, 1.0));
        compositor.apply(&mut graph, [&shirt, &bottom()]);

        let revision = graph.revision();
        let snapshot = graph.clone();
        let report = compositor.apply(&mut graph, [&shirt, &bottom()]);

        assert!(report.is_noop());
        assert_eq!(graph.revision(), revision);
        assert_eq!(graph, snapshot);
    }

    #[test]
    fn test_external_selection_hides_category() {
        let mut graph = avatar();
        let compositor = EmbeddedCompositor::default();
        let jacket = ClothingItem::external("j", "Jacket", ClothingCategory::Top, "/jacket.glb");
        compositor.apply(&mut graph, [&jacket, &bottom()]);

        assert_eq!(visible_names(&graph), vec!["Wolf3D_Body", "Wolf3D_Outfit_Bottom"]);
    }

    #[test]
    fn test_markers_classify_meshes() {
        let markers = ClothingMarkers::default();
        assert_eq!(markers.category_of("Wolf3D_Outfit_Top_3"), Some(ClothingCategory::Top));
        assert_eq!(markers.category_of("Wolf3D_Outfit_Bottom"), Some(ClothingCategory::Bottom));
        assert!(!markers.is_clothing("Wolf3D_Body"));
    }
}
