use super::{NodeId, NodeKind, SceneNode};
use crate::assets::material::{Material, MaterialId};
use crate::catalog::ClothingCategory;
use crate::utils::math::{Color, Transform};
use glam::Mat4;
use std::collections::{HashMap, HashSet};

/// Arena-backed scene tree with a graph-owned material table.
///
/// Meshes reference materials by [`MaterialId`]; two meshes holding the same
/// id share one material, so recoloring it affects both. `revision` only moves
/// when a mutation actually changes something, which lets callers detect
/// whether a recomposition produced a scene delta.
///
/// Material slots left unreferenced by [`SceneGraph::remove_subtree`] are
/// freed and reused by later [`SceneGraph::add_material`] calls, so repeated
/// graft/remove cycles keep the table bounded.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGraph {
    nodes: HashMap<NodeId, SceneNode>,
    materials: Vec<Option<Material>>,
    free_materials: Vec<MaterialId>,
    root: NodeId,
    next_id: u32,
    revision: u64,
}

/// A mesh the render surface should draw this frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub node: NodeId,
    pub name: String,
    pub world: Mat4,
    pub color: Color,
}

impl SceneGraph {
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(root, SceneNode::group(root_name));
        SceneGraph {
            nodes,
            materials: Vec::new(),
            free_materials: Vec::new(),
            root,
            next_id: 1,
            revision: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = match self.free_materials.pop() {
            Some(id) => {
                self.materials[id.index()] = Some(material);
                id
            }
            None => {
                self.materials.push(Some(material));
                MaterialId(self.materials.len() as u32 - 1)
            }
        };
        self.revision += 1;
        id
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.index()).and_then(Option::as_ref)
    }

    /// Live materials, not counting freed slots
    pub fn material_count(&self) -> usize {
        self.materials.iter().filter(|m| m.is_some()).count()
    }

    /// Add `node` as the last child of `parent`. Returns `None` if `parent`
    /// is not part of this graph.
    pub fn add_child(&mut self, parent: NodeId, mut node: SceneNode) -> Option<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return None;
        }

        let id = NodeId(self.next_id);
        self.next_id += 1;

        node.parent = Some(parent);
        node.children.clear();
        self.nodes.insert(id, node);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }

        self.revision += 1;
        Some(id)
    }

    /// Returns whether visibility changed
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.visible != visible => {
                node.visible = visible;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Returns whether the transform changed
    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.transform != transform => {
                node.transform = transform;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Returns whether the tag changed
    pub fn set_tag(&mut self, id: NodeId, tag: Option<ClothingCategory>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.tag != tag => {
                node.tag = tag;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Recolor a material in place. Every mesh sharing it picks up the change.
    pub fn set_material_color(&mut self, id: MaterialId, color: Color) -> bool {
        match self.materials.get_mut(id.index()).and_then(Option::as_mut) {
            Some(material) if material.base_color != color => {
                material.base_color = color;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Depth-first, pre-order walk from the root in child insertion order
    pub fn traverse(&self) -> Vec<NodeId> {
        self.traverse_from(self.root, |_| true)
    }

    /// Pre-order walk from `start`; subtrees whose root fails `descend` are
    /// skipped entirely (the root itself included)
    pub fn traverse_from<F>(&self, start: NodeId, descend: F) -> Vec<NodeId>
    where
        F: Fn(&SceneNode) -> bool,
    {
        let mut order = Vec::new();
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !descend(node) {
                continue;
            }
            order.push(id);
            stack.extend(node.children.iter().rev().copied());
        }

        order
    }

    pub fn meshes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> + '_ {
        self.traverse()
            .into_iter()
            .filter_map(move |id| self.nodes.get(&id).map(|node| (id, node)))
            .filter(|(_, node)| node.is_mesh())
    }

    /// Meshes that belong to the base model itself, i.e. not inside an
    /// attached (tagged) subtree
    pub fn base_meshes(&self) -> Vec<NodeId> {
        self.traverse_from(self.root, |node| node.tag.is_none())
            .into_iter()
            .filter(|id| self.nodes.get(id).is_some_and(SceneNode::is_mesh))
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.traverse()
            .into_iter()
            .find(|id| self.nodes.get(id).is_some_and(|node| node.name == name))
    }

    pub fn find_tagged(&self, tag: ClothingCategory) -> Vec<NodeId> {
        self.traverse()
            .into_iter()
            .filter(|id| self.nodes.get(id).is_some_and(|node| node.tag == Some(tag)))
            .collect()
    }

    /// Deep-copy `source` under `parent` and return the id of the copied root.
    ///
    /// Every material referenced by the copied meshes is duplicated into this
    /// graph, so the copy can be recolored without touching `source` or any
    /// other copy. Meshes that shared a material in `source` still share the
    /// duplicate.
    pub fn graft(&mut self, parent: NodeId, source: &SceneGraph) -> Option<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return None;
        }

        let mut material_map: HashMap<MaterialId, MaterialId> = HashMap::new();
        let mut node_map: HashMap<NodeId, NodeId> = HashMap::new();

        for source_id in source.traverse() {
            let Some(source_node) = source.nodes.get(&source_id) else {
                continue;
            };

            let mut copy = source_node.clone();
            if let NodeKind::Mesh { material, .. } = &mut copy.kind {
                let cloned = match material_map.get(material) {
                    Some(id) => *id,
                    None => {
                        let duplicate = source.material(*material).cloned().unwrap_or_default();
                        let id = self.add_material(duplicate);
                        material_map.insert(*material, id);
                        id
                    }
                };
                *material = cloned;
            }

            let target_parent = match source_node.parent {
                Some(p) => node_map.get(&p).copied().unwrap_or(parent),
                None => parent,
            };
            let new_id = self.add_child(target_parent, copy)?;
            node_map.insert(source_id, new_id);
        }

        node_map.get(&source.root).copied()
    }

    /// Remove `id` and all its descendants. The root cannot be removed.
    /// Materials referenced only by the removed meshes are freed; node ids
    /// are never reused.
    pub fn remove_subtree(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.nodes.contains_key(&id) {
            return false;
        }

        let doomed = self.traverse_from(id, |_| true);
        if let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|child| *child != id);
            }
        }

        let mut orphaned = HashSet::new();
        for node_id in doomed {
            if let Some(material) = self.nodes.remove(&node_id).and_then(|n| n.material()) {
                orphaned.insert(material);
            }
        }
        for node in self.nodes.values() {
            if let Some(material) = node.material() {
                orphaned.remove(&material);
            }
        }
        for material in orphaned {
            if let Some(slot) = self.materials.get_mut(material.index()) {
                if slot.take().is_some() {
                    self.free_materials.push(material);
                }
            }
        }

        self.revision += 1;
        true
    }

    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(&node_id) else {
                break;
            };
            matrix = node.transform.to_matrix() * matrix;
            current = node.parent;
        }
        matrix
    }

    /// Meshes whose whole ancestor chain is visible, in traversal order
    pub fn visible_meshes(&self) -> Vec<RenderItem> {
        self.traverse_from(self.root, |node| node.visible)
            .into_iter()
            .filter_map(|id| {
                let node = self.nodes.get(&id)?;
                let material = node.material()?;
                Some(RenderItem {
                    node: id,
                    name: node.name.clone(),
                    world: self.world_transform(id),
                    color: self.material(material).map(|m| m.base_color).unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avatar_fixture() -> (SceneGraph, MaterialId) {
        let mut graph = SceneGraph::new("Avatar");
        let shared = graph.add_material(Material::new("Outfit", Color::WHITE));
        let root = graph.root();
        let armature = graph.add_child(root, SceneNode::group("Armature")).unwrap();
        graph.add_child(armature, SceneNode::mesh("Wolf3D_Outfit_Top", shared)).unwrap();
        graph.add_child(armature, SceneNode::mesh("Wolf3D_Outfit_Bottom", shared)).unwrap();
        (graph, shared)
    }

    #[test]
    fn test_traversal_is_preorder() {
        let (graph, _) = avatar_fixture();
        let names: Vec<_> = graph
            .traverse()
            .into_iter()
            .map(|id| graph.node(id).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["Avatar", "Armature", "Wolf3D_Outfit_Top", "Wolf3D_Outfit_Bottom"]);
    }

    #[test]
    fn test_revision_only_moves_on_change() {
        let (mut graph, shared) = avatar_fixture();
        let top = graph.find_by_name("Wolf3D_Outfit_Top").unwrap();
        let before = graph.revision();

        assert!(!graph.set_visible(top, true));
        assert!(!graph.set_material_color(shared, Color::WHITE));
        assert_eq!(graph.revision(), before);

        assert!(graph.set_visible(top, false));
        assert_eq!(graph.revision(), before + 1);
    }

    #[test]
    fn test_shared_material_recolors_every_user() {
        let (mut graph, shared) = avatar_fixture();
        let blue = Color::rgba(0.0, 0.0, 1.0, 1.0);
        graph.set_material_color(shared, blue);

        let colors: Vec<_> = graph.visible_meshes().into_iter().map(|item| item.color).collect();
        assert_eq!(colors, vec![blue, blue]);
    }

    #[test]
    fn test_graft_clones_materials() {
        let (mut avatar, _) = avatar_fixture();

        let mut jacket = SceneGraph::new("jacket.glb");
        let cloth = jacket.add_material(Material::new("Cloth", Color::WHITE));
        let jacket_root = jacket.root();
        jacket.add_child(jacket_root, SceneNode::mesh("Sleeve_L", cloth)).unwrap();
        jacket.add_child(jacket_root, SceneNode::mesh("Sleeve_R", cloth)).unwrap();

        let grafted = avatar.graft(avatar.root(), &jacket).unwrap();
        let sleeves = avatar.traverse_from(grafted, |_| true);
        assert_eq!(sleeves.len(), 3);

        let left = avatar.find_by_name("Sleeve_L").unwrap();
        let right = avatar.find_by_name("Sleeve_R").unwrap();
        let left_mat = avatar.node(left).unwrap().material().unwrap();
        let right_mat = avatar.node(right).unwrap().material().unwrap();
        assert_eq!(left_mat, right_mat);

        avatar.set_material_color(left_mat, Color::rgba(1.0, 0.0, 0.0, 1.0));
        assert_eq!(jacket.material(cloth).unwrap().base_color, Color::WHITE);
    }

    #[test]
    fn test_remove_subtree() {
        let (mut graph, _) = avatar_fixture();
        let armature = graph.find_by_name("Armature").unwrap();
        assert!(graph.remove_subtree(armature));
        assert_eq!(graph.node_count(), 1);
        assert!(graph.node(graph.root()).unwrap().children().is_empty());
        assert!(!graph.remove_subtree(graph.root()));
    }

    #[test]
    fn test_graft_and_remove_keeps_material_table_bounded() {
        let (mut avatar, shared) = avatar_fixture();
        let mut jacket = SceneGraph::new("jacket.glb");
        let cloth = jacket.add_material(Material::new("Cloth", Color::WHITE));
        let lining = jacket.add_material(Material::new("Lining", Color::WHITE));
        let jacket_root = jacket.root();
        jacket.add_child(jacket_root, SceneNode::mesh("Shell", cloth)).unwrap();
        jacket.add_child(jacket_root, SceneNode::mesh("Lining", lining)).unwrap();

        let baseline = avatar.material_count();
        for _ in 0..50 {
            let grafted = avatar.graft(avatar.root(), &jacket).unwrap();
            assert_eq!(avatar.material_count(), baseline + 2);
            assert!(avatar.remove_subtree(grafted));
            assert_eq!(avatar.material_count(), baseline);
        }

        assert_eq!(avatar.materials.len(), baseline + 2);
        assert_eq!(avatar.material(shared).unwrap().name, "Outfit");
    }

    #[test]
    fn test_material_still_referenced_survives_removal() {
        let (mut graph, shared) = avatar_fixture();
        let root = graph.root();
        let extra = graph.add_child(root, SceneNode::mesh("Wolf3D_Outfit_Top_2", shared)).unwrap();

        assert!(graph.remove_subtree(extra));
        assert!(graph.material(shared).is_some());
        assert_eq!(graph.material_count(), 1);
    }

    #[test]
    fn test_base_meshes_skip_tagged_subtrees() {
        let (mut graph, shared) = avatar_fixture();
        let root = graph.root();
        let garment = graph.add_child(root, SceneNode::group("jacket")).unwrap();
        graph.add_child(garment, SceneNode::mesh("Wolf3D_Outfit_Top", shared)).unwrap();
        graph.set_tag(garment, Some(ClothingCategory::Top));

        assert_eq!(graph.base_meshes().len(), 2);
        assert_eq!(graph.find_tagged(ClothingCategory::Top), vec![garment]);
    }

    #[test]
    fn test_hidden_ancestor_hides_meshes() {
        let (mut graph, _) = avatar_fixture();
        let armature = graph.find_by_name("Armature").unwrap();
        graph.set_visible(armature, false);
        assert!(graph.visible_meshes().is_empty());
    }
}
