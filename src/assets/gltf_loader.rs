use super::manager::SceneLoader;
use super::material::{Material, MaterialId};
use super::LoadError;
use crate::rendering::scene::{NodeId, SceneGraph, SceneNode};
use crate::utils::math::{Color, Transform};
use async_trait::async_trait;
use bytes::Bytes;
use glam::{Quat, Vec3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Loads `.glb`/`.gltf` models from HTTP(S) URLs or the filesystem.
///
/// Only the node hierarchy, names, transforms and base colors are kept;
/// geometry stays with the renderer.
pub struct GltfSceneLoader {
    client: reqwest::Client,
    asset_root: Option<PathBuf>,
}

impl GltfSceneLoader {
    pub fn new(asset_root: Option<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            asset_root,
        }
    }

    /// Web-style absolute paths ("/jacket.glb") are served from the asset root
    pub fn resolve_path(&self, source: &str) -> PathBuf {
        match &self.asset_root {
            Some(root) => root.join(source.trim_start_matches('/')),
            None => PathBuf::from(source),
        }
    }

    async fn fetch(&self, source: &str) -> Result<Bytes, LoadError> {
        if let Ok(url) = Url::parse(source) {
            match url.scheme() {
                "http" | "https" => return self.fetch_http(url).await,
                "file" => {
                    let path = url.to_file_path().map_err(|_| LoadError::Io {
                        source_path: source.to_string(),
                        reason: "not a local file URL".to_string(),
                    })?;
                    return read_file(source, &path).await;
                }
                // single letter schemes are Windows drive prefixes
                scheme if scheme.len() > 1 => {
                    return Err(LoadError::Other {
                        reason: format!("Unsupported URL scheme '{}' in {}", scheme, source),
                    });
                }
                _ => {}
            }
        }

        read_file(source, &self.resolve_path(source)).await
    }

    async fn fetch_http(&self, url: Url) -> Result<Bytes, LoadError> {
        let http_error = |e: reqwest::Error| LoadError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        };

        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(http_error)?
            .error_for_status()
            .map_err(http_error)?;
        response.bytes().await.map_err(http_error)
    }
}

async fn read_file(source: &str, path: &Path) -> Result<Bytes, LoadError> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| LoadError::Io {
            source_path: source.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
}

#[async_trait]
impl SceneLoader for GltfSceneLoader {
    async fn load(&self, source: &str) -> Result<SceneGraph, LoadError> {
        info!("Loading model: {}", source);
        let bytes = self.fetch(source).await?;

        let name = source.to_string();
        tokio::task::spawn_blocking(move || parse_scene(&name, &bytes))
            .await
            .map_err(|e| LoadError::Other {
                reason: format!("glTF parse task failed: {}", e),
            })?
    }
}

/// Build a scene graph from glTF/GLB bytes. The graph root is named `source`.
pub fn parse_scene(source: &str, bytes: &[u8]) -> Result<SceneGraph, LoadError> {
    let gltf = gltf::Gltf::from_slice(bytes).map_err(|e| LoadError::Parse {
        source_path: source.to_string(),
        reason: e.to_string(),
    })?;
    let document = &gltf.document;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| LoadError::Parse {
            source_path: source.to_string(),
            reason: "document has no scenes".to_string(),
        })?;

    let mut builder = SceneBuilder {
        graph: SceneGraph::new(source),
        materials: HashMap::new(),
        default_material: None,
    };

    for material in document.materials() {
        if let Some(index) = material.index() {
            let name = material
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("material_{index}"));
            let base_color = Color::from_array(material.pbr_metallic_roughness().base_color_factor());
            let id = builder.graph.add_material(Material::new(name, base_color));
            builder.materials.insert(index, id);
        }
    }

    let root = builder.graph.root();
    for node in scene.nodes() {
        builder.add_node(root, &node)?;
    }

    debug!(
        "Parsed {}: {} nodes, {} materials",
        source,
        builder.graph.node_count(),
        builder.graph.material_count()
    );
    Ok(builder.graph)
}

struct SceneBuilder {
    graph: SceneGraph,
    materials: HashMap<usize, MaterialId>,
    default_material: Option<MaterialId>,
}

impl SceneBuilder {
    fn material_for(&mut self, primitive: &gltf::Primitive<'_>) -> MaterialId {
        if let Some(id) = primitive.material().index().and_then(|i| self.materials.get(&i)) {
            return *id;
        }
        match self.default_material {
            Some(id) => id,
            None => {
                let id = self.graph.add_material(Material::default());
                self.default_material = Some(id);
                id
            }
        }
    }

    fn add_node(&mut self, parent: NodeId, node: &gltf::Node<'_>) -> Result<(), LoadError> {
        let name = node
            .name()
            .map(str::to_string)
            .or_else(|| node.mesh().and_then(|m| m.name().map(str::to_string)))
            .unwrap_or_else(|| format!("node_{}", node.index()));

        let (translation, rotation, scale) = node.transform().decomposed();
        let transform = Transform {
            translation: Vec3::from_array(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from_array(scale),
        };

        let primitives: Vec<_> = node.mesh().map(|m| m.primitives().collect()).unwrap_or_default();

        let scene_node = match primitives.as_slice() {
            [single] => SceneNode::mesh(name.clone(), self.material_for(single)),
            _ => SceneNode::group(name.clone()),
        }
        .with_transform(transform);

        let id = self
            .graph
            .add_child(parent, scene_node)
            .ok_or_else(|| LoadError::Other {
                reason: format!("parent of glTF node {} vanished", node.index()),
            })?;

        // Primitives of one mesh all carry the node's name so they match as one item
        if primitives.len() > 1 {
            for (index, primitive) in primitives.iter().enumerate() {
                let material = self.material_for(primitive);
                self.graph.add_child(
                    id,
                    SceneNode::mesh(name.clone(), material).with_primitive(index),
                );
            }
        }

        for child in node.children() {
            self.add_node(id, &child)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [ { "nodes": [0] } ],
        "nodes": [
            { "name": "Armature", "children": [1, 2], "translation": [0.0, 1.0, 0.0] },
            { "name": "Wolf3D_Outfit_Top", "mesh": 0 },
            { "name": "Wolf3D_Body", "mesh": 1 }
        ],
        "materials": [
            { "name": "Wolf3D_Outfit", "pbrMetallicRoughness": { "baseColorFactor": [0.5, 0.5, 0.5, 1.0] } }
        ],
        "accessors": [
            { "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 1.0] }
        ],
        "meshes": [
            { "primitives": [ { "attributes": { "POSITION": 0 }, "material": 0 } ] },
            { "primitives": [ { "attributes": { "POSITION": 0 } }, { "attributes": { "POSITION": 0 } } ] }
        ]
    }"#;

    #[test]
    fn test_parse_hierarchy_and_materials() {
        let graph = parse_scene("avatar.gltf", MINIMAL_GLTF.as_bytes()).unwrap();

        let armature = graph.find_by_name("Armature").unwrap();
        assert_eq!(graph.node(armature).unwrap().transform.translation, Vec3::Y);

        let top = graph.find_by_name("Wolf3D_Outfit_Top").unwrap();
        let material = graph.node(top).unwrap().material().unwrap();
        assert_eq!(graph.material(material).unwrap().name, "Wolf3D_Outfit");
        assert_eq!(graph.material(material).unwrap().base_color, Color::rgba(0.5, 0.5, 0.5, 1.0));
    }

    #[test]
    fn test_multi_primitive_mesh_becomes_named_children() {
        let graph = parse_scene("avatar.gltf", MINIMAL_GLTF.as_bytes()).unwrap();
        let body_meshes: Vec<_> = graph
            .meshes()
            .filter(|(_, node)| node.name == "Wolf3D_Body")
            .collect();
        assert_eq!(body_meshes.len(), 2);

        // both primitives fall back to the same default material
        let materials: Vec<_> = body_meshes.iter().map(|(_, n)| n.material().unwrap()).collect();
        assert_eq!(materials[0], materials[1]);
        assert_eq!(graph.material_count(), 2);
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = parse_scene("broken.glb", b"not a model").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn test_resolve_against_asset_root() {
        let loader = GltfSceneLoader::new(Some(PathBuf::from("/srv/public")));
        assert_eq!(loader.resolve_path("/jacket.glb"), PathBuf::from("/srv/public/jacket.glb"));

        let bare = GltfSceneLoader::new(None);
        assert_eq!(bare.resolve_path("models/jacket.glb"), PathBuf::from("models/jacket.glb"));
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("avatar.gltf"), MINIMAL_GLTF).unwrap();

        let loader = GltfSceneLoader::new(Some(dir.path().to_path_buf()));
        let graph = loader.load("/avatar.gltf").await.unwrap();
        assert!(graph.find_by_name("Wolf3D_Outfit_Top").is_some());

        let missing = loader.load("/missing.glb").await.unwrap_err();
        assert!(matches!(missing, LoadError::Io { .. }));
    }
}
