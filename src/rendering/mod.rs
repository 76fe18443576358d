//! Scene representation handed to the render surface

pub mod scene;

pub use scene::{NodeId, NodeKind, RenderItem, SceneGraph, SceneNode};
