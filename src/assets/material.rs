use crate::utils::math::Color;

/// Index into a scene graph's material table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub(crate) u32);

impl MaterialId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Surface description shared by every mesh that references it
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: Color,
}

impl Material {
    pub fn new(name: impl Into<String>, base_color: Color) -> Self {
        Self {
            name: name.into(),
            base_color,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("Default", Color::WHITE)
    }
}
