use std::path::{Path, PathBuf};

use crate::foundation::math::{Mat4, Vec3};

/// One drawable piece of a model
///
/// Attribute arrays run in parallel, one entry per vertex, already expanded
/// to a triangle list. `normals` and `tex_coords` may be empty when the
/// source file has none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    /// Vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Vertex normals, empty when absent
    pub normals: Vec<[f32; 3]>,
    /// Texture coordinates in file convention (V up), empty when absent
    pub tex_coords: Vec<[f32; 2]>,
    /// Diffuse texture path, empty when the material has none
    pub diffuse_texture: PathBuf,
}

impl Shape {
    /// Number of vertices in the shape
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Whether the shape names a diffuse texture
    pub fn has_texture(&self) -> bool {
        !self.diffuse_texture.as_os_str().is_empty()
    }
}

/// A named model with its shapes and world transform
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Display name
    pub name: String,
    /// Ordered shapes
    pub shapes: Vec<Shape>,
    /// Model-to-world transform
    pub transform: Mat4,
}

impl Model {
    /// Create an empty model with an identity transform
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shapes: Vec::new(),
            transform: Mat4::identity(),
        }
    }

    /// Append a shape
    #[must_use]
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shapes.push(shape);
        self
    }

    /// Total vertex count across shapes
    pub fn vertex_count(&self) -> usize {
        self.shapes.iter().map(Shape::vertex_count).sum()
    }

    /// First non-empty diffuse texture path among the shapes
    pub fn diffuse_texture(&self) -> Option<&Path> {
        self.shapes
            .iter()
            .find(|shape| shape.has_texture())
            .map(|shape| shape.diffuse_texture.as_path())
    }

    /// Place the model at a position
    pub fn set_translation(&mut self, position: Vec3) {
        self.transform = Mat4::new_translation(&position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_textured_shape_wins() {
        let model = Model::new("crate")
            .with_shape(Shape::default())
            .with_shape(Shape {
                diffuse_texture: PathBuf::from("wood.png"),
                ..Shape::default()
            })
            .with_shape(Shape {
                diffuse_texture: PathBuf::from("metal.png"),
                ..Shape::default()
            });

        assert_eq!(model.diffuse_texture(), Some(Path::new("wood.png")));
    }

    #[test]
    fn test_untextured_model_has_no_texture() {
        let model = Model::new("plain").with_shape(Shape::default());
        assert!(model.diffuse_texture().is_none());
    }
}
