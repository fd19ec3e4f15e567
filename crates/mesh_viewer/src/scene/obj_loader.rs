//! Wavefront OBJ loading through `tobj`

use std::path::{Path, PathBuf};

use super::{Model, SceneError, Shape};

/// Load an OBJ file into a [`Model`]
///
/// Faces are triangulated and expanded to a flat triangle list; diffuse
/// texture paths are resolved relative to the OBJ file's directory.
pub fn load_obj(path: impl AsRef<Path>) -> Result<Model, SceneError> {
    let path = path.as_ref();
    let display = path.display().to_string();

    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (meshes, materials) = tobj::load_obj(path, &options).map_err(|source| SceneError::Obj {
        path: display.clone(),
        source,
    })?;

    let materials = materials.unwrap_or_else(|e| {
        log::warn!("[objLoader] {}: material library unavailable ({}), shapes stay untextured", display, e);
        Vec::new()
    });
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

    let name = path
        .file_stem()
        .map_or_else(|| display.clone(), |stem| stem.to_string_lossy().into_owned());
    let mut model = Model::new(name);

    for mesh in &meshes {
        let texture = mesh
            .mesh
            .material_id
            .and_then(|id| materials.get(id))
            .and_then(|material| material.diffuse_texture.as_deref())
            .filter(|texture| !texture.is_empty())
            .map(|texture| base_dir.join(texture));

        let shape = shape_from_mesh(&mesh.mesh, texture);
        if shape.vertex_count() > 0 {
            model.shapes.push(shape);
        }
    }

    if model.shapes.is_empty() {
        return Err(SceneError::Empty(display));
    }

    log::info!(
        "[objLoader] Loaded '{}': {} shape(s), {} vertices",
        model.name,
        model.shapes.len(),
        model.vertex_count()
    );
    Ok(model)
}

/// Expand an indexed `tobj` mesh into a triangle-list [`Shape`]
fn shape_from_mesh(mesh: &tobj::Mesh, texture: Option<PathBuf>) -> Shape {
    let has_normals = !mesh.normals.is_empty();
    let has_uvs = !mesh.texcoords.is_empty();

    let mut shape = Shape {
        diffuse_texture: texture.unwrap_or_default(),
        ..Shape::default()
    };

    for &index in &mesh.indices {
        let i = index as usize;
        let Some(position) = mesh.positions.get(3 * i..3 * i + 3) else {
            continue;
        };
        shape.positions.push([position[0], position[1], position[2]]);

        if has_normals {
            let normal = mesh.normals.get(3 * i..3 * i + 3).unwrap_or(&[0.0, 0.0, 0.0]);
            shape.normals.push([normal[0], normal[1], normal[2]]);
        }
        if has_uvs {
            let uv = mesh.texcoords.get(2 * i..2 * i + 2).unwrap_or(&[0.0, 0.0]);
            shape.tex_coords.push([uv[0], uv[1]]);
        }
    }

    shape
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> tobj::Mesh {
        tobj::Mesh {
            positions: vec![
                0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                1.0, 1.0, 0.0, //
                0.0, 1.0, 0.0,
            ],
            texcoords: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            indices: vec![0, 1, 2, 0, 2, 3],
            ..Default::default()
        }
    }

    #[test]
    fn test_indices_expand_to_triangle_list() {
        let shape = shape_from_mesh(&quad_mesh(), None);

        assert_eq!(shape.vertex_count(), 6);
        assert_eq!(shape.positions[3], [0.0, 0.0, 0.0]);
        assert_eq!(shape.positions[5], [0.0, 1.0, 0.0]);
        assert_eq!(shape.tex_coords.len(), 6);
        assert_eq!(shape.tex_coords[2], [1.0, 1.0]);
        assert!(shape.normals.is_empty());
        assert!(!shape.has_texture());
    }

    #[test]
    fn test_texture_path_is_kept() {
        let shape = shape_from_mesh(&quad_mesh(), Some(PathBuf::from("assets/brick.png")));
        assert!(shape.has_texture());
        assert_eq!(shape.diffuse_texture, PathBuf::from("assets/brick.png"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_obj("does/not/exist.obj").expect_err("missing file");
        assert!(err.to_string().contains("does/not/exist.obj"));
    }
}
