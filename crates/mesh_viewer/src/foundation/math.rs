//! Math types
//!
//! Thin aliases over `nalgebra` so the rest of the crate reads in `f32`
//! graphics vocabulary.

pub use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Convert a matrix into the column-major array layout GLSL `mat4` expects
pub fn to_gpu_matrix(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_matrix_is_column_major() {
        let translation = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let gpu = to_gpu_matrix(&translation);

        // Translation lives in the fourth column
        assert_eq!(gpu[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(gpu[0], [1.0, 0.0, 0.0, 0.0]);
    }
}
