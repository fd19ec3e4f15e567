//! Orbit camera
//!
//! Produces a right-handed view matrix and a projection matrix in Vulkan clip
//! conventions: Y points down in clip space and depth maps to `[0, 1]`.

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Camera orbiting a target point
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    /// Point the camera looks at
    pub target: Point3,
    /// Distance from the target
    pub distance: f32,
    /// Rotation around the world Y axis, radians
    pub yaw: f32,
    /// Elevation above the XZ plane, radians
    pub pitch: f32,
    /// Vertical field of view, radians
    pub fov_y: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Point3::origin(),
            distance: 5.0,
            yaw: 0.0,
            pitch: 0.3,
            fov_y: 45.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl OrbitCamera {
    const PITCH_LIMIT: f32 = 1.5;
    const MIN_DISTANCE: f32 = 0.2;

    /// World-space eye position
    pub fn eye(&self) -> Point3 {
        let offset = Vec3::new(
            self.distance * self.pitch.cos() * self.yaw.sin(),
            self.distance * self.pitch.sin(),
            self.distance * self.pitch.cos() * self.yaw.cos(),
        );
        self.target + offset
    }

    /// Rotate around the target, clamping pitch short of the poles
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw += delta_yaw;
        self.pitch = (self.pitch + delta_pitch).clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    /// Move toward (negative) or away from (positive) the target
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance + delta).max(Self::MIN_DISTANCE);
    }

    /// View matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(&self.eye(), &self.target, &Vec3::y())
    }

    /// Projection matrix for the given aspect ratio (width / height)
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        vulkan_perspective(self.fov_y, aspect, self.near, self.far)
    }
}

/// Right-handed perspective projection with Y flipped and depth in `[0, 1]`
pub fn vulkan_perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let focal = 1.0 / (fov_y * 0.5).tan();
    let aspect = if aspect > 0.0 { aspect } else { 1.0 };

    Mat4::new(
        focal / aspect, 0.0, 0.0, 0.0,
        0.0, -focal, 0.0, 0.0,
        0.0, 0.0, far / (near - far), near * far / (near - far),
        0.0, 0.0, -1.0, 0.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    fn project(matrix: &Mat4, point: Vec3) -> Vec3 {
        let clip = matrix * Vec4::new(point.x, point.y, point.z, 1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    #[test]
    fn test_depth_range_is_zero_to_one() {
        let projection = vulkan_perspective(60.0_f32.to_radians(), 1.0, 0.5, 50.0);

        assert_relative_eq!(project(&projection, Vec3::new(0.0, 0.0, -0.5)).z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(project(&projection, Vec3::new(0.0, 0.0, -50.0)).z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_up_maps_to_negative_clip_y() {
        let projection = vulkan_perspective(60.0_f32.to_radians(), 1.0, 0.1, 10.0);
        let ndc = project(&projection, Vec3::new(0.0, 1.0, -5.0));
        assert!(ndc.y < 0.0);
    }

    #[test]
    fn test_view_places_target_on_negative_z() {
        let camera = OrbitCamera::default();
        let view = camera.view_matrix();
        let target = view * camera.target.to_homogeneous();

        assert_relative_eq!(target.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.z, -camera.distance, epsilon = 1e-4);
    }

    #[test]
    fn test_pitch_and_distance_are_clamped() {
        let mut camera = OrbitCamera::default();
        camera.orbit(0.0, 10.0);
        camera.zoom(-100.0);

        assert_relative_eq!(camera.pitch, 1.5);
        assert_relative_eq!(camera.distance, 0.2);
    }
}
