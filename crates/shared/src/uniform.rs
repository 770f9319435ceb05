use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-surface uniform block: a single model-view-projection matrix.
#[repr(C)]
#[derive(Clone, Debug, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub mvp: Mat4,
}

impl UniformBufferObject {
    /// `projection * view * model`
    pub fn new(projection: Mat4, view: Mat4, model: Mat4) -> Self {
        Self {
            mvp: projection * view * model,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// View and projection parameters shared by every surface.
#[derive(Clone, Debug, Copy, PartialEq)]
pub struct Camera {
    pub view: Mat4,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    /// Right-handed perspective projection mapped to Vulkan clip space (y down, depth 0..1).
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let mut projection =
            Mat4::perspective_rh(self.fov_y_degrees.to_radians(), aspect, self.near, self.far);
        projection.y_axis.y *= -1.0;
        projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    #[test]
    fn mvp_is_projection_view_model() {
        let projection = Camera::default().projection(16.0 / 9.0);
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0));
        let model = Mat4::from_rotation_y(0.3);
        let ubo = UniformBufferObject::new(projection, view, model);
        assert!(ubo.mvp.abs_diff_eq(projection * view * model, 1e-6));
        assert_eq!(ubo.as_bytes().len(), 64);
    }

    #[test]
    fn projection_flips_y() {
        let projection = Camera::default().projection(1.0);
        let clip = projection * Vec4::new(0.0, 1.0, -5.0, 1.0);
        assert!(clip.y < 0.0);
    }
}
