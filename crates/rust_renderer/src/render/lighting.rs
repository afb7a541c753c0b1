//! Lighting and per-frame uniform blocks
//!
//! The `*Ubo` structs mirror the std140 uniform blocks of the shaders byte for
//! byte and are copied into persistently mapped buffers once per frame.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{to_columns, Mat4, Vec3};

/// Directional light (like sunlight)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction towards the light; not normalized so it can double as a position
    pub direction: Vec3,
    /// Light intensity
    pub intensity: f32,
    /// Near plane of the light-space projection
    pub z_near: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(1.0, 1.0, 0.0).normalize(),
            intensity: 0.5,
            z_near: 0.1,
        }
    }
}

impl DirectionalLight {
    /// Create a directional light
    pub fn new(direction: Vec3, intensity: f32) -> Self {
        Self {
            direction,
            intensity,
            ..Self::default()
        }
    }
}

/// std140 `DirectionalLight`: vec3 + float + float, padded to 32 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuDirectionalLight {
    /// Direction towards the light
    pub direction: [f32; 3],
    /// Light intensity
    pub intensity: f32,
    /// Near plane
    pub z_near: f32,
    _padding: [f32; 3],
}

impl From<&DirectionalLight> for GpuDirectionalLight {
    fn from(light: &DirectionalLight) -> Self {
        Self {
            direction: light.direction.into(),
            intensity: light.intensity,
            z_near: light.z_near,
            _padding: [0.0; 3],
        }
    }
}

/// Vertex-stage uniform block shared by the main and shadow passes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexUbo {
    /// Light projection times light view
    pub light_space: [[f32; 4]; 4],
    /// Camera view matrix
    pub view: [[f32; 4]; 4],
    /// Camera projection matrix, Y already flipped
    pub proj: [[f32; 4]; 4],
}

impl Default for VertexUbo {
    fn default() -> Self {
        let identity = to_columns(&Mat4::identity());
        Self {
            light_space: identity,
            view: identity,
            proj: identity,
        }
    }
}

impl VertexUbo {
    /// Replace the camera matrices, keeping the light-space matrix
    pub fn with_camera(mut self, view: &Mat4, proj: &Mat4) -> Self {
        self.view = to_columns(view);
        self.proj = to_columns(proj);
        self
    }

    /// Replace the light-space matrix
    pub fn with_light_space(mut self, light_space: &Mat4) -> Self {
        self.light_space = to_columns(light_space);
        self
    }
}

/// Fragment-stage uniform block of the main pass
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct FragmentUbo {
    /// Sun parameters
    pub light: GpuDirectionalLight,
    /// World-space camera position
    pub camera_pos: [f32; 3],
    _padding: f32,
}

impl FragmentUbo {
    /// Build the block for a light and camera position
    pub fn new(light: &DirectionalLight, camera_pos: Vec3) -> Self {
        Self {
            light: light.into(),
            camera_pos: camera_pos.into(),
            _padding: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn uniform_blocks_match_std140_sizes() {
        assert_eq!(mem::size_of::<GpuDirectionalLight>(), 32);
        assert_eq!(mem::size_of::<FragmentUbo>(), 48);
        assert_eq!(mem::size_of::<VertexUbo>(), 192);
    }

    #[test]
    fn camera_position_follows_light_block() {
        let ubo = FragmentUbo::new(&DirectionalLight::new(Vec3::new(10.0, 10.0, 10.0), 2.0), Vec3::new(1.0, 2.0, 3.0));
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&ubo));

        assert_eq!(&floats[0..4], &[10.0, 10.0, 10.0, 2.0]);
        assert_eq!(&floats[8..11], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn camera_update_keeps_light_space() {
        let light_space = Mat4::new_scaling(2.0);
        let ubo = VertexUbo::default()
            .with_light_space(&light_space)
            .with_camera(&Mat4::identity(), &Mat4::identity());

        assert_eq!(ubo.light_space, to_columns(&light_space));
    }
}
