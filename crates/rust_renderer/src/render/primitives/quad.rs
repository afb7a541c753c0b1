//! Built-in primitive meshes
//!
//! The unit quad is created on first request and cached by the owner of the
//! [`PrimitiveMeshes`] value, usually the renderer.

use crate::foundation::math::{Mat4, Vec3};
use crate::render::backend::UploadTarget;
use crate::render::backends::vulkan::VulkanResult;
use crate::render::primitives::material::Material;
use crate::render::primitives::mesh::{Mesh, Vertex};

/// Unit quad in the XY plane facing -Z
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-1.0, -1.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0]),
    Vertex::new([-1.0, 1.0, 0.0], [0.0, 0.0, -1.0], [0.0, 0.0]),
    Vertex::new([1.0, 1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0]),
    Vertex::new([1.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 1.0]),
];

/// Two counter-clockwise triangles
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Model matrix laying the quad flat with its normal pointing up
pub fn ground_plane_transform() -> Mat4 {
    Mat4::new_rotation(Vec3::x() * std::f32::consts::FRAC_PI_2)
}

/// Lazily created primitive meshes
pub struct PrimitiveMeshes<B> {
    quad: Option<Mesh<B>>,
}

impl<B> Default for PrimitiveMeshes<B> {
    fn default() -> Self {
        Self { quad: None }
    }
}

impl<B> PrimitiveMeshes<B> {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The quad, uploading it through `target` on the first call
    pub fn quad<U>(&mut self, target: &mut U) -> VulkanResult<&Mesh<B>>
    where
        U: UploadTarget<Buffer = B>,
    {
        let mesh = match self.quad.take() {
            Some(mesh) => mesh,
            None => {
                log::debug!("Creating primitive quad");
                Mesh::upload(target, &QUAD_VERTICES, &QUAD_INDICES, Material::default())?
            }
        };
        Ok(self.quad.insert(mesh))
    }

    /// The quad if it has been created already
    pub fn cached_quad(&self) -> Option<&Mesh<B>> {
        self.quad.as_ref()
    }

    /// Number of primitive meshes created so far
    pub fn mesh_count(&self) -> usize {
        usize::from(self.quad.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::mocks::CountingUploader;
    use approx::assert_relative_eq;

    #[test]
    fn quad_is_created_once() {
        let mut uploader = CountingUploader::default();
        let mut primitives = PrimitiveMeshes::new();

        let first = primitives.quad(&mut uploader).expect("first").index_count();
        let second = primitives.quad(&mut uploader).expect("second").index_count();

        assert_eq!(first, 6);
        assert_eq!(second, 6);
        assert_eq!(primitives.mesh_count(), 1);
        assert_eq!(uploader.vertex_buffers, 1);
        assert_eq!(uploader.index_buffers, 1);
    }

    #[test]
    fn cache_starts_empty() {
        let primitives: PrimitiveMeshes<()> = PrimitiveMeshes::new();
        assert!(primitives.cached_quad().is_none());
        assert_eq!(primitives.mesh_count(), 0);
    }

    #[test]
    fn ground_transform_turns_normal_up() {
        let normal = Vec3::from(QUAD_VERTICES[0].normal);
        let turned = ground_plane_transform().transform_vector(&normal);

        assert_relative_eq!(turned, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
    }
}
