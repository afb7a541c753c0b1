//! GPU-resident geometry
//!
//! A [`Mesh`] owns one vertex buffer, one index buffer and the [`Material`]
//! of its geometry group. It is built once through an [`UploadTarget`] and
//! never changes afterwards.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem;

use crate::foundation::math::Mat4;
use crate::render::backend::{DrawRecorder, PassKind, UploadTarget};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::primitives::material::Material;

/// Interleaved vertex as consumed by every pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    /// Single interleaved binding at slot 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(mem::size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    /// Position, normal and texture coordinate at locations 0, 1 and 2
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

/// Immutable vertex/index buffers plus one material
pub struct Mesh<B> {
    vertex_buffer: B,
    index_buffer: B,
    index_count: u32,
    material: Material,
}

impl<B> Mesh<B> {
    /// Upload host geometry through `target`
    ///
    /// Both streams must be non-empty; nothing is uploaded otherwise.
    pub fn upload<U>(target: &mut U, vertices: &[Vertex], indices: &[u32], material: Material) -> VulkanResult<Self>
    where
        U: UploadTarget<Buffer = B>,
    {
        if vertices.is_empty() || indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "mesh needs vertices and indices, got {} and {}",
                    vertices.len(),
                    indices.len()
                ),
            });
        }

        let vertex_buffer = target.create_vertex_buffer(vertices)?;
        let index_buffer = target.create_index_buffer(indices)?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            material,
        })
    }

    /// Number of indices drawn
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Model-local material
    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Record this mesh with `model` as its transform
    ///
    /// Texture indices are pushed only in the main pass, shifted by
    /// `bindless_base`.
    pub fn draw<R>(&self, recorder: &mut R, model: &Mat4, bindless_base: u32)
    where
        R: DrawRecorder<Buffer = B>,
    {
        recorder.push_model_matrix(model);
        if recorder.pass_kind() == PassKind::Main {
            recorder.push_texture_indices(&self.material.offset_by(bindless_base));
        }
        recorder.bind_geometry(&self.vertex_buffer, &self.index_buffer);
        recorder.draw_indexed(self.index_count);
    }
}
