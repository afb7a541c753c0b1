//! Vulkan implementation of the draw recording seam

use ash::vk;

use crate::foundation::math::Mat4;
use crate::render::backend::{DrawRecorder, OverlayRecorder, PassKind};
use crate::render::backends::vulkan::graph::texture_debug::{OverlayImage, TextureDebugView};
use crate::render::backends::vulkan::rendering::commands::ActiveRenderPass;
use crate::render::backends::vulkan::rendering::shader::GraphicsPipeline;
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::descriptor_set::DescriptorSetWriter;
use crate::render::backends::vulkan::resources::texture::Texture;
use crate::render::backends::vulkan::{
    VulkanError, VulkanResult, MODEL_PUSH_CONSTANT_OFFSET, TEXTURE_INDEX_PUSH_CONSTANT_OFFSET,
};
use crate::render::primitives::material::Material;
use crate::render::primitives::quad::PrimitiveMeshes;

/// Records one pass of one frame slot
///
/// Owns the open render pass; dropping the recorder ends it.
pub struct PassRecorder<'a> {
    pass: ActiveRenderPass<'a>,
    kind: PassKind,
    slot: usize,
    layout: vk::PipelineLayout,
    bindless_set: vk::DescriptorSet,
    sampler: vk::Sampler,
    primitives: &'a PrimitiveMeshes<Buffer>,
    overlay: Option<&'a TextureDebugView>,
}

impl<'a> PassRecorder<'a> {
    /// Wrap an open render pass
    pub fn new(
        pass: ActiveRenderPass<'a>,
        kind: PassKind,
        slot: usize,
        primitives: &'a PrimitiveMeshes<Buffer>,
    ) -> Self {
        Self {
            pass,
            kind,
            slot,
            layout: vk::PipelineLayout::null(),
            bindless_set: vk::DescriptorSet::null(),
            sampler: vk::Sampler::null(),
            primitives,
            overlay: None,
        }
    }

    /// Cached primitive meshes
    pub fn primitives(&self) -> &'a PrimitiveMeshes<Buffer> {
        self.primitives
    }

    /// Bind `pipeline`; later pushes and set binds use its layout
    pub fn use_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        self.pass.cmd_bind_pipeline(pipeline.handle());
        self.layout = pipeline.layout();
    }

    /// Bind descriptor sets against the current pipeline layout
    pub fn bind_descriptor_sets(&mut self, first_set: u32, sets: &[vk::DescriptorSet]) {
        self.pass.cmd_bind_descriptor_sets(self.layout, first_set, sets);
    }

    /// Bindless set and sampler that [`DrawRecorder::write_texture`] writes into
    pub fn set_bindless_target(&mut self, set: vk::DescriptorSet, sampler: vk::Sampler) {
        self.bindless_set = set;
        self.sampler = sampler;
    }

    /// Overlay pipeline used by [`OverlayRecorder::bind_overlay_image`]
    pub fn set_overlay(&mut self, overlay: &'a TextureDebugView) {
        self.overlay = Some(overlay);
    }

    /// Full-extent viewport and scissor
    pub fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        self.pass.set_viewport(&viewport);
        self.pass.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
    }

    /// Dynamic depth bias
    pub fn set_depth_bias(&mut self, constant: f32, clamp: f32, slope: f32) {
        self.pass.set_depth_bias(constant, clamp, slope);
    }

    /// Write a combined image sampler into a set the caller owns
    pub fn write_image(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) {
        DescriptorSetWriter::new()
            .write_image(set, binding, 0, view, sampler, layout)
            .update(self.pass.device());
    }
}

impl<'a> DrawRecorder for PassRecorder<'a> {
    type Buffer = Buffer;
    type Texture = Texture;

    fn pass_kind(&self) -> PassKind {
        self.kind
    }

    fn write_texture(&mut self, index: u32, texture: &Texture) -> VulkanResult<()> {
        if self.bindless_set == vk::DescriptorSet::null() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("No bindless set bound for texture element {}", index),
            });
        }

        DescriptorSetWriter::new()
            .write_image(
                self.bindless_set,
                0,
                index,
                texture.view(),
                self.sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .update(self.pass.device());
        Ok(())
    }

    fn push_model_matrix(&mut self, model: &Mat4) {
        self.pass.cmd_push_constants(
            self.layout,
            vk::ShaderStageFlags::VERTEX,
            MODEL_PUSH_CONSTANT_OFFSET,
            bytemuck::cast_slice(model.as_slice()),
        );
    }

    fn push_texture_indices(&mut self, material: &Material) {
        self.pass.cmd_push_constants(
            self.layout,
            vk::ShaderStageFlags::FRAGMENT,
            TEXTURE_INDEX_PUSH_CONSTANT_OFFSET,
            bytemuck::bytes_of(material),
        );
    }

    fn bind_geometry(&mut self, vertex_buffer: &Buffer, index_buffer: &Buffer) {
        self.pass.cmd_bind_vertex_buffers(0, &[vertex_buffer.handle()], &[0]);
        self.pass
            .cmd_bind_index_buffer(index_buffer.handle(), 0, vk::IndexType::UINT32);
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.pass.cmd_draw_indexed(index_count, 1, 0, 0, 0);
    }
}

impl<'a> OverlayRecorder for PassRecorder<'a> {
    type Image = OverlayImage;

    fn texture_image(&self, texture: &Texture) -> OverlayImage {
        OverlayImage {
            view: texture.view(),
            sampler: self.sampler,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    fn bind_overlay_image(&mut self, image: OverlayImage) -> VulkanResult<()> {
        let overlay = self.overlay.ok_or_else(|| VulkanError::InvalidOperation {
            reason: "No overlay pipeline set on this pass".to_string(),
        })?;
        let set = overlay.set(self.slot);

        self.write_image(set, 0, image.view, image.sampler, image.layout);
        self.use_pipeline(overlay.pipeline());
        self.bind_descriptor_sets(0, &[set]);
        Ok(())
    }
}
