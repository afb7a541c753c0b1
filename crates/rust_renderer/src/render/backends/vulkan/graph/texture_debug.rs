//! Full-screen texture debug overlay

use std::path::Path;

use ash::{vk, Device};

use crate::foundation::math::Mat4;
use crate::render::backend::OverlayRecorder;
use crate::render::backends::vulkan::frame::MAX_FRAMES_IN_FLIGHT;
use crate::render::backends::vulkan::rendering::shader::{GraphicsPipeline, PipelineOptions};
use crate::render::backends::vulkan::resources::descriptor_set::{DescriptorPool, DescriptorSetLayout};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::primitives::mesh::Mesh;

/// Image view, sampler and current layout sampled by the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayImage {
    /// View over the sampled image
    pub view: vk::ImageView,
    /// Sampler used for the read
    pub sampler: vk::Sampler,
    /// Layout the image is in while the overlay reads it
    pub layout: vk::ImageLayout,
}

/// Pipeline and per-slot sampler sets of the debug overlay
pub struct TextureDebugView {
    pipeline: GraphicsPipeline,
    sets: Vec<vk::DescriptorSet>,
    _pool: DescriptorPool,
    _layout: DescriptorSetLayout,
}

impl TextureDebugView {
    /// Build the overlay pipeline against the main render pass
    pub fn new(device: &Device, render_pass: vk::RenderPass, shader_dir: &Path) -> VulkanResult<Self> {
        let layout = DescriptorSetLayout::single_sampler(device)?;
        let pool = DescriptorPool::new(
            device,
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: MAX_FRAMES_IN_FLIGHT as u32,
            }],
            MAX_FRAMES_IN_FLIGHT as u32,
            vk::DescriptorPoolCreateFlags::empty(),
        )?;
        let sets = pool.allocate(&[layout.handle(); MAX_FRAMES_IN_FLIGHT])?;

        let pipeline = GraphicsPipeline::from_files(
            device,
            &shader_dir.join("texture_debug.vert.spv"),
            &shader_dir.join("texture_debug.frag.spv"),
            render_pass,
            &[layout.handle()],
            PipelineOptions::overlay(),
        )?;

        Ok(Self {
            pipeline,
            sets,
            _pool: pool,
            _layout: layout,
        })
    }

    /// Overlay pipeline
    pub fn pipeline(&self) -> &GraphicsPipeline {
        &self.pipeline
    }

    /// Sampler set owned by frame slot `slot`
    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot % MAX_FRAMES_IN_FLIGHT]
    }
}

/// Overlay access handed to a scene during the main pass
///
/// The slot's overlay set is rewritten on every call, so show at most one
/// image per frame.
pub struct DebugOverlay<'r, R: OverlayRecorder> {
    recorder: &'r mut R,
    quad: Option<&'r Mesh<R::Buffer>>,
    shadow_map: R::Image,
}

impl<'r, R: OverlayRecorder> DebugOverlay<'r, R> {
    /// Overlay recording into `recorder`, drawing with the cached unit quad
    pub fn new(recorder: &'r mut R, quad: Option<&'r Mesh<R::Buffer>>, shadow_map: R::Image) -> Self {
        Self {
            recorder,
            quad,
            shadow_map,
        }
    }

    /// Draw `texture` over the whole viewport
    pub fn show(&mut self, texture: &R::Texture) -> VulkanResult<()> {
        let image = self.recorder.texture_image(texture);
        self.show_image(image)
    }

    /// Draw this slot's shadow map
    pub fn show_shadow_map(&mut self) -> VulkanResult<()> {
        self.show_image(self.shadow_map.clone())
    }

    fn show_image(&mut self, image: R::Image) -> VulkanResult<()> {
        let quad = self.quad.ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Primitive quad must be created before showing a texture".to_string(),
        })?;

        self.recorder.bind_overlay_image(image)?;
        quad.draw(&mut *self.recorder, &Mat4::identity(), 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::mocks::{Command, CountingUploader, MockBuffer, MockTexture, RecordingRecorder};
    use crate::render::backend::PassKind;
    use crate::render::primitives::quad::PrimitiveMeshes;

    fn quad_meshes() -> PrimitiveMeshes<MockBuffer> {
        let mut primitives = PrimitiveMeshes::new();
        let mut uploader = CountingUploader::default();
        primitives.quad(&mut uploader).expect("quad");
        primitives
    }

    #[test]
    fn shadow_map_is_bound_then_drawn_as_quad() {
        let primitives = quad_meshes();
        let mut recorder = RecordingRecorder::new(PassKind::Main);

        DebugOverlay::new(&mut recorder, primitives.cached_quad(), "shadow-map".to_string())
            .show_shadow_map()
            .expect("overlay");

        assert_eq!(recorder.commands[0], Command::BindOverlay("shadow-map".to_string()));
        assert_eq!(recorder.commands[1], Command::PushModel(Mat4::identity()));
        assert_eq!(recorder.draws(), [6]);
    }

    #[test]
    fn texture_is_sampled_through_its_own_image() {
        let primitives = quad_meshes();
        let mut recorder = RecordingRecorder::new(PassKind::Main);
        let texture = MockTexture {
            path: "albedo.png".to_string(),
            srgb: true,
            mipmapped: true,
        };

        DebugOverlay::new(&mut recorder, primitives.cached_quad(), "shadow-map".to_string())
            .show(&texture)
            .expect("overlay");

        let bound: Vec<&Command> = recorder
            .commands
            .iter()
            .filter(|c| matches!(c, Command::BindOverlay(_)))
            .collect();
        assert_eq!(bound, [&Command::BindOverlay("albedo.png".to_string())]);
        assert!(!recorder.commands.iter().any(|c| matches!(c, Command::WriteTexture(..))));
    }

    #[test]
    fn missing_quad_records_nothing() {
        let mut recorder = RecordingRecorder::new(PassKind::Main);

        let result = DebugOverlay::new(&mut recorder, None, "shadow-map".to_string()).show_shadow_map();

        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
        assert!(recorder.commands.is_empty());
    }
}
