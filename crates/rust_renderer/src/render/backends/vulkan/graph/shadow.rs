//! Shadow map pass
//!
//! Depth-only rendering of the scene from the sun into one fixed-size depth
//! image. The pass has its own render pass, pipeline, descriptor sets and
//! uniform buffers; the only thing it shares with the main pass is the depth
//! image, which the main pass samples at [`SHADOW_MAP_BINDING`].
//!
//! [`SHADOW_MAP_BINDING`]: crate::render::backends::vulkan::SHADOW_MAP_BINDING

use std::path::Path;

use ash::vk;

use crate::core::config::ShadowConfig;
use crate::foundation::math::{self, Mat4, Vec3, WORLD_UP};
use crate::render::backend::PassKind;
use crate::render::backends::vulkan::frame::MAX_FRAMES_IN_FLIGHT;
use crate::render::backends::vulkan::graph::SceneRenderer;
use crate::render::backends::vulkan::rendering::commands::CommandRecorder;
use crate::render::backends::vulkan::rendering::recorder::PassRecorder;
use crate::render::backends::vulkan::rendering::render_pass::{RenderPass, SHADOW_MAP_LAYOUT};
use crate::render::backends::vulkan::rendering::shader::{GraphicsPipeline, PipelineOptions};
use crate::render::backends::vulkan::resources::allocator::ResourceAllocator;
use crate::render::backends::vulkan::resources::buffer::{Buffer, MappedUniformBuffer};
use crate::render::backends::vulkan::resources::descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetWriter};
use crate::render::backends::vulkan::resources::texture::{Sampler, SamplerKind, Texture};
use crate::render::backends::vulkan::state::framebuffer::Framebuffer;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::lighting::{DirectionalLight, VertexUbo};
use crate::render::primitives::quad::PrimitiveMeshes;

/// Orthographic light projection times a view looking from the sun at the origin
///
/// The projection's Y term is flipped for Vulkan clip space.
pub fn light_space_matrix(light: &DirectionalLight, settings: &ShadowConfig) -> Mat4 {
    let view = math::look_at(&light.direction, &Vec3::zeros(), &WORLD_UP);
    let [left, right, bottom, top] = settings.ortho_bounds;
    let projection = math::flip_y(math::orthographic(left, right, bottom, top, settings.near, settings.far));
    projection * view
}

struct ShadowSlot {
    framebuffer: Framebuffer,
    ubo: MappedUniformBuffer<VertexUbo>,
    set: vk::DescriptorSet,
}

/// Shadow render target and everything needed to fill it
pub struct ShadowPass {
    slots: Vec<ShadowSlot>,
    pipeline: GraphicsPipeline,
    _pool: DescriptorPool,
    _layout: DescriptorSetLayout,
    sampler: Sampler,
    map: Texture,
    render_pass: RenderPass,
    settings: ShadowConfig,
}

impl ShadowPass {
    /// Create the depth map, one framebuffer and uniform set per frame slot, and the pipeline
    pub fn new(
        allocator: &ResourceAllocator,
        depth_format: vk::Format,
        shader_dir: &Path,
        settings: &ShadowConfig,
    ) -> VulkanResult<Self> {
        let device = allocator.device().clone();
        let extent = vk::Extent2D {
            width: settings.resolution,
            height: settings.resolution,
        };

        let render_pass = RenderPass::shadow_pass(device.clone(), depth_format)?;
        let map = allocator.create_attachment(
            extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::DEPTH,
        )?;
        let sampler = Sampler::new(device.clone(), SamplerKind::Shadow)?;
        let layout = DescriptorSetLayout::shadow_uniforms(&device)?;
        let pool = DescriptorPool::uniforms(&device, MAX_FRAMES_IN_FLIGHT as u32, 0)?;
        let sets = pool.allocate(&[layout.handle(); MAX_FRAMES_IN_FLIGHT])?;

        let pipeline = GraphicsPipeline::from_files(
            &device,
            &shader_dir.join("shadow_mapping.vert.spv"),
            &shader_dir.join("shadow_mapping.frag.spv"),
            render_pass.handle(),
            &[layout.handle()],
            PipelineOptions::shadow(),
        )?;

        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for &set in &sets {
            let ubo = MappedUniformBuffer::<VertexUbo>::new(device.clone(), allocator.memory_properties())?;
            DescriptorSetWriter::new()
                .write_buffer(set, 0, ubo.handle(), MappedUniformBuffer::<VertexUbo>::range())
                .update(&device);
            let framebuffer = Framebuffer::new(device.clone(), render_pass.handle(), &[map.view()], extent)?;
            slots.push(ShadowSlot { framebuffer, ubo, set });
        }

        log::debug!(
            "Created {}x{} shadow map ({:?}) with {} slots",
            extent.width,
            extent.height,
            depth_format,
            slots.len()
        );

        Ok(Self {
            slots,
            pipeline,
            _pool: pool,
            _layout: layout,
            sampler,
            map,
            render_pass,
            settings: settings.clone(),
        })
    }

    /// Depth view sampled by the main pass
    pub fn map_view(&self) -> vk::ImageView {
        self.map.view()
    }

    /// Layout the map is in after the pass
    pub fn map_layout(&self) -> vk::ImageLayout {
        SHADOW_MAP_LAYOUT
    }

    /// Border-clamped sampler for the map
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    /// Light-space matrix for `light` under the current settings
    pub fn light_space(&self, light: &DirectionalLight) -> Mat4 {
        light_space_matrix(light, &self.settings)
    }

    /// Record the pass for `slot` and return the light-space matrix it used
    pub fn record<S>(
        &mut self,
        commands: &mut CommandRecorder,
        slot: usize,
        scene: &S,
        primitives: &PrimitiveMeshes<Buffer>,
    ) -> VulkanResult<Mat4>
    where
        S: SceneRenderer + ?Sized,
    {
        let light_space = self.light_space(scene.sun());
        let shadow_slot = self.slots.get_mut(slot).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("No shadow slot {}", slot),
        })?;
        shadow_slot.ubo.write(&VertexUbo::default().with_light_space(&light_space));

        let set = shadow_slot.set;
        let framebuffer = shadow_slot.framebuffer.handle();
        let extent = self.map.extent();
        let clear_values = [vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        }];

        let pass = commands.begin_render_pass(
            self.render_pass.handle(),
            framebuffer,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            &clear_values,
        )?;

        let mut recorder = PassRecorder::new(pass, PassKind::Shadow, slot, primitives);
        recorder.use_pipeline(&self.pipeline);
        recorder.set_viewport_and_scissor(extent);
        recorder.set_depth_bias(
            self.settings.depth_bias_constant,
            self.settings.depth_bias_clamp,
            self.settings.depth_bias_slope,
        );
        recorder.bind_descriptor_sets(0, &[set]);
        scene.draw(&mut recorder)?;

        Ok(light_space)
    }
}
