//! Vulkan renderer: the process-scoped device context and its frame loop
//!
//! [`VulkanRenderer`] owns every GPU object. Subsystems that need device
//! access receive it explicitly, e.g. model loading goes through
//! [`VulkanRenderer::uploader`].

use std::path::Path;

use ash::vk;

use crate::assets::SceneImporter;
use crate::core::config::{RendererConfig, ShadowConfig};
use crate::foundation::math::Vec3;
use crate::render::backend::PassKind;
use crate::render::backends::vulkan::frame::{
    AcquireOutcome, FrameBackend, FrameOrchestrator, FrameOutcome, FrameSlot, PresentOutcome, MAX_FRAMES_IN_FLIGHT,
};
use crate::render::backends::vulkan::graph::{self, DebugOverlay, OverlayImage, SceneRenderer, ShadowPass, TextureDebugView};
use crate::render::backends::vulkan::initialization::context::VulkanContext;
use crate::render::backends::vulkan::initialization::policy::DevicePolicy;
use crate::render::backends::vulkan::rendering::commands::CommandPool;
use crate::render::backends::vulkan::rendering::recorder::PassRecorder;
use crate::render::backends::vulkan::rendering::render_pass::RenderPass;
use crate::render::backends::vulkan::rendering::shader::{GraphicsPipeline, PipelineOptions};
use crate::render::backends::vulkan::resources::allocator::ResourceAllocator;
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetWriter};
use crate::render::backends::vulkan::resources::texture::{Sampler, SamplerKind, Texture};
use crate::render::backends::vulkan::state::framebuffer::{find_depth_format, DEPTH_FORMAT_CANDIDATES};
use crate::render::backends::vulkan::state::swapchain::surface_format;
use crate::render::backends::vulkan::state::swapchain_manager::SwapchainManager;
use crate::render::backends::vulkan::{VulkanError, VulkanResult, MAX_NUM_TEXTURE_BINDING, SHADOW_MAP_BINDING};
use crate::render::primitives::mesh::Mesh;
use crate::render::primitives::model::Model;
use crate::render::primitives::quad::PrimitiveMeshes;
use crate::render::window::Window;

/// GPU state of the renderer
///
/// Field order is drop order: scene-facing objects first, the device context last.
struct RendererCore {
    primitives: PrimitiveMeshes<Buffer>,
    frames: [FrameSlot; MAX_FRAMES_IN_FLIGHT],
    texture_debug: TextureDebugView,
    shadow: ShadowPass,
    main_pipeline: GraphicsPipeline,
    _bindless_pool: DescriptorPool,
    _uniform_pool: DescriptorPool,
    _bindless_layout: DescriptorSetLayout,
    _uniform_layout: DescriptorSetLayout,
    default_sampler: Sampler,
    swapchain: SwapchainManager,
    main_render_pass: RenderPass,
    _command_pool: CommandPool,
    allocator: ResourceAllocator,
    policy: Box<dyn DevicePolicy>,
    clear_color: [f32; 4],
    context: VulkanContext,
}

impl Drop for RendererCore {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {}", e);
        }
        log::debug!("Destroying renderer resources");
    }
}

/// Frame-loop operations bound to one window for one frame
struct FrameDriver<'r> {
    core: &'r mut RendererCore,
    window: &'r mut Window,
}

impl<'r> FrameBackend for FrameDriver<'r> {
    type Scene = dyn SceneRenderer;

    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.core.frames[slot].sync.wait_in_flight()
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
        let semaphore = self.core.frames[slot].sync.image_available();
        AcquireOutcome::from_result(self.core.swapchain.swapchain().acquire_next_image(semaphore))
    }

    fn reset_slot_fence(&mut self, slot: usize) -> VulkanResult<()> {
        self.core.frames[slot].sync.reset_in_flight()
    }

    fn record(&mut self, slot: usize, image_index: u32, scene: &Self::Scene) -> VulkanResult<()> {
        let core = &mut *self.core;
        let frame = &mut core.frames[slot];

        frame.recorder.reset()?;
        frame.recorder.begin()?;

        let light_space = core.shadow.record(&mut frame.recorder, slot, scene, &core.primitives)?;

        let extent = core.swapchain.extent();
        let (vertex_ubo, fragment_ubo) = graph::main_uniforms(scene, extent, &light_space);
        frame.vertex_ubo.write(&vertex_ubo);
        frame.fragment_ubo.write(&fragment_ubo);

        let shadow_map = OverlayImage {
            view: core.shadow.map_view(),
            sampler: core.shadow.sampler(),
            layout: core.shadow.map_layout(),
        };
        DescriptorSetWriter::new()
            .write_image(
                frame.uniform_set,
                SHADOW_MAP_BINDING,
                0,
                shadow_map.view,
                shadow_map.sampler,
                shadow_map.layout,
            )
            .update(core.allocator.device());

        let sets = [frame.uniform_set, frame.bindless_set];
        let bindless_set = frame.bindless_set;
        let default_sampler = core.default_sampler.handle();
        let framebuffer = core.swapchain.framebuffer(image_index)?;
        let clear_values = graph::main_clear_values(core.clear_color);

        {
            let pass = frame.recorder.begin_render_pass(
                core.main_render_pass.handle(),
                framebuffer,
                vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                &clear_values,
            )?;

            let mut recorder = PassRecorder::new(pass, PassKind::Main, slot, &core.primitives);
            recorder.use_pipeline(&core.main_pipeline);
            recorder.set_viewport_and_scissor(extent);
            recorder.set_depth_bias(0.0, 0.0, 0.0);
            recorder.bind_descriptor_sets(0, &sets);
            recorder.set_bindless_target(bindless_set, default_sampler);
            scene.draw(&mut recorder)?;

            recorder.set_overlay(&core.texture_debug);
            let mut overlay = DebugOverlay::new(&mut recorder, core.primitives.cached_quad(), shadow_map);
            scene.draw_overlay(&mut overlay)?;
        }

        frame.recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> VulkanResult<()> {
        let frame = &self.core.frames[slot];
        let wait_semaphores = [frame.sync.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.recorder.handle()];
        let signal_semaphores = [frame.sync.render_finished()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.core
                .allocator
                .device()
                .queue_submit(
                    self.core.context.graphics_queue(),
                    &[submit_info.build()],
                    frame.sync.in_flight(),
                )
                .map_err(VulkanError::Api)
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
        let queue = self.core.context.present_queue();
        let wait = self.core.frames[slot].sync.render_finished();

        let outcome = PresentOutcome::from_result(self.core.swapchain.swapchain().present(queue, wait, image_index))?;

        unsafe {
            self.core
                .allocator
                .device()
                .queue_wait_idle(queue)
                .map_err(VulkanError::Api)?;
        }
        Ok(outcome)
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        let core = &mut *self.core;
        core.swapchain.recreate(
            self.window,
            &core.context,
            &core.allocator,
            core.main_render_pass.handle(),
            core.policy.as_ref(),
        )
    }
}

/// Two-pass Vulkan renderer with a fixed ring of frames in flight
pub struct VulkanRenderer {
    orchestrator: FrameOrchestrator,
    core: RendererCore,
}

impl VulkanRenderer {
    /// Bootstrap the device and build every pass for `window`
    pub fn new(
        window: &Window,
        config: &RendererConfig,
        shadow_config: &ShadowConfig,
        policy: Box<dyn DevicePolicy>,
    ) -> VulkanResult<Self> {
        log::debug!("Creating VulkanRenderer...");

        let context = VulkanContext::new(
            window,
            &config.application_name,
            config.validation_enabled(),
            policy.as_ref(),
        )?;
        let allocator = ResourceAllocator::new(&context, config.bindless_capacity)?;
        let device = context.raw_device();
        let command_pool = CommandPool::new(device.clone(), context.device.graphics_family)?;

        let depth_format = find_depth_format(&DEPTH_FORMAT_CANDIDATES, |f| allocator.supports_depth_attachment(f))?;
        let color_format = surface_format(&context, policy.as_ref())?.format;
        let main_render_pass = RenderPass::main_pass(device.clone(), color_format, depth_format)?;

        let swapchain = SwapchainManager::new(
            &context,
            &allocator,
            main_render_pass.handle(),
            depth_format,
            window.framebuffer_size(),
            policy.as_ref(),
        )?;

        let default_sampler = Sampler::new(
            device.clone(),
            SamplerKind::Default {
                max_anisotropy: allocator.max_sampler_anisotropy(),
            },
        )?;

        let frames_in_flight = MAX_FRAMES_IN_FLIGHT as u32;
        let uniform_layout = DescriptorSetLayout::main_uniforms(&device, SHADOW_MAP_BINDING)?;
        let bindless_layout = DescriptorSetLayout::bindless(&device, config.bindless_capacity)?;
        let uniform_pool = DescriptorPool::uniforms(&device, frames_in_flight, MAX_NUM_TEXTURE_BINDING)?;
        let bindless_pool = DescriptorPool::bindless(&device, frames_in_flight, config.bindless_capacity)?;
        let uniform_sets = uniform_pool.allocate(&[uniform_layout.handle(); MAX_FRAMES_IN_FLIGHT])?;
        let bindless_sets =
            bindless_pool.allocate_variable(&[bindless_layout.handle(); MAX_FRAMES_IN_FLIGHT], config.bindless_capacity)?;

        let main_pipeline = GraphicsPipeline::from_files(
            &device,
            &config.shader_dir.join("default.vert.spv"),
            &config.shader_dir.join("default.frag.spv"),
            main_render_pass.handle(),
            &[uniform_layout.handle(), bindless_layout.handle()],
            PipelineOptions::default(),
        )?;
        let shadow = ShadowPass::new(&allocator, depth_format, &config.shader_dir, shadow_config)?;
        let texture_debug = TextureDebugView::new(&device, main_render_pass.handle(), &config.shader_dir)?;

        let frames = FrameSlot::create_ring(
            &device,
            allocator.memory_properties(),
            &command_pool,
            &uniform_sets,
            &bindless_sets,
        )?;

        log::debug!("VulkanRenderer created with {} frames in flight", MAX_FRAMES_IN_FLIGHT);

        Ok(Self {
            orchestrator: FrameOrchestrator::new(),
            core: RendererCore {
                primitives: PrimitiveMeshes::new(),
                frames,
                texture_debug,
                shadow,
                main_pipeline,
                _bindless_pool: bindless_pool,
                _uniform_pool: uniform_pool,
                _bindless_layout: bindless_layout,
                _uniform_layout: uniform_layout,
                default_sampler,
                swapchain,
                main_render_pass,
                _command_pool: command_pool,
                allocator,
                policy,
                clear_color: config.clear_color,
                context,
            },
        })
    }

    /// Render and present one frame of `scene`
    pub fn draw_frame(&mut self, window: &mut Window, scene: &(dyn SceneRenderer + 'static)) -> VulkanResult<FrameOutcome> {
        let resized = window.take_resized();
        let mut driver = FrameDriver {
            core: &mut self.core,
            window,
        };
        self.orchestrator.draw_frame(&mut driver, scene, resized)
    }

    /// Resource creation for meshes, textures and models
    pub fn uploader(&mut self) -> &mut ResourceAllocator {
        &mut self.core.allocator
    }

    /// Import a scene file and upload it as a model
    pub fn load_model<I>(&mut self, importer: &I, path: &Path, position: Vec3) -> VulkanResult<Model<Buffer, Texture>>
    where
        I: SceneImporter + ?Sized,
    {
        Model::load(&mut self.core.allocator, importer, path, position)
    }

    /// Release a model once the GPU no longer uses it, freeing its bindless range
    pub fn unload_model(&mut self, model: Model<Buffer, Texture>) -> VulkanResult<()> {
        self.core.context.wait_idle()?;
        model.unload(&mut self.core.allocator)
    }

    /// The cached unit quad, created on first use
    pub fn quad(&mut self) -> VulkanResult<&Mesh<Buffer>> {
        let core = &mut self.core;
        core.primitives.quad(&mut core.allocator)
    }

    /// Current swapchain extent
    pub fn swapchain_extent(&self) -> (u32, u32) {
        let extent = self.core.swapchain.extent();
        (extent.width, extent.height)
    }

    /// Name of the selected GPU
    pub fn device_name(&self) -> String {
        self.core.context.physical_device.name()
    }

    /// Frames presented so far
    pub fn frames_presented(&self) -> u64 {
        self.orchestrator.frames_presented()
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.core.context.wait_idle()
    }
}
