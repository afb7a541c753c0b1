//! Swapchain plus everything sized to it
//!
//! The manager owns the swapchain, the depth buffer and one framebuffer per
//! swapchain image. Recreation drops framebuffers, depth, then the chain, and
//! rebuilds in reverse.

use ash::vk;

use crate::render::backends::vulkan::initialization::context::VulkanContext;
use crate::render::backends::vulkan::initialization::policy::DevicePolicy;
use crate::render::backends::vulkan::resources::allocator::ResourceAllocator;
use crate::render::backends::vulkan::state::framebuffer::{DepthBuffer, Framebuffer};
use crate::render::backends::vulkan::state::swapchain::Swapchain;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::window::Window;

/// Swapchain-dependent resource set
pub struct SwapchainManager {
    framebuffers: Vec<Framebuffer>,
    depth: Option<DepthBuffer>,
    swapchain: Swapchain,
    depth_format: vk::Format,
}

impl SwapchainManager {
    /// Create the chain, depth buffer and framebuffers
    pub fn new(
        context: &VulkanContext,
        allocator: &ResourceAllocator,
        render_pass: vk::RenderPass,
        depth_format: vk::Format,
        framebuffer_size: (u32, u32),
        policy: &dyn DevicePolicy,
    ) -> VulkanResult<Self> {
        let swapchain = Swapchain::new(context, framebuffer_size, policy)?;

        let mut manager = Self {
            framebuffers: Vec::new(),
            depth: None,
            swapchain,
            depth_format,
        };
        manager.create_attachments(context, allocator, render_pass)?;
        Ok(manager)
    }

    fn create_attachments(
        &mut self,
        context: &VulkanContext,
        allocator: &ResourceAllocator,
        render_pass: vk::RenderPass,
    ) -> VulkanResult<()> {
        let extent = self.swapchain.extent();
        let depth = DepthBuffer::new(allocator, extent, self.depth_format)?;

        for &view in self.swapchain.image_views() {
            self.framebuffers.push(Framebuffer::new(
                context.raw_device(),
                render_pass,
                &[view, depth.image_view()],
                extent,
            )?);
        }
        self.depth = Some(depth);

        log::debug!("Created {} swapchain framebuffers", self.framebuffers.len());
        Ok(())
    }

    /// Full teardown and rebuild after a resize or a stale present
    ///
    /// Blocks on the window's event pump while the framebuffer is zero-sized.
    pub fn recreate(
        &mut self,
        window: &mut Window,
        context: &VulkanContext,
        allocator: &ResourceAllocator,
        render_pass: vk::RenderPass,
        policy: &dyn DevicePolicy,
    ) -> VulkanResult<()> {
        let mut size = window.framebuffer_size();
        while size.0 == 0 || size.1 == 0 {
            window.wait_events();
            size = window.framebuffer_size();
        }

        context.wait_idle()?;
        log::debug!("Recreating swapchain for {}x{}", size.0, size.1);

        self.framebuffers.clear();
        self.depth = None;
        self.swapchain.rebuild(context, size, policy)?;
        self.create_attachments(context, allocator, render_pass)
    }

    /// The swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Current extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Framebuffer for an acquired image
    pub fn framebuffer(&self, image_index: u32) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!(
                    "Image index {} out of range for {} framebuffers",
                    image_index,
                    self.framebuffers.len()
                ),
            })
    }
}
